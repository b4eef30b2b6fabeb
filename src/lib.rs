//! # Leveling
//!
//! 三條產線的投入量平準化：需求彙總、配額分配、零件與容量反映、警報彙總、循環排序。

pub mod logging;
pub mod settings;

pub use leveling_calc::{
    AlarmWorkbook, LevelingWarning, LinePipeline, LineResult, WarningSeverity,
};
pub use leveling_core::{
    AlarmCategory, AlarmRecord, BacklogRow, CapacityReportRow, CapacityRules, LevelingConfig,
    LevelingError, LineConfig, LineSnapshot, MaxGroup, Order, OrderList, PriorPlanRow,
    ProductLine, RatioGroup, ReleaseLookup, ReleasePlan, SequencingKey, SharedInputs,
    SpecialtyCondition, TimeStudy, WorkCalendar,
};
pub use leveling_orchestrator::{run_all, Orchestrator, RunInputs, RunReport};

use anyhow::{Context, Result};

/// 依設定載入配置與輸入並執行
pub fn run_from_settings(settings: &settings::Settings) -> Result<RunReport> {
    let config = settings::load_config(&settings.config_path)?;
    let inputs_path = settings
        .inputs_path
        .as_deref()
        .context("未設定 LEVELING_INPUTS")?;
    let inputs = settings::load_inputs(inputs_path)?;

    let report = run_all(&config, &inputs);
    for line in ProductLine::ALL {
        match report.line(line) {
            Ok(result) => tracing::info!(
                line = %line,
                "投入 {} 台，警報 {} 筆，警告 {} 筆",
                result.released_qty,
                result.workbook.details.len(),
                result.warnings.len()
            ),
            Err(e) => tracing::error!(line = %line, "計算失敗: {}", e),
        }
    }
    Ok(report)
}

/// 將產線結果輸出為 JSON
pub fn result_to_json(result: &LineResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("無法序列化計算結果")
}
