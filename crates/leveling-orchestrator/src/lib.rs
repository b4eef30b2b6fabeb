//! # Leveling Orchestrator
//!
//! 三條產線的執行協調：標準線與電源線並行，特殊線等待標準線轉交訂單後開始。
//! 每條產線的帳本、配額與警報各自獨立，任一產線失敗不影響其他產線。

use leveling_calc::{LevelingWarning, LinePipeline, LineResult, ProgressFn};
use leveling_core::{
    LevelingConfig, LevelingError, LineSnapshot, Order, ProductLine, ReleaseLookup, Result,
    SharedInputs,
};
use std::collections::BTreeMap;

/// 一次執行的全部輸入
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct RunInputs {
    pub shared: SharedInputs,
    pub standard: LineSnapshot,
    pub power: LineSnapshot,
    pub specialty: LineSnapshot,
}

/// 一次執行的結果
#[derive(Debug)]
pub struct RunReport {
    pub standard: Result<LineResult>,
    pub power: Result<LineResult>,
    pub specialty: Result<LineResult>,

    /// 標準線轉交特殊線的台數
    pub handoff_qty: u32,

    /// 跨產線警告（轉交失敗、完整性檢查）
    pub warnings: Vec<LevelingWarning>,

    /// 合併後的投入結果查詢表
    pub lookup: ReleaseLookup,

    /// 總耗時（毫秒）
    pub calculation_time_ms: u128,
}

impl RunReport {
    pub fn line(&self, line: ProductLine) -> &Result<LineResult> {
        match line {
            ProductLine::Standard => &self.standard,
            ProductLine::Power => &self.power,
            ProductLine::Specialty => &self.specialty,
        }
    }

    /// 成功完成的產線數
    pub fn succeeded(&self) -> usize {
        ProductLine::ALL
            .iter()
            .filter(|line| self.line(**line).is_ok())
            .count()
    }
}

/// 產線協調器
pub struct Orchestrator<'a> {
    config: &'a LevelingConfig,
    shared: &'a SharedInputs,
    progress: Option<&'a ProgressFn<'a>>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a LevelingConfig, shared: &'a SharedInputs) -> Self {
        Self {
            config,
            shared,
            progress: None,
        }
    }

    /// 建構器模式：設置進度回報
    pub fn with_progress(mut self, progress: &'a ProgressFn<'a>) -> Self {
        self.progress = Some(progress);
        self
    }

    fn pipeline(&self, line: ProductLine, snapshot: &'a LineSnapshot) -> LinePipeline<'a> {
        let pipeline = LinePipeline::new(self.config.line(line), snapshot, self.shared);
        match self.progress {
            Some(progress) => pipeline.with_progress(progress),
            None => pipeline,
        }
    }

    /// 執行三條產線
    pub fn run(
        &self,
        standard: &'a LineSnapshot,
        power: &'a LineSnapshot,
        specialty: &'a LineSnapshot,
    ) -> RunReport {
        let start_time = std::time::Instant::now();
        tracing::info!(
            release_date = %self.shared.release_date,
            "開始三線平準化：標準 {} 列、電源 {} 列、特殊 {} 列",
            standard.backlog.len(),
            power.backlog.len(),
            specialty.backlog.len()
        );

        let standard_pipeline = self.pipeline(ProductLine::Standard, standard);
        let power_pipeline = self.pipeline(ProductLine::Power, power);
        let specialty_pipeline = self.pipeline(ProductLine::Specialty, specialty);

        let ((standard_result, specialty_result, handoff, handoff_warning), power_result) = rayon::join(
            || Self::run_standard_then_specialty(&standard_pipeline, &specialty_pipeline),
            || power_pipeline.calculate(Vec::new()),
        );

        let mut warnings: Vec<LevelingWarning> = handoff_warning.into_iter().collect();
        for (line, result) in [
            (ProductLine::Standard, &standard_result),
            (ProductLine::Power, &power_result),
            (ProductLine::Specialty, &specialty_result),
        ] {
            if let Err(e) = result {
                tracing::error!(line = %line, "產線計算失敗: {}", e);
            }
        }

        let mut lookup = ReleaseLookup::new();
        for result in [&standard_result, &power_result, &specialty_result]
            .into_iter()
            .flatten()
        {
            lookup.merge(&result.lookup);
        }
        warnings.extend(self.completeness_check(&lookup, [standard, power, specialty]));

        let report = RunReport {
            standard: standard_result,
            power: power_result,
            specialty: specialty_result,
            handoff_qty: handoff.iter().map(|o| o.backlog_qty).sum(),
            warnings,
            lookup,
            calculation_time_ms: start_time.elapsed().as_millis(),
        };

        tracing::info!(
            "三線平準化完成：成功 {}/3，耗時 {:?}",
            report.succeeded(),
            start_time.elapsed()
        );
        report
    }

    /// 標準線彙總並轉交後，標準線的反映與特殊線並行
    fn run_standard_then_specialty(
        standard: &LinePipeline<'a>,
        specialty: &LinePipeline<'a>,
    ) -> (Result<LineResult>, Result<LineResult>, Vec<Order>, Option<LevelingWarning>) {
        match standard.prepare() {
            Ok(mut prepared) => {
                let handoff = std::mem::take(&mut prepared.handoff);
                let (standard_result, specialty_result) = rayon::join(
                    || standard.finish(prepared, Vec::new()),
                    || specialty.calculate(handoff.clone()),
                );
                (standard_result, specialty_result, handoff, None)
            }
            Err(e) => {
                tracing::warn!("標準線彙總失敗，特殊線不含轉交訂單: {}", e);
                let warning = LevelingWarning::error(
                    ProductLine::Specialty.to_string(),
                    format!("標準線彙總失敗，未收到轉交訂單: {}", e),
                );
                let specialty_result = specialty.calculate(Vec::new());
                (Err(e), specialty_result, Vec::new(), Some(warning))
            }
        }
    }

    /// 緊急名單中沒有任何產線投入的 Linkage
    ///
    /// 依 Linkage 或機種代碼被保留的訂單不列入。
    fn completeness_check(
        &self,
        lookup: &ReleaseLookup,
        snapshots: [&LineSnapshot; 3],
    ) -> Vec<LevelingWarning> {
        let product_codes: BTreeMap<&str, &str> = snapshots
            .iter()
            .flat_map(|snapshot| snapshot.backlog.iter())
            .map(|row| (row.linkage_id.as_str(), row.product_code.as_str()))
            .collect();

        self.shared
            .emergency
            .linkage_ids
            .iter()
            .filter(|id| match product_codes.get(id.as_str()) {
                Some(product_code) => !self.shared.held.matches(id, product_code),
                None => !self.shared.held.linkage_ids.contains(*id),
            })
            .filter(|id| !lookup.is_linkage_released(id))
            .map(|id| {
                tracing::warn!(linkage_id = %id, "緊急訂單未被任何產線投入");
                LevelingWarning::warning(id.clone(), "緊急訂單未被任何產線投入".to_string())
            })
            .collect()
    }
}

/// 以 `RunInputs` 執行三條產線
pub fn run_all(config: &LevelingConfig, inputs: &RunInputs) -> RunReport {
    Orchestrator::new(config, &inputs.shared).run(&inputs.standard, &inputs.power, &inputs.specialty)
}

/// 檢查快照與產線是否一致
pub fn validate_inputs(inputs: &RunInputs) -> Result<()> {
    for (line, snapshot) in [
        (ProductLine::Standard, &inputs.standard),
        (ProductLine::Power, &inputs.power),
        (ProductLine::Specialty, &inputs.specialty),
    ] {
        if snapshot.line != line {
            return Err(LevelingError::InvalidConfig(format!(
                "{} 的快照標示為 {}",
                line, snapshot.line
            )));
        }
    }
    if inputs.shared.calendar.is_empty() {
        return Err(LevelingError::MissingInput("工作日曆".to_string()));
    }
    Ok(())
}
