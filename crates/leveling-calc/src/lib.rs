//! # Leveling Calculation Engine
//!
//! 投入量平準化計算引擎：需求彙總、平準化配額、零件／容量反映、警報分類與重新排序

pub mod aggregation;
pub mod capacity;
pub mod classifier;
pub mod component;
pub mod leveling;
pub mod pipeline;
pub mod sequencing;

// Re-export 主要類型
pub use aggregation::{AggregationOutput, DemandAggregator};
pub use capacity::{CapacityReflection, Constraint};
pub use classifier::{AlarmClassifier, AlarmSummaryRow, AlarmWorkbook, CategoryExplanation};
pub use component::ComponentReflection;
pub use leveling::{GroupQuota, LevelingAllocator};
pub use pipeline::{LinePipeline, PreparedDemand, ProgressFn};
pub use sequencing::{CyclicResequencer, UnitExpander};

use leveling_core::{CapacityReportRow, Order, ProductLine, ReleaseLookup, ReleasePlan};
use serde::Serialize;

/// 單一產線的計算結果
#[derive(Debug, Clone, Serialize)]
pub struct LineResult {
    /// 執行ID（僅用於日誌關聯）
    pub run_id: uuid::Uuid,

    pub line: ProductLine,

    /// 重新排序並編號後的投入計劃
    pub plan: ReleasePlan,

    /// 警報明細、彙總與說明
    pub workbook: AlarmWorkbook,

    /// 各帳本的期初與剩餘量
    pub capacity_report: Vec<CapacityReportRow>,

    /// 投入結果查詢表
    pub lookup: ReleaseLookup,

    /// 最終分配後的訂單（依優先順序）
    pub orders: Vec<Order>,

    /// 警告信息
    pub warnings: Vec<LevelingWarning>,

    /// 實際投入台數
    pub released_qty: u32,

    /// 未達投入目標的台數
    pub unmet_release_qty: u32,

    /// 計算耗時（毫秒）
    pub calculation_time_ms: Option<u128>,
}

impl LineResult {
    /// 創建空的計算結果
    pub fn empty(line: ProductLine, plan: ReleasePlan) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4(),
            line,
            plan,
            workbook: AlarmWorkbook::default(),
            capacity_report: Vec::new(),
            lookup: ReleaseLookup::new(),
            orders: Vec::new(),
            warnings: Vec::new(),
            released_qty: 0,
            unmet_release_qty: 0,
            calculation_time_ms: None,
        }
    }

    /// 添加警告
    pub fn add_warning(&mut self, warning: LevelingWarning) {
        self.warnings.push(warning);
    }

    /// 指定 Linkage 的最終投入台數
    pub fn released_for(&self, linkage_id: &str) -> u32 {
        self.plan.qty_for(linkage_id)
    }
}

/// 平準化警告（非致命）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelingWarning {
    /// 相關對象（產線、Linkage、機種或日期）
    pub subject: String,
    pub message: String,
    pub severity: WarningSeverity,
}

impl LevelingWarning {
    pub fn new(subject: String, message: String, severity: WarningSeverity) -> Self {
        Self {
            subject,
            message,
            severity,
        }
    }

    pub fn info(subject: String, message: String) -> Self {
        Self::new(subject, message, WarningSeverity::Info)
    }

    pub fn warning(subject: String, message: String) -> Self {
        Self::new(subject, message, WarningSeverity::Warning)
    }

    pub fn error(subject: String, message: String) -> Self {
        Self::new(subject, message, WarningSeverity::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WarningSeverity {
    Info,
    Warning,
    Error,
}
