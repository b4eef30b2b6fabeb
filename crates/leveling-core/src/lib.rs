//! # Leveling Core
//!
//! 投入量平準化的核心資料模型與類型定義

pub mod alarm;
pub mod calendar;
pub mod config;
pub mod ledger;
pub mod order;
pub mod plan;
pub mod snapshot;

// Re-export 主要類型
pub use alarm::{AlarmCategory, AlarmLog, AlarmRecord, ShortageAggregation};
pub use calendar::{RemainingDays, WorkCalendar};
pub use config::{
    CapacityRules, LevelingConfig, LineConfig, MaxGroup, ModuleClass, RatioGroup, SequencingKey,
    SpecialtyCondition,
};
pub use ledger::{CapacityKey, Draw, Ledger};
pub use order::{BacklogRow, Order, OrderList, Pass, PassAllocation, ProductLine, Urgency};
pub use plan::{
    CapacityReportRow, PlannedUnit, PriorPlanRow, ReleaseLookup, ReleasePlan, ReleaseUnit,
    UnitClass,
};
pub use snapshot::{LineSnapshot, SharedInputs, TimeStudy};

/// 平準化錯誤類型（致命錯誤，會中止該產線的計算）
#[derive(Debug, thiserror::Error)]
pub enum LevelingError {
    #[error("缺少必要的輸入資料: {0}")]
    MissingInput(String),

    #[error("無效的日期: {0}")]
    InvalidDate(String),

    #[error("查詢失敗: {0}")]
    LookupFailed(String),

    #[error("輸入資料格式錯誤: {0}")]
    MalformedInput(String),

    #[error("配置錯誤: {0}")]
    InvalidConfig(String),

    #[error("序列化錯誤: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("計算錯誤: {0}")]
    CalculationError(String),
}

pub type Result<T> = std::result::Result<T, LevelingError>;
