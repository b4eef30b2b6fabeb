//! 警報模型

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::order::Order;

/// 警報分類（封閉集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlarmCategory {
    /// 1：零件庫存不足
    ComponentShortage,
    /// 2：容量（設備時間／群組上限）不足
    CapacityShortage,
    /// 2-1：比率上限不足
    RatioCapShortage,
    /// 2-2：機種絕對上限不足
    ProductCapShortage,
    /// etc1：機種沒有零件對應
    NoComponentMapping,
    /// etc2：緊急＋當日需求超過投入總量
    ReleaseCapExceeded,
    /// etc3：零件不在庫存資料中
    UnregisteredComponent,
    /// etc4：延遲完工機種超過總上限
    DelayedCapExceeded,
}

/// 彙總時的不足量計算方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortageAggregation {
    Sum,
    Max,
}

impl AlarmCategory {
    pub const ALL: [AlarmCategory; 8] = [
        Self::ComponentShortage,
        Self::CapacityShortage,
        Self::RatioCapShortage,
        Self::ProductCapShortage,
        Self::NoComponentMapping,
        Self::ReleaseCapExceeded,
        Self::UnregisteredComponent,
        Self::DelayedCapExceeded,
    ];

    /// 分類代碼
    pub fn code(&self) -> &'static str {
        match self {
            Self::ComponentShortage => "1",
            Self::CapacityShortage => "2",
            Self::RatioCapShortage => "2-1",
            Self::ProductCapShortage => "2-2",
            Self::NoComponentMapping => "etc1",
            Self::ReleaseCapExceeded => "etc2",
            Self::UnregisteredComponent => "etc3",
            Self::DelayedCapExceeded => "etc4",
        }
    }

    /// 固定說明文字
    pub fn description(&self) -> &'static str {
        match self {
            Self::ComponentShortage => "零件庫存不足，投入量依可用庫存削減",
            Self::CapacityShortage => "檢查設備時間或群組上限不足",
            Self::RatioCapShortage => "超過比率群組佔投入總量的上限",
            Self::ProductCapShortage => "超過機種的每日絕對上限",
            Self::NoComponentMapping => "機種沒有零件對應資料，請維護零件主檔",
            Self::ReleaseCapExceeded => "緊急與當日訂單超過當日投入總量",
            Self::UnregisteredComponent => "零件不在庫存資料中，請確認零件代碼",
            Self::DelayedCapExceeded => "延遲完工機種超過總上限",
        }
    }

    /// 資料維護類（etc1／etc3）取最大值，其餘加總
    pub fn aggregation(&self) -> ShortageAggregation {
        match self {
            Self::NoComponentMapping | Self::UnregisteredComponent => ShortageAggregation::Max,
            _ => ShortageAggregation::Sum,
        }
    }
}

impl fmt::Display for AlarmCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// 一筆警報明細（建立後不再修改）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmRecord {
    /// 流水號（從 1 開始）
    pub seq: u32,
    pub category: AlarmCategory,
    pub linkage_id: String,
    pub product_code: String,

    /// 相關資源（零件、設備、群組）
    pub resource_id: Option<String>,

    pub backlog_qty: u32,
    pub shortage_qty: u32,

    /// 所需時間（秒，僅設備時間類）
    pub needed_time: Option<i64>,

    pub due_date: NaiveDate,
}

/// 單一產線執行期間的警報紀錄（只能追加）
#[derive(Debug, Clone, Default)]
pub struct AlarmLog {
    records: Vec<AlarmRecord>,
}

impl AlarmLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一筆警報
    pub fn raise(
        &mut self,
        category: AlarmCategory,
        order: &Order,
        resource_id: Option<&str>,
        shortage_qty: u32,
        needed_time: Option<i64>,
    ) -> &AlarmRecord {
        let seq = self.records.len() as u32 + 1;
        self.records.push(AlarmRecord {
            seq,
            category,
            linkage_id: order.linkage_id.clone(),
            product_code: order.product_code.clone(),
            resource_id: resource_id.map(str::to_string),
            backlog_qty: order.backlog_qty,
            shortage_qty,
            needed_time,
            due_date: order.completion_date,
        });
        &self.records[self.records.len() - 1]
    }

    pub fn records(&self) -> &[AlarmRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 指定分類的警報
    pub fn by_category(&self, category: AlarmCategory) -> impl Iterator<Item = &AlarmRecord> {
        self.records.iter().filter(move |r| r.category == category)
    }

    pub fn into_records(self) -> Vec<AlarmRecord> {
        self.records
    }
}
