//! 投入計劃模型

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::order::ProductLine;

/// 單台的排序類別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitClass {
    /// 延遲完工機種（最前面，不參與循環排序）
    Delayed,
    /// 緊急訂單
    Emergency,
    /// 一般與當日訂單（循環排序）
    Normal,
}

/// 展開後的單台
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseUnit {
    pub linkage_id: String,
    pub product_code: String,
    pub model_key: String,

    /// 排序分組鍵（設備或代表機種）
    pub sequence_key: String,

    pub class: UnitClass,
    pub due_date: NaiveDate,

    /// 原計劃欄位
    pub columns: BTreeMap<String, String>,
}

/// 已編號的單台
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedUnit {
    /// 投入序號
    pub sequence_no: u32,
    pub release_date: NaiveDate,
    pub unit: ReleaseUnit,
}

/// 單一產線的投入計劃
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasePlan {
    pub line: ProductLine,
    pub release_date: NaiveDate,
    pub units: Vec<PlannedUnit>,
}

impl ReleasePlan {
    pub fn new(line: ProductLine, release_date: NaiveDate) -> Self {
        Self {
            line,
            release_date,
            units: Vec::new(),
        }
    }

    /// 投入總台數
    pub fn total_qty(&self) -> u32 {
        self.units.len() as u32
    }

    /// 指定 Linkage 的投入台數
    pub fn qty_for(&self, linkage_id: &str) -> u32 {
        self.units
            .iter()
            .filter(|u| u.unit.linkage_id == linkage_id)
            .count() as u32
    }

    /// 依序排列的分組鍵
    pub fn sequence_keys(&self) -> Vec<&str> {
        self.units
            .iter()
            .map(|u| u.unit.sequence_key.as_str())
            .collect()
    }
}

/// 既有生產計劃的一列
///
/// 序號為空表示尚未投入。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorPlanRow {
    pub line: ProductLine,
    pub linkage_id: String,
    pub release_date: NaiveDate,
    #[serde(default)]
    pub sequence_no: Option<u32>,
}

impl PriorPlanRow {
    /// 同產線、同投入日已使用的最大序號（無則為 0）
    pub fn next_sequence_offset(rows: &[PriorPlanRow], line: ProductLine, release_date: NaiveDate) -> u32 {
        rows.iter()
            .filter(|r| r.line == line && r.release_date == release_date)
            .filter_map(|r| r.sequence_no)
            .max()
            .unwrap_or(0)
    }
}

/// 剩餘容量報表的一列
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityReportRow {
    /// 帳本名稱
    pub ledger: String,
    pub key: String,
    pub opening: i64,
    pub remaining: i64,
}

/// 投入結果查詢表（跨產線完整性檢查用）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseLookup {
    /// Linkage 編號 → 是否已投入
    pub by_linkage: BTreeMap<String, bool>,

    /// 機種代碼 → 是否已投入
    pub by_product: BTreeMap<String, bool>,
}

impl ReleaseLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// 記錄一筆結果（已投入優先）
    pub fn record(&mut self, linkage_id: &str, product_code: &str, released: bool) {
        let entry = self.by_linkage.entry(linkage_id.to_string()).or_insert(false);
        *entry |= released;
        let entry = self.by_product.entry(product_code.to_string()).or_insert(false);
        *entry |= released;
    }

    /// 合併其他產線的結果
    pub fn merge(&mut self, other: &ReleaseLookup) {
        for (linkage_id, released) in &other.by_linkage {
            *self.by_linkage.entry(linkage_id.clone()).or_insert(false) |= *released;
        }
        for (product_code, released) in &other.by_product {
            *self.by_product.entry(product_code.clone()).or_insert(false) |= *released;
        }
    }

    pub fn is_linkage_released(&self, linkage_id: &str) -> bool {
        self.by_linkage.get(linkage_id).copied().unwrap_or(false)
    }

    pub fn is_product_released(&self, product_code: &str) -> bool {
        self.by_product.get(product_code).copied().unwrap_or(false)
    }
}
