//! 訂單模型

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// 產線
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProductLine {
    /// 標準機種
    Standard,
    /// 電源機種
    Power,
    /// 特殊機種
    Specialty,
}

impl ProductLine {
    pub const ALL: [ProductLine; 3] = [Self::Standard, Self::Power, Self::Specialty];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::Power => "POWER",
            Self::Specialty => "SPECIALTY",
        }
    }
}

impl fmt::Display for ProductLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 緊急程度
///
/// 剩餘工作日 ≤ 0 為緊急、== 1 為當日，兩者都會略過庫存與容量檢查。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Urgency {
    /// 緊急訂單
    Emergency,
    /// 當日訂單
    SameDay,
    /// 一般訂單
    Normal,
}

impl Urgency {
    /// 依剩餘工作日判定
    pub fn from_remaining_days(days: i64) -> Self {
        match days {
            d if d <= 0 => Self::Emergency,
            1 => Self::SameDay,
            _ => Self::Normal,
        }
    }

    /// 是否略過庫存／容量檢查
    pub fn bypasses_checks(&self) -> bool {
        !matches!(self, Self::Normal)
    }
}

/// 一筆未投入的訂單明細（每列一台）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacklogRow {
    /// Linkage 編號
    pub linkage_id: String,

    /// 機種代碼
    pub product_code: String,

    /// 指定完工日
    pub completion_date: NaiveDate,

    /// 原計劃表的其他欄位（原樣帶到投入計劃）
    #[serde(default)]
    pub columns: BTreeMap<String, String>,
}

impl BacklogRow {
    /// 創建新的明細列
    pub fn new(linkage_id: String, product_code: String, completion_date: NaiveDate) -> Self {
        Self {
            linkage_id,
            product_code,
            completion_date,
            columns: BTreeMap::new(),
        }
    }

    /// 建構器模式：附加原計劃欄位
    pub fn with_column(mut self, name: &str, value: &str) -> Self {
        self.columns.insert(name.to_string(), value.to_string());
        self
    }
}

/// 緊急／保留名單
///
/// 先比對 Linkage 編號，再以機種代碼補比對。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderList {
    #[serde(default)]
    pub linkage_ids: BTreeSet<String>,

    #[serde(default)]
    pub product_codes: BTreeSet<String>,
}

impl OrderList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_linkage(mut self, linkage_id: &str) -> Self {
        self.linkage_ids.insert(linkage_id.to_string());
        self
    }

    pub fn with_product_code(mut self, product_code: &str) -> Self {
        self.product_codes.insert(product_code.to_string());
        self
    }

    pub fn matches(&self, linkage_id: &str, product_code: &str) -> bool {
        self.linkage_ids.contains(linkage_id) || self.product_codes.contains(product_code)
    }

    pub fn is_empty(&self) -> bool {
        self.linkage_ids.is_empty() && self.product_codes.is_empty()
    }
}

/// 分配階段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    /// 平準化配額內的數量
    Primary,
    /// 配額外的剩餘數量
    Remainder,
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Remainder => f.write_str("remainder"),
        }
    }
}

/// 單一階段的分配結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassAllocation {
    /// 目前核准的數量（每經過一道檢查只會減少）
    pub qty: u32,

    /// 被指派的檢查設備
    pub resource: Option<String>,
}

/// 彙總後的訂單（一個 Linkage 一筆）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Linkage 編號
    pub linkage_id: String,

    /// 機種代碼
    pub product_code: String,

    /// 代表機種
    pub model_key: String,

    /// 平準化群組（特殊條件表可覆寫，預設為代表機種）
    pub group_key: String,

    /// 完工日（延遲完工機種已提前）
    pub completion_date: NaiveDate,

    /// 未投入數量
    pub backlog_qty: u32,

    /// 剩餘工作日
    pub remaining_days: i64,

    /// 緊急程度
    pub urgency: Urgency,

    /// 特殊條件表的優先旗標（越大越優先）
    pub priority: u8,

    /// 是否為延遲完工機種（CT）
    pub delayed_variant: bool,

    /// 訂單來源產線（跨線轉入時與執行產線不同）
    pub source_line: ProductLine,

    /// 配額內分配
    pub primary: PassAllocation,

    /// 配額外分配
    pub remainder: PassAllocation,

    /// 原計劃欄位
    pub columns: BTreeMap<String, String>,
}

impl Order {
    /// 創建新的訂單
    pub fn new(
        linkage_id: String,
        product_code: String,
        model_key: String,
        completion_date: NaiveDate,
        backlog_qty: u32,
        remaining_days: i64,
    ) -> Self {
        Self {
            linkage_id,
            product_code,
            group_key: model_key.clone(),
            model_key,
            completion_date,
            backlog_qty,
            remaining_days,
            urgency: Urgency::from_remaining_days(remaining_days),
            priority: 0,
            delayed_variant: false,
            source_line: ProductLine::Standard,
            primary: PassAllocation::default(),
            remainder: PassAllocation::default(),
            columns: BTreeMap::new(),
        }
    }

    /// 建構器模式：設置緊急程度
    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }

    /// 建構器模式：設置優先旗標
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// 建構器模式：設置平準化群組
    pub fn with_group_key(mut self, group_key: String) -> Self {
        self.group_key = group_key;
        self
    }

    /// 建構器模式：標記為延遲完工機種
    pub fn with_delayed_variant(mut self, delayed: bool) -> Self {
        self.delayed_variant = delayed;
        self
    }

    /// 建構器模式：設置來源產線
    pub fn with_source_line(mut self, line: ProductLine) -> Self {
        self.source_line = line;
        self
    }

    /// 建構器模式：設置原計劃欄位
    pub fn with_columns(mut self, columns: BTreeMap<String, String>) -> Self {
        self.columns = columns;
        self
    }

    pub fn is_emergency(&self) -> bool {
        self.urgency == Urgency::Emergency
    }

    pub fn is_same_day(&self) -> bool {
        self.urgency == Urgency::SameDay
    }

    /// 緊急或當日訂單略過庫存／容量檢查（與階段無關）
    pub fn bypasses_checks(&self) -> bool {
        self.urgency.bypasses_checks()
    }

    pub fn allocation(&self, pass: Pass) -> &PassAllocation {
        match pass {
            Pass::Primary => &self.primary,
            Pass::Remainder => &self.remainder,
        }
    }

    pub fn allocation_mut(&mut self, pass: Pass) -> &mut PassAllocation {
        match pass {
            Pass::Primary => &mut self.primary,
            Pass::Remainder => &mut self.remainder,
        }
    }

    /// 最終投入數量（配額內 + 配額外）
    pub fn allocated_total(&self) -> u32 {
        self.primary.qty + self.remainder.qty
    }

    /// 未能投入的數量
    pub fn unmet_qty(&self) -> u32 {
        self.backlog_qty.saturating_sub(self.allocated_total())
    }
}
