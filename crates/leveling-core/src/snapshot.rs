//! 輸入快照

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::calendar::WorkCalendar;
use crate::order::{BacklogRow, OrderList, ProductLine};
use crate::plan::PriorPlanRow;
use crate::{LevelingError, Result};

/// 機種的檢查時間資料
///
/// JSON 輸入可給 `unit_seconds`，或給各工程時間 `steps`（`HH:MM:SS`）於載入時加總。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TimeStudyRecord")]
pub struct TimeStudy {
    pub product_code: String,

    /// 每台所需秒數
    pub unit_seconds: i64,

    /// 可使用的檢查設備（依偏好順序）
    pub equipment: Vec<String>,
}

impl TimeStudy {
    pub fn new(product_code: &str, unit_seconds: i64, equipment: &[&str]) -> Self {
        Self {
            product_code: product_code.to_string(),
            unit_seconds,
            equipment: equipment.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// 由各工程時間（`HH:MM:SS`）加總
    ///
    /// 數字與冒號以外的字元會被去除，空白欄位視為 0 秒。
    pub fn from_step_times(product_code: &str, steps: &[&str], equipment: &[&str]) -> Result<Self> {
        let mut total = 0i64;
        for step in steps {
            total += parse_hms(step).ok_or_else(|| {
                LevelingError::MalformedInput(format!(
                    "{} 的工程時間格式錯誤: {:?}",
                    product_code, step
                ))
            })?;
        }
        Ok(Self::new(product_code, total, equipment))
    }
}

/// 檢查時間資料的輸入格式
#[derive(Deserialize)]
struct TimeStudyRecord {
    product_code: String,
    #[serde(default)]
    unit_seconds: Option<i64>,
    #[serde(default)]
    steps: Vec<String>,
    equipment: Vec<String>,
}

impl TryFrom<TimeStudyRecord> for TimeStudy {
    type Error = LevelingError;

    fn try_from(record: TimeStudyRecord) -> Result<Self> {
        let equipment: Vec<&str> = record.equipment.iter().map(String::as_str).collect();
        if !record.steps.is_empty() {
            let steps: Vec<&str> = record.steps.iter().map(String::as_str).collect();
            return Self::from_step_times(&record.product_code, &steps, &equipment);
        }
        match record.unit_seconds {
            Some(seconds) => Ok(Self::new(&record.product_code, seconds, &equipment)),
            None => Err(LevelingError::MalformedInput(format!(
                "{} 的檢查時間沒有 unit_seconds 也沒有 steps",
                record.product_code
            ))),
        }
    }
}

fn parse_hms(raw: &str) -> Option<i64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ':')
        .collect();
    if cleaned.is_empty() {
        return Some(0);
    }

    let parts: Vec<&str> = cleaned.split(':').collect();
    let [h, m, s] = parts.as_slice() else {
        return None;
    };
    let h: i64 = h.parse().ok()?;
    let m: i64 = m.parse().ok()?;
    let s: i64 = s.parse().ok()?;
    Some(h * 3600 + m * 60 + s)
}

/// 單一產線的輸入快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSnapshot {
    pub line: ProductLine,

    /// 未投入明細（每列一台）
    pub backlog: Vec<BacklogRow>,

    /// 機種代碼 → 零件清單（遇到空白即停止）
    #[serde(default)]
    pub component_map: BTreeMap<String, Vec<String>>,

    /// 零件現有庫存
    #[serde(default)]
    pub inventory: BTreeMap<String, i64>,

    /// 已被先前計劃佔用的零件數量
    #[serde(default)]
    pub committed: BTreeMap<String, i64>,

    /// 機種代碼 → 檢查時間
    #[serde(default)]
    pub time_study: BTreeMap<String, TimeStudy>,
}

impl LineSnapshot {
    pub fn new(line: ProductLine) -> Self {
        Self {
            line,
            backlog: Vec::new(),
            component_map: BTreeMap::new(),
            inventory: BTreeMap::new(),
            committed: BTreeMap::new(),
            time_study: BTreeMap::new(),
        }
    }

    /// 建構器模式：加入 n 台未投入明細
    pub fn with_backlog(mut self, linkage_id: &str, product_code: &str, completion: NaiveDate, qty: u32) -> Self {
        for _ in 0..qty {
            self.backlog.push(BacklogRow::new(
                linkage_id.to_string(),
                product_code.to_string(),
                completion,
            ));
        }
        self
    }

    /// 建構器模式：設置零件對應
    pub fn with_components(mut self, product_code: &str, components: &[&str]) -> Self {
        self.component_map.insert(
            product_code.to_string(),
            components.iter().map(|c| c.to_string()).collect(),
        );
        self
    }

    /// 建構器模式：設置零件庫存
    pub fn with_inventory(mut self, component_id: &str, on_hand: i64) -> Self {
        self.inventory.insert(component_id.to_string(), on_hand);
        self
    }

    /// 建構器模式：設置已佔用數量
    pub fn with_committed(mut self, component_id: &str, qty: i64) -> Self {
        self.committed.insert(component_id.to_string(), qty);
        self
    }

    /// 建構器模式：設置檢查時間
    pub fn with_time_study(mut self, study: TimeStudy) -> Self {
        self.time_study.insert(study.product_code.clone(), study);
        self
    }

    /// 可用零件數量（現有 − 已佔用）
    pub fn net_inventory(&self) -> BTreeMap<String, i64> {
        self.inventory
            .iter()
            .map(|(id, on_hand)| {
                let committed = self.committed.get(id).copied().unwrap_or(0);
                (id.clone(), on_hand - committed)
            })
            .collect()
    }
}

/// 三條產線共用的輸入
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedInputs {
    /// 計算基準日
    pub today: NaiveDate,

    /// 投入日
    pub release_date: NaiveDate,

    pub calendar: WorkCalendar,

    /// 緊急名單
    #[serde(default)]
    pub emergency: OrderList,

    /// 保留名單
    #[serde(default)]
    pub held: OrderList,

    /// 既有生產計劃
    #[serde(default)]
    pub prior_plan: Vec<PriorPlanRow>,
}

impl SharedInputs {
    pub fn new(today: NaiveDate, release_date: NaiveDate, calendar: WorkCalendar) -> Self {
        Self {
            today,
            release_date,
            calendar,
            emergency: OrderList::new(),
            held: OrderList::new(),
            prior_plan: Vec::new(),
        }
    }

    pub fn with_emergency(mut self, emergency: OrderList) -> Self {
        self.emergency = emergency;
        self
    }

    pub fn with_held(mut self, held: OrderList) -> Self {
        self.held = held;
        self
    }

    pub fn with_prior_plan(mut self, rows: Vec<PriorPlanRow>) -> Self {
        self.prior_plan = rows;
        self
    }
}
