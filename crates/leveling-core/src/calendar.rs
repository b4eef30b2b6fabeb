//! 工作日曆模型

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{LevelingError, Result};

/// 工廠行事曆
///
/// 以「日期 → 是否為工作日」的表格為主；表格未涵蓋的日期改用週間設定推算。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkCalendar {
    /// 日曆ID
    pub calendar_id: String,

    /// 行事曆表格（日期 → 是否為工作日）
    pub days: BTreeMap<NaiveDate, bool>,

    /// 表格未涵蓋時的工作日設定
    /// 索引 0 = 週一, 1 = 週二, ..., 6 = 週日
    pub fallback_weekdays: [bool; 7],
}

/// 剩餘工作日計算結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemainingDays {
    /// 剩餘工作日（≤ 0 表示已逾期）
    pub days: i64,

    /// 完工日不在行事曆中，已改用一般工作日推算
    pub used_fallback: bool,
}

impl WorkCalendar {
    /// 創建空的行事曆（備援為週一到週五）
    pub fn new(calendar_id: String) -> Self {
        Self {
            calendar_id,
            days: BTreeMap::new(),
            fallback_weekdays: [true, true, true, true, true, false, false],
        }
    }

    /// 建構器模式：載入行事曆表格
    pub fn with_days<I>(mut self, days: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, bool)>,
    {
        self.days.extend(days);
        self
    }

    /// 建構器模式：設置備援工作日
    pub fn with_fallback_weekdays(mut self, weekdays: [bool; 7]) -> Self {
        self.fallback_weekdays = weekdays;
        self
    }

    /// 設定單日是否為工作日
    pub fn set_day(&mut self, date: NaiveDate, working: bool) {
        self.days.insert(date, working);
    }

    /// 行事曆表格是否涵蓋該日期
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.days.contains_key(&date)
    }

    /// 表格是否為空（視為缺少行事曆）
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// 檢查是否為工作日（表格優先）
    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        match self.days.get(&date) {
            Some(&working) => working,
            None => self.is_fallback_working_day(date),
        }
    }

    /// 只依週間設定判斷
    pub fn is_fallback_working_day(&self, date: NaiveDate) -> bool {
        let weekday_index = date.weekday().num_days_from_monday() as usize;
        self.fallback_weekdays[weekday_index]
    }

    /// 計算今天到完工日之間的剩餘工作日
    ///
    /// - 完工日在今天之後：計算 `today < d ≤ completion` 的工作日數，自完工日往回走
    /// - 完工日在今天之前：計算 `completion < d ≤ today` 的工作日數並取負值（追趕天數）
    /// - 完工日不在表格中：整段改用週間設定推算，並標記 `used_fallback`
    pub fn remaining_working_days(
        &self,
        today: NaiveDate,
        completion: NaiveDate,
    ) -> Result<RemainingDays> {
        let used_fallback = !self.contains(completion);
        let is_working = |date: NaiveDate| {
            if used_fallback {
                self.is_fallback_working_day(date)
            } else {
                self.is_working_day(date)
            }
        };

        let mut count: i64 = 0;
        if completion >= today {
            let mut cursor = completion;
            while cursor > today {
                if is_working(cursor) {
                    count += 1;
                }
                cursor = cursor
                    .pred_opt()
                    .ok_or_else(|| LevelingError::InvalidDate(cursor.to_string()))?;
            }
        } else {
            let mut cursor = completion;
            while cursor < today {
                cursor = cursor
                    .succ_opt()
                    .ok_or_else(|| LevelingError::InvalidDate(cursor.to_string()))?;
                if is_working(cursor) {
                    count -= 1;
                }
            }
        }

        Ok(RemainingDays {
            days: count,
            used_fallback,
        })
    }

    /// 計算工作日（向後推算）
    pub fn subtract_working_days(&self, start_date: NaiveDate, days: u32) -> Result<NaiveDate> {
        let mut current = start_date;
        let mut remaining = days;

        while remaining > 0 {
            current = current
                .pred_opt()
                .ok_or_else(|| LevelingError::InvalidDate(current.to_string()))?;
            if self.is_working_day(current) {
                remaining -= 1;
            }
        }

        Ok(current)
    }
}

impl Default for WorkCalendar {
    fn default() -> Self {
        Self::new("DEFAULT".to_string())
    }
}
