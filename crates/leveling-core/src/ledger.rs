//! 可消耗資源帳本
//!
//! 零件庫存、設備時間、比率／群組上限與延遲機種總上限都以同一種帳本表示：
//! 鍵 → 剩餘量（有號整數）。緊急訂單的扣減可能暫時使餘額為負，
//! 發出警報後立即歸零。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::ModuleClass;

/// 容量帳本的鍵
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CapacityKey {
    /// 當日投入總量
    ReleaseTotal,
    /// 延遲完工機種總上限
    DelayedVariant,
    /// 檢查設備（秒）
    Equipment(String),
    /// 比率群組
    Ratio(String),
    /// 機種絕對上限
    ProductCap(String),
    /// 階層式上限群組
    Group(String),
    /// 模組／非模組分類
    Category(ModuleClass),
}

impl fmt::Display for CapacityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReleaseTotal => f.write_str("TOTAL"),
            Self::DelayedVariant => f.write_str("CT"),
            Self::Equipment(id) => write!(f, "{}", id),
            Self::Ratio(id) => write!(f, "RATIO:{}", id),
            Self::ProductCap(code) => write!(f, "MAX:{}", code),
            Self::Group(id) => write!(f, "GROUP:{}", id),
            Self::Category(ModuleClass::Module) => f.write_str("MODULE"),
            Self::Category(ModuleClass::NonModule) => f.write_str("NON-MODULE"),
        }
    }
}

/// 單次扣減的結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Draw {
    /// 核准台數
    pub granted: u32,

    /// 不足台數（一般訂單為被削減的台數，緊急訂單為超扣的台數）
    pub shortage: u32,

    /// 扣減前餘額
    pub before: i64,

    /// 扣減後餘額（歸零前）
    pub after: i64,
}

impl Draw {
    /// 是否需要發出警報
    pub fn is_short(&self) -> bool {
        self.shortage > 0
    }
}

/// 資源帳本
#[derive(Debug, Clone)]
pub struct Ledger<K: Ord + Clone> {
    name: String,
    opening: BTreeMap<K, i64>,
    balances: BTreeMap<K, i64>,
}

impl<K: Ord + Clone> Ledger<K> {
    /// 創建空帳本
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            opening: BTreeMap::new(),
            balances: BTreeMap::new(),
        }
    }

    /// 由快照建立帳本
    pub fn from_snapshot<I>(name: &str, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, i64)>,
    {
        let mut ledger = Self::new(name);
        for (key, balance) in entries {
            ledger.insert(key, balance);
        }
        ledger
    }

    /// 加入（或覆寫）期初餘額
    pub fn insert(&mut self, key: K, balance: i64) {
        self.opening.insert(key.clone(), balance);
        self.balances.insert(key, balance);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contains(&self, key: &K) -> bool {
        self.balances.contains_key(key)
    }

    pub fn balance(&self, key: &K) -> Option<i64> {
        self.balances.get(key).copied()
    }

    /// 可用餘額（負值視為 0）
    pub fn headroom(&self, key: &K) -> Option<i64> {
        self.balance(key).map(|b| b.max(0))
    }

    /// 已消耗量（期初 − 目前）
    pub fn consumed(&self, key: &K) -> Option<i64> {
        Some(self.opening.get(key)? - self.balance(key)?)
    }

    /// 依鍵排序的 (鍵, 期初, 目前)
    pub fn entries(&self) -> impl Iterator<Item = (&K, i64, i64)> {
        self.balances
            .iter()
            .map(|(key, balance)| (key, self.opening.get(key).copied().unwrap_or(0), *balance))
    }

    /// 在可用餘額內最多能負擔的台數
    pub fn affordable(&self, key: &K, requested: u32, unit_cost: i64) -> Option<u32> {
        let headroom = self.headroom(key)?;
        if unit_cost <= 0 {
            return Some(requested);
        }
        let max_units = headroom / unit_cost;
        Some(requested.min(u32::try_from(max_units).unwrap_or(u32::MAX)))
    }

    /// 直接扣減，回傳扣減後餘額
    pub fn debit(&mut self, key: &K, amount: i64) -> Option<i64> {
        let balance = self.balances.get_mut(key)?;
        *balance -= amount;
        Some(*balance)
    }

    /// 將單一鍵的負餘額歸零
    pub fn clamp_negative(&mut self, key: &K) {
        if let Some(balance) = self.balances.get_mut(key) {
            if *balance < 0 {
                *balance = 0;
            }
        }
    }

    /// 扣減資源
    ///
    /// - 一般訂單：只核准可用餘額負擔得起的台數，不會使餘額變負
    /// - 略過檢查（緊急／當日）：全數核准；若扣減前已為負，不足量為
    ///   `min(需求, −扣減前)`，否則為本次扣減造成的赤字。有不足量時餘額歸零
    ///
    /// 鍵不存在時回傳 `None`。
    pub fn try_consume(
        &mut self,
        key: &K,
        requested: u32,
        unit_cost: i64,
        bypass: bool,
    ) -> Option<Draw> {
        let before = self.balance(key)?;

        if !bypass {
            let granted = self.affordable(key, requested, unit_cost)?;
            let after = self.debit(key, i64::from(granted) * unit_cost)?;
            return Some(Draw {
                granted,
                shortage: requested - granted,
                before,
                after,
            });
        }

        let demand = i64::from(requested) * unit_cost;
        let after = self.debit(key, demand)?;
        let deficit = if before < 0 {
            demand.min(-before)
        } else {
            (-after).max(0)
        };
        let shortage = if unit_cost <= 0 || deficit <= 0 {
            0
        } else {
            let units = (deficit + unit_cost - 1) / unit_cost;
            requested.min(u32::try_from(units).unwrap_or(u32::MAX))
        };
        if shortage > 0 {
            self.clamp_negative(key);
        }

        Some(Draw {
            granted: requested,
            shortage,
            before,
            after,
        })
    }

    /// 結算：所有負餘額歸零，回傳被歸零的鍵
    pub fn settle(&mut self) -> Vec<K> {
        let mut clamped = Vec::new();
        for (key, balance) in self.balances.iter_mut() {
            if *balance < 0 {
                *balance = 0;
                clamped.push(key.clone());
            }
        }
        clamped
    }

    /// 是否有任何負餘額
    pub fn has_negative(&self) -> bool {
        self.balances.values().any(|b| *b < 0)
    }
}
