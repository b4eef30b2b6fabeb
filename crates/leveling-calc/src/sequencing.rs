//! 單台展開與循環排序
//!
//! 每筆訂單的最終投入量展開為單台，再依排序鍵做加權輪流排列，
//! 避免同一設備（或機種）連續佔用。

use chrono::NaiveDate;
use leveling_core::{LineConfig, Order, Pass, PlannedUnit, ReleaseUnit, SequencingKey, UnitClass};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// 單台展開
pub struct UnitExpander;

impl UnitExpander {
    /// 依訂單順序展開為單台
    ///
    /// 依設備排序時，配額內與配額外的數量各自帶著被指派的設備。
    pub fn expand(config: &LineConfig, orders: &[Order]) -> Vec<ReleaseUnit> {
        let mut units = Vec::new();
        for order in orders {
            let class = if order.delayed_variant {
                UnitClass::Delayed
            } else if order.is_emergency() {
                UnitClass::Emergency
            } else {
                UnitClass::Normal
            };

            for pass in [Pass::Primary, Pass::Remainder] {
                let allocation = order.allocation(pass);
                let sequence_key = match config.sequencing {
                    SequencingKey::Equipment => allocation
                        .resource
                        .clone()
                        .unwrap_or_else(|| order.model_key.clone()),
                    SequencingKey::Model => order.model_key.clone(),
                };
                for _ in 0..allocation.qty {
                    units.push(ReleaseUnit {
                        linkage_id: order.linkage_id.clone(),
                        product_code: order.product_code.clone(),
                        model_key: order.model_key.clone(),
                        sequence_key: sequence_key.clone(),
                        class,
                        due_date: order.completion_date,
                        columns: order.columns.clone(),
                    });
                }
            }
        }
        units
    }

    /// 依最終順序編號
    pub fn number(units: Vec<ReleaseUnit>, release_date: NaiveDate, offset: u32) -> Vec<PlannedUnit> {
        units
            .into_iter()
            .zip(offset + 1..)
            .map(|(unit, sequence_no)| PlannedUnit {
                sequence_no,
                release_date,
                unit,
            })
            .collect()
    }
}

/// 循環排序器
pub struct CyclicResequencer;

impl CyclicResequencer {
    /// 最終順序：延遲完工機種 → 緊急訂單 → 循環排列的一般訂單
    pub fn resequence(units: Vec<ReleaseUnit>) -> Vec<ReleaseUnit> {
        let mut delayed = Vec::new();
        let mut emergency = Vec::new();
        let mut normal = Vec::new();
        for unit in units {
            match unit.class {
                UnitClass::Delayed => delayed.push(unit),
                UnitClass::Emergency => emergency.push(unit),
                UnitClass::Normal => normal.push(unit),
            }
        }

        let mut cycled = Self::slot_order(normal);
        Self::repair(&mut cycled);
        tracing::debug!(
            "排序完成：延遲 {} 台、緊急 {} 台、一般 {} 台（相鄰重複 {} 處）",
            delayed.len(),
            emergency.len(),
            cycled.len(),
            Self::adjacent_repeats(&cycled)
        );

        delayed.extend(emergency);
        delayed.extend(cycled);
        delayed
    }

    /// 依循環槽位排序
    ///
    /// 群組 g（大小 s_g）的第 i 台（從 1 起算）槽位為 `i × maxCycle ÷ s_g`；
    /// 槽位相同時小群組優先，再依首次出現順序。小群組的最後一台槽位必為 `maxCycle`，
    /// 讓大群組的最後一台排在最後才不會緊接在自己前一台之後。
    pub fn slot_order(units: Vec<ReleaseUnit>) -> Vec<ReleaseUnit> {
        let mut first_seen: Vec<String> = Vec::new();
        let mut sizes: BTreeMap<String, u32> = BTreeMap::new();
        for unit in &units {
            let size = sizes.entry(unit.sequence_key.clone()).or_insert(0);
            if *size == 0 {
                first_seen.push(unit.sequence_key.clone());
            }
            *size += 1;
        }
        let Some(max_cycle) = sizes.values().copied().max() else {
            return units;
        };

        let mut ranked = first_seen.clone();
        ranked.sort_by_key(|key| sizes.get(key).copied().unwrap_or(0));
        let rank: BTreeMap<&str, usize> = ranked
            .iter()
            .enumerate()
            .map(|(i, key)| (key.as_str(), i))
            .collect();

        let mut counters: BTreeMap<String, u32> = BTreeMap::new();
        let mut slotted: Vec<(Decimal, usize, usize, ReleaseUnit)> = Vec::with_capacity(units.len());
        for (index, unit) in units.into_iter().enumerate() {
            let size = sizes.get(&unit.sequence_key).copied().unwrap_or(1);
            let position = counters.entry(unit.sequence_key.clone()).or_insert(0);
            *position += 1;

            let slot = Decimal::from(*position) * Decimal::from(max_cycle) / Decimal::from(size);
            let group_rank = rank.get(unit.sequence_key.as_str()).copied().unwrap_or(usize::MAX);
            slotted.push((slot, group_rank, index, unit));
        }

        slotted.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));
        slotted.into_iter().map(|(_, _, _, unit)| unit).collect()
    }

    /// 修補相鄰重複
    ///
    /// 發現相鄰兩台同鍵時，往後找最近一組「兩台鍵不同且都不同於該鍵」的相鄰位置，
    /// 把後一台移到兩者之間。每次移動都會減少一處相鄰重複，找不到位置時保留原狀。
    pub fn repair(units: &mut Vec<ReleaseUnit>) {
        let mut i = 1;
        while i < units.len() {
            if units[i].sequence_key != units[i - 1].sequence_key {
                i += 1;
                continue;
            }

            let key = units[i].sequence_key.as_str();
            let target = (i + 1..units.len().saturating_sub(1)).find(|&j| {
                let left = units[j].sequence_key.as_str();
                let right = units[j + 1].sequence_key.as_str();
                left != key && right != key && left != right
            });

            match target {
                Some(j) => {
                    let unit = units.remove(i);
                    units.insert(j, unit);
                }
                None => i += 1,
            }
        }
    }

    /// 相鄰同鍵的處數
    pub fn adjacent_repeats(units: &[ReleaseUnit]) -> usize {
        units
            .windows(2)
            .filter(|pair| pair[0].sequence_key == pair[1].sequence_key)
            .count()
    }
}
