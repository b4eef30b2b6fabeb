//! 平準化配額
//!
//! 依代表機種群組計算每日最小需求量，再依優先順序把配額分給各訂單。
//! 配額內的數量為第一階段，剩餘數量留給第二階段。

use leveling_core::{LineConfig, Order};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// 群組配額
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupQuota {
    pub group_key: String,

    /// 群組總未投入數量
    pub backlog_qty: u32,

    /// 計算出的每日最小需求量
    pub min_daily_qty: u32,

    /// 特殊條件表指定的每日最大投入量
    pub override_max: Option<u32>,

    /// 剩餘配額
    pub remaining: u32,
}

impl GroupQuota {
    /// 配額起始值（有指定最大量時以其為準）
    pub fn seed(&self) -> u32 {
        self.override_max.unwrap_or(self.min_daily_qty)
    }
}

/// 平準化配額分配器
pub struct LevelingAllocator;

impl LevelingAllocator {
    /// 優先順序：優先旗標 → 緊急 → 當日 → 完工日 → 未投入量（大者優先）→ Linkage
    pub fn priority_order(a: &Order, b: &Order) -> Ordering {
        b.priority
            .cmp(&a.priority)
            .then_with(|| b.is_emergency().cmp(&a.is_emergency()))
            .then_with(|| b.is_same_day().cmp(&a.is_same_day()))
            .then_with(|| a.completion_date.cmp(&b.completion_date))
            .then_with(|| b.backlog_qty.cmp(&a.backlog_qty))
            .then_with(|| a.linkage_id.cmp(&b.linkage_id))
    }

    pub fn sort_orders(orders: &mut [Order]) {
        orders.sort_by(Self::priority_order);
    }

    /// 每日最小需求量
    ///
    /// 依剩餘工作日由近到遠累計未投入量，取 `ceil(累計量 ÷ max(剩餘日, 1))` 的最大值。
    /// 同一完工日時等於 `ceil(總量 ÷ max(剩餘日, 1))`。
    pub fn min_daily_qty(orders: &[&Order]) -> u32 {
        let mut by_days: Vec<(i64, u32)> = orders
            .iter()
            .map(|o| (o.remaining_days, o.backlog_qty))
            .collect();
        by_days.sort_by_key(|(days, _)| *days);

        let mut cumulative: u64 = 0;
        let mut rate: u64 = 0;
        for (days, qty) in by_days {
            cumulative += u64::from(qty);
            let divisor = days.max(1) as u64;
            rate = rate.max(cumulative.div_ceil(divisor));
        }
        u32::try_from(rate).unwrap_or(u32::MAX)
    }

    /// 建立各群組的配額
    pub fn build_quotas(config: &LineConfig, orders: &[Order]) -> BTreeMap<String, GroupQuota> {
        let mut members: BTreeMap<&str, Vec<&Order>> = BTreeMap::new();
        for order in orders {
            members.entry(order.group_key.as_str()).or_default().push(order);
        }

        members
            .into_iter()
            .map(|(group_key, group_orders)| {
                let override_max = group_orders.iter().find_map(|o| {
                    config
                        .condition_for(&o.product_code)
                        .and_then(|c| c.max_daily)
                });
                let mut quota = GroupQuota {
                    group_key: group_key.to_string(),
                    backlog_qty: group_orders.iter().map(|o| o.backlog_qty).sum(),
                    min_daily_qty: Self::min_daily_qty(&group_orders),
                    override_max,
                    remaining: 0,
                };
                quota.remaining = quota.seed();
                (group_key.to_string(), quota)
            })
            .collect()
    }

    /// 排序訂單並分配配額
    ///
    /// 緊急訂單一律取得全部未投入量（配額扣到 0 為止，不會擋下訂單）；
    /// 其餘訂單取得 `min(未投入量, 剩餘配額)`，不足部分成為第二階段數量。
    pub fn allocate(config: &LineConfig, orders: &mut [Order]) -> BTreeMap<String, GroupQuota> {
        Self::sort_orders(orders);
        let mut quotas = Self::build_quotas(config, orders);

        for order in orders.iter_mut() {
            let Some(quota) = quotas.get_mut(&order.group_key) else {
                continue;
            };

            if order.is_emergency() {
                order.primary.qty = order.backlog_qty;
                order.remainder.qty = 0;
                quota.remaining = quota.remaining.saturating_sub(order.backlog_qty);
            } else {
                let leveled = order.backlog_qty.min(quota.remaining);
                quota.remaining -= leveled;
                order.primary.qty = leveled;
                order.remainder.qty = order.backlog_qty - leveled;
            }
        }

        tracing::debug!(
            line = %config.line,
            "平準化群組 {} 個，配額內 {} 台，剩餘 {} 台",
            quotas.len(),
            orders.iter().map(|o| o.primary.qty).sum::<u32>(),
            orders.iter().map(|o| o.remainder.qty).sum::<u32>()
        );

        quotas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use leveling_core::{CapacityRules, ProductLine, SpecialtyCondition, Urgency};
    use proptest::prelude::*;

    fn config() -> LineConfig {
        LineConfig::new(
            ProductLine::Power,
            100,
            CapacityRules::Ratio {
                groups: vec![],
                product_caps: BTreeMap::new(),
            },
        )
    }

    fn order(linkage: &str, model: &str, backlog: u32, days: i64) -> Order {
        Order::new(
            linkage.to_string(),
            format!("{}-01", model),
            model.to_string(),
            NaiveDate::from_ymd_opt(2025, 10, 9).unwrap(),
            backlog,
            days,
        )
    }

    #[test]
    fn test_quota_exhausted_by_larger_order() {
        let mut orders = vec![order("L2", "M1", 10, 3), order("L1", "M1", 30, 3)];
        let quotas = LevelingAllocator::allocate(&config(), &mut orders);

        assert_eq!(quotas["M1"].min_daily_qty, 14);
        assert_eq!(orders[0].linkage_id, "L1");
        assert_eq!((orders[0].primary.qty, orders[0].remainder.qty), (14, 16));
        assert_eq!((orders[1].primary.qty, orders[1].remainder.qty), (0, 10));
        assert_eq!(quotas["M1"].remaining, 0);
    }

    #[test]
    fn test_emergency_never_blocked_by_quota() {
        let mut orders = vec![
            order("L1", "M1", 30, 5),
            order("L2", "M1", 8, 0),
        ];
        let quotas = LevelingAllocator::allocate(&config(), &mut orders);

        // 緊急訂單排在前面並取得全部數量
        assert_eq!(orders[0].linkage_id, "L2");
        assert_eq!(orders[0].primary.qty, 8);
        // ceil(8/1)=8 與 ceil(38/5)=8 → 配額 8，被緊急訂單用完
        assert_eq!(quotas["M1"].min_daily_qty, 8);
        assert_eq!(orders[1].primary.qty, 0);
        assert_eq!(orders[1].remainder.qty, 30);
    }

    #[test]
    fn test_override_max_daily() {
        let config = config().with_condition(
            SpecialtyCondition::new("M1")
                .with_group_key("G")
                .with_max_daily(25),
        );
        let mut orders = vec![order("L1", "M1", 30, 3).with_group_key("G".to_string())];
        LevelingAllocator::allocate(&config, &mut orders);

        assert_eq!(orders[0].primary.qty, 25);
        assert_eq!(orders[0].remainder.qty, 5);
    }

    #[test]
    fn test_priority_order() {
        let mut orders = vec![
            order("L1", "M1", 5, 5),
            order("L2", "M2", 5, 1),
            order("L3", "M3", 5, 5).with_priority(1),
            order("L4", "M4", 9, 5),
        ];
        LevelingAllocator::sort_orders(&mut orders);

        let ids: Vec<&str> = orders.iter().map(|o| o.linkage_id.as_str()).collect();
        assert_eq!(ids, vec!["L3", "L2", "L4", "L1"]);
        assert_eq!(orders[1].urgency, Urgency::SameDay);
    }

    proptest! {
        #[test]
        fn prop_primary_plus_remainder_equals_backlog(
            specs in prop::collection::vec((0u8..4, 1u32..40, -2i64..10), 1..30)
        ) {
            let mut orders: Vec<Order> = specs
                .iter()
                .enumerate()
                .map(|(i, (model, backlog, days))| {
                    order(&format!("L{:03}", i), &format!("M{}", model), *backlog, *days)
                })
                .collect();
            LevelingAllocator::allocate(&config(), &mut orders);

            for o in &orders {
                prop_assert_eq!(o.primary.qty + o.remainder.qty, o.backlog_qty);
            }
        }
    }
}
