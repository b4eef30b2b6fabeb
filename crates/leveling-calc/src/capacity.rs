//! 容量／配額反映
//!
//! 三種產線共用同一套流程，差別只在於套用哪些帳本：
//! - 標準線：檢查設備可用秒數（可在多台設備中擇一）
//! - 電源線：比率群組上限 + 機種絕對上限
//! - 特殊線：兩層群組上限 + 模組／非模組上限
//!
//! 當日投入總量與延遲完工機種總上限也都是帳本中的一個鍵。

use leveling_core::{
    AlarmCategory, AlarmLog, CapacityKey, CapacityRules, Ledger, LineConfig, LineSnapshot, Order,
    Pass,
};
use std::collections::BTreeSet;

/// 訂單要通過的一項容量限制
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    /// 可擇一使用的帳本鍵（取可用量最大者）
    pub candidates: Vec<CapacityKey>,

    /// 每台消耗量（台數為 1，設備時間為秒數）
    pub unit_cost: i64,

    /// 一般訂單被削減時的警報分類（`None` 表示不發警報）
    pub limit_alarm: Option<AlarmCategory>,

    /// 緊急訂單超扣時的警報分類
    pub overdraw_alarm: AlarmCategory,

    /// 是否為設備時間（記錄指派設備與所需秒數）
    pub time_based: bool,
}

impl Constraint {
    fn count(key: CapacityKey, limit_alarm: Option<AlarmCategory>, overdraw_alarm: AlarmCategory) -> Self {
        Self {
            candidates: vec![key],
            unit_cost: 1,
            limit_alarm,
            overdraw_alarm,
            time_based: false,
        }
    }

    fn equipment(equipment: &[String], unit_seconds: i64) -> Self {
        Self {
            candidates: equipment
                .iter()
                .map(|id| CapacityKey::Equipment(id.clone()))
                .collect(),
            unit_cost: unit_seconds,
            limit_alarm: Some(AlarmCategory::CapacityShortage),
            overdraw_alarm: AlarmCategory::CapacityShortage,
            time_based: true,
        }
    }

    /// 在帳本中可用量最大的鍵（相同時取先列出者）
    fn resolve<'a>(&'a self, ledger: &Ledger<CapacityKey>) -> Option<&'a CapacityKey> {
        let mut best: Option<(&CapacityKey, i64)> = None;
        for key in &self.candidates {
            let Some(headroom) = ledger.headroom(key) else {
                continue;
            };
            if best.map_or(true, |(_, h)| headroom > h) {
                best = Some((key, headroom));
            }
        }
        best.map(|(key, _)| key)
    }
}

/// 容量反映
pub struct CapacityReflection;

impl CapacityReflection {
    /// 依產線配置建立容量帳本
    pub fn open_ledger(config: &LineConfig, snapshot: &LineSnapshot) -> Ledger<CapacityKey> {
        let mut ledger = Ledger::new("capacity");
        ledger.insert(CapacityKey::ReleaseTotal, i64::from(config.release_target));
        if let Some(cap) = config.delayed_cap {
            ledger.insert(CapacityKey::DelayedVariant, i64::from(cap));
        }

        match &config.capacity {
            CapacityRules::EquipmentTime { budgets } => {
                for (equipment, seconds) in budgets {
                    ledger.insert(CapacityKey::Equipment(equipment.clone()), *seconds);
                }
                for study in snapshot.time_study.values() {
                    for equipment in &study.equipment {
                        let key = CapacityKey::Equipment(equipment.clone());
                        if !ledger.contains(&key) {
                            tracing::warn!(line = %config.line, %equipment, "設備沒有可用時間資料，以 0 秒計");
                            ledger.insert(key, 0);
                        }
                    }
                }
            }
            CapacityRules::Ratio {
                groups,
                product_caps,
            } => {
                for group in groups {
                    ledger.insert(
                        CapacityKey::Ratio(group.id.clone()),
                        i64::from(group.cap(config.release_target)),
                    );
                }
                for (product, cap) in product_caps {
                    ledger.insert(CapacityKey::ProductCap(product.clone()), i64::from(*cap));
                }
            }
            CapacityRules::Hierarchical {
                groups,
                module_cap,
                non_module_cap,
                ..
            } => {
                for group in groups {
                    ledger.insert(CapacityKey::Group(group.id.clone()), i64::from(group.max_qty));
                }
                if let Some(cap) = module_cap {
                    ledger.insert(
                        CapacityKey::Category(leveling_core::ModuleClass::Module),
                        i64::from(*cap),
                    );
                }
                if let Some(cap) = non_module_cap {
                    ledger.insert(
                        CapacityKey::Category(leveling_core::ModuleClass::NonModule),
                        i64::from(*cap),
                    );
                }
            }
        }

        ledger
    }

    /// 訂單適用的限制（依固定順序：投入總量 → 延遲機種上限 → 產線專屬限制）
    ///
    /// 標準線找不到檢查時間資料時回傳 `false`，訂單不受設備時間限制。
    pub fn constraints_for(
        config: &LineConfig,
        snapshot: &LineSnapshot,
        order: &Order,
    ) -> (Vec<Constraint>, bool) {
        let mut constraints = vec![Constraint::count(
            CapacityKey::ReleaseTotal,
            None,
            AlarmCategory::ReleaseCapExceeded,
        )];
        if order.delayed_variant && config.delayed_cap.is_some() {
            constraints.push(Constraint::count(
                CapacityKey::DelayedVariant,
                Some(AlarmCategory::DelayedCapExceeded),
                AlarmCategory::DelayedCapExceeded,
            ));
        }

        let mut has_time_study = true;
        match &config.capacity {
            CapacityRules::EquipmentTime { .. } => {
                match snapshot.time_study.get(&order.product_code) {
                    Some(study) if !study.equipment.is_empty() => {
                        constraints.push(Constraint::equipment(&study.equipment, study.unit_seconds));
                    }
                    _ => has_time_study = false,
                }
            }
            CapacityRules::Ratio {
                groups,
                product_caps,
            } => {
                for group in groups.iter().filter(|g| g.matches(&order.product_code)) {
                    constraints.push(Constraint::count(
                        CapacityKey::Ratio(group.id.clone()),
                        Some(AlarmCategory::RatioCapShortage),
                        AlarmCategory::RatioCapShortage,
                    ));
                }
                for product in product_caps
                    .keys()
                    .filter(|p| order.product_code.starts_with(p.as_str()))
                {
                    constraints.push(Constraint::count(
                        CapacityKey::ProductCap(product.clone()),
                        Some(AlarmCategory::ProductCapShortage),
                        AlarmCategory::ProductCapShortage,
                    ));
                }
            }
            CapacityRules::Hierarchical { groups, .. } => {
                let mut applied: BTreeSet<&str> = BTreeSet::new();
                for group in groups.iter().filter(|g| g.matches(&order.product_code)) {
                    let parent = group.parent.as_deref();
                    for id in std::iter::once(group.id.as_str()).chain(parent) {
                        if applied.insert(id) {
                            constraints.push(Constraint::count(
                                CapacityKey::Group(id.to_string()),
                                Some(AlarmCategory::CapacityShortage),
                                AlarmCategory::CapacityShortage,
                            ));
                        }
                    }
                }
                if let Some(class) = config.capacity.module_class(&order.product_code) {
                    constraints.push(Constraint::count(
                        CapacityKey::Category(class),
                        Some(AlarmCategory::CapacityShortage),
                        AlarmCategory::CapacityShortage,
                    ));
                }
            }
        }

        (constraints, has_time_study)
    }

    /// 對指定階段的數量反映容量
    ///
    /// 回傳缺少檢查時間資料的機種代碼。
    pub fn reflect(
        config: &LineConfig,
        snapshot: &LineSnapshot,
        orders: &mut [Order],
        pass: Pass,
        ledger: &mut Ledger<CapacityKey>,
        alarms: &mut AlarmLog,
    ) -> BTreeSet<String> {
        let mut missing_time_study = BTreeSet::new();

        for order in orders.iter_mut() {
            let requested = order.allocation(pass).qty;
            if requested == 0 {
                continue;
            }

            let (constraints, has_time_study) = Self::constraints_for(config, snapshot, order);
            if !has_time_study {
                missing_time_study.insert(order.product_code.clone());
            }

            let resolved: Vec<(CapacityKey, &Constraint)> = constraints
                .iter()
                .filter_map(|c| c.resolve(ledger).map(|key| (key.clone(), c)))
                .collect();

            let granted = if order.bypasses_checks() {
                Self::reflect_bypass(order, requested, &resolved, ledger, alarms)
            } else {
                Self::reflect_normal(order, requested, &resolved, ledger, alarms)
            };

            let resource = resolved
                .iter()
                .find(|(_, c)| c.time_based)
                .map(|(key, _)| key.to_string());
            let allocation = order.allocation_mut(pass);
            allocation.qty = granted;
            allocation.resource = resource;
        }

        tracing::debug!(
            line = %config.line,
            "容量反映（{}）完成，核准 {} 台",
            pass,
            orders.iter().map(|o| o.allocation(pass).qty).sum::<u32>()
        );

        missing_time_study
    }

    /// 緊急／當日：全數核准，超扣的帳本發出警報後歸零
    fn reflect_bypass(
        order: &Order,
        requested: u32,
        resolved: &[(CapacityKey, &Constraint)],
        ledger: &mut Ledger<CapacityKey>,
        alarms: &mut AlarmLog,
    ) -> u32 {
        for (key, constraint) in resolved {
            let Some(draw) = ledger.try_consume(key, requested, constraint.unit_cost, true) else {
                continue;
            };
            if draw.is_short() {
                let needed_time = constraint
                    .time_based
                    .then(|| i64::from(requested) * constraint.unit_cost);
                alarms.raise(
                    constraint.overdraw_alarm,
                    order,
                    Some(key.to_string().as_str()),
                    draw.shortage,
                    needed_time,
                );
            }
        }
        requested
    }

    /// 一般訂單：依序套用各限制，取可負擔的最小數量後一次扣減所有帳本
    fn reflect_normal(
        order: &Order,
        requested: u32,
        resolved: &[(CapacityKey, &Constraint)],
        ledger: &mut Ledger<CapacityKey>,
        alarms: &mut AlarmLog,
    ) -> u32 {
        let mut qty = requested;
        for (key, constraint) in resolved {
            let affordable = ledger
                .affordable(key, qty, constraint.unit_cost)
                .unwrap_or(0);
            if affordable < qty {
                if let Some(category) = constraint.limit_alarm {
                    let needed_time = constraint
                        .time_based
                        .then(|| i64::from(qty) * constraint.unit_cost);
                    alarms.raise(
                        category,
                        order,
                        Some(key.to_string().as_str()),
                        qty - affordable,
                        needed_time,
                    );
                }
                qty = affordable;
            }
        }

        for (key, constraint) in resolved {
            ledger.debit(key, i64::from(qty) * constraint.unit_cost);
        }
        qty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use leveling_core::{MaxGroup, ProductLine, RatioGroup, TimeStudy, Urgency};
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use std::collections::BTreeMap;

    fn order(linkage: &str, code: &str, requested: u32, urgency: Urgency) -> Order {
        let mut order = Order::new(
            linkage.to_string(),
            code.to_string(),
            code.to_string(),
            NaiveDate::from_ymd_opt(2025, 10, 9).unwrap(),
            requested,
            3,
        )
        .with_urgency(urgency);
        order.primary.qty = requested;
        order
    }

    fn run(
        config: &LineConfig,
        snapshot: &LineSnapshot,
        orders: &mut [Order],
    ) -> (Ledger<CapacityKey>, AlarmLog) {
        let mut ledger = CapacityReflection::open_ledger(config, snapshot);
        let mut alarms = AlarmLog::new();
        CapacityReflection::reflect(config, snapshot, orders, Pass::Primary, &mut ledger, &mut alarms);
        (ledger, alarms)
    }

    fn standard_config(target: u32) -> LineConfig {
        LineConfig::new(
            ProductLine::Standard,
            target,
            CapacityRules::EquipmentTime {
                budgets: BTreeMap::from([
                    ("ATE-01".to_string(), 3000),
                    ("ATE-02".to_string(), 1200),
                ]),
            },
        )
    }

    fn standard_snapshot() -> LineSnapshot {
        LineSnapshot::new(ProductLine::Standard)
            .with_time_study(TimeStudy::new("P1", 600, &["ATE-02", "ATE-01"]))
            .with_time_study(TimeStudy::new("P2", 500, &["ATE-03"]))
    }

    #[test]
    fn test_equipment_prefers_largest_headroom() {
        let config = standard_config(100);
        let snapshot = standard_snapshot();
        let mut orders = vec![order("L1", "P1", 3, Urgency::Normal)];

        let (ledger, alarms) = run(&config, &snapshot, &mut orders);

        assert_eq!(orders[0].primary.qty, 3);
        assert_eq!(orders[0].primary.resource.as_deref(), Some("ATE-01"));
        assert_eq!(ledger.balance(&CapacityKey::Equipment("ATE-01".to_string())), Some(1200));
        assert_eq!(ledger.balance(&CapacityKey::ReleaseTotal), Some(97));
        assert!(alarms.is_empty());
    }

    #[test]
    fn test_equipment_time_limits_quantity() {
        let config = standard_config(100);
        let snapshot = standard_snapshot();
        let mut orders = vec![order("L1", "P1", 8, Urgency::Normal)];

        let (ledger, alarms) = run(&config, &snapshot, &mut orders);

        // ATE-01 3000 秒 / 600 秒 = 5 台
        assert_eq!(orders[0].primary.qty, 5);
        let alarm = &alarms.records()[0];
        assert_eq!(alarm.category, AlarmCategory::CapacityShortage);
        assert_eq!(alarm.shortage_qty, 3);
        assert_eq!(alarm.needed_time, Some(4800));
        assert_eq!(ledger.balance(&CapacityKey::Equipment("ATE-01".to_string())), Some(0));
    }

    #[test]
    fn test_unbudgeted_equipment_opens_at_zero() {
        let config = standard_config(100);
        let snapshot = standard_snapshot();
        let mut orders = vec![order("L1", "P2", 2, Urgency::Normal)];

        let (_, alarms) = run(&config, &snapshot, &mut orders);

        assert_eq!(orders[0].primary.qty, 0);
        assert_eq!(alarms.records()[0].resource_id.as_deref(), Some("ATE-03"));
    }

    #[test]
    fn test_missing_time_study_is_unconstrained() {
        let config = standard_config(100);
        let snapshot = standard_snapshot();
        let mut orders = vec![order("L1", "P9", 4, Urgency::Normal)];

        let mut ledger = CapacityReflection::open_ledger(&config, &snapshot);
        let mut alarms = AlarmLog::new();
        let missing = CapacityReflection::reflect(
            &config,
            &snapshot,
            &mut orders,
            Pass::Primary,
            &mut ledger,
            &mut alarms,
        );

        assert_eq!(orders[0].primary.qty, 4);
        assert!(missing.contains("P9"));
    }

    #[test]
    fn test_release_total_cuts_silently_for_normal_orders() {
        let config = standard_config(4);
        let snapshot = standard_snapshot();
        let mut orders = vec![order("L1", "P1", 3, Urgency::Normal), order("L2", "P1", 3, Urgency::Normal)];

        let (_, alarms) = run(&config, &snapshot, &mut orders);

        assert_eq!(orders[0].primary.qty, 3);
        assert_eq!(orders[1].primary.qty, 1);
        assert!(alarms.is_empty());
    }

    #[test]
    fn test_emergency_overdraws_release_total() {
        let config = standard_config(2);
        let snapshot = standard_snapshot();
        let mut orders = vec![order("L1", "P1", 3, Urgency::Emergency)];

        let (ledger, alarms) = run(&config, &snapshot, &mut orders);

        assert_eq!(orders[0].primary.qty, 3);
        let etc2: Vec<_> = alarms.by_category(AlarmCategory::ReleaseCapExceeded).collect();
        assert_eq!(etc2.len(), 1);
        assert_eq!(etc2[0].shortage_qty, 1);
        assert_eq!(ledger.balance(&CapacityKey::ReleaseTotal), Some(0));
    }

    #[test]
    fn test_delayed_variant_cap() {
        let config = standard_config(100).with_delayed_variant(&["/CT"], 2, 2);
        let snapshot = LineSnapshot::new(ProductLine::Standard);
        let mut orders = vec![order("L1", "P1/CT", 5, Urgency::Normal).with_delayed_variant(true)];

        let (_, alarms) = run(&config, &snapshot, &mut orders);

        assert_eq!(orders[0].primary.qty, 2);
        let alarm = &alarms.records()[0];
        assert_eq!(alarm.category, AlarmCategory::DelayedCapExceeded);
        assert_eq!(alarm.shortage_qty, 3);
    }

    #[test]
    fn test_ratio_and_product_caps() {
        let config = LineConfig::new(
            ProductLine::Power,
            20,
            CapacityRules::Ratio {
                groups: vec![RatioGroup::new("PS", &["F3PU"], Decimal::from(25))],
                product_caps: BTreeMap::from([("F3PU20".to_string(), 3)]),
            },
        );
        let snapshot = LineSnapshot::new(ProductLine::Power);
        let mut orders = vec![
            order("L1", "F3PU10-0S", 4, Urgency::Normal),
            order("L2", "F3PU20-0N", 4, Urgency::Normal),
        ];

        let (ledger, alarms) = run(&config, &snapshot, &mut orders);

        // 比率上限 20 × 25% = 5
        assert_eq!(orders[0].primary.qty, 4);
        assert_eq!(orders[1].primary.qty, 1);
        let categories: Vec<AlarmCategory> = alarms.records().iter().map(|r| r.category).collect();
        assert_eq!(categories, vec![AlarmCategory::RatioCapShortage]);
        assert_eq!(alarms.records()[0].shortage_qty, 3);
        assert_eq!(ledger.balance(&CapacityKey::ProductCap("F3PU20".to_string())), Some(2));
    }

    #[test]
    fn test_hierarchical_groups_and_module_cap() {
        let config = LineConfig::new(
            ProductLine::Specialty,
            50,
            CapacityRules::Hierarchical {
                groups: vec![
                    MaxGroup::new("RZ", &["F3RZ"], 6),
                    MaxGroup::new("RZ9", &["F3RZ9"], 4).with_parent("RZ"),
                ],
                module_patterns: vec!["F3RZ9".to_string()],
                module_cap: Some(3),
                non_module_cap: None,
            },
        );
        let snapshot = LineSnapshot::new(ProductLine::Specialty);
        let mut orders = vec![
            order("L1", "F3RZ91-0N", 5, Urgency::Normal),
            order("L2", "F3RZ21-0N", 5, Urgency::Normal),
        ];

        let (ledger, alarms) = run(&config, &snapshot, &mut orders);

        // L1：RZ9 上限 4 → 模組上限 3
        assert_eq!(orders[0].primary.qty, 3);
        // L2：父群組 RZ 剩 3
        assert_eq!(orders[1].primary.qty, 3);
        assert_eq!(alarms.len(), 3);
        assert_eq!(ledger.balance(&CapacityKey::Group("RZ".to_string())), Some(0));
        assert_eq!(ledger.balance(&CapacityKey::Group("RZ9".to_string())), Some(1));
    }

    proptest! {
        #[test]
        fn prop_capacity_never_negative_after_pass(
            specs in prop::collection::vec((0u8..2, 1u32..6, any::<bool>()), 1..20),
            target in 1u32..30,
        ) {
            let config = standard_config(target);
            let snapshot = standard_snapshot();
            let mut orders: Vec<Order> = specs
                .iter()
                .enumerate()
                .map(|(i, (kind, qty, urgent))| {
                    let code = if *kind == 0 { "P1" } else { "P2" };
                    let urgency = if *urgent { Urgency::Emergency } else { Urgency::Normal };
                    order(&format!("L{:02}", i), code, *qty, urgency)
                })
                .collect();

            let (ledger, _) = run(&config, &snapshot, &mut orders);

            prop_assert!(!ledger.has_negative());
            for o in &orders {
                prop_assert!(o.primary.qty <= o.backlog_qty);
            }
        }
    }
}
