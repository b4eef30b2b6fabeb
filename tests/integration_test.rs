//! 集成測試

use chrono::NaiveDate;
use leveling::*;
use rstest::rstest;
use std::collections::BTreeMap;

fn date(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, m, d).unwrap()
}

/// 2025-10-06（週一）起四週，週末休息
fn shared() -> SharedInputs {
    let start = date(10, 6);
    let calendar = WorkCalendar::new("FAB".to_string()).with_days((0..28).map(|offset| {
        let day = start + chrono::Duration::days(offset);
        (day, offset % 7 < 5)
    }));
    SharedInputs::new(date(10, 6), date(10, 7), calendar)
}

fn standard_config(target: u32) -> LineConfig {
    LineConfig::new(
        ProductLine::Standard,
        target,
        CapacityRules::EquipmentTime {
            budgets: BTreeMap::from([("ATE-01".to_string(), 28_800)]),
        },
    )
}

fn power_config(target: u32) -> LineConfig {
    LineConfig::new(
        ProductLine::Power,
        target,
        CapacityRules::Ratio {
            groups: vec![],
            product_caps: BTreeMap::new(),
        },
    )
}

fn specialty_config(target: u32) -> LineConfig {
    LineConfig::new(
        ProductLine::Specialty,
        target,
        CapacityRules::Hierarchical {
            groups: vec![],
            module_patterns: vec![],
            module_cap: None,
            non_module_cap: None,
        },
    )
}

#[test]
fn test_leveling_split_across_same_model() {
    // 同一代表機種 M1 兩筆訂單（30 台、10 台），剩餘 3 個工作日
    let config = standard_config(100);
    let snapshot = LineSnapshot::new(ProductLine::Standard)
        .with_backlog("L1", "M1-A", date(10, 9), 30)
        .with_backlog("L2", "M1-B", date(10, 9), 10)
        .with_components("M1-A", &["C1"])
        .with_components("M1-B", &["C1"])
        .with_inventory("C1", 1000);
    let inputs = shared();

    let result = LinePipeline::new(&config, &snapshot, &inputs)
        .calculate(vec![])
        .unwrap();

    let l1 = result.orders.iter().find(|o| o.linkage_id == "L1").unwrap();
    let l2 = result.orders.iter().find(|o| o.linkage_id == "L2").unwrap();
    assert_eq!((l1.primary.qty, l1.remainder.qty), (14, 16));
    assert_eq!((l2.primary.qty, l2.remainder.qty), (0, 10));
    assert_eq!(result.released_qty, 40);

    // 沒有檢查時間資料：不受設備限制，但留下警告
    assert!(result.warnings.iter().any(|w| w.subject == "M1-A"));
}

#[test]
fn test_component_shortage_limits_release() {
    // 一般訂單 8 台，零件 C1 只有 5 個
    let config = power_config(100);
    let snapshot = LineSnapshot::new(ProductLine::Power)
        .with_backlog("L1", "F3PU10-0S", date(10, 13), 8)
        .with_components("F3PU10-0S", &["C1"])
        .with_inventory("C1", 5);
    let inputs = shared();

    let result = LinePipeline::new(&config, &snapshot, &inputs)
        .calculate(vec![])
        .unwrap();

    assert_eq!(result.released_for("L1"), 5);
    assert_eq!(result.workbook.headline(AlarmCategory::ComponentShortage), 3);
    let c1 = result
        .capacity_report
        .iter()
        .find(|row| row.ledger == "component" && row.key == "C1")
        .unwrap();
    assert_eq!(c1.remaining, 0);
}

#[test]
fn test_emergency_on_negative_inventory() {
    // 同一訂單列為緊急，C1 已被先前計劃佔用到 −2
    let config = power_config(100);
    let snapshot = LineSnapshot::new(ProductLine::Power)
        .with_backlog("L1", "F3PU10-0S", date(10, 13), 8)
        .with_components("F3PU10-0S", &["C1"])
        .with_inventory("C1", 0)
        .with_committed("C1", 2);
    let inputs = shared().with_emergency(OrderList::new().with_linkage("L1"));

    let result = LinePipeline::new(&config, &snapshot, &inputs)
        .calculate(vec![])
        .unwrap();

    assert_eq!(result.released_for("L1"), 8);
    let alarms: Vec<&AlarmRecord> = result
        .workbook
        .details
        .iter()
        .filter(|r| r.category == AlarmCategory::ComponentShortage)
        .collect();
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].shortage_qty, 2);

    let c1 = result
        .capacity_report
        .iter()
        .find(|row| row.ledger == "component" && row.key == "C1")
        .unwrap();
    assert_eq!((c1.opening, c1.remaining), (-2, 0));
    assert!(result.capacity_report.iter().all(|row| row.remaining >= 0));
}

#[test]
fn test_cyclic_resequencing_three_models() {
    // 三個機種 5、3、2 台，全部當日投入
    let config = specialty_config(100);
    let snapshot = LineSnapshot::new(ProductLine::Specialty)
        .with_backlog("LA", "MA-1", date(10, 7), 5)
        .with_backlog("LB", "MB-1", date(10, 7), 3)
        .with_backlog("LC", "MC-1", date(10, 7), 2)
        .with_components("MA-1", &["C1"])
        .with_components("MB-1", &["C1"])
        .with_components("MC-1", &["C1"])
        .with_inventory("C1", 100);
    let inputs = shared();

    let result = LinePipeline::new(&config, &snapshot, &inputs)
        .calculate(vec![])
        .unwrap();

    assert_eq!(
        result.plan.sequence_keys(),
        vec!["MA", "MB", "MA", "MC", "MA", "MB", "MA", "MC", "MB", "MA"]
    );
}

#[rstest]
#[case(vec![], 1)]
#[case(vec![(Some(7u32), date(10, 7)), (Some(31), date(10, 7)), (Some(99), date(10, 8))], 32)]
#[case(vec![(None, date(10, 7))], 1)]
fn test_sequence_numbers_continue_prior_plan(
    #[case] prior: Vec<(Option<u32>, NaiveDate)>,
    #[case] first_no: u32,
) {
    let config = power_config(10);
    let snapshot = LineSnapshot::new(ProductLine::Power)
        .with_backlog("L1", "F3PU10-0S", date(10, 7), 2)
        .with_components("F3PU10-0S", &["C1"])
        .with_inventory("C1", 10);
    let rows = prior
        .into_iter()
        .enumerate()
        .map(|(i, (sequence_no, release_date))| PriorPlanRow {
            line: ProductLine::Power,
            linkage_id: format!("P{}", i),
            release_date,
            sequence_no,
        })
        .collect();
    let inputs = shared().with_prior_plan(rows);

    let result = LinePipeline::new(&config, &snapshot, &inputs)
        .calculate(vec![])
        .unwrap();

    assert_eq!(result.plan.units[0].sequence_no, first_no);
    assert_eq!(result.plan.units[1].sequence_no, first_no + 1);
}

fn full_run_inputs() -> (LevelingConfig, RunInputs) {
    let json = r#"{
        "standard": {
            "line": "Standard",
            "release_target": 12,
            "delayed_cap": 2,
            "delayed_markers": ["/CT"],
            "delayed_offset_days": 2,
            "excluded_markers": ["ZOTHER", "YZ", "SF", "KM", "TA80"],
            "conditions": [
                { "pattern": "F3SP", "group_key": "SP", "route_to_specialty": true }
            ],
            "sequencing": "Equipment",
            "capacity": { "EquipmentTime": { "budgets": { "ATE-01": 3600, "ATE-02": 3600 } } }
        },
        "power": {
            "line": "Power",
            "release_target": 10,
            "sequencing": "Model",
            "capacity": {
                "Ratio": {
                    "groups": [ { "id": "PU", "patterns": ["F3PU"], "percent": "50" } ],
                    "product_caps": { "F3PU20": 2 }
                }
            }
        },
        "specialty": {
            "line": "Specialty",
            "release_target": 8,
            "sequencing": "Model",
            "capacity": {
                "Hierarchical": {
                    "groups": [
                        { "id": "SP", "patterns": ["F3SP"], "max_qty": 6 },
                        { "id": "SP7", "patterns": ["F3SP7"], "max_qty": 3, "parent": "SP" }
                    ],
                    "module_patterns": ["F3SP7"],
                    "module_cap": 4
                }
            }
        }
    }"#;
    let config = LevelingConfig::from_json_str(json).unwrap();

    let standard = LineSnapshot::new(ProductLine::Standard)
        .with_backlog("S1", "F3XD32-3F", date(10, 9), 6)
        .with_backlog("S2", "F3XD64-3F/CT", date(10, 13), 4)
        .with_backlog("S3", "F3SP71-4S", date(10, 8), 4)
        .with_backlog("S4", "F3ZOTHER-01", date(10, 8), 3)
        .with_components("F3XD32-3F", &["C1", "C2"])
        .with_components("F3XD64-3F/CT", &["C1"])
        .with_inventory("C1", 20)
        .with_inventory("C2", 4)
        .with_time_study(TimeStudy::from_step_times("F3XD32-3F", &["00:05:00", "00:05:00"], &["ATE-01", "ATE-02"]).unwrap())
        .with_time_study(TimeStudy::new("F3XD64-3F/CT", 300, &["ATE-02"]));
    let power = LineSnapshot::new(ProductLine::Power)
        .with_backlog("P1", "F3PU10-0S", date(10, 9), 4)
        .with_backlog("P2", "F3PU20-0N", date(10, 6), 3)
        .with_components("F3PU10-0S", &["C5"])
        .with_components("F3PU20-0N", &["C5"])
        .with_inventory("C5", 50);
    let specialty = LineSnapshot::new(ProductLine::Specialty)
        .with_backlog("X1", "F3SP21-0N", date(10, 9), 3)
        .with_components("F3SP21-0N", &["C7"])
        .with_components("F3SP71-4S", &["C7"])
        .with_inventory("C7", 30);

    let shared = shared()
        .with_emergency(OrderList::new().with_linkage("P2").with_linkage("Z9"))
        .with_held(OrderList::new().with_linkage("H1"));

    (
        config,
        RunInputs {
            shared,
            standard,
            power,
            specialty,
        },
    )
}

#[test]
fn test_three_lines_end_to_end() {
    leveling::logging::init_test();
    let (config, inputs) = full_run_inputs();

    let report = run_all(&config, &inputs);

    assert_eq!(report.succeeded(), 3);
    assert_eq!(report.handoff_qty, 4);

    let standard = report.standard.as_ref().unwrap();
    let power = report.power.as_ref().unwrap();
    let specialty = report.specialty.as_ref().unwrap();

    // 延遲完工機種排在最前面，且受總上限 2 台限制
    assert_eq!(standard.plan.units[0].unit.linkage_id, "S2");
    assert_eq!(standard.released_for("S2"), 2);
    assert!(standard.workbook.count(AlarmCategory::DelayedCapExceeded) > 0);
    assert_eq!(standard.released_for("S3"), 0);

    // 緊急訂單 P2 全數投入，機種上限超扣發出 2-2 警報
    assert_eq!(power.released_for("P2"), 3);
    assert!(power.workbook.count(AlarmCategory::ProductCapShortage) > 0);

    // 轉入的 S3 由特殊線投入
    assert!(specialty.released_for("S3") > 0);
    assert!(report.lookup.is_linkage_released("S3"));

    // Z9 不在任何產線
    assert!(report.warnings.iter().any(|w| w.subject == "Z9"));

    for result in [standard, power, specialty] {
        assert!(result.capacity_report.iter().all(|row| row.remaining >= 0));
        for order in &result.orders {
            assert!(order.allocated_total() <= order.backlog_qty);
        }
        assert_eq!(result.plan.total_qty(), result.released_qty);
    }
}

#[test]
fn test_rerun_is_idempotent() {
    leveling::logging::init_test();
    let (config, inputs) = full_run_inputs();

    let first = run_all(&config, &inputs);
    let second = run_all(&config, &inputs);

    for line in ProductLine::ALL {
        let a = first.line(line).as_ref().unwrap();
        let b = second.line(line).as_ref().unwrap();
        assert_eq!(a.plan, b.plan);
        assert_eq!(a.workbook, b.workbook);
        assert_eq!(a.capacity_report, b.capacity_report);
    }
    assert_eq!(first.lookup, second.lookup);
}

#[test]
fn test_power_failure_does_not_cancel_other_lines() {
    let (config, mut inputs) = full_run_inputs();
    inputs.power = LineSnapshot::new(ProductLine::Power)
        .with_backlog("P1", "F3PU10-0S", date(10, 9), 1)
        .with_backlog("P1", "F3PU20-0N", date(10, 9), 1);

    let report = run_all(&config, &inputs);

    assert!(matches!(report.power, Err(LevelingError::MalformedInput(_))));
    assert!(report.standard.is_ok());
    assert!(report.specialty.is_ok());
    assert_eq!(report.succeeded(), 2);
}

#[test]
fn test_result_serializes_to_json() {
    let (config, inputs) = full_run_inputs();
    let report = run_all(&config, &inputs);

    let json = result_to_json(report.power.as_ref().unwrap()).unwrap();
    assert!(json.contains("\"line\": \"Power\""));
    assert!(json.contains("ProductCapShortage"));
}
