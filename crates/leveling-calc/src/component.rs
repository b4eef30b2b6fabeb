//! 零件庫存反映
//!
//! 每台需要一組零件（套件），所有零件同時扣減相同數量。

use leveling_core::{AlarmCategory, AlarmLog, Ledger, LineSnapshot, Order, Pass};
use std::collections::BTreeMap;

/// 零件庫存反映
pub struct ComponentReflection;

impl ComponentReflection {
    /// 由快照建立零件帳本（現有 − 已佔用）
    pub fn open_ledger(snapshot: &LineSnapshot) -> Ledger<String> {
        Ledger::from_snapshot("component", snapshot.net_inventory())
    }

    /// 機種的零件清單
    ///
    /// 遇到第一個空白欄位即停止，重複的零件只計一次。沒有對應資料時回傳 `None`。
    pub fn components_for(
        component_map: &BTreeMap<String, Vec<String>>,
        product_code: &str,
    ) -> Option<Vec<String>> {
        let raw = component_map.get(product_code)?;
        let mut components: Vec<String> = Vec::new();
        for id in raw.iter().map(|c| c.trim()).take_while(|c| !c.is_empty()) {
            if !components.iter().any(|c| c == id) {
                components.push(id.to_string());
            }
        }
        if components.is_empty() {
            None
        } else {
            Some(components)
        }
    }

    /// 對指定階段的數量反映零件庫存
    pub fn reflect(
        orders: &mut [Order],
        pass: Pass,
        component_map: &BTreeMap<String, Vec<String>>,
        ledger: &mut Ledger<String>,
        alarms: &mut AlarmLog,
    ) {
        for order in orders.iter_mut() {
            let requested = order.allocation(pass).qty;
            if requested == 0 {
                continue;
            }

            let Some(components) = Self::components_for(component_map, &order.product_code) else {
                alarms.raise(AlarmCategory::NoComponentMapping, order, None, requested, None);
                order.allocation_mut(pass).qty = 0;
                continue;
            };

            let unregistered: Vec<&String> = components
                .iter()
                .filter(|c| !ledger.contains(c))
                .collect();
            if !unregistered.is_empty() {
                for component_id in unregistered {
                    alarms.raise(
                        AlarmCategory::UnregisteredComponent,
                        order,
                        Some(component_id.as_str()),
                        requested,
                        None,
                    );
                }
                order.allocation_mut(pass).qty = 0;
                continue;
            }

            let granted = if order.bypasses_checks() {
                Self::reflect_bypass(order, requested, &components, ledger, alarms)
            } else {
                Self::reflect_normal(order, requested, &components, ledger, alarms)
            };
            order.allocation_mut(pass).qty = granted;
        }

        tracing::debug!(
            "零件反映（{}）完成，核准 {} 台",
            pass,
            orders.iter().map(|o| o.allocation(pass).qty).sum::<u32>()
        );
    }

    /// 緊急／當日：全數核准，每個零件各自判斷是否超扣
    fn reflect_bypass(
        order: &Order,
        requested: u32,
        components: &[String],
        ledger: &mut Ledger<String>,
        alarms: &mut AlarmLog,
    ) -> u32 {
        for component_id in components {
            if let Some(draw) = ledger.try_consume(component_id, requested, 1, true) {
                if draw.is_short() {
                    alarms.raise(
                        AlarmCategory::ComponentShortage,
                        order,
                        Some(component_id.as_str()),
                        draw.shortage,
                        None,
                    );
                }
            }
        }
        requested
    }

    /// 一般訂單：取所有零件可用量的最小值，再以該數量扣減每個零件
    fn reflect_normal(
        order: &Order,
        requested: u32,
        components: &[String],
        ledger: &mut Ledger<String>,
        alarms: &mut AlarmLog,
    ) -> u32 {
        let mut feasible = requested;
        let mut short: Vec<&String> = Vec::new();

        for component_id in components {
            let affordable = ledger.affordable(component_id, requested, 1).unwrap_or(0);
            if affordable < requested {
                alarms.raise(
                    AlarmCategory::ComponentShortage,
                    order,
                    Some(component_id.as_str()),
                    requested - affordable,
                    None,
                );
                short.push(component_id);
            }
            feasible = feasible.min(affordable);
        }

        for component_id in components {
            ledger.debit(component_id, i64::from(feasible));
        }
        for component_id in short {
            ledger.clamp_negative(component_id);
        }

        feasible
    }
}
