//! 需求彙總
//!
//! 將逐台的未投入明細依 Linkage 彙總為訂單，計算剩餘工作日並判定緊急程度。

use chrono::NaiveDate;
use leveling_core::{
    BacklogRow, LevelingError, LineConfig, Order, ProductLine, Result, SharedInputs, Urgency,
};
use std::collections::{BTreeMap, BTreeSet};

use crate::LevelingWarning;

/// 彙總結果
#[derive(Debug, Clone, Default)]
pub struct AggregationOutput {
    /// 彙總後的訂單（依 Linkage 排序）
    pub orders: Vec<Order>,

    pub warnings: Vec<LevelingWarning>,

    /// 因排除標記略過的明細列數
    pub excluded_rows: usize,

    /// 被保留的訂單數
    pub held_orders: usize,
}

/// 同一 Linkage 的明細累計
struct LinkageRows<'a> {
    product_code: &'a str,
    completion_date: NaiveDate,
    qty: u32,
    first: &'a BacklogRow,
}

/// 需求彙總器
pub struct DemandAggregator;

impl DemandAggregator {
    /// 彙總未投入明細
    pub fn aggregate(
        config: &LineConfig,
        rows: &[BacklogRow],
        inputs: &SharedInputs,
    ) -> Result<AggregationOutput> {
        if inputs.calendar.is_empty() {
            return Err(LevelingError::MissingInput(format!(
                "工作日曆 {} 沒有任何日期",
                inputs.calendar.calendar_id
            )));
        }

        let mut output = AggregationOutput::default();
        let mut grouped: BTreeMap<&str, LinkageRows> = BTreeMap::new();

        for row in rows {
            if row.linkage_id.trim().is_empty() {
                return Err(LevelingError::MalformedInput(format!(
                    "機種 {} 的明細沒有 Linkage 編號",
                    row.product_code
                )));
            }
            if config.is_excluded(&row.product_code) {
                output.excluded_rows += 1;
                continue;
            }

            match grouped.get_mut(row.linkage_id.as_str()) {
                Some(entry) => {
                    if entry.product_code != row.product_code {
                        return Err(LevelingError::MalformedInput(format!(
                            "Linkage {} 同時出現機種 {} 與 {}",
                            row.linkage_id, entry.product_code, row.product_code
                        )));
                    }
                    entry.qty += 1;
                    entry.completion_date = entry.completion_date.min(row.completion_date);
                }
                None => {
                    grouped.insert(
                        &row.linkage_id,
                        LinkageRows {
                            product_code: &row.product_code,
                            completion_date: row.completion_date,
                            qty: 1,
                            first: row,
                        },
                    );
                }
            }
        }

        if output.excluded_rows > 0 {
            tracing::debug!(line = %config.line, "排除標記略過 {} 列", output.excluded_rows);
        }

        let mut fallback_dates: BTreeSet<NaiveDate> = BTreeSet::new();

        for (linkage_id, entry) in grouped {
            if inputs.held.matches(linkage_id, entry.product_code) {
                output.held_orders += 1;
                continue;
            }

            let delayed = config.is_delayed_variant(entry.product_code);
            let completion = if delayed {
                inputs
                    .calendar
                    .subtract_working_days(entry.completion_date, config.delayed_offset_days)?
            } else {
                entry.completion_date
            };

            let remaining = inputs
                .calendar
                .remaining_working_days(inputs.today, completion)?;
            if remaining.used_fallback && fallback_dates.insert(completion) {
                tracing::warn!(line = %config.line, %completion, "完工日不在工作日曆中，改用一般工作日推算");
                output.warnings.push(LevelingWarning::warning(
                    completion.to_string(),
                    "完工日不在工作日曆中，已改用週一至週五推算，請維護工作日曆".to_string(),
                ));
            }

            let urgency = if inputs.emergency.matches(linkage_id, entry.product_code) {
                Urgency::Emergency
            } else {
                Urgency::from_remaining_days(remaining.days)
            };

            let order = Order::new(
                linkage_id.to_string(),
                entry.product_code.to_string(),
                config.model_key(entry.product_code),
                completion,
                entry.qty,
                remaining.days,
            )
            .with_urgency(urgency)
            .with_delayed_variant(delayed)
            .with_source_line(config.line)
            .with_columns(entry.first.columns.clone());

            output.orders.push(Self::apply_conditions(config, order));
        }

        tracing::debug!(
            line = %config.line,
            "彙總訂單 {} 筆（保留 {} 筆）",
            output.orders.len(),
            output.held_orders
        );

        Ok(output)
    }

    /// 依產線的特殊條件表重新推導代表機種、群組與優先旗標
    ///
    /// 跨線轉入的訂單也用這個方法改套接收產線的條件。
    pub fn apply_conditions(config: &LineConfig, mut order: Order) -> Order {
        order.model_key = config.model_key(&order.product_code);
        order.group_key = order.model_key.clone();
        order.priority = 0;

        if let Some(condition) = config.condition_for(&order.product_code) {
            if let Some(group_key) = &condition.group_key {
                order.group_key = group_key.clone();
            }
            order.priority = condition.priority;
        }
        order
    }

    /// 分出要轉交特殊線的訂單
    pub fn split_handoff(config: &LineConfig, orders: Vec<Order>) -> (Vec<Order>, Vec<Order>) {
        if config.line != ProductLine::Standard {
            return (orders, Vec::new());
        }
        orders
            .into_iter()
            .partition(|order| !config.routes_to_specialty(&order.product_code))
    }
}
