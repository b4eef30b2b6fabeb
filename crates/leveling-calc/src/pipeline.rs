//! 單一產線的平準化流程

use leveling_core::{
    AlarmLog, CapacityReportRow, LevelingError, LineConfig, LineSnapshot, Order, Pass,
    PriorPlanRow, ProductLine, ReleaseLookup, ReleasePlan, Result, SharedInputs,
};

use crate::aggregation::DemandAggregator;
use crate::capacity::CapacityReflection;
use crate::classifier::AlarmClassifier;
use crate::component::ComponentReflection;
use crate::leveling::LevelingAllocator;
use crate::sequencing::{CyclicResequencer, UnitExpander};
use crate::{LevelingWarning, LineResult};

/// 進度回報（產線, 百分比）
pub type ProgressFn<'a> = dyn Fn(ProductLine, u8) + Sync + 'a;

/// 彙總後、反映前的需求
#[derive(Debug, Clone, Default)]
pub struct PreparedDemand {
    /// 本產線要處理的訂單
    pub orders: Vec<Order>,

    /// 要轉交特殊線的訂單
    pub handoff: Vec<Order>,

    pub warnings: Vec<LevelingWarning>,
}

/// 產線流程
pub struct LinePipeline<'a> {
    config: &'a LineConfig,
    snapshot: &'a LineSnapshot,
    inputs: &'a SharedInputs,
    progress: Option<&'a ProgressFn<'a>>,
}

impl<'a> LinePipeline<'a> {
    /// 創建新的產線流程
    pub fn new(config: &'a LineConfig, snapshot: &'a LineSnapshot, inputs: &'a SharedInputs) -> Self {
        Self {
            config,
            snapshot,
            inputs,
            progress: None,
        }
    }

    /// 建構器模式：設置進度回報
    pub fn with_progress(mut self, progress: &'a ProgressFn<'a>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn line(&self) -> ProductLine {
        self.config.line
    }

    fn report(&self, percent: u8) {
        tracing::debug!(line = %self.config.line, "進度 {}%", percent);
        if let Some(progress) = self.progress {
            progress(self.config.line, percent);
        }
    }

    /// 彙總需求並分出轉交訂單
    pub fn prepare(&self) -> Result<PreparedDemand> {
        if self.snapshot.line != self.config.line {
            return Err(LevelingError::InvalidConfig(format!(
                "{} 的配置收到 {} 的快照",
                self.config.line, self.snapshot.line
            )));
        }

        let aggregated = DemandAggregator::aggregate(self.config, &self.snapshot.backlog, self.inputs)?;
        let (orders, handoff) = DemandAggregator::split_handoff(self.config, aggregated.orders);
        if !handoff.is_empty() {
            tracing::info!(
                line = %self.config.line,
                "轉交特殊線 {} 筆（{} 台）",
                handoff.len(),
                handoff.iter().map(|o| o.backlog_qty).sum::<u32>()
            );
        }
        self.report(10);

        Ok(PreparedDemand {
            orders,
            handoff,
            warnings: aggregated.warnings,
        })
    }

    /// 完整計算（彙總 + 反映 + 排序），接收其他產線轉入的訂單
    pub fn calculate(&self, incoming: Vec<Order>) -> Result<LineResult> {
        let prepared = self.prepare()?;
        if !prepared.handoff.is_empty() {
            tracing::warn!(
                line = %self.config.line,
                "單獨計算時忽略 {} 筆轉交訂單",
                prepared.handoff.len()
            );
        }
        self.finish(prepared, incoming)
    }

    /// 反映、分類、排序與編號
    pub fn finish(&self, prepared: PreparedDemand, incoming: Vec<Order>) -> Result<LineResult> {
        let line = self.config.line;
        let start_time = std::time::Instant::now();
        let mut result = LineResult::empty(line, ReleasePlan::new(line, self.inputs.release_date));
        let run_id = result.run_id;
        result.warnings = prepared.warnings;

        let mut orders = prepared.orders;
        let incoming_count = incoming.len();
        orders.extend(
            incoming
                .into_iter()
                .map(|order| DemandAggregator::apply_conditions(self.config, order)),
        );

        tracing::info!(
            line = %line,
            %run_id,
            "開始平準化計算：訂單 {} 筆（轉入 {} 筆），投入目標 {} 台",
            orders.len(),
            incoming_count,
            self.config.release_target
        );

        // Step 1: 平準化配額
        tracing::debug!(line = %line, "Step 1: 平準化配額");
        LevelingAllocator::allocate(self.config, &mut orders);
        self.report(20);

        // Step 2: 零件庫存反映（配額內 → 配額外）
        tracing::debug!(line = %line, "Step 2: 零件庫存反映");
        let mut alarms = AlarmLog::new();
        let mut components = ComponentReflection::open_ledger(self.snapshot);
        for pass in [Pass::Primary, Pass::Remainder] {
            ComponentReflection::reflect(
                &mut orders,
                pass,
                &self.snapshot.component_map,
                &mut components,
                &mut alarms,
            );
        }
        self.report(40);

        // Step 3: 容量反映（配額內 → 配額外）
        tracing::debug!(line = %line, "Step 3: 容量反映");
        let mut capacity = CapacityReflection::open_ledger(self.config, self.snapshot);
        let mut missing_time_study = std::collections::BTreeSet::new();
        for pass in [Pass::Primary, Pass::Remainder] {
            missing_time_study.extend(CapacityReflection::reflect(
                self.config,
                self.snapshot,
                &mut orders,
                pass,
                &mut capacity,
                &mut alarms,
            ));
        }
        for product_code in missing_time_study {
            tracing::warn!(line = %line, %product_code, "沒有檢查時間資料，不受設備時間限制");
            result.add_warning(LevelingWarning::warning(
                product_code,
                "沒有檢查時間資料，未套用設備時間限制".to_string(),
            ));
        }
        self.report(60);

        // Step 4: 結算帳本（未被扣減的負值也歸零）
        tracing::debug!(line = %line, "Step 4: 結算帳本");
        let clamped = components.settle();
        if !clamped.is_empty() {
            tracing::debug!(line = %line, "零件期初為負值已歸零: {:?}", clamped);
        }
        capacity.settle();

        // Step 5: 警報分類
        tracing::debug!(line = %line, "Step 5: 警報分類");
        result.workbook = AlarmClassifier::classify(alarms.into_records());
        self.report(70);

        // Step 6: 展開、排序、編號
        tracing::debug!(line = %line, "Step 6: 展開與循環排序");
        let units = UnitExpander::expand(self.config, &orders);
        let sequenced = CyclicResequencer::resequence(units);
        let offset = PriorPlanRow::next_sequence_offset(
            &self.inputs.prior_plan,
            line,
            self.inputs.release_date,
        );
        result.plan.units = UnitExpander::number(sequenced, self.inputs.release_date, offset);
        self.report(90);

        // Step 7: 報表與查詢表
        tracing::debug!(line = %line, "Step 7: 剩餘容量報表");
        result.capacity_report = capacity
            .entries()
            .map(|(key, opening, remaining)| CapacityReportRow {
                ledger: capacity.name().to_string(),
                key: key.to_string(),
                opening,
                remaining,
            })
            .chain(components.entries().map(|(key, opening, remaining)| CapacityReportRow {
                ledger: components.name().to_string(),
                key: key.clone(),
                opening,
                remaining,
            }))
            .collect();

        let mut lookup = ReleaseLookup::new();
        for order in &orders {
            lookup.record(&order.linkage_id, &order.product_code, order.allocated_total() > 0);
        }
        result.lookup = lookup;

        result.released_qty = result.plan.total_qty();
        result.unmet_release_qty = self.config.release_target.saturating_sub(result.released_qty);
        if result.unmet_release_qty > 0 {
            result.add_warning(LevelingWarning::warning(
                line.to_string(),
                format!(
                    "投入 {} 台，未達目標 {} 台（不足 {} 台）",
                    result.released_qty, self.config.release_target, result.unmet_release_qty
                ),
            ));
        }

        result.orders = orders;
        result.calculation_time_ms = Some(start_time.elapsed().as_millis());
        self.report(100);

        tracing::info!(
            line = %line,
            %run_id,
            "平準化計算完成，投入 {} 台，警報 {} 筆，耗時 {:?}",
            result.released_qty,
            result.workbook.details.len(),
            start_time.elapsed()
        );

        Ok(result)
    }
}
