//! 警報分類與彙總

use leveling_core::{AlarmCategory, AlarmRecord, ShortageAggregation};
use serde::Serialize;
use std::collections::BTreeMap;

/// 警報彙總表的一列（分類 × 資源）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlarmSummaryRow {
    pub category: AlarmCategory,
    pub resource_id: Option<String>,

    /// 警報筆數
    pub count: u32,

    /// 不足量合計
    pub total_shortage: u32,

    /// 單筆最大不足量
    pub max_shortage: u32,

    /// 代表不足量（依分類取合計或最大值）
    pub headline_qty: u32,

    /// 所需時間合計（秒）
    pub total_needed_time: i64,
}

/// 分類說明
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryExplanation {
    pub code: &'static str,
    pub description: &'static str,
}

/// 警報報表：明細、彙總、說明
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlarmWorkbook {
    pub details: Vec<AlarmRecord>,
    pub summary: Vec<AlarmSummaryRow>,
    pub explanations: Vec<CategoryExplanation>,
}

impl AlarmWorkbook {
    pub fn is_empty(&self) -> bool {
        self.details.is_empty()
    }

    /// 指定分類的警報筆數
    pub fn count(&self, category: AlarmCategory) -> usize {
        self.details.iter().filter(|r| r.category == category).count()
    }

    /// 指定分類的代表不足量（跨資源加總）
    pub fn headline(&self, category: AlarmCategory) -> u32 {
        self.summary
            .iter()
            .filter(|row| row.category == category)
            .map(|row| row.headline_qty)
            .sum()
    }
}

/// 警報分類器
pub struct AlarmClassifier;

impl AlarmClassifier {
    /// 依分類與資源彙總警報
    pub fn classify(records: Vec<AlarmRecord>) -> AlarmWorkbook {
        let mut grouped: BTreeMap<(AlarmCategory, Option<String>), AlarmSummaryRow> = BTreeMap::new();

        for record in &records {
            let row = grouped
                .entry((record.category, record.resource_id.clone()))
                .or_insert_with(|| AlarmSummaryRow {
                    category: record.category,
                    resource_id: record.resource_id.clone(),
                    count: 0,
                    total_shortage: 0,
                    max_shortage: 0,
                    headline_qty: 0,
                    total_needed_time: 0,
                });
            row.count += 1;
            row.total_shortage += record.shortage_qty;
            row.max_shortage = row.max_shortage.max(record.shortage_qty);
            row.total_needed_time += record.needed_time.unwrap_or(0);
        }

        let summary = grouped
            .into_values()
            .map(|mut row| {
                row.headline_qty = match row.category.aggregation() {
                    ShortageAggregation::Sum => row.total_shortage,
                    ShortageAggregation::Max => row.max_shortage,
                };
                row
            })
            .collect();

        let explanations = AlarmCategory::ALL
            .iter()
            .map(|category| CategoryExplanation {
                code: category.code(),
                description: category.description(),
            })
            .collect();

        AlarmWorkbook {
            details: records,
            summary,
            explanations,
        }
    }
}
