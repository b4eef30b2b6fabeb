//! 平準化配置模型

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::order::ProductLine;
use crate::{LevelingError, Result};

/// 重新排序時的分組依據
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequencingKey {
    /// 依指派的檢查設備
    Equipment,
    /// 依代表機種
    Model,
}

/// 模組／非模組分類（特殊機種）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModuleClass {
    Module,
    NonModule,
}

/// 特殊條件表的一列
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialtyCondition {
    /// 機種代碼前綴
    pub pattern: String,

    /// 覆寫的平準化群組
    #[serde(default)]
    pub group_key: Option<String>,

    /// 覆寫的每日最大投入量（取代計算出的最小需求量）
    #[serde(default)]
    pub max_daily: Option<u32>,

    /// 優先旗標
    #[serde(default)]
    pub priority: u8,

    /// 標準線訂單符合時轉交特殊線
    #[serde(default)]
    pub route_to_specialty: bool,
}

impl SpecialtyCondition {
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            group_key: None,
            max_daily: None,
            priority: 0,
            route_to_specialty: false,
        }
    }

    pub fn with_group_key(mut self, group_key: &str) -> Self {
        self.group_key = Some(group_key.to_string());
        self
    }

    pub fn with_max_daily(mut self, max_daily: u32) -> Self {
        self.max_daily = Some(max_daily);
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn routed_to_specialty(mut self) -> Self {
        self.route_to_specialty = true;
        self
    }

    pub fn matches(&self, product_code: &str) -> bool {
        product_code.starts_with(&self.pattern)
    }
}

/// 比率群組（佔當日投入總量的百分比）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatioGroup {
    pub id: String,

    /// 機種代碼前綴
    pub patterns: Vec<String>,

    /// 百分比（0-100）
    pub percent: Decimal,
}

impl RatioGroup {
    pub fn new(id: &str, patterns: &[&str], percent: Decimal) -> Self {
        Self {
            id: id.to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            percent,
        }
    }

    pub fn matches(&self, product_code: &str) -> bool {
        self.patterns.iter().any(|p| product_code.starts_with(p.as_str()))
    }

    /// 換算為台數上限（無條件捨去）
    pub fn cap(&self, release_target: u32) -> u32 {
        (Decimal::from(release_target) * self.percent / Decimal::from(100))
            .floor()
            .to_u32()
            .unwrap_or(0)
    }
}

/// 階層式上限群組（最多兩層）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxGroup {
    pub id: String,

    /// 機種代碼前綴
    pub patterns: Vec<String>,

    /// 台數上限
    pub max_qty: u32,

    /// 上層群組
    #[serde(default)]
    pub parent: Option<String>,
}

impl MaxGroup {
    pub fn new(id: &str, patterns: &[&str], max_qty: u32) -> Self {
        Self {
            id: id.to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            max_qty,
            parent: None,
        }
    }

    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    pub fn matches(&self, product_code: &str) -> bool {
        self.patterns.iter().any(|p| product_code.starts_with(p.as_str()))
    }
}

/// 各產線的容量規則
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CapacityRules {
    /// 檢查設備可用秒數（標準線）
    EquipmentTime {
        budgets: BTreeMap<String, i64>,
    },

    /// 比率上限 + 機種絕對上限（電源線）
    Ratio {
        groups: Vec<RatioGroup>,
        #[serde(default)]
        product_caps: BTreeMap<String, u32>,
    },

    /// 兩層群組上限 + 模組分類上限（特殊線）
    Hierarchical {
        groups: Vec<MaxGroup>,
        #[serde(default)]
        module_patterns: Vec<String>,
        #[serde(default)]
        module_cap: Option<u32>,
        #[serde(default)]
        non_module_cap: Option<u32>,
    },
}

impl CapacityRules {
    /// 依機種代碼判定模組分類
    pub fn module_class(&self, product_code: &str) -> Option<ModuleClass> {
        match self {
            Self::Hierarchical {
                module_patterns, ..
            } => {
                if module_patterns
                    .iter()
                    .any(|p| product_code.starts_with(p.as_str()))
                {
                    Some(ModuleClass::Module)
                } else {
                    Some(ModuleClass::NonModule)
                }
            }
            _ => None,
        }
    }
}

/// 單一產線的平準化參數
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineConfig {
    /// 產線
    pub line: ProductLine,

    /// 當日投入目標台數
    pub release_target: u32,

    /// 延遲完工機種的總上限
    #[serde(default)]
    pub delayed_cap: Option<u32>,

    /// 延遲完工機種的代碼標記
    #[serde(default)]
    pub delayed_markers: Vec<String>,

    /// 延遲完工機種的完工日提前工作日數
    #[serde(default)]
    pub delayed_offset_days: u32,

    /// 不參與平準化的代碼標記
    #[serde(default)]
    pub excluded_markers: Vec<String>,

    /// 代表機種取代碼前幾碼（未設定時取第一個 '-' 之前）
    #[serde(default)]
    pub model_key_len: Option<usize>,

    /// 特殊條件表
    #[serde(default)]
    pub conditions: Vec<SpecialtyCondition>,

    /// 重新排序的分組依據
    pub sequencing: SequencingKey,

    /// 容量規則
    pub capacity: CapacityRules,
}

impl LineConfig {
    /// 創建新的產線配置
    pub fn new(line: ProductLine, release_target: u32, capacity: CapacityRules) -> Self {
        let sequencing = match capacity {
            CapacityRules::EquipmentTime { .. } => SequencingKey::Equipment,
            _ => SequencingKey::Model,
        };
        Self {
            line,
            release_target,
            delayed_cap: None,
            delayed_markers: Vec::new(),
            delayed_offset_days: 0,
            excluded_markers: Vec::new(),
            model_key_len: None,
            conditions: Vec::new(),
            sequencing,
            capacity,
        }
    }

    /// 建構器模式：設置延遲完工機種
    pub fn with_delayed_variant(mut self, markers: &[&str], offset_days: u32, cap: u32) -> Self {
        self.delayed_markers = markers.iter().map(|m| m.to_string()).collect();
        self.delayed_offset_days = offset_days;
        self.delayed_cap = Some(cap);
        self
    }

    /// 建構器模式：設置排除標記
    pub fn with_excluded_markers(mut self, markers: &[&str]) -> Self {
        self.excluded_markers = markers.iter().map(|m| m.to_string()).collect();
        self
    }

    /// 建構器模式：設置代表機種長度
    pub fn with_model_key_len(mut self, len: usize) -> Self {
        self.model_key_len = Some(len);
        self
    }

    /// 建構器模式：加入特殊條件
    pub fn with_condition(mut self, condition: SpecialtyCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// 建構器模式：設置重新排序依據
    pub fn with_sequencing(mut self, sequencing: SequencingKey) -> Self {
        self.sequencing = sequencing;
        self
    }

    /// 由機種代碼取得代表機種
    pub fn model_key(&self, product_code: &str) -> String {
        match self.model_key_len {
            Some(len) => product_code.chars().take(len).collect(),
            None => product_code
                .split('-')
                .next()
                .unwrap_or(product_code)
                .to_string(),
        }
    }

    pub fn is_delayed_variant(&self, product_code: &str) -> bool {
        self.delayed_markers
            .iter()
            .any(|m| !m.is_empty() && product_code.contains(m.as_str()))
    }

    pub fn is_excluded(&self, product_code: &str) -> bool {
        self.excluded_markers
            .iter()
            .any(|m| !m.is_empty() && product_code.contains(m.as_str()))
    }

    /// 第一個符合的特殊條件
    pub fn condition_for(&self, product_code: &str) -> Option<&SpecialtyCondition> {
        self.conditions.iter().find(|c| c.matches(product_code))
    }

    /// 是否要轉交特殊線
    pub fn routes_to_specialty(&self, product_code: &str) -> bool {
        self.conditions
            .iter()
            .any(|c| c.route_to_specialty && c.matches(product_code))
    }

    /// 檢查配置是否合理
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(LevelingError::InvalidConfig(format!("{}: {}", self.line, msg)));

        if let Some(condition) = self.conditions.iter().find(|c| c.pattern.is_empty()) {
            return invalid(format!("特殊條件的機種前綴不可為空 (群組 {:?})", condition.group_key));
        }

        match &self.capacity {
            CapacityRules::EquipmentTime { budgets } => {
                if let Some((id, secs)) = budgets.iter().find(|(_, secs)| **secs < 0) {
                    return invalid(format!("設備 {} 的可用秒數為負值 {}", id, secs));
                }
            }
            CapacityRules::Ratio { groups, .. } => {
                for group in groups {
                    if group.percent < Decimal::ZERO || group.percent > Decimal::from(100) {
                        return invalid(format!("比率群組 {} 的百分比 {} 超出範圍", group.id, group.percent));
                    }
                    if group.patterns.is_empty() {
                        return invalid(format!("比率群組 {} 沒有機種前綴", group.id));
                    }
                }
            }
            CapacityRules::Hierarchical { groups, .. } => {
                let ids: BTreeSet<&str> = groups.iter().map(|g| g.id.as_str()).collect();
                for group in groups {
                    let Some(parent) = group.parent.as_deref() else {
                        continue;
                    };
                    if !ids.contains(parent) {
                        return invalid(format!("群組 {} 的上層群組 {} 不存在", group.id, parent));
                    }
                    let grandparent = groups
                        .iter()
                        .find(|g| g.id == parent)
                        .and_then(|g| g.parent.as_ref());
                    if grandparent.is_some() {
                        return invalid(format!("群組 {} 超過兩層", group.id));
                    }
                }
            }
        }

        Ok(())
    }
}

/// 三條產線的完整配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelingConfig {
    pub standard: LineConfig,
    pub power: LineConfig,
    pub specialty: LineConfig,
}

impl LevelingConfig {
    /// 從 JSON 載入並驗證
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for line in ProductLine::ALL {
            let config = self.line(line);
            if config.line != line {
                return Err(LevelingError::InvalidConfig(format!(
                    "{} 的配置標示為 {}",
                    line, config.line
                )));
            }
            config.validate()?;
        }
        Ok(())
    }

    pub fn line(&self, line: ProductLine) -> &LineConfig {
        match line {
            ProductLine::Standard => &self.standard,
            ProductLine::Power => &self.power,
            ProductLine::Specialty => &self.specialty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn equipment_rules() -> CapacityRules {
        CapacityRules::EquipmentTime {
            budgets: BTreeMap::from([("ATE-01".to_string(), 28_800)]),
        }
    }

    #[test]
    fn test_model_key() {
        let config = LineConfig::new(ProductLine::Standard, 100, equipment_rules());
        assert_eq!(config.model_key("F3XD32-3F"), "F3XD32");
        assert_eq!(config.model_key("F3XD32"), "F3XD32");

        let config = config.with_model_key_len(4);
        assert_eq!(config.model_key("F3XD32-3F"), "F3XD");
    }

    #[test]
    fn test_config_builder() {
        let config = LineConfig::new(ProductLine::Standard, 120, equipment_rules())
            .with_delayed_variant(&["/CT"], 2, 10)
            .with_excluded_markers(&["ZOTHER", "YZ"])
            .with_condition(
                SpecialtyCondition::new("F3SP")
                    .with_group_key("SP")
                    .routed_to_specialty(),
            );

        assert_eq!(config.sequencing, SequencingKey::Equipment);
        assert!(config.is_delayed_variant("F3XD32-3F/CT"));
        assert!(config.is_excluded("F3ZOTHER-01"));
        assert!(config.routes_to_specialty("F3SP71-4S"));
        assert_eq!(
            config.condition_for("F3SP71-4S").and_then(|c| c.group_key.as_deref()),
            Some("SP")
        );
    }

    #[test]
    fn test_ratio_cap_rounds_down() {
        let group = RatioGroup::new("PS", &["F3PU"], Decimal::new(333, 1));
        // 50 × 33.3% = 16.65 → 16
        assert_eq!(group.cap(50), 16);
    }

    #[test]
    fn test_validate_rejects_three_level_groups() {
        let rules = CapacityRules::Hierarchical {
            groups: vec![
                MaxGroup::new("TOP", &["F3"], 50),
                MaxGroup::new("MID", &["F3R"], 20).with_parent("TOP"),
                MaxGroup::new("LEAF", &["F3RZ"], 5).with_parent("MID"),
            ],
            module_patterns: vec![],
            module_cap: None,
            non_module_cap: None,
        };
        let config = LineConfig::new(ProductLine::Specialty, 40, rules);

        assert!(matches!(
            config.validate(),
            Err(LevelingError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_ratio_over_100() {
        let rules = CapacityRules::Ratio {
            groups: vec![RatioGroup::new("PS", &["F3PU"], Decimal::from(120))],
            product_caps: BTreeMap::new(),
        };
        let config = LineConfig::new(ProductLine::Power, 40, rules);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_module_class() {
        let rules = CapacityRules::Hierarchical {
            groups: vec![],
            module_patterns: vec!["F3RZ".to_string()],
            module_cap: Some(5),
            non_module_cap: None,
        };
        assert_eq!(rules.module_class("F3RZ91-0N"), Some(ModuleClass::Module));
        assert_eq!(rules.module_class("F3LC11-1F"), Some(ModuleClass::NonModule));
        assert_eq!(equipment_rules().module_class("F3RZ91-0N"), None);
    }
}
