use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// 各字段在总置信度中的权重，合计必须为 1.0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldWeights {
    pub name: f64,
    pub address: f64,
    pub ai: f64,
    pub vendor: f64,
    pub amount: f64,
}

impl FieldWeights {
    /// 默认方案 40/30/20/5/5 (名称/地址/AI/供应商/金额)
    pub fn ai_heavy() -> Self {
        Self {
            name: 0.40,
            address: 0.30,
            ai: 0.20,
            vendor: 0.05,
            amount: 0.05,
        }
    }

    /// 规则偏重方案 40/25/15/10/10
    pub fn rule_heavy() -> Self {
        Self {
            name: 0.40,
            address: 0.25,
            ai: 0.15,
            vendor: 0.10,
            amount: 0.10,
        }
    }

    pub fn total(&self) -> f64 {
        self.name + self.address + self.ai + self.vendor + self.amount
    }
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self::ai_heavy()
    }
}

/// 阈值配置
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThresholdConfig {
    /// 置信度 >= 该值时自动匹配
    #[serde(alias = "auto_threshold")]
    pub auto_threshold: u8,
    /// 置信度 >= 该值时进入人工复核
    #[serde(alias = "review_floor")]
    pub review_floor: u8,
    pub weights: FieldWeights,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            auto_threshold: 85,
            review_floor: 60,
            weights: FieldWeights::default(),
        }
    }
}

impl ThresholdConfig {
    pub fn validate(&self) -> Result<()> {
        if self.auto_threshold > 100 {
            return Err(EngineError::InvalidConfig(format!(
                "autoThreshold {} out of range 0-100",
                self.auto_threshold
            )));
        }
        if self.review_floor > self.auto_threshold {
            return Err(EngineError::InvalidConfig(format!(
                "reviewFloor {} is above autoThreshold {}",
                self.review_floor, self.auto_threshold
            )));
        }

        let w = &self.weights;
        for (field, value) in [
            ("name", w.name),
            ("address", w.address),
            ("ai", w.ai),
            ("vendor", w.vendor),
            ("amount", w.amount),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "weight {} must be a non-negative number, got {}",
                    field, value
                )));
            }
        }

        let total = w.total();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(EngineError::InvalidConfig(format!(
                "weights must sum to 1.0, got {:.4}",
                total
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_presets_are_valid() {
        ThresholdConfig::default().validate().unwrap();
        ThresholdConfig {
            weights: FieldWeights::rule_heavy(),
            ..Default::default()
        }
        .validate()
        .unwrap();
    }

    #[test]
    fn rejects_weights_not_summing_to_one() {
        let config = ThresholdConfig {
            weights: FieldWeights {
                name: 0.5,
                address: 0.5,
                ai: 0.2,
                vendor: 0.0,
                amount: 0.0,
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_floor_above_auto_threshold() {
        let config = ThresholdConfig {
            auto_threshold: 70,
            review_floor: 80,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let out_of_range = ThresholdConfig {
            auto_threshold: 120,
            ..Default::default()
        };
        assert!(out_of_range.validate().is_err());
    }
}
