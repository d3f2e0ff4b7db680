//! 流水线配置
//!
//! 所有启发式常量都在这里具名并可调，不在调用点写裸字面量。

use serde::{Deserialize, Serialize};

/// 单 token 命中时遮盖宽度占 token 宽度的比例（经验值）
pub const DEFAULT_TRUNCATION_RATIO: f32 = 0.66;
/// 回退引擎 token 的最低置信度（0-100），低于等于此值整条丢弃
pub const DEFAULT_FALLBACK_MIN_CONFIDENCE: u8 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MaskConfig {
    /// 单 token 命中时遮盖宽度比例
    pub truncation_ratio: f32,
    /// 回退引擎置信度阈值
    pub fallback_min_confidence: u8,
    /// 先知路径几何搜索用的置信度阈值
    pub oracle_min_confidence: u8,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            truncation_ratio: env_f32("UIDMASK_TRUNCATION_RATIO", DEFAULT_TRUNCATION_RATIO),
            fallback_min_confidence: env_u8(
                "UIDMASK_FALLBACK_MIN_CONF",
                DEFAULT_FALLBACK_MIN_CONFIDENCE,
            ),
            oracle_min_confidence: env_u8(
                "UIDMASK_ORACLE_MIN_CONF",
                DEFAULT_FALLBACK_MIN_CONFIDENCE,
            ),
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<f32>().ok())
        .unwrap_or(default)
}

fn env_u8(key: &str, default: u8) -> u8 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u8>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MaskConfig::default();
        assert!((config.truncation_ratio - DEFAULT_TRUNCATION_RATIO).abs() < f32::EPSILON);
        assert_eq!(config.fallback_min_confidence, DEFAULT_FALLBACK_MIN_CONFIDENCE);
        assert_eq!(config.oracle_min_confidence, DEFAULT_FALLBACK_MIN_CONFIDENCE);
    }
}
