//! 机器人配置文件（TOML）
//!
//! ```toml
//! [balance]
//! period_ms = 10
//! starting_angle = -0.25
//!
//! [balance.gains]
//! k_gyro_angle = 15.0
//!
//! [behavior]
//! obstacle_distance = 0.30
//! min_voltage = 6.1
//! ```
//!
//! 缺省字段使用默认值。

use balancebot_behavior::BehaviorConfig;
use balancebot_driver::BalanceConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// 完整的机器人配置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    /// 控制循环参数
    pub balance: BalanceConfig,
    /// 行为参数
    pub behavior: BehaviorConfig,
}

impl RobotConfig {
    /// 从 TOML 文本解析并校验
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.balance
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.behavior
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }
}
