use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;
use crate::models::ThresholdConfig;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub matching: ThresholdConfig,
    #[serde(default)]
    pub ai: AiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// AI 评分配置，没有 api_key 时只用规则评分
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub timeout_ms: u64,
}

impl AiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            timeout_ms: 3000,
        }
    }
}

// 启动日志会打印整个配置，key 不能出现在日志里
impl std::fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "postgres://localhost/invoice_match".to_string(),
            },
            matching: ThresholdConfig::default(),
            ai: AiConfig::default(),
        }
    }
}

impl AppConfig {
    /// 加载配置：默认值 -> matcher.toml（可选）-> MATCHER__ 前缀环境变量 -> 常用环境变量
    ///
    /// 例如 `MATCHER__MATCHING__AUTO_THRESHOLD=90`。
    pub fn load() -> Result<Self> {
        let defaults = Self::default();
        let settings = Config::builder()
            .set_default("server.host", defaults.server.host)?
            .set_default("server.port", i64::from(defaults.server.port))?
            .set_default("database.url", defaults.database.url)?
            .add_source(File::with_name("matcher").required(false))
            .add_source(Environment::with_prefix("MATCHER").separator("__"))
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option(
                "server.port",
                std::env::var("SERVER_PORT")
                    .ok()
                    .and_then(|p| p.parse::<u16>().ok())
                    .map(i64::from),
            )?
            .set_override_option("ai.api_key", std::env::var("OPENAI_API_KEY").ok())?
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.matching.validate()?;
        Ok(config)
    }

    /// 只从常用环境变量加载，其余取默认值
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server: ServerConfig {
                host: std::env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: std::env::var("SERVER_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(defaults.server.port),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL").unwrap_or(defaults.database.url),
            },
            matching: defaults.matching,
            ai: AiConfig {
                api_key: std::env::var("OPENAI_API_KEY").ok(),
                ..defaults.ai
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.matching.validate().is_ok());
        assert_eq!(config.ai.timeout(), Duration::from_millis(3000));
        assert!(config.ai.api_key.is_none());
    }

    #[test]
    fn debug_output_masks_api_key() {
        let ai = AiConfig {
            api_key: Some("sk-secret".to_string()),
            ..Default::default()
        };
        let printed = format!("{:?}", ai);
        assert!(!printed.contains("sk-secret"));
        assert!(printed.contains("***"));
    }

    #[test]
    fn deserializes_snake_case_threshold_keys() {
        let settings = Config::builder()
            .set_default("server.host", "0.0.0.0")
            .unwrap()
            .set_default("server.port", 9000)
            .unwrap()
            .set_default("database.url", "postgres://localhost/test")
            .unwrap()
            .set_override("matching.auto_threshold", 90)
            .unwrap()
            .build()
            .unwrap();
        let config: AppConfig = settings.try_deserialize().unwrap();
        assert_eq!(config.matching.auto_threshold, 90);
        assert_eq!(config.matching.review_floor, 60);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.ai.model, "gpt-4o-mini");
    }
}
