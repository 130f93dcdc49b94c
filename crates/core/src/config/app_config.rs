use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use super::sections::{
    AggregatorConfig, ObservabilityConfig, QueueConfig, RetryConfig, SimulationConfig,
    WorkerConfig,
};
use super::validation::{ConfigError, ConfigResult, ConfigValidator};

const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/registration.toml",
    "registration.toml",
    "/etc/registration/config.toml",
];

/// 系统配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub aggregator: AggregatorConfig,
    pub retry: RetryConfig,
    pub queue: QueueConfig,
    pub worker: WorkerConfig,
    pub simulation: SimulationConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序：
    /// 1. 内置默认值
    /// 2. 配置文件（TOML）；未指定路径时依次尝试默认位置
    /// 3. 环境变量覆盖（前缀 `REGISTRATION__`，层级分隔符 `__`）
    pub fn load(config_path: Option<&str>) -> ConfigResult<Self> {
        let mut builder = ConfigBuilder::builder();

        match config_path {
            Some(path) => {
                if !Path::new(path).exists() {
                    return Err(ConfigError::FileNotFound {
                        path: path.to_string(),
                    });
                }
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
            None => {
                if let Some(path) = DEFAULT_CONFIG_PATHS
                    .iter()
                    .find(|path| Path::new(path).exists())
                {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("REGISTRATION")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 从TOML字符串加载配置
    pub fn from_toml_str(toml_str: &str) -> ConfigResult<Self> {
        let config: AppConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.aggregator.validate()?;
        self.retry.validate()?;
        self.queue.validate()?;
        self.worker.validate()?;
        self.simulation.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}
