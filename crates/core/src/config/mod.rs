//! 配置管理
//!
//! `AppConfig` 由若干配置段组成，每段实现 [`ConfigValidator`]。
//! 未提供配置文件时全部使用内置默认值，环境变量优先级最高。

pub mod app_config;
pub mod sections;
pub mod validation;


pub use app_config::AppConfig;
pub use sections::{
    AggregatorConfig, LatencyRange, ObservabilityConfig, QueueConfig, RetryConfig,
    SimulationConfig, WorkerConfig,
};
pub use validation::{ConfigError, ConfigResult, ConfigValidator};
