use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::validation::{ensure_not_blank, ensure_positive, ensure_rate, ConfigError, ConfigResult, ConfigValidator};
use crate::models::{RetryPolicy, Subsystem};

/// 聚合器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// 全局截止时间
    pub timeout_seconds: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self { timeout_seconds: 30 }
    }
}

impl AggregatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl ConfigValidator for AggregatorConfig {
    fn validate(&self) -> ConfigResult<()> {
        ensure_positive("aggregator.timeout_seconds", self.timeout_seconds)
    }
}

/// 重试引擎配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub enabled: bool,
    pub backoff_delays_seconds: Vec<u64>,
    pub max_attempts: u32,
    pub sweep_interval_seconds: u64,
    /// 单次扫描内并发重处理的上限
    pub max_concurrent_retries: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backoff_delays_seconds: vec![5, 10, 20],
            max_attempts: 3,
            sweep_interval_seconds: 5,
            max_concurrent_retries: 16,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            delays_seconds: self.backoff_delays_seconds.clone(),
            max_attempts: self.max_attempts,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

impl ConfigValidator for RetryConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.backoff_delays_seconds.is_empty() {
            return Err(ConfigError::invalid(
                "retry.backoff_delays_seconds",
                "退避序列不能为空",
            ));
        }
        if self.backoff_delays_seconds.windows(2).any(|w| w[0] > w[1]) {
            return Err(ConfigError::invalid(
                "retry.backoff_delays_seconds",
                "退避序列必须单调不减",
            ));
        }
        ensure_positive("retry.max_attempts", u64::from(self.max_attempts))?;
        ensure_positive("retry.sweep_interval_seconds", self.sweep_interval_seconds)?;
        ensure_positive(
            "retry.max_concurrent_retries",
            self.max_concurrent_retries as u64,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub registration_queue: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            registration_queue: "student.registration.queue".to_string(),
        }
    }
}

impl ConfigValidator for QueueConfig {
    fn validate(&self) -> ConfigResult<()> {
        ensure_not_blank("queue.registration_queue", &self.registration_queue)
    }
}

/// 队列消费者配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub enabled: bool,
    pub poll_interval_ms: u64,
    /// 单次轮询内并发处理的消息数
    pub max_concurrent_messages: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 1000,
            max_concurrent_messages: 8,
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl ConfigValidator for WorkerConfig {
    fn validate(&self) -> ConfigResult<()> {
        ensure_positive("worker.poll_interval_ms", self.poll_interval_ms)?;
        ensure_positive(
            "worker.max_concurrent_messages",
            self.max_concurrent_messages as u64,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl LatencyRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }
}

/// 模拟子系统配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// 每次调用失败的概率
    pub failure_rate: f64,
    pub academic: LatencyRange,
    pub housing: LatencyRange,
    pub billing: LatencyRange,
    pub library: LatencyRange,
    /// 每个客户端保留的幂等结果条数，超出后淘汰最早的
    pub idempotency_cache_capacity: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.0,
            academic: LatencyRange::new(500, 2000),
            housing: LatencyRange::new(800, 2500),
            billing: LatencyRange::new(600, 2200),
            library: LatencyRange::new(400, 1800),
            idempotency_cache_capacity: 10_000,
        }
    }
}

impl SimulationConfig {
    pub fn latency_for(&self, subsystem: Subsystem) -> LatencyRange {
        match subsystem {
            Subsystem::Academic => self.academic,
            Subsystem::Housing => self.housing,
            Subsystem::Billing => self.billing,
            Subsystem::Library => self.library,
        }
    }
}

impl ConfigValidator for SimulationConfig {
    fn validate(&self) -> ConfigResult<()> {
        ensure_rate("simulation.failure_rate", self.failure_rate)?;
        ensure_positive(
            "simulation.idempotency_cache_capacity",
            self.idempotency_cache_capacity as u64,
        )?;
        for subsystem in [
            Subsystem::Academic,
            Subsystem::Housing,
            Subsystem::Billing,
            Subsystem::Library,
        ] {
            let range = self.latency_for(subsystem);
            if range.min_ms > range.max_ms {
                return Err(ConfigError::invalid(
                    format!("simulation.{}", subsystem.as_str().to_lowercase()),
                    format!("最小延迟 {} 大于最大延迟 {}", range.min_ms, range.max_ms),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// "pretty" 或 "json"
    pub log_format: String,
    pub metrics_enabled: bool,
    pub metrics_listen_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_listen_address: "0.0.0.0:9090".to_string(),
        }
    }
}

impl ConfigValidator for ObservabilityConfig {
    fn validate(&self) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::invalid(
                "observability.log_level",
                format!("无效的日志级别: {}，支持: {:?}", self.log_level, valid_levels),
            ));
        }
        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            return Err(ConfigError::invalid(
                "observability.log_format",
                format!("无效的日志格式: {}", self.log_format),
            ));
        }
        if self.metrics_enabled {
            self.metrics_listen_address
                .parse::<std::net::SocketAddr>()
                .map_err(|e| ConfigError::invalid("observability.metrics_listen_address", e.to_string()))?;
        }
        Ok(())
    }
}
