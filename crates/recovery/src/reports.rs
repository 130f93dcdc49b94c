use std::collections::BTreeMap;

use registration_core::models::{
    ErrorCategory, ErrorLogEntry, ErrorSeverity, FailedUnit, RetryStatus,
};
use serde::Serialize;
use uuid::Uuid;

/// 单次扫描的结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    /// 扫描时到期的单元数
    pub due: usize,
    pub succeeded: usize,
    pub rescheduled: usize,
    pub moved_to_dlq: usize,
    /// 已被其他流程锁定而跳过
    pub skipped: usize,
    pub errors: Vec<String>,
    pub sweep_duration_ms: u64,
}

impl SweepReport {
    pub fn processed(&self) -> usize {
        self.succeeded + self.rescheduled + self.moved_to_dlq
    }
}

/// 死信队列批量人工重试结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkRetryReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<(Uuid, String)>,
}

/// 失败单元统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetryStatistics {
    pub total: usize,
    pub by_status: BTreeMap<RetryStatus, usize>,
    pub by_category: BTreeMap<ErrorCategory, usize>,
    pub by_stage: BTreeMap<String, usize>,
    pub in_dead_letter_queue: usize,
    pub resolved: usize,
    pub unresolved: usize,
    /// 百分比
    pub success_rate: f64,
    pub dlq_rate: f64,
}

impl RetryStatistics {
    pub fn from_units(units: &[FailedUnit]) -> Self {
        let mut stats = Self {
            total: units.len(),
            ..Self::default()
        };

        for unit in units {
            *stats.by_status.entry(unit.status).or_default() += 1;
            *stats.by_category.entry(unit.error_category).or_default() += 1;
            *stats.by_stage.entry(unit.failure_stage.clone()).or_default() += 1;
            if unit.in_dead_letter_queue {
                stats.in_dead_letter_queue += 1;
            }
            if unit.status.is_resolved() {
                stats.resolved += 1;
            }
            if !unit.status.is_terminal() {
                stats.unresolved += 1;
            }
        }

        if stats.total > 0 {
            let total = stats.total as f64;
            stats.success_rate = stats.resolved as f64 / total * 100.0;
            stats.dlq_rate = stats.in_dead_letter_queue as f64 / total * 100.0;
        }
        stats
    }

    pub fn count_for(&self, status: RetryStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

/// 错误日志统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorLogStatistics {
    pub total: usize,
    pub unresolved: usize,
    pub by_category: BTreeMap<ErrorCategory, usize>,
    pub by_stage: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<ErrorSeverity, usize>,
}

impl ErrorLogStatistics {
    pub fn from_entries(entries: &[ErrorLogEntry]) -> Self {
        let mut stats = Self {
            total: entries.len(),
            ..Self::default()
        };
        for entry in entries {
            *stats.by_category.entry(entry.error_category).or_default() += 1;
            *stats.by_stage.entry(entry.error_stage.clone()).or_default() += 1;
            *stats.by_severity.entry(entry.severity).or_default() += 1;
            if !entry.resolved {
                stats.unresolved += 1;
            }
        }
        stats
    }
}
