//! 失败单元与重试状态机
//!
//! 状态流转：
//!
//! ```text
//! capture → PENDING_RETRY → RETRYING → RETRY_SUCCESS
//!                 ↑            │
//!                 └── 失败 ────┤
//!                              └→ MOVED_TO_DLQ → AWAITING_MANUAL_RETRY
//!                                                   │
//!                         RETRYING(人工) ←──────────┘
//!                           ├→ MANUAL_RETRY_SUCCESS
//!                           └→ FAILED
//! ```
//!
//! 所有合法转换都由 [`RetryStatus::apply`] 一处给出。

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RegistrationRequest;
use crate::errors::{RegistrationError, RegistrationResult};

/// 失败阶段标签
pub mod stages {
    pub const REGISTRATION_SUBMISSION: &str = "REGISTRATION_SUBMISSION";
    pub const ROUTING: &str = "ROUTING";
    pub const AGGREGATION: &str = "AGGREGATION";
    pub const PROFILE_STORAGE: &str = "PROFILE_STORAGE";
}

/// 错误分类，仅用于筛选与报表，不影响重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    SystemDown,
    NetworkTimeout,
    InvalidData,
    DatabaseError,
    QueueError,
    TranslationError,
    RoutingError,
    AggregationError,
    Unknown,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 9] = [
        ErrorCategory::SystemDown,
        ErrorCategory::NetworkTimeout,
        ErrorCategory::InvalidData,
        ErrorCategory::DatabaseError,
        ErrorCategory::QueueError,
        ErrorCategory::TranslationError,
        ErrorCategory::RoutingError,
        ErrorCategory::AggregationError,
        ErrorCategory::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::SystemDown => "SYSTEM_DOWN",
            ErrorCategory::NetworkTimeout => "NETWORK_TIMEOUT",
            ErrorCategory::InvalidData => "INVALID_DATA",
            ErrorCategory::DatabaseError => "DATABASE_ERROR",
            ErrorCategory::QueueError => "QUEUE_ERROR",
            ErrorCategory::TranslationError => "TRANSLATION_ERROR",
            ErrorCategory::RoutingError => "ROUTING_ERROR",
            ErrorCategory::AggregationError => "AGGREGATION_ERROR",
            ErrorCategory::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCategory {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase();
        ErrorCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| RegistrationError::validation(format!("未知错误分类: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetryStatus {
    PendingRetry,
    Retrying,
    RetrySuccess,
    MovedToDlq,
    AwaitingManualRetry,
    ManualRetrySuccess,
    Failed,
}

/// 驱动状态机的事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryEvent {
    /// 定时扫描锁定到期单元
    SweepLock,
    /// 运维人员发起人工重试
    ManualLock,
    ReprocessSucceeded,
    /// 重处理失败且仍有剩余次数
    ReprocessFailed,
    /// 重处理失败且次数耗尽
    RetriesExhausted,
    AwaitManual,
    ManualSucceeded,
    ManualFailed,
}

impl RetryStatus {
    pub const ALL: [RetryStatus; 7] = [
        RetryStatus::PendingRetry,
        RetryStatus::Retrying,
        RetryStatus::RetrySuccess,
        RetryStatus::MovedToDlq,
        RetryStatus::AwaitingManualRetry,
        RetryStatus::ManualRetrySuccess,
        RetryStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RetryStatus::PendingRetry => "PENDING_RETRY",
            RetryStatus::Retrying => "RETRYING",
            RetryStatus::RetrySuccess => "RETRY_SUCCESS",
            RetryStatus::MovedToDlq => "MOVED_TO_DLQ",
            RetryStatus::AwaitingManualRetry => "AWAITING_MANUAL_RETRY",
            RetryStatus::ManualRetrySuccess => "MANUAL_RETRY_SUCCESS",
            RetryStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RetryStatus::RetrySuccess | RetryStatus::ManualRetrySuccess | RetryStatus::Failed
        )
    }

    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            RetryStatus::RetrySuccess | RetryStatus::ManualRetrySuccess
        )
    }

    pub fn is_dead_letter(&self) -> bool {
        matches!(
            self,
            RetryStatus::MovedToDlq | RetryStatus::AwaitingManualRetry
        )
    }

    /// 状态转换表，返回 `None` 表示该转换非法
    pub fn apply(self, event: RetryEvent) -> Option<RetryStatus> {
        use RetryEvent::*;
        use RetryStatus::*;

        match (self, event) {
            (PendingRetry, SweepLock) => Some(Retrying),
            (PendingRetry | MovedToDlq | AwaitingManualRetry, ManualLock) => Some(Retrying),
            (Retrying, ReprocessSucceeded) => Some(RetrySuccess),
            (Retrying, ReprocessFailed) => Some(PendingRetry),
            (Retrying, RetriesExhausted) => Some(MovedToDlq),
            (MovedToDlq, AwaitManual) => Some(AwaitingManualRetry),
            (Retrying, ManualSucceeded) => Some(ManualRetrySuccess),
            (Retrying, ManualFailed) => Some(Failed),
            _ => None,
        }
    }
}

impl fmt::Display for RetryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetryStatus {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase();
        RetryStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == normalized)
            .ok_or_else(|| RegistrationError::validation(format!("未知重试状态: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryOutcome {
    InitialFailure,
    RetryFailed,
    RetrySucceeded,
    MovedToDlq,
    ManualSucceeded,
    ManualFailed,
}

impl HistoryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryOutcome::InitialFailure => "INITIAL_FAILURE",
            HistoryOutcome::RetryFailed => "RETRY_FAILED",
            HistoryOutcome::RetrySucceeded => "RETRY_SUCCEEDED",
            HistoryOutcome::MovedToDlq => "MOVED_TO_DLQ",
            HistoryOutcome::ManualSucceeded => "MANUAL_SUCCEEDED",
            HistoryOutcome::ManualFailed => "MANUAL_FAILED",
        }
    }
}

/// 重试历史条目，写入后不可修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub attempt_number: u32,
    pub outcome: HistoryOutcome,
    pub detail: String,
}

impl fmt::Display for RetryHistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] Attempt {}: {} - {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.attempt_number,
            self.outcome.as_str(),
            self.detail
        )
    }
}

/// 退避策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delays_seconds: Vec<u64>,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delays_seconds: vec![5, 10, 20],
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// 第 `attempts` 次失败后的等待时间，下标截断到最后一项
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let last = self.delays_seconds.len().saturating_sub(1);
        let index = (attempts as usize).min(last);
        let seconds = self.delays_seconds.get(index).copied().unwrap_or(0);
        Duration::seconds(seconds as i64)
    }
}

/// 可恢复的失败单元
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedUnit {
    pub id: Uuid,
    pub request: RegistrationRequest,
    pub failure_stage: String,
    pub error_category: ErrorCategory,
    pub error_message: String,
    pub status: RetryStatus,
    pub retry_attempts: u32,
    pub max_attempts: u32,
    pub failed_at: DateTime<Utc>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub moved_to_dlq_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub retried_by: Option<String>,
    pub admin_notes: Option<String>,
    pub in_dead_letter_queue: bool,
    pub user_notified: bool,
    pub last_notification_at: Option<DateTime<Utc>>,
    pub retry_history: Vec<RetryHistoryEntry>,
}

impl FailedUnit {
    /// 捕获一次失败，生成处于 PENDING_RETRY 的新单元
    pub fn capture(
        request: RegistrationRequest,
        stage: impl Into<String>,
        category: ErrorCategory,
        error_message: impl Into<String>,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        let error_message = error_message.into();
        let mut unit = Self {
            id: Uuid::new_v4(),
            request,
            failure_stage: stage.into(),
            error_category: category,
            error_message: error_message.clone(),
            status: RetryStatus::PendingRetry,
            retry_attempts: 0,
            max_attempts: policy.max_attempts,
            failed_at: now,
            next_retry_at: Some(now + policy.delay_for(0)),
            last_retry_at: None,
            moved_to_dlq_at: None,
            resolved_at: None,
            retried_by: None,
            admin_notes: None,
            in_dead_letter_queue: false,
            user_notified: false,
            last_notification_at: None,
            retry_history: Vec::new(),
        };
        unit.record(now, 0, HistoryOutcome::InitialFailure, error_message);
        unit
    }

    /// 是否到期可被定时扫描处理
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == RetryStatus::PendingRetry
            && self.retry_attempts < self.max_attempts
            && self.next_retry_at.is_some_and(|at| at <= now)
    }

    /// 按转换表推进状态，非法转换返回错误且不修改单元
    pub fn transition(&mut self, event: RetryEvent) -> RegistrationResult<RetryStatus> {
        match self.status.apply(event) {
            Some(next) => {
                self.status = next;
                if next.is_dead_letter() {
                    self.in_dead_letter_queue = true;
                }
                Ok(next)
            }
            None => Err(RegistrationError::invalid_transition(
                self.id,
                self.status,
                format!("{event:?}"),
            )),
        }
    }

    /// 自动重试成功
    pub fn record_retry_success(&mut self, now: DateTime<Utc>) -> RegistrationResult<()> {
        self.transition(RetryEvent::ReprocessSucceeded)?;
        self.last_retry_at = Some(now);
        self.resolved_at = Some(now);
        self.next_retry_at = None;
        let attempt = self.retry_attempts + 1;
        self.record(now, attempt, HistoryOutcome::RetrySucceeded, "重处理成功");
        Ok(())
    }

    /// 自动重试失败，次数耗尽时进入死信队列
    pub fn record_retry_failure(
        &mut self,
        detail: impl Into<String>,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> RegistrationResult<()> {
        let attempts = self.retry_attempts + 1;
        let detail = detail.into();

        if attempts >= self.max_attempts {
            self.transition(RetryEvent::RetriesExhausted)?;
            self.transition(RetryEvent::AwaitManual)?;
            self.retry_attempts = attempts;
            self.last_retry_at = Some(now);
            self.moved_to_dlq_at = Some(now);
            self.next_retry_at = None;
            self.record(
                now,
                attempts,
                HistoryOutcome::MovedToDlq,
                format!("{detail}; 重试次数已耗尽，移入死信队列"),
            );
        } else {
            self.transition(RetryEvent::ReprocessFailed)?;
            self.retry_attempts = attempts;
            self.last_retry_at = Some(now);
            self.next_retry_at = Some(now + policy.delay_for(attempts));
            self.record(now, attempts, HistoryOutcome::RetryFailed, detail);
        }
        self.error_message = self
            .retry_history
            .last()
            .map(|entry| entry.detail.clone())
            .unwrap_or_default();
        Ok(())
    }

    /// 人工重试结果，不计入自动重试次数
    pub fn record_manual_outcome(
        &mut self,
        succeeded: bool,
        operator: &str,
        notes: Option<String>,
        detail: impl Into<String>,
        now: DateTime<Utc>,
    ) -> RegistrationResult<()> {
        let (event, outcome) = if succeeded {
            (RetryEvent::ManualSucceeded, HistoryOutcome::ManualSucceeded)
        } else {
            (RetryEvent::ManualFailed, HistoryOutcome::ManualFailed)
        };
        self.transition(event)?;
        self.retried_by = Some(operator.to_string());
        self.admin_notes = notes;
        self.last_retry_at = Some(now);
        self.next_retry_at = None;
        if succeeded {
            self.resolved_at = Some(now);
        }
        let attempt = self.retry_attempts + 1;
        self.record(
            now,
            attempt,
            outcome,
            format!("{} (operator: {operator})", detail.into()),
        );
        Ok(())
    }

    pub fn mark_notified(&mut self, now: DateTime<Utc>) {
        self.user_notified = true;
        self.last_notification_at = Some(now);
    }

    /// 追加历史；时间戳不早于上一条
    fn record(
        &mut self,
        now: DateTime<Utc>,
        attempt_number: u32,
        outcome: HistoryOutcome,
        detail: impl Into<String>,
    ) {
        let timestamp = match self.retry_history.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };
        self.retry_history.push(RetryHistoryEntry {
            timestamp,
            attempt_number,
            outcome,
            detail: detail.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(now: DateTime<Utc>) -> FailedUnit {
        let request =
            RegistrationRequest::new("S200", "Carol", "carol@rsu.edu", "Engineering", None);
        FailedUnit::capture(
            request,
            stages::REGISTRATION_SUBMISSION,
            ErrorCategory::NetworkTimeout,
            "connection timed out",
            &RetryPolicy::default(),
            now,
        )
    }

    #[test]
    fn test_capture_initial_state() {
        let now = Utc::now();
        let unit = unit(now);
        assert_eq!(unit.status, RetryStatus::PendingRetry);
        assert_eq!(unit.retry_attempts, 0);
        assert_eq!(unit.max_attempts, 3);
        assert_eq!(unit.next_retry_at, Some(now + Duration::seconds(5)));
        assert_eq!(unit.retry_history.len(), 1);
        assert!(!unit.in_dead_letter_queue);
    }

    #[test]
    fn test_delay_index_is_clamped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::seconds(5));
        assert_eq!(policy.delay_for(1), Duration::seconds(10));
        assert_eq!(policy.delay_for(2), Duration::seconds(20));
        assert_eq!(policy.delay_for(9), Duration::seconds(20));
    }

    #[test]
    fn test_transition_table_rejects_terminal_states() {
        for terminal in [
            RetryStatus::RetrySuccess,
            RetryStatus::ManualRetrySuccess,
            RetryStatus::Failed,
        ] {
            assert!(terminal.is_terminal());
            assert_eq!(terminal.apply(RetryEvent::ManualLock), None);
            assert_eq!(terminal.apply(RetryEvent::SweepLock), None);
        }
        assert_eq!(RetryStatus::Retrying.apply(RetryEvent::SweepLock), None);
        assert_eq!(
            RetryStatus::AwaitingManualRetry.apply(RetryEvent::ManualLock),
            Some(RetryStatus::Retrying)
        );
    }

    #[test]
    fn test_three_failures_move_to_dead_letter() {
        let policy = RetryPolicy::default();
        let mut now = Utc::now();
        let mut unit = unit(now);

        for _ in 0..3 {
            now += Duration::seconds(30);
            unit.transition(RetryEvent::SweepLock).unwrap();
            unit.record_retry_failure("academic down", &policy, now).unwrap();
        }

        assert_eq!(unit.status, RetryStatus::AwaitingManualRetry);
        assert_eq!(unit.retry_attempts, 3);
        assert!(unit.in_dead_letter_queue);
        assert_eq!(unit.moved_to_dlq_at, Some(now));
        assert_eq!(unit.retry_history.len(), 4);
        assert_eq!(
            unit.retry_history.last().unwrap().outcome,
            HistoryOutcome::MovedToDlq
        );
        assert!(!unit.is_due(now + Duration::days(1)));
    }

    #[test]
    fn test_history_is_ordered() {
        let policy = RetryPolicy::default();
        let now = Utc::now();
        let mut unit = unit(now);
        unit.transition(RetryEvent::SweepLock).unwrap();
        // 时钟回拨也不能破坏顺序
        unit.record_retry_failure("boom", &policy, now - Duration::seconds(10))
            .unwrap();

        let history = &unit.retry_history;
        assert!(history[1].timestamp >= history[0].timestamp);
        assert!(history[1].attempt_number > history[0].attempt_number);
    }

    #[test]
    fn test_invalid_transition_leaves_unit_unchanged() {
        let mut unit = unit(Utc::now());
        let before = unit.clone();
        let result = unit.transition(RetryEvent::ManualSucceeded);
        assert!(matches!(
            result,
            Err(RegistrationError::InvalidTransition { .. })
        ));
        assert_eq!(unit, before);
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in RetryStatus::ALL {
            assert_eq!(status.to_string().parse::<RetryStatus>().unwrap(), status);
        }
        assert_eq!(
            "network_timeout".parse::<ErrorCategory>().unwrap(),
            ErrorCategory::NetworkTimeout
        );
    }

    #[test]
    fn test_history_entry_display() {
        let unit = unit(Utc::now());
        let line = unit.retry_history[0].to_string();
        assert!(line.contains("Attempt 0: INITIAL_FAILURE - connection timed out"));
    }
}
