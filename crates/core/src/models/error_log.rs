//! 错误日志
//!
//! 每次捕获失败都会留下一条错误日志，供管理端按分类、阶段、严重级别检索。
//! 重处理成功后，同一学生同一阶段的未解决日志被标记为已解决。

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ErrorCategory, RegistrationRequest};
use crate::errors::RegistrationError;

/// 自动解决时记录的处理人
pub const SYSTEM_RESOLVER: &str = "SYSTEM";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorSeverity {
    Info,
    Warn,
    Error,
    Fatal,
}

impl ErrorSeverity {
    pub const ALL: [ErrorSeverity; 4] = [
        ErrorSeverity::Info,
        ErrorSeverity::Warn,
        ErrorSeverity::Error,
        ErrorSeverity::Fatal,
    ];

    /// 捕获失败时使用的级别，数据错误只算警告
    pub fn for_category(category: ErrorCategory) -> Self {
        match category {
            ErrorCategory::InvalidData => ErrorSeverity::Warn,
            _ => ErrorSeverity::Error,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "INFO",
            ErrorSeverity::Warn => "WARN",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorSeverity {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase();
        ErrorSeverity::ALL
            .into_iter()
            .find(|level| level.as_str() == normalized)
            .ok_or_else(|| RegistrationError::validation(format!("未知严重级别: {s}")))
    }
}

/// 一条错误日志
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLogEntry {
    pub id: Uuid,
    pub student_id: String,
    pub student_name: String,
    pub error_stage: String,
    pub error_category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub error_message: String,
    pub occurred_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolution_notes: Option<String>,
}

impl ErrorLogEntry {
    pub fn new(
        request: &RegistrationRequest,
        stage: impl Into<String>,
        category: ErrorCategory,
        severity: ErrorSeverity,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id: request.student_id.clone(),
            student_name: request.student_name.clone(),
            error_stage: stage.into(),
            error_category: category,
            severity,
            error_message: message.into(),
            occurred_at: now,
            resolved: false,
            resolved_at: None,
            resolved_by: None,
            resolution_notes: None,
        }
    }

    /// 标记为已解决，已解决的日志保持原样
    pub fn resolve(&mut self, resolved_by: &str, notes: &str, now: DateTime<Utc>) -> bool {
        if self.resolved {
            return false;
        }
        self.resolved = true;
        self.resolved_at = Some(now.max(self.occurred_at));
        self.resolved_by = Some(resolved_by.to_string());
        self.resolution_notes = Some(notes.to_string());
        true
    }
}

/// 错误日志检索条件，未设置的字段不参与过滤
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorLogCriteria {
    pub category: Option<ErrorCategory>,
    pub stage: Option<String>,
    pub severity: Option<ErrorSeverity>,
    pub resolved: Option<bool>,
    pub student_id: Option<String>,
}

impl ErrorLogCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: ErrorCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn resolved(mut self, resolved: bool) -> Self {
        self.resolved = Some(resolved);
        self
    }

    pub fn student_id(mut self, student_id: impl Into<String>) -> Self {
        self.student_id = Some(student_id.into());
        self
    }

    pub fn matches(&self, entry: &ErrorLogEntry) -> bool {
        self.category.map_or(true, |c| c == entry.error_category)
            && self.stage.as_deref().map_or(true, |s| s == entry.error_stage)
            && self.severity.map_or(true, |s| s == entry.severity)
            && self.resolved.map_or(true, |r| r == entry.resolved)
            && self
                .student_id
                .as_deref()
                .map_or(true, |id| id == entry.student_id)
    }
}
