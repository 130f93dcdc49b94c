use std::sync::Arc;

use chrono::{DateTime, Utc};
use registration_core::models::{
    CompletionStatus, ErrorCategory, FailedUnit, RetryHistoryEntry, RetryStatus,
};
use registration_core::traits::{FailedUnitRepository, ProfileRepository};
use registration_core::RegistrationResult;
use serde::Serialize;

/// 学生可见的注册状态
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationStatusView {
    pub student_id: String,
    /// 是否已有聚合档案
    pub registered: bool,
    pub completion_status: Option<CompletionStatus>,
    pub has_error: bool,
    pub retry_status: Option<RetryStatus>,
    pub retry_attempts: Option<u32>,
    pub max_attempts: Option<u32>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub error_category: Option<ErrorCategory>,
    pub in_dead_letter_queue: bool,
    pub retry_history: Vec<RetryHistoryEntry>,
    pub user_message: String,
}

/// 注册状态查询
///
/// 档案与最近一次失败单元合并为一个视图，每种重试状态对应一条不同的提示。
pub struct RegistrationStatusService {
    profiles: Arc<dyn ProfileRepository>,
    failed_units: Arc<dyn FailedUnitRepository>,
}

impl RegistrationStatusService {
    pub fn new(
        profiles: Arc<dyn ProfileRepository>,
        failed_units: Arc<dyn FailedUnitRepository>,
    ) -> Self {
        Self {
            profiles,
            failed_units,
        }
    }

    pub async fn status(&self, student_id: &str) -> RegistrationResult<RegistrationStatusView> {
        let profile = self.profiles.find_by_student_id(student_id).await?;
        let latest = self
            .failed_units
            .find_by_student_id(student_id)
            .await?
            .into_iter()
            .next();

        let completion_status = profile.as_ref().map(|p| p.completion_status);
        let user_message = match (&latest, completion_status) {
            (Some(unit), _) => user_message(unit),
            (None, Some(CompletionStatus::Complete)) => "注册已完成，学生档案已生成。".to_string(),
            (None, Some(status)) => format!("注册正在处理中 (档案状态: {status})。"),
            (None, None) => "未找到该学号的注册记录。".to_string(),
        };

        Ok(RegistrationStatusView {
            student_id: student_id.to_string(),
            registered: profile.is_some(),
            completion_status,
            has_error: latest.is_some(),
            retry_status: latest.as_ref().map(|u| u.status),
            retry_attempts: latest.as_ref().map(|u| u.retry_attempts),
            max_attempts: latest.as_ref().map(|u| u.max_attempts),
            next_retry_at: latest.as_ref().and_then(|u| u.next_retry_at),
            failed_at: latest.as_ref().map(|u| u.failed_at),
            error_category: latest.as_ref().map(|u| u.error_category),
            in_dead_letter_queue: latest.as_ref().is_some_and(|u| u.in_dead_letter_queue),
            retry_history: latest.map(|u| u.retry_history).unwrap_or_default(),
            user_message,
        })
    }
}

/// 每种重试状态对应的提示
pub fn user_message(unit: &FailedUnit) -> String {
    match unit.status {
        RetryStatus::PendingRetry => {
            let next = unit
                .next_retry_at
                .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "待定".to_string());
            format!(
                "注册暂时失败，系统正在自动重试 (第 {}/{} 次)，下次重试时间: {}",
                unit.retry_attempts + 1,
                unit.max_attempts,
                next
            )
        }
        RetryStatus::Retrying => "系统正在重新处理您的注册，请稍后查看。".to_string(),
        RetryStatus::RetrySuccess => "您的注册已在自动重试后处理成功。".to_string(),
        RetryStatus::MovedToDlq => "注册多次重试失败，已转入人工处理队列。".to_string(),
        RetryStatus::AwaitingManualRetry => {
            "注册多次重试失败，工作人员已收到通知并将人工处理，请稍后查看或联系支持。".to_string()
        }
        RetryStatus::ManualRetrySuccess => "您的注册已由工作人员处理成功。".to_string(),
        RetryStatus::Failed => "注册处理失败，请携带学号联系支持人员。".to_string(),
    }
}
