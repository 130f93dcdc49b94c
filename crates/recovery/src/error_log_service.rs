use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use registration_core::models::{
    ErrorCategory, ErrorLogCriteria, ErrorLogEntry, ErrorSeverity, FailedUnit, RegistrationRequest,
};
use registration_core::traits::{Clock, ErrorLogRepository};
use registration_core::RegistrationResult;
use tracing::{debug, info};

use crate::reports::ErrorLogStatistics;

/// 最近错误的查询窗口
const RECENT_WINDOW_HOURS: i64 = 24;

/// 错误日志服务
///
/// 记录每次捕获的失败，在重处理成功后标记为已解决，并提供管理端查询。
pub struct ErrorLogService {
    repository: Arc<dyn ErrorLogRepository>,
    clock: Arc<dyn Clock>,
}

impl ErrorLogService {
    pub fn new(repository: Arc<dyn ErrorLogRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    pub async fn log_error(
        &self,
        request: &RegistrationRequest,
        stage: &str,
        category: ErrorCategory,
        severity: ErrorSeverity,
        message: &str,
    ) -> RegistrationResult<ErrorLogEntry> {
        let entry = ErrorLogEntry::new(
            request,
            stage,
            category,
            severity,
            message,
            self.clock.now(),
        );
        let saved = self.repository.save(&entry).await?;
        debug!(
            "记录错误日志: 学生 {} 阶段 {} 分类 {} 级别 {}",
            saved.student_id, saved.error_stage, saved.error_category, saved.severity
        );
        Ok(saved)
    }

    /// 为新捕获的失败单元记录一条日志
    pub async fn log_capture(&self, unit: &FailedUnit) -> RegistrationResult<ErrorLogEntry> {
        self.log_error(
            &unit.request,
            &unit.failure_stage,
            unit.error_category,
            ErrorSeverity::for_category(unit.error_category),
            &unit.error_message,
        )
        .await
    }

    /// 标记学生在某阶段的未解决日志为已解决
    pub async fn log_resolution(
        &self,
        student_id: &str,
        stage: Option<&str>,
        resolved_by: &str,
        notes: &str,
    ) -> RegistrationResult<usize> {
        let resolved = self
            .repository
            .mark_resolved(student_id, stage, resolved_by, notes, self.clock.now())
            .await?;
        if resolved > 0 {
            info!(
                "学生 {} 的 {} 条错误日志已由 {} 标记为已解决",
                student_id, resolved, resolved_by
            );
        }
        Ok(resolved)
    }

    /// 最近 24 小时内的错误
    pub async fn recent_errors(&self) -> RegistrationResult<Vec<ErrorLogEntry>> {
        let since = self.clock.now() - Duration::hours(RECENT_WINDOW_HOURS);
        self.repository.find_since(since).await
    }

    pub async fn errors_by_category(
        &self,
        category: ErrorCategory,
    ) -> RegistrationResult<Vec<ErrorLogEntry>> {
        self.search(&ErrorLogCriteria::new().category(category)).await
    }

    pub async fn errors_by_stage(&self, stage: &str) -> RegistrationResult<Vec<ErrorLogEntry>> {
        self.search(&ErrorLogCriteria::new().stage(stage)).await
    }

    pub async fn errors_for_student(
        &self,
        student_id: &str,
    ) -> RegistrationResult<Vec<ErrorLogEntry>> {
        self.search(&ErrorLogCriteria::new().student_id(student_id)).await
    }

    pub async fn unresolved_errors(&self) -> RegistrationResult<Vec<ErrorLogEntry>> {
        self.search(&ErrorLogCriteria::new().resolved(false)).await
    }

    pub async fn search(
        &self,
        criteria: &ErrorLogCriteria,
    ) -> RegistrationResult<Vec<ErrorLogEntry>> {
        self.repository.search(criteria).await
    }

    pub async fn error_count(&self, category: ErrorCategory) -> RegistrationResult<usize> {
        Ok(self.errors_by_category(category).await?.len())
    }

    pub async fn unresolved_count(&self) -> RegistrationResult<usize> {
        Ok(self.unresolved_errors().await?.len())
    }

    pub async fn statistics(&self) -> RegistrationResult<ErrorLogStatistics> {
        let entries = self.repository.find_all().await?;
        Ok(ErrorLogStatistics::from_entries(&entries))
    }

    /// 清理在 `before` 之前已解决的日志
    pub async fn purge_resolved_before(&self, before: DateTime<Utc>) -> RegistrationResult<usize> {
        let deleted = self.repository.delete_resolved_before(before).await?;
        info!("清理 {} 条已解决的错误日志", deleted);
        Ok(deleted)
    }
}
