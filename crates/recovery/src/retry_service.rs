use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use registration_core::config::RetryConfig;
use registration_core::models::{
    ErrorCategory, FailedUnit, RegistrationRequest, RetryEvent, RetryPolicy, RetryStatus,
    SYSTEM_RESOLVER,
};
use registration_core::traits::{Clock, FailedUnitRepository, Reprocessor};
use registration_core::{RegistrationError, RegistrationResult};
use registration_infrastructure::{MetricsCollector, StructuredLogger};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error_classifier::ErrorClassifier;
use crate::error_log_service::ErrorLogService;
use crate::reports::{BulkRetryReport, RetryStatistics, SweepReport};

/// 重试服务接口
#[async_trait]
pub trait RetryService: Send + Sync {
    /// 捕获一次失败，生成待重试单元
    async fn capture(
        &self,
        request: &RegistrationRequest,
        stage: &str,
        category: ErrorCategory,
        error_message: &str,
    ) -> RegistrationResult<FailedUnit>;

    /// 捕获一个错误，分类由错误本身推断
    async fn capture_error(
        &self,
        request: &RegistrationRequest,
        stage: &str,
        error: &RegistrationError,
    ) -> RegistrationResult<FailedUnit>;

    /// 扫描到期单元并重处理
    async fn run_sweep(&self) -> RegistrationResult<SweepReport>;

    /// 人工重试，返回重处理是否成功
    async fn manual_retry(
        &self,
        id: Uuid,
        operator: &str,
        notes: Option<String>,
    ) -> RegistrationResult<bool>;

    /// 对全部等待人工处理的单元执行人工重试
    async fn retry_all_dead_letters(
        &self,
        operator: &str,
        notes: Option<String>,
    ) -> RegistrationResult<BulkRetryReport>;
}

enum AttemptOutcome {
    Succeeded,
    Rescheduled,
    DeadLettered,
    Skipped,
}

/// 重试服务实现
///
/// 定时扫描与人工重试都先用条件更新把单元置为 RETRYING 取得独占权。
/// 持锁期间的任何错误都会把单元退回加锁前的状态，不会遗留 RETRYING。
pub struct RegistrationRetryService {
    repository: Arc<dyn FailedUnitRepository>,
    reprocessor: Arc<dyn Reprocessor>,
    clock: Arc<dyn Clock>,
    config: RetryConfig,
    policy: RetryPolicy,
    metrics: Option<Arc<MetricsCollector>>,
    error_log: Option<Arc<ErrorLogService>>,
}

impl RegistrationRetryService {
    pub fn new(
        repository: Arc<dyn FailedUnitRepository>,
        reprocessor: Arc<dyn Reprocessor>,
        clock: Arc<dyn Clock>,
        config: Option<RetryConfig>,
    ) -> Self {
        let config = config.unwrap_or_default();
        let policy = config.policy();
        Self {
            repository,
            reprocessor,
            clock,
            config,
            policy,
            metrics: None,
            error_log: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// 捕获时写错误日志，重处理成功后标记为已解决
    pub fn with_error_log(mut self, error_log: Arc<ErrorLogService>) -> Self {
        self.error_log = Some(error_log);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn find_unit(&self, id: Uuid) -> RegistrationResult<FailedUnit> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| RegistrationError::unit_not_found(id))
    }

    pub async fn units_for_student(&self, student_id: &str) -> RegistrationResult<Vec<FailedUnit>> {
        self.repository.find_by_student_id(student_id).await
    }

    pub async fn units_by_status(&self, status: RetryStatus) -> RegistrationResult<Vec<FailedUnit>> {
        self.repository.find_by_status(status).await
    }

    pub async fn units_by_category(
        &self,
        category: ErrorCategory,
    ) -> RegistrationResult<Vec<FailedUnit>> {
        self.repository.find_by_category(category).await
    }

    pub async fn dead_letters(&self) -> RegistrationResult<Vec<FailedUnit>> {
        self.repository.find_dead_letters().await
    }

    pub async fn unresolved(&self) -> RegistrationResult<Vec<FailedUnit>> {
        self.repository.find_unresolved().await
    }

    pub async fn statistics(&self) -> RegistrationResult<RetryStatistics> {
        let units = self.repository.find_all().await?;
        Ok(RetryStatistics::from_units(&units))
    }

    /// 对一个到期单元执行一次自动重试
    async fn attempt(&self, unit: FailedUnit) -> RegistrationResult<AttemptOutcome> {
        if unit.status.apply(RetryEvent::SweepLock).is_none() {
            return Ok(AttemptOutcome::Skipped);
        }
        let locked = self
            .repository
            .update_status_if(unit.id, RetryStatus::PendingRetry, RetryStatus::Retrying)
            .await?;
        if !locked {
            debug!("失败单元 {} 已被其他流程锁定，跳过", unit.id);
            return Ok(AttemptOutcome::Skipped);
        }

        match self.attempt_locked(unit.id).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.release_lock(unit.id, RetryStatus::PendingRetry).await;
                Err(e)
            }
        }
    }

    /// 持锁后的自动重处理，出错时由调用方释放锁
    async fn attempt_locked(&self, id: Uuid) -> RegistrationResult<AttemptOutcome> {
        let mut unit = self.find_unit(id).await?;
        let attempt = unit.retry_attempts + 1;
        debug!(
            "重处理学生 {} (单元 {}, 第 {} 次)",
            unit.request.student_id, unit.id, attempt
        );

        let result = self.reprocessor.reprocess(&unit.request, attempt).await;
        let now = self.clock.now();

        let outcome = match result {
            Ok(true) => {
                unit.record_retry_success(now)?;
                AttemptOutcome::Succeeded
            }
            Ok(false) => {
                unit.record_retry_failure("重处理未得到完整档案", &self.policy, now)?;
                self.failure_outcome(&unit)
            }
            Err(e) => {
                unit.record_retry_failure(format!("重处理失败: {e}"), &self.policy, now)?;
                self.failure_outcome(&unit)
            }
        };

        if matches!(outcome, AttemptOutcome::DeadLettered) {
            unit.mark_notified(now);
        }
        let unit = self.repository.save(&unit).await?;

        match outcome {
            AttemptOutcome::DeadLettered => {
                StructuredLogger::log_moved_to_dlq(&unit);
                if let Some(metrics) = &self.metrics {
                    metrics.record_retry(false);
                    metrics.record_dead_letter();
                }
            }
            _ => {
                let succeeded = matches!(outcome, AttemptOutcome::Succeeded);
                StructuredLogger::log_retry_attempted(&unit, succeeded);
                if let Some(metrics) = &self.metrics {
                    metrics.record_retry(succeeded);
                }
                if succeeded {
                    self.resolve_error_log(&unit, SYSTEM_RESOLVER, "自动重试成功")
                        .await;
                }
            }
        }
        Ok(outcome)
    }

    /// 持锁后的人工重处理，出错时由调用方释放锁
    async fn manual_retry_locked(
        &self,
        id: Uuid,
        operator: &str,
        notes: Option<String>,
    ) -> RegistrationResult<bool> {
        let mut unit = self.find_unit(id).await?;
        let attempt = unit.retry_attempts + 1;
        info!(
            "运维人员 {} 人工重试学生 {} (单元 {})",
            operator, unit.request.student_id, id
        );

        let (succeeded, detail) = match self.reprocessor.reprocess(&unit.request, attempt).await
        {
            Ok(true) => (true, "人工重试成功".to_string()),
            Ok(false) => (false, "人工重试未得到完整档案".to_string()),
            Err(e) => (false, format!("人工重试失败: {e}")),
        };

        unit.record_manual_outcome(succeeded, operator, notes, detail, self.clock.now())?;
        let unit = self.repository.save(&unit).await?;

        StructuredLogger::log_manual_retry(&unit, operator, succeeded);
        if let Some(metrics) = &self.metrics {
            metrics.record_manual_retry();
        }
        if succeeded {
            let notes = unit.admin_notes.as_deref().unwrap_or("人工重试成功");
            self.resolve_error_log(&unit, operator, notes).await;
        }
        Ok(succeeded)
    }

    /// 把仍处于 RETRYING 的单元退回 `restore`
    async fn release_lock(&self, id: Uuid, restore: RetryStatus) {
        match self
            .repository
            .update_status_if(id, RetryStatus::Retrying, restore)
            .await
        {
            Ok(true) => warn!("失败单元 {} 处理出错，已释放锁并恢复为 {}", id, restore),
            Ok(false) => debug!("失败单元 {} 已不在 RETRYING，无需释放锁", id),
            Err(e) => error!("失败单元 {} 释放锁失败，将保持 RETRYING: {}", id, e),
        }
    }

    async fn resolve_error_log(&self, unit: &FailedUnit, resolved_by: &str, notes: &str) {
        let Some(error_log) = &self.error_log else {
            return;
        };
        if let Err(e) = error_log
            .log_resolution(
                &unit.request.student_id,
                Some(&unit.failure_stage),
                resolved_by,
                notes,
            )
            .await
        {
            warn!(
                "学生 {} 的错误日志未能标记为已解决: {}",
                unit.request.student_id, e
            );
        }
    }

    fn failure_outcome(&self, unit: &FailedUnit) -> AttemptOutcome {
        if unit.status.is_dead_letter() {
            AttemptOutcome::DeadLettered
        } else {
            AttemptOutcome::Rescheduled
        }
    }
}

#[async_trait]
impl RetryService for RegistrationRetryService {
    async fn capture(
        &self,
        request: &RegistrationRequest,
        stage: &str,
        category: ErrorCategory,
        error_message: &str,
    ) -> RegistrationResult<FailedUnit> {
        let unit = FailedUnit::capture(
            request.clone(),
            stage,
            category,
            error_message,
            &self.policy,
            self.clock.now(),
        );

        let saved = match self.repository.save(&unit).await {
            Ok(saved) => saved,
            Err(e) => {
                StructuredLogger::log_capture_failed(&request.student_id, stage, &e.to_string());
                return Err(e);
            }
        };

        StructuredLogger::log_failure_captured(&saved);
        if let Some(metrics) = &self.metrics {
            metrics.record_failure_captured(category);
        }
        if let Some(error_log) = &self.error_log {
            if let Err(e) = error_log.log_capture(&saved).await {
                warn!("学生 {} 的错误日志未能写入: {}", request.student_id, e);
            }
        }
        Ok(saved)
    }

    async fn capture_error(
        &self,
        request: &RegistrationRequest,
        stage: &str,
        error: &RegistrationError,
    ) -> RegistrationResult<FailedUnit> {
        let category = ErrorClassifier::classify(error);
        self.capture(request, stage, category, &error.to_string())
            .await
    }

    #[instrument(skip(self))]
    async fn run_sweep(&self) -> RegistrationResult<SweepReport> {
        let started = Instant::now();
        let due = self.repository.find_due(self.clock.now()).await?;
        if due.is_empty() {
            return Ok(SweepReport::default());
        }

        info!("重试扫描: {} 个单元到期", due.len());
        let mut report = SweepReport {
            due: due.len(),
            ..SweepReport::default()
        };

        let outcomes: Vec<(Uuid, RegistrationResult<AttemptOutcome>)> = stream::iter(due)
            .map(|unit| async move {
                let id = unit.id;
                (id, self.attempt(unit).await)
            })
            .buffer_unordered(self.config.max_concurrent_retries.max(1))
            .collect()
            .await;

        for (id, outcome) in outcomes {
            match outcome {
                Ok(AttemptOutcome::Succeeded) => report.succeeded += 1,
                Ok(AttemptOutcome::Rescheduled) => report.rescheduled += 1,
                Ok(AttemptOutcome::DeadLettered) => report.moved_to_dlq += 1,
                Ok(AttemptOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    error!("失败单元 {} 重试出错: {}", id, e);
                    report.errors.push(format!("{id}: {e}"));
                }
            }
        }

        let elapsed = started.elapsed();
        report.sweep_duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        if let Some(metrics) = &self.metrics {
            metrics.record_sweep_duration(elapsed.as_secs_f64());
        }

        info!(
            "重试扫描完成: 成功 {}，重新排期 {}，进入死信 {}，跳过 {}，错误 {}",
            report.succeeded,
            report.rescheduled,
            report.moved_to_dlq,
            report.skipped,
            report.errors.len()
        );
        Ok(report)
    }

    #[instrument(skip(self, notes))]
    async fn manual_retry(
        &self,
        id: Uuid,
        operator: &str,
        notes: Option<String>,
    ) -> RegistrationResult<bool> {
        let unit = self.find_unit(id).await?;

        if unit.status.apply(RetryEvent::ManualLock).is_none() {
            if unit.status == RetryStatus::Retrying {
                return Err(RegistrationError::UnitLocked { id });
            }
            return Err(RegistrationError::invalid_transition(
                id,
                unit.status,
                "manual_retry",
            ));
        }

        let locked = self
            .repository
            .update_status_if(id, unit.status, RetryStatus::Retrying)
            .await?;
        if !locked {
            warn!("失败单元 {} 在人工重试加锁前状态已变化", id);
            return Err(RegistrationError::UnitLocked { id });
        }

        match self.manual_retry_locked(id, operator, notes).await {
            Ok(succeeded) => Ok(succeeded),
            Err(e) => {
                self.release_lock(id, unit.status).await;
                Err(e)
            }
        }
    }

    async fn retry_all_dead_letters(
        &self,
        operator: &str,
        notes: Option<String>,
    ) -> RegistrationResult<BulkRetryReport> {
        let units = self
            .repository
            .find_by_status(RetryStatus::AwaitingManualRetry)
            .await?;
        info!("运维人员 {} 批量重试 {} 个死信单元", operator, units.len());

        let mut report = BulkRetryReport::default();
        for unit in units {
            report.attempted += 1;
            match self.manual_retry(unit.id, operator, notes.clone()).await {
                Ok(true) => report.succeeded += 1,
                Ok(false) => report.failed += 1,
                Err(e) => {
                    warn!("死信单元 {} 批量重试被拒绝: {}", unit.id, e);
                    report.errors.push((unit.id, e.to_string()));
                }
            }
        }
        Ok(report)
    }
}
