use registration_core::models::{AggregatedProfile, FailedUnit};
use tracing::{error, info, warn};

/// 以事件名为键的结构化日志
pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_failure_captured(unit: &FailedUnit) {
        warn!(
            event = "failure_captured",
            unit.id = %unit.id,
            student.id = %unit.request.student_id,
            failure.stage = %unit.failure_stage,
            failure.category = %unit.error_category,
            failure.message = %unit.error_message,
            next_retry_at = ?unit.next_retry_at,
            "Failure captured for automatic retry"
        );
    }

    pub fn log_capture_failed(student_id: &str, stage: &str, reason: &str) {
        error!(
            event = "capture_failed",
            student.id = student_id,
            failure.stage = stage,
            error = reason,
            "Unable to persist failure unit"
        );
    }

    pub fn log_retry_attempted(unit: &FailedUnit, succeeded: bool) {
        if succeeded {
            info!(
                event = "retry_attempted",
                unit.id = %unit.id,
                student.id = %unit.request.student_id,
                retry.attempt = unit.retry_attempts + 1,
                retry.success = true,
                "Automatic retry succeeded"
            );
        } else {
            warn!(
                event = "retry_attempted",
                unit.id = %unit.id,
                student.id = %unit.request.student_id,
                retry.attempt = unit.retry_attempts,
                retry.max_attempts = unit.max_attempts,
                retry.success = false,
                next_retry_at = ?unit.next_retry_at,
                "Automatic retry failed"
            );
        }
    }

    pub fn log_moved_to_dlq(unit: &FailedUnit) {
        error!(
            event = "moved_to_dlq",
            unit.id = %unit.id,
            student.id = %unit.request.student_id,
            retry.attempts = unit.retry_attempts,
            failure.category = %unit.error_category,
            "Retries exhausted, unit awaiting manual retry"
        );
    }

    pub fn log_manual_retry(unit: &FailedUnit, operator: &str, succeeded: bool) {
        info!(
            event = "manual_retry",
            unit.id = %unit.id,
            student.id = %unit.request.student_id,
            operator = operator,
            retry.success = succeeded,
            unit.status = %unit.status,
            "Manual retry resolved"
        );
    }

    pub fn log_aggregation_completed(profile: &AggregatedProfile, attempt: u32) {
        info!(
            event = "aggregation_completed",
            student.id = %profile.student_id,
            aggregation.status = %profile.completion_status,
            aggregation.responses = profile.responses_received,
            aggregation.expected = profile.responses_expected,
            aggregation.duration_ms = profile.aggregation_time_ms,
            attempt = attempt,
            "Profile aggregation completed"
        );
    }
}
