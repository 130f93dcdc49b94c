use std::sync::Arc;

use registration_core::models::{HistoryOutcome, RetryStatus};
use registration_core::traits::{Clock, FailedUnitRepository};
use registration_core::RegistrationError;
use registration_infrastructure::InMemoryFailedUnitRepository;
use registration_recovery::{RegistrationRetryService, RetryService};
use registration_testing_utils::{
    FailedUnitBuilder, FlakyFailedUnitRepository, ManualClock, ScriptedReprocessor,
};

struct Harness {
    store: Arc<InMemoryFailedUnitRepository>,
    flaky: Arc<FlakyFailedUnitRepository>,
    reprocessor: Arc<ScriptedReprocessor>,
    clock: Arc<ManualClock>,
    service: RegistrationRetryService,
}

impl Harness {
    fn new(reprocessor: ScriptedReprocessor) -> Self {
        let store = Arc::new(InMemoryFailedUnitRepository::new());
        let flaky = Arc::new(FlakyFailedUnitRepository::new(store.clone()));
        let reprocessor = Arc::new(reprocessor);
        let clock = Arc::new(ManualClock::fixed());
        let service = RegistrationRetryService::new(
            flaky.clone(),
            reprocessor.clone(),
            clock.clone(),
            None,
        );
        Self {
            store,
            flaky,
            reprocessor,
            clock,
            service,
        }
    }

    async fn status_of(&self, unit_id: uuid::Uuid) -> RetryStatus {
        self.store.find_by_id(unit_id).await.unwrap().unwrap().status
    }
}

#[tokio::test]
async fn test_sweep_save_failure_returns_unit_to_pending() {
    let h = Harness::new(ScriptedReprocessor::always_succeed());
    let unit = FailedUnitBuilder::new()
        .with_student_id("S210")
        .failed_at(h.clock.now())
        .due_now()
        .build();
    h.store.save(&unit).await.unwrap();
    h.flaky.fail_next_saves(1);

    let report = h.service.run_sweep().await.unwrap();

    assert_eq!(report.due, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.processed(), 0);
    let stored = h.store.find_by_id(unit.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RetryStatus::PendingRetry);
    assert_eq!(stored.retry_attempts, 0);
    assert_eq!(stored.retry_history.len(), 1);

    let report = h.service.run_sweep().await.unwrap();

    assert_eq!(report.succeeded, 1);
    assert!(report.errors.is_empty());
    assert_eq!(h.status_of(unit.id).await, RetryStatus::RetrySuccess);
    assert_eq!(h.reprocessor.call_count(), 2);
}

#[tokio::test]
async fn test_sweep_lookup_failure_after_lock_releases_unit() {
    let h = Harness::new(ScriptedReprocessor::always_succeed());
    let unit = FailedUnitBuilder::new()
        .failed_at(h.clock.now())
        .due_now()
        .build();
    h.store.save(&unit).await.unwrap();
    h.flaky.fail_next_lookups(1);

    let report = h.service.run_sweep().await.unwrap();

    assert_eq!(report.errors.len(), 1);
    assert_eq!(h.status_of(unit.id).await, RetryStatus::PendingRetry);
    assert_eq!(h.reprocessor.call_count(), 0);
}

#[tokio::test]
async fn test_manual_retry_save_failure_restores_prior_status() {
    let h = Harness::new(ScriptedReprocessor::always_succeed());
    let unit = FailedUnitBuilder::new()
        .with_student_id("S310")
        .in_dead_letter_queue()
        .build();
    h.store.save(&unit).await.unwrap();
    h.flaky.fail_next_saves(1);

    let result = h.service.manual_retry(unit.id, "admin", None).await;

    assert!(matches!(result, Err(RegistrationError::Repository(_))));
    let stored = h.store.find_by_id(unit.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RetryStatus::AwaitingManualRetry);
    assert_eq!(stored.retry_history.len(), unit.retry_history.len());
    assert!(stored.retried_by.is_none());

    let succeeded = h.service.manual_retry(unit.id, "admin", None).await.unwrap();

    assert!(succeeded);
    let stored = h.store.find_by_id(unit.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RetryStatus::ManualRetrySuccess);
    assert_eq!(
        stored.retry_history.last().unwrap().outcome,
        HistoryOutcome::ManualSucceeded
    );
}

#[tokio::test]
async fn test_manual_retry_from_pending_restores_pending_on_failure() {
    let h = Harness::new(ScriptedReprocessor::always_fail());
    let unit = FailedUnitBuilder::new()
        .failed_at(h.clock.now())
        .due_now()
        .build();
    h.store.save(&unit).await.unwrap();
    h.flaky.fail_next_saves(1);

    assert!(h.service.manual_retry(unit.id, "ops", None).await.is_err());
    assert_eq!(h.status_of(unit.id).await, RetryStatus::PendingRetry);

    let report = h.service.run_sweep().await.unwrap();
    assert_eq!(report.rescheduled, 1);
}
