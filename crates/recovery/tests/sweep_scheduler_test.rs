use std::sync::Arc;
use std::time::Duration;

use registration_core::models::RetryStatus;
use registration_core::traits::{Clock, FailedUnitRepository};
use registration_infrastructure::InMemoryFailedUnitRepository;
use registration_recovery::{RegistrationRetryService, RetrySweepScheduler};
use registration_testing_utils::{FailedUnitBuilder, ManualClock, ScriptedReprocessor, TestEnv};
use tokio::sync::broadcast;

#[tokio::test]
async fn test_scheduler_sweeps_until_shutdown() {
    let repo = Arc::new(InMemoryFailedUnitRepository::new());
    let clock = Arc::new(ManualClock::fixed());
    let reprocessor = Arc::new(ScriptedReprocessor::always_succeed());
    let service = Arc::new(RegistrationRetryService::new(
        repo.clone(),
        reprocessor.clone(),
        clock.clone(),
        None,
    ));
    let unit = FailedUnitBuilder::new()
        .failed_at(clock.now())
        .due_now()
        .build();
    repo.save(&unit).await.unwrap();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let scheduler = RetrySweepScheduler::new(service, Duration::from_millis(50));
    let handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    let resolved = TestEnv::wait_for(
        || {
            let repo = repo.clone();
            async move {
                repo.find_by_id(unit.id)
                    .await
                    .unwrap()
                    .is_some_and(|u| u.status == RetryStatus::RetrySuccess)
            }
        },
        Duration::from_secs(2),
    )
    .await;
    assert!(resolved);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("scheduler should stop on shutdown")
        .unwrap();
    assert_eq!(reprocessor.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_stops_when_idle() {
    let service = Arc::new(RegistrationRetryService::new(
        Arc::new(InMemoryFailedUnitRepository::new()),
        Arc::new(ScriptedReprocessor::always_succeed()),
        Arc::new(ManualClock::fixed()),
        None,
    ));
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let scheduler = RetrySweepScheduler::new(service, Duration::from_secs(5));
    let handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    tokio::time::sleep(Duration::from_secs(12)).await;
    shutdown_tx.send(()).unwrap();

    assert!(handle.await.is_ok());
}
