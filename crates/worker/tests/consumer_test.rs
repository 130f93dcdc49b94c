use std::sync::Arc;
use std::time::Duration;

use registration_aggregator::{ContentBasedRouter, ProfileAggregator, RegistrationPipeline};
use registration_core::config::WorkerConfig;
use registration_core::models::{
    stages, CompletionStatus, ErrorCategory, RegistrationMessage, RegistrationRequest, Subsystem,
};
use registration_core::traits::{
    Clock, FailedUnitRepository, MessageQueue, ProfileRepository, SubsystemClient,
};
use registration_infrastructure::{
    InMemoryFailedUnitRepository, InMemoryMessageQueue, InMemoryProfileRepository,
    MetricsCollector,
};
use registration_recovery::RegistrationRetryService;
use registration_testing_utils::{
    FailingMessageQueue, FailingProfileRepository, FlakyMessageQueue, ManualClock,
    RegistrationRequestBuilder, ScriptedReprocessor, ScriptedSubsystemClient, TestEnv,
};
use registration_worker::{PollReport, RegistrationConsumer};
use tokio::sync::broadcast;

const QUEUE: &str = "student.registration.queue";

struct Harness {
    queue: Arc<InMemoryMessageQueue>,
    profiles: Arc<dyn ProfileRepository>,
    failed_units: Arc<InMemoryFailedUnitRepository>,
    consumer: Arc<RegistrationConsumer>,
}

impl Harness {
    fn new(clients: Vec<Arc<dyn SubsystemClient>>) -> Self {
        Self::with_profiles(clients, Arc::new(InMemoryProfileRepository::new()))
    }

    fn with_profiles(
        clients: Vec<Arc<dyn SubsystemClient>>,
        profiles: Arc<dyn ProfileRepository>,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::fixed());
        let queue = Arc::new(InMemoryMessageQueue::new());
        let failed_units = Arc::new(InMemoryFailedUnitRepository::new());
        let aggregator = Arc::new(ProfileAggregator::new(clients, clock.clone(), None));
        let pipeline = Arc::new(RegistrationPipeline::new(aggregator, profiles.clone()));
        let retry_service = Arc::new(RegistrationRetryService::new(
            failed_units.clone(),
            Arc::new(ScriptedReprocessor::always_succeed()),
            clock,
            None,
        ));
        let consumer = Arc::new(RegistrationConsumer::new(
            queue.clone(),
            pipeline,
            retry_service,
            QUEUE,
            Some(WorkerConfig {
                poll_interval_ms: 10,
                ..WorkerConfig::default()
            }),
        ));
        Self {
            queue,
            profiles,
            failed_units,
            consumer,
        }
    }

    async fn publish(&self, request: RegistrationRequest) {
        let plan = ContentBasedRouter::new().route(&request);
        let message = RegistrationMessage::new(request, plan, ManualClock::fixed().now());
        self.queue.publish_message(QUEUE, &message).await.unwrap();
    }
}

fn healthy_clients() -> Vec<Arc<dyn SubsystemClient>> {
    vec![
        Arc::new(ScriptedSubsystemClient::succeed(Subsystem::Academic)),
        Arc::new(ScriptedSubsystemClient::succeed(Subsystem::Housing)),
        Arc::new(ScriptedSubsystemClient::succeed(Subsystem::Billing)),
        Arc::new(ScriptedSubsystemClient::succeed(Subsystem::Library)),
    ]
}

#[tokio::test(start_paused = true)]
async fn test_poll_empty_queue() {
    let harness = Harness::new(healthy_clients());

    let report = harness.consumer.poll_once().await.unwrap();

    assert_eq!(report, PollReport::default());
}

#[tokio::test(start_paused = true)]
async fn test_poll_completes_registrations() {
    let harness = Harness::new(healthy_clients());
    harness
        .publish(RegistrationRequestBuilder::new().with_student_id("S600").first_year().build())
        .await;
    harness
        .publish(RegistrationRequestBuilder::new().with_student_id("S601").returning().build())
        .await;

    let report = harness.consumer.poll_once().await.unwrap();

    assert_eq!(report.consumed, 2);
    assert_eq!(report.completed, 2);
    assert_eq!(report.captured, 0);
    for student_id in ["S600", "S601"] {
        let profile = harness
            .profiles
            .find_by_student_id(student_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.completion_status, CompletionStatus::Complete);
    }
    assert!(harness.failed_units.find_all().await.unwrap().is_empty());
    assert_eq!(harness.queue.get_queue_size(QUEUE).await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_partial_profile_is_captured_for_retry() {
    let harness = Harness::new(vec![
        Arc::new(ScriptedSubsystemClient::succeed(Subsystem::Academic)),
        Arc::new(ScriptedSubsystemClient::succeed(Subsystem::Housing)),
        Arc::new(ScriptedSubsystemClient::fail(Subsystem::Library, "catalog offline")),
    ]);
    harness
        .publish(RegistrationRequestBuilder::new().with_student_id("S602").first_year().build())
        .await;

    let report = harness.consumer.poll_once().await.unwrap();

    assert_eq!(report.completed, 0);
    assert_eq!(report.captured, 1);
    let units = harness.failed_units.find_by_student_id("S602").await.unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].failure_stage, stages::AGGREGATION);
    assert_eq!(units[0].error_category, ErrorCategory::AggregationError);
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_profile_is_captured_as_network_timeout() {
    let harness = Harness::new(vec![
        Arc::new(ScriptedSubsystemClient::hang(Subsystem::Academic)),
        Arc::new(ScriptedSubsystemClient::succeed(Subsystem::Billing)),
        Arc::new(ScriptedSubsystemClient::succeed(Subsystem::Library)),
    ]);
    harness
        .publish(RegistrationRequestBuilder::new().with_student_id("S603").returning().build())
        .await;

    let report = harness.consumer.poll_once().await.unwrap();

    assert_eq!(report.captured, 1);
    let profile = harness
        .profiles
        .find_by_student_id("S603")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(profile.completion_status, CompletionStatus::Timeout);
    let units = harness.failed_units.find_by_student_id("S603").await.unwrap();
    assert_eq!(units[0].error_category, ErrorCategory::NetworkTimeout);
}

#[tokio::test(start_paused = true)]
async fn test_storage_failure_is_captured_at_profile_storage() {
    let harness = Harness::with_profiles(healthy_clients(), Arc::new(FailingProfileRepository));
    harness
        .publish(RegistrationRequestBuilder::new().with_student_id("S604").build())
        .await;

    let report = harness.consumer.poll_once().await.unwrap();

    assert_eq!(report.captured, 1);
    let units = harness.failed_units.find_by_student_id("S604").await.unwrap();
    assert_eq!(units[0].failure_stage, stages::PROFILE_STORAGE);
    assert_eq!(units[0].error_category, ErrorCategory::DatabaseError);
}

#[tokio::test(start_paused = true)]
async fn test_poll_surfaces_queue_failure() {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::fixed());
    let aggregator = Arc::new(ProfileAggregator::new(healthy_clients(), clock.clone(), None));
    let pipeline = Arc::new(RegistrationPipeline::new(
        aggregator,
        Arc::new(InMemoryProfileRepository::new()),
    ));
    let retry_service = Arc::new(RegistrationRetryService::new(
        Arc::new(InMemoryFailedUnitRepository::new()),
        Arc::new(ScriptedReprocessor::always_succeed()),
        clock,
        None,
    ));
    let consumer = RegistrationConsumer::new(
        Arc::new(FailingMessageQueue),
        pipeline,
        retry_service,
        QUEUE,
        None,
    );

    assert!(consumer.poll_once().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_depth_read_failure_does_not_drop_consumed_messages() {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::fixed());
    let inner = Arc::new(InMemoryMessageQueue::new());
    let queue = Arc::new(FlakyMessageQueue::new(inner.clone()));
    queue.set_size_unavailable(true);
    let profiles = Arc::new(InMemoryProfileRepository::new());
    let failed_units = Arc::new(InMemoryFailedUnitRepository::new());
    let aggregator = Arc::new(ProfileAggregator::new(healthy_clients(), clock.clone(), None));
    let pipeline = Arc::new(RegistrationPipeline::new(aggregator, profiles.clone()));
    let retry_service = Arc::new(RegistrationRetryService::new(
        failed_units.clone(),
        Arc::new(ScriptedReprocessor::always_succeed()),
        clock.clone(),
        None,
    ));
    let consumer = RegistrationConsumer::new(queue.clone(), pipeline, retry_service, QUEUE, None)
        .with_metrics(Arc::new(MetricsCollector::new()));

    let request = RegistrationRequestBuilder::new()
        .with_student_id("S640")
        .returning()
        .build();
    let plan = ContentBasedRouter::new().route(&request);
    queue
        .publish_message(QUEUE, &RegistrationMessage::new(request, plan, clock.now()))
        .await
        .unwrap();

    let report = consumer.poll_once().await.unwrap();

    assert_eq!(report.consumed, 1);
    assert_eq!(report.completed, 1);
    let profile = profiles.find_by_student_id("S640").await.unwrap().unwrap();
    assert_eq!(profile.completion_status, CompletionStatus::Complete);
    assert!(failed_units.find_all().await.unwrap().is_empty());
    assert_eq!(inner.get_queue_size(QUEUE).await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_run_consumes_until_shutdown() {
    let harness = Harness::new(healthy_clients());
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let consumer = harness.consumer.clone();
    let handle = tokio::spawn(async move { consumer.run(shutdown_rx).await });

    harness
        .publish(RegistrationRequestBuilder::new().with_student_id("S605").build())
        .await;

    let profiles = harness.profiles.clone();
    let stored = TestEnv::wait_for(
        || {
            let profiles = profiles.clone();
            async move {
                profiles
                    .find_by_student_id("S605")
                    .await
                    .unwrap()
                    .is_some()
            }
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(stored);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("consumer should stop")
        .unwrap();
}
