use std::sync::Arc;

use registration_aggregator::{ProfileAggregator, RegistrationPipeline, SimulatedSubsystemClient};
use registration_core::config::SimulationConfig;
use registration_core::models::{CompletionStatus, Subsystem};
use registration_core::traits::{ProfileRepository, Reprocessor, SubsystemClient, SystemClock};
use registration_core::RegistrationError;
use registration_infrastructure::InMemoryProfileRepository;
use registration_testing_utils::{
    FailingProfileRepository, ManualClock, RegistrationRequestBuilder, ScriptedSubsystemClient,
};

fn scripted_pipeline(
    clients: Vec<Arc<dyn SubsystemClient>>,
    profiles: Arc<dyn ProfileRepository>,
) -> RegistrationPipeline {
    let aggregator = ProfileAggregator::new(clients, Arc::new(ManualClock::fixed()), None);
    RegistrationPipeline::new(Arc::new(aggregator), profiles)
}

fn healthy_clients() -> Vec<Arc<dyn SubsystemClient>> {
    vec![
        Arc::new(ScriptedSubsystemClient::succeed(Subsystem::Academic)),
        Arc::new(ScriptedSubsystemClient::succeed(Subsystem::Housing)),
        Arc::new(ScriptedSubsystemClient::succeed(Subsystem::Billing)),
        Arc::new(ScriptedSubsystemClient::succeed(Subsystem::Library)),
    ]
}

fn clients_with_library_down() -> Vec<Arc<dyn SubsystemClient>> {
    vec![
        Arc::new(ScriptedSubsystemClient::succeed(Subsystem::Academic)),
        Arc::new(ScriptedSubsystemClient::succeed(Subsystem::Housing)),
        Arc::new(ScriptedSubsystemClient::succeed(Subsystem::Billing)),
        Arc::new(ScriptedSubsystemClient::fail(Subsystem::Library, "catalog offline")),
    ]
}

#[tokio::test(start_paused = true)]
async fn test_process_stores_profile() {
    let profiles = Arc::new(InMemoryProfileRepository::new());
    let pipeline = scripted_pipeline(healthy_clients(), profiles.clone());
    let request = RegistrationRequestBuilder::new().with_student_id("S400").build();

    let profile = pipeline.process(&request, 0).await.unwrap();

    assert_eq!(profile.completion_status, CompletionStatus::Complete);
    let stored = profiles.find_by_student_id("S400").await.unwrap().unwrap();
    assert_eq!(stored, profile);
}

#[tokio::test(start_paused = true)]
async fn test_reprocess_reports_completion() {
    let profiles = Arc::new(InMemoryProfileRepository::new());
    let request = RegistrationRequestBuilder::new().with_student_id("S401").build();

    let degraded = scripted_pipeline(clients_with_library_down(), profiles.clone());
    assert!(!degraded.reprocess(&request, 1).await.unwrap());
    let stored = profiles.find_by_student_id("S401").await.unwrap().unwrap();
    assert_eq!(stored.completion_status, CompletionStatus::Partial);

    let healthy = scripted_pipeline(healthy_clients(), profiles.clone());
    assert!(healthy.reprocess(&request, 2).await.unwrap());
    let stored = profiles.find_by_student_id("S401").await.unwrap().unwrap();
    assert_eq!(stored.completion_status, CompletionStatus::Complete);
    assert_eq!(profiles.count().await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_complete_profile_survives_degraded_replay() {
    let profiles = Arc::new(InMemoryProfileRepository::new());
    let request = RegistrationRequestBuilder::new().with_student_id("S402").build();

    let healthy = scripted_pipeline(healthy_clients(), profiles.clone());
    healthy.process(&request, 0).await.unwrap();

    let degraded = scripted_pipeline(clients_with_library_down(), profiles.clone());
    let replayed = degraded.process(&request, 1).await.unwrap();

    assert_eq!(replayed.completion_status, CompletionStatus::Complete);
    assert!(degraded.reprocess(&request, 2).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_reprocess_rejects_invalid_request() {
    let profiles = Arc::new(InMemoryProfileRepository::new());
    let pipeline = scripted_pipeline(healthy_clients(), profiles.clone());
    let request = RegistrationRequestBuilder::new().with_email("not-an-email").build();

    let result = pipeline.reprocess(&request, 1).await;

    assert!(matches!(result, Err(RegistrationError::Validation(_))));
    assert_eq!(profiles.count().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_profile_storage_failure_propagates() {
    let pipeline = scripted_pipeline(healthy_clients(), Arc::new(FailingProfileRepository));
    let request = RegistrationRequestBuilder::new().build();

    let result = pipeline.process(&request, 0).await;

    assert!(matches!(result, Err(RegistrationError::Repository(_))));
}

#[tokio::test(start_paused = true)]
async fn test_simulated_subsystems_are_idempotent_per_student() {
    let clock = Arc::new(SystemClock);
    let clients = SimulatedSubsystemClient::all(&SimulationConfig::default(), clock.clone());
    let aggregator = ProfileAggregator::new(clients, clock, None);
    let profiles = Arc::new(InMemoryProfileRepository::new());
    let pipeline = RegistrationPipeline::new(Arc::new(aggregator), profiles.clone());
    let request = RegistrationRequestBuilder::new()
        .with_student_id("S-403")
        .with_program("Computer Science")
        .first_year()
        .build();

    let first = pipeline.process(&request, 0).await.unwrap();
    let replay = pipeline.process(&request, 1).await.unwrap();

    assert_eq!(first.completion_status, CompletionStatus::Complete);
    let housing = first.housing.clone().unwrap();
    assert_eq!(housing.dormitory_building, "Tech Hall");
    assert_eq!(first.library.as_ref().unwrap().library_card_number, "LIB-S403");
    assert_eq!(first.academic.as_ref().unwrap().advisor_name, "Dr. Alan Turing");
    assert_eq!(replay.housing, Some(housing));
    assert_eq!(replay.academic, first.academic);
}
