//! Test doubles for the trait seams
//!
//! Scripted collaborators record how they were called so tests can assert on
//! idempotency keys, attempt numbers and cancellation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use registration_core::models::{
    AggregatedProfile, ErrorCategory, FailedUnit, RegistrationMessage, RegistrationRequest,
    RetryStatus, Subsystem, SubsystemResponse,
};
use registration_core::traits::{
    FailedUnitRepository, InvocationContext, MessageQueue, ProfileRepository, Reprocessor,
    SubsystemClient,
};
use registration_core::{RegistrationError, RegistrationResult};
use uuid::Uuid;

use crate::builders::sample_response;

/// Behaviour of a scripted subsystem client
#[derive(Debug, Clone)]
pub enum ClientBehaviour {
    /// Respond immediately with a sample response
    Succeed,
    /// Respond after the given delay
    Delayed(Duration),
    /// Fail with `SubsystemUnavailable`
    Fail(String),
    /// Never settle until cancelled
    Hang,
    /// Respond with a variant belonging to another subsystem
    WrongVariant,
    /// Panic inside the call
    Panic,
    /// Respond with the right variant for a different student
    OtherStudent(String),
}

/// Subsystem client driven by a fixed behaviour
pub struct ScriptedSubsystemClient {
    subsystem: Subsystem,
    behaviour: ClientBehaviour,
    invocations: Arc<Mutex<Vec<InvocationContext>>>,
}

impl ScriptedSubsystemClient {
    pub fn new(subsystem: Subsystem, behaviour: ClientBehaviour) -> Self {
        Self {
            subsystem,
            behaviour,
            invocations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn succeed(subsystem: Subsystem) -> Self {
        Self::new(subsystem, ClientBehaviour::Succeed)
    }

    pub fn delayed(subsystem: Subsystem, delay: Duration) -> Self {
        Self::new(subsystem, ClientBehaviour::Delayed(delay))
    }

    pub fn fail(subsystem: Subsystem, message: &str) -> Self {
        Self::new(subsystem, ClientBehaviour::Fail(message.to_string()))
    }

    pub fn hang(subsystem: Subsystem) -> Self {
        Self::new(subsystem, ClientBehaviour::Hang)
    }

    pub fn invocations(&self) -> Vec<InvocationContext> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }
}

#[async_trait]
impl SubsystemClient for ScriptedSubsystemClient {
    fn subsystem(&self) -> Subsystem {
        self.subsystem
    }

    async fn invoke(
        &self,
        request: &RegistrationRequest,
        ctx: &InvocationContext,
    ) -> RegistrationResult<SubsystemResponse> {
        self.invocations.lock().unwrap().push(ctx.clone());

        match &self.behaviour {
            ClientBehaviour::Succeed => Ok(sample_response(self.subsystem, &request.student_id)),
            ClientBehaviour::Delayed(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(sample_response(self.subsystem, &request.student_id))
            }
            ClientBehaviour::Fail(message) => Err(RegistrationError::subsystem_unavailable(
                self.subsystem,
                message.clone(),
            )),
            ClientBehaviour::Hang => {
                ctx.cancellation.cancelled().await;
                Err(RegistrationError::Timeout(format!(
                    "{} call cancelled",
                    self.subsystem
                )))
            }
            ClientBehaviour::WrongVariant => {
                let other = if self.subsystem == Subsystem::Library {
                    Subsystem::Academic
                } else {
                    Subsystem::Library
                };
                Ok(sample_response(other, &request.student_id))
            }
            ClientBehaviour::Panic => panic!("scripted panic in {}", self.subsystem),
            ClientBehaviour::OtherStudent(student_id) => {
                Ok(sample_response(self.subsystem, student_id))
            }
        }
    }
}

/// Scripted reprocessing outcome
#[derive(Debug, Clone)]
pub enum ReprocessOutcome {
    Succeed,
    Fail,
    Error(String),
}

/// Reprocessor returning queued outcomes, then a default
pub struct ScriptedReprocessor {
    outcomes: Mutex<VecDeque<ReprocessOutcome>>,
    default_outcome: ReprocessOutcome,
    delay: Option<Duration>,
    calls: Mutex<Vec<(String, u32)>>,
}

impl ScriptedReprocessor {
    pub fn new(default_outcome: ReprocessOutcome) -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            default_outcome,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always_succeed() -> Self {
        Self::new(ReprocessOutcome::Succeed)
    }

    pub fn always_fail() -> Self {
        Self::new(ReprocessOutcome::Fail)
    }

    pub fn with_outcomes(self, outcomes: Vec<ReprocessOutcome>) -> Self {
        *self.outcomes.lock().unwrap() = outcomes.into();
        self
    }

    /// Hold each call for the given time before resolving
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// (student id, attempt) for every call in order
    pub fn calls(&self) -> Vec<(String, u32)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Reprocessor for ScriptedReprocessor {
    async fn reprocess(
        &self,
        request: &RegistrationRequest,
        attempt: u32,
    ) -> RegistrationResult<bool> {
        self.calls
            .lock()
            .unwrap()
            .push((request.student_id.clone(), attempt));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_outcome.clone());

        match outcome {
            ReprocessOutcome::Succeed => Ok(true),
            ReprocessOutcome::Fail => Ok(false),
            ReprocessOutcome::Error(message) => Err(RegistrationError::Aggregation(message)),
        }
    }
}

/// Message queue that rejects every operation
#[derive(Debug, Clone, Default)]
pub struct FailingMessageQueue;

#[async_trait]
impl MessageQueue for FailingMessageQueue {
    async fn publish_message(
        &self,
        queue: &str,
        _message: &RegistrationMessage,
    ) -> RegistrationResult<()> {
        Err(RegistrationError::queue(format!(
            "broker connection refused for {queue}"
        )))
    }

    async fn consume_messages(&self, queue: &str) -> RegistrationResult<Vec<RegistrationMessage>> {
        Err(RegistrationError::queue(format!(
            "broker connection refused for {queue}"
        )))
    }

    async fn get_queue_size(&self, queue: &str) -> RegistrationResult<u32> {
        Err(RegistrationError::queue(format!(
            "broker connection refused for {queue}"
        )))
    }
}

/// Failed unit repository whose storage is unavailable
#[derive(Debug, Clone, Default)]
pub struct FailingFailedUnitRepository;

fn storage_down<T>() -> RegistrationResult<T> {
    Err(RegistrationError::repository("database connection lost"))
}

#[async_trait]
impl FailedUnitRepository for FailingFailedUnitRepository {
    async fn save(&self, _unit: &FailedUnit) -> RegistrationResult<FailedUnit> {
        storage_down()
    }

    async fn find_by_id(&self, _id: Uuid) -> RegistrationResult<Option<FailedUnit>> {
        storage_down()
    }

    async fn find_by_student_id(&self, _student_id: &str) -> RegistrationResult<Vec<FailedUnit>> {
        storage_down()
    }

    async fn find_by_status(&self, _status: RetryStatus) -> RegistrationResult<Vec<FailedUnit>> {
        storage_down()
    }

    async fn find_dead_letters(&self) -> RegistrationResult<Vec<FailedUnit>> {
        storage_down()
    }

    async fn find_by_category(
        &self,
        _category: ErrorCategory,
    ) -> RegistrationResult<Vec<FailedUnit>> {
        storage_down()
    }

    async fn find_due(&self, _now: DateTime<Utc>) -> RegistrationResult<Vec<FailedUnit>> {
        storage_down()
    }

    async fn find_unresolved(&self) -> RegistrationResult<Vec<FailedUnit>> {
        storage_down()
    }

    async fn find_all(&self) -> RegistrationResult<Vec<FailedUnit>> {
        storage_down()
    }

    async fn update_status_if(
        &self,
        _id: Uuid,
        _expected: RetryStatus,
        _new: RetryStatus,
    ) -> RegistrationResult<bool> {
        storage_down()
    }
}

/// Profile repository whose storage is unavailable
#[derive(Debug, Clone, Default)]
pub struct FailingProfileRepository;

#[async_trait]
impl ProfileRepository for FailingProfileRepository {
    async fn save(&self, _profile: &AggregatedProfile) -> RegistrationResult<AggregatedProfile> {
        storage_down()
    }

    async fn find_by_student_id(
        &self,
        _student_id: &str,
    ) -> RegistrationResult<Option<AggregatedProfile>> {
        storage_down()
    }

    async fn count(&self) -> RegistrationResult<usize> {
        storage_down()
    }
}

/// Takes one unit off a countdown, reporting whether the call should fail
fn take_failure(remaining: &AtomicUsize) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Failed unit repository that delegates to a real one but fails selected calls
///
/// Failures are armed per operation and consumed one call at a time, so a
/// test can break the write that follows a successful lock.
pub struct FlakyFailedUnitRepository {
    inner: Arc<dyn FailedUnitRepository>,
    failing_saves: AtomicUsize,
    failing_lookups: AtomicUsize,
}

impl FlakyFailedUnitRepository {
    pub fn new(inner: Arc<dyn FailedUnitRepository>) -> Self {
        Self {
            inner,
            failing_saves: AtomicUsize::new(0),
            failing_lookups: AtomicUsize::new(0),
        }
    }

    /// The next `count` calls to `save` fail
    pub fn fail_next_saves(&self, count: usize) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    /// The next `count` calls to `find_by_id` fail
    pub fn fail_next_lookups(&self, count: usize) {
        self.failing_lookups.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl FailedUnitRepository for FlakyFailedUnitRepository {
    async fn save(&self, unit: &FailedUnit) -> RegistrationResult<FailedUnit> {
        if take_failure(&self.failing_saves) {
            return storage_down();
        }
        self.inner.save(unit).await
    }

    async fn find_by_id(&self, id: Uuid) -> RegistrationResult<Option<FailedUnit>> {
        if take_failure(&self.failing_lookups) {
            return storage_down();
        }
        self.inner.find_by_id(id).await
    }

    async fn find_by_student_id(&self, student_id: &str) -> RegistrationResult<Vec<FailedUnit>> {
        self.inner.find_by_student_id(student_id).await
    }

    async fn find_by_status(&self, status: RetryStatus) -> RegistrationResult<Vec<FailedUnit>> {
        self.inner.find_by_status(status).await
    }

    async fn find_dead_letters(&self) -> RegistrationResult<Vec<FailedUnit>> {
        self.inner.find_dead_letters().await
    }

    async fn find_by_category(
        &self,
        category: ErrorCategory,
    ) -> RegistrationResult<Vec<FailedUnit>> {
        self.inner.find_by_category(category).await
    }

    async fn find_due(&self, now: DateTime<Utc>) -> RegistrationResult<Vec<FailedUnit>> {
        self.inner.find_due(now).await
    }

    async fn find_unresolved(&self) -> RegistrationResult<Vec<FailedUnit>> {
        self.inner.find_unresolved().await
    }

    async fn find_all(&self) -> RegistrationResult<Vec<FailedUnit>> {
        self.inner.find_all().await
    }

    async fn update_status_if(
        &self,
        id: Uuid,
        expected: RetryStatus,
        new: RetryStatus,
    ) -> RegistrationResult<bool> {
        self.inner.update_status_if(id, expected, new).await
    }
}

/// Message queue that delegates to a real one but can lose its depth reads
pub struct FlakyMessageQueue {
    inner: Arc<dyn MessageQueue>,
    size_unavailable: AtomicBool,
}

impl FlakyMessageQueue {
    pub fn new(inner: Arc<dyn MessageQueue>) -> Self {
        Self {
            inner,
            size_unavailable: AtomicBool::new(false),
        }
    }

    /// Make every `get_queue_size` call fail until switched back
    pub fn set_size_unavailable(&self, unavailable: bool) {
        self.size_unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageQueue for FlakyMessageQueue {
    async fn publish_message(
        &self,
        queue: &str,
        message: &RegistrationMessage,
    ) -> RegistrationResult<()> {
        self.inner.publish_message(queue, message).await
    }

    async fn consume_messages(&self, queue: &str) -> RegistrationResult<Vec<RegistrationMessage>> {
        self.inner.consume_messages(queue).await
    }

    async fn get_queue_size(&self, queue: &str) -> RegistrationResult<u32> {
        if self.size_unavailable.load(Ordering::SeqCst) {
            return Err(RegistrationError::queue(format!(
                "queue statistics unavailable for {queue}"
            )));
        }
        self.inner.get_queue_size(queue).await
    }
}
