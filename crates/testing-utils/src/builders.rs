//! Test data builders
//!
//! Builders come with sensible defaults so each test only spells out the
//! fields it cares about.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use registration_core::models::{
    stages, AcademicRecord, BillingAccount, ErrorCategory, FailedUnit, HousingAssignment,
    LibraryAccount, RegistrationRequest, RetryPolicy, RetryStatus, Subsystem, SubsystemResponse,
};

/// Builder for RegistrationRequest values
pub struct RegistrationRequestBuilder {
    request: RegistrationRequest,
}

impl RegistrationRequestBuilder {
    pub fn new() -> Self {
        Self {
            request: RegistrationRequest {
                student_id: "S001".to_string(),
                student_name: "Test Student".to_string(),
                email: "student@rsu.edu".to_string(),
                program: "Computer Science".to_string(),
                year_level: Some("1".to_string()),
            },
        }
    }

    pub fn with_student_id(mut self, student_id: &str) -> Self {
        self.request.student_id = student_id.to_string();
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.request.student_name = name.to_string();
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.request.email = email.to_string();
        self
    }

    pub fn with_program(mut self, program: &str) -> Self {
        self.request.program = program.to_string();
        self
    }

    pub fn with_year_level(mut self, year_level: &str) -> Self {
        self.request.year_level = Some(year_level.to_string());
        self
    }

    pub fn without_year_level(mut self) -> Self {
        self.request.year_level = None;
        self
    }

    pub fn first_year(self) -> Self {
        self.with_year_level("1")
    }

    pub fn returning(self) -> Self {
        self.with_year_level("3")
    }

    pub fn build(self) -> RegistrationRequest {
        self.request
    }
}

impl Default for RegistrationRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for FailedUnit entities, starting from a fresh capture
pub struct FailedUnitBuilder {
    request: RegistrationRequest,
    stage: String,
    category: ErrorCategory,
    error_message: String,
    failed_at: DateTime<Utc>,
    policy: RetryPolicy,
    status: Option<RetryStatus>,
    retry_attempts: Option<u32>,
    next_retry_at: Option<Option<DateTime<Utc>>>,
    due_now: bool,
}

impl FailedUnitBuilder {
    pub fn new() -> Self {
        Self {
            request: RegistrationRequestBuilder::new().build(),
            stage: stages::REGISTRATION_SUBMISSION.to_string(),
            category: ErrorCategory::Unknown,
            error_message: "test failure".to_string(),
            failed_at: Utc::now(),
            policy: RetryPolicy::default(),
            status: None,
            retry_attempts: None,
            next_retry_at: None,
            due_now: false,
        }
    }

    pub fn with_request(mut self, request: RegistrationRequest) -> Self {
        self.request = request;
        self
    }

    pub fn with_student_id(mut self, student_id: &str) -> Self {
        self.request.student_id = student_id.to_string();
        self
    }

    pub fn with_stage(mut self, stage: &str) -> Self {
        self.stage = stage.to_string();
        self
    }

    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    pub fn failed_at(mut self, failed_at: DateTime<Utc>) -> Self {
        self.failed_at = failed_at;
        self
    }

    pub fn with_status(mut self, status: RetryStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }

    /// Make the unit due immediately
    pub fn due_now(mut self) -> Self {
        self.due_now = true;
        self
    }

    /// Quarantined unit awaiting manual retry
    pub fn in_dead_letter_queue(mut self) -> Self {
        self.status = Some(RetryStatus::AwaitingManualRetry);
        self.retry_attempts = Some(self.policy.max_attempts);
        self.next_retry_at = Some(None);
        self
    }

    pub fn build(self) -> FailedUnit {
        let mut unit = FailedUnit::capture(
            self.request,
            self.stage,
            self.category,
            self.error_message,
            &self.policy,
            self.failed_at,
        );
        if let Some(status) = self.status {
            unit.status = status;
            if status.is_dead_letter() {
                unit.in_dead_letter_queue = true;
                unit.moved_to_dlq_at = Some(self.failed_at);
            }
        }
        if let Some(attempts) = self.retry_attempts {
            unit.retry_attempts = attempts;
        }
        if self.due_now {
            unit.next_retry_at = Some(self.failed_at - Duration::seconds(1));
        }
        if let Some(next_retry_at) = self.next_retry_at {
            unit.next_retry_at = next_retry_at;
        }
        unit
    }
}

impl Default for FailedUnitBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Well-formed response for the given subsystem
pub fn sample_response(subsystem: Subsystem, student_id: &str) -> SubsystemResponse {
    let date = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap_or_default();
    match subsystem {
        Subsystem::Academic => SubsystemResponse::Academic(AcademicRecord {
            student_id: student_id.to_string(),
            student_name: "Test Student".to_string(),
            program: "Computer Science".to_string(),
            enrollment_status: "ENROLLED".to_string(),
            academic_level: Some("1".to_string()),
            gpa: 3.5,
            advisor_name: "Dr. Alan Turing".to_string(),
            enrolled_at: Utc::now(),
        }),
        Subsystem::Housing => SubsystemResponse::Housing(HousingAssignment {
            student_id: student_id.to_string(),
            room_assignment: "305".to_string(),
            dormitory_building: "Tech Hall".to_string(),
            room_type: "Double Occupancy".to_string(),
            move_in_date: date,
            floor_number: "3".to_string(),
            roommate_name: "Alex Smith".to_string(),
            housing_status: "ASSIGNED".to_string(),
        }),
        Subsystem::Billing => SubsystemResponse::Billing(BillingAccount {
            student_id: student_id.to_string(),
            tuition_fee: 30000.0,
            miscellaneous_fees: 5000.0,
            total_fee_amount: 35000.0,
            payment_deadline: date,
            account_status: "ACTIVE".to_string(),
            amount_paid: 0.0,
            balance_remaining: 35000.0,
            payment_plan: "Full Payment or Installment Available".to_string(),
        }),
        Subsystem::Library => SubsystemResponse::Library(LibraryAccount {
            student_id: student_id.to_string(),
            library_card_number: format!("LIB-{student_id}"),
            account_status: "ACTIVE".to_string(),
            expiration_date: date,
            max_books_allowed: 5,
            current_books_checked_out: 0,
            available_services: vec!["Book Borrowing".to_string()],
            outstanding_fines: 0.0,
            access_level: "UNDERGRADUATE".to_string(),
        }),
    }
}
