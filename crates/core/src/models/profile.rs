use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{RegistrationRequest, Subsystem};

/// 聚合档案期望的响应数：学籍、住宿或计费、图书馆
pub const RESPONSES_EXPECTED: u8 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicRecord {
    pub student_id: String,
    pub student_name: String,
    pub program: String,
    pub enrollment_status: String,
    pub academic_level: Option<String>,
    pub gpa: f64,
    pub advisor_name: String,
    pub enrolled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HousingAssignment {
    pub student_id: String,
    pub room_assignment: String,
    pub dormitory_building: String,
    pub room_type: String,
    pub move_in_date: NaiveDate,
    pub floor_number: String,
    pub roommate_name: String,
    pub housing_status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingAccount {
    pub student_id: String,
    pub tuition_fee: f64,
    pub miscellaneous_fees: f64,
    pub total_fee_amount: f64,
    pub payment_deadline: NaiveDate,
    pub account_status: String,
    pub amount_paid: f64,
    pub balance_remaining: f64,
    pub payment_plan: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryAccount {
    pub student_id: String,
    pub library_card_number: String,
    pub account_status: String,
    pub expiration_date: NaiveDate,
    pub max_books_allowed: u32,
    pub current_books_checked_out: u32,
    pub available_services: Vec<String>,
    pub outstanding_fines: f64,
    pub access_level: String,
}

/// 子系统响应，每个子系统一个变体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "subsystem", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubsystemResponse {
    Academic(AcademicRecord),
    Housing(HousingAssignment),
    Billing(BillingAccount),
    Library(LibraryAccount),
}

impl SubsystemResponse {
    pub fn subsystem(&self) -> Subsystem {
        match self {
            SubsystemResponse::Academic(_) => Subsystem::Academic,
            SubsystemResponse::Housing(_) => Subsystem::Housing,
            SubsystemResponse::Billing(_) => Subsystem::Billing,
            SubsystemResponse::Library(_) => Subsystem::Library,
        }
    }

    pub fn student_id(&self) -> &str {
        match self {
            SubsystemResponse::Academic(r) => &r.student_id,
            SubsystemResponse::Housing(r) => &r.student_id,
            SubsystemResponse::Billing(r) => &r.student_id,
            SubsystemResponse::Library(r) => &r.student_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletionStatus {
    Complete,
    Partial,
    Timeout,
    Failed,
}

impl CompletionStatus {
    /// 全部调用在截止时间前结束时，根据成功数决定状态
    pub fn from_settled(responses_received: u8) -> Self {
        match responses_received {
            n if n >= RESPONSES_EXPECTED => CompletionStatus::Complete,
            0 => CompletionStatus::Failed,
            _ => CompletionStatus::Partial,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionStatus::Complete => "COMPLETE",
            CompletionStatus::Partial => "PARTIAL",
            CompletionStatus::Timeout => "TIMEOUT",
            CompletionStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 学生聚合档案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedProfile {
    pub student_id: String,
    pub student_name: String,
    pub email: String,
    pub program: String,
    pub year_level: Option<String>,
    pub academic: Option<AcademicRecord>,
    pub housing: Option<HousingAssignment>,
    pub billing: Option<BillingAccount>,
    pub library: Option<LibraryAccount>,
    pub responses_received: u8,
    pub responses_expected: u8,
    pub completion_status: CompletionStatus,
    pub aggregation_time_ms: u64,
    pub aggregated_at: DateTime<Utc>,
}

impl AggregatedProfile {
    /// 以请求字段初始化一个空档案
    pub fn empty(request: &RegistrationRequest, aggregated_at: DateTime<Utc>) -> Self {
        Self {
            student_id: request.student_id.clone(),
            student_name: request.student_name.clone(),
            email: request.email.clone(),
            program: request.program.clone(),
            year_level: request.year_level.clone(),
            academic: None,
            housing: None,
            billing: None,
            library: None,
            responses_received: 0,
            responses_expected: RESPONSES_EXPECTED,
            completion_status: CompletionStatus::Failed,
            aggregation_time_ms: 0,
            aggregated_at,
        }
    }

    /// 合并一个子系统响应并重新计数
    pub fn absorb(&mut self, response: SubsystemResponse) {
        match response {
            SubsystemResponse::Academic(r) => self.academic = Some(r),
            SubsystemResponse::Housing(r) => self.housing = Some(r),
            SubsystemResponse::Billing(r) => self.billing = Some(r),
            SubsystemResponse::Library(r) => self.library = Some(r),
        }
        self.responses_received = self.count_responses();
    }

    /// 住宿与计费共用一个槽位，计数永远不超过3
    pub fn count_responses(&self) -> u8 {
        let academic = u8::from(self.academic.is_some());
        let placement = u8::from(self.housing.is_some() || self.billing.is_some());
        let library = u8::from(self.library.is_some());
        academic + placement + library
    }

    pub fn is_complete(&self) -> bool {
        self.completion_status == CompletionStatus::Complete
    }

    pub fn completion_percentage(&self) -> f64 {
        f64::from(self.responses_received) * 100.0 / f64::from(self.responses_expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RegistrationRequest {
        RegistrationRequest::new("S1", "Bob", "bob@rsu.edu", "Nursing", Some("2".into()))
    }

    fn library() -> LibraryAccount {
        LibraryAccount {
            student_id: "S1".into(),
            library_card_number: "LIB-S1".into(),
            account_status: "ACTIVE".into(),
            expiration_date: NaiveDate::from_ymd_opt(2027, 1, 1).unwrap(),
            max_books_allowed: 7,
            current_books_checked_out: 0,
            available_services: vec!["Book Borrowing".into()],
            outstanding_fines: 0.0,
            access_level: "UNDERGRADUATE".into(),
        }
    }

    #[test]
    fn test_from_settled() {
        assert_eq!(CompletionStatus::from_settled(3), CompletionStatus::Complete);
        assert_eq!(CompletionStatus::from_settled(2), CompletionStatus::Partial);
        assert_eq!(CompletionStatus::from_settled(1), CompletionStatus::Partial);
        assert_eq!(CompletionStatus::from_settled(0), CompletionStatus::Failed);
    }

    #[test]
    fn test_absorb_counts_each_slot_once() {
        let mut profile = AggregatedProfile::empty(&request(), Utc::now());
        profile.absorb(SubsystemResponse::Library(library()));
        profile.absorb(SubsystemResponse::Library(library()));
        assert_eq!(profile.responses_received, 1);
        assert_eq!(profile.responses_expected, 3);
        assert!((profile.completion_percentage() - 33.333).abs() < 0.01);
    }

    #[test]
    fn test_completion_status_serializes_upper_case() {
        let json = serde_json::to_string(&CompletionStatus::Timeout).unwrap();
        assert_eq!(json, "\"TIMEOUT\"");
    }
}
