//! 失败捕获、自动重试、死信队列与人工重试

pub mod error_classifier;
pub mod error_log_service;
pub mod reports;
pub mod retry_service;
pub mod status_service;
pub mod sweep_scheduler;

pub use error_classifier::ErrorClassifier;
pub use error_log_service::ErrorLogService;
pub use reports::{BulkRetryReport, ErrorLogStatistics, RetryStatistics, SweepReport};
pub use retry_service::{RegistrationRetryService, RetryService};
pub use status_service::{RegistrationStatusService, RegistrationStatusView};
pub use sweep_scheduler::RetrySweepScheduler;
