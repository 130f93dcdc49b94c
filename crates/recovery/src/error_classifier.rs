use registration_core::models::ErrorCategory;
use registration_core::RegistrationError;

/// 错误分类器
///
/// 先按错误变体判断，无法判断时再按错误信息中的关键字推断。
/// 分类结果只用于筛选与报表。
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn classify(error: &RegistrationError) -> ErrorCategory {
        match error {
            RegistrationError::SubsystemUnavailable { .. } => ErrorCategory::SystemDown,
            RegistrationError::Timeout(_) => ErrorCategory::NetworkTimeout,
            RegistrationError::Validation(_) => ErrorCategory::InvalidData,
            RegistrationError::Repository(_) => ErrorCategory::DatabaseError,
            RegistrationError::MessageQueue(_) => ErrorCategory::QueueError,
            RegistrationError::Serialization(_) | RegistrationError::Translation(_) => {
                ErrorCategory::TranslationError
            }
            RegistrationError::Routing(_) => ErrorCategory::RoutingError,
            RegistrationError::Aggregation(_) => ErrorCategory::AggregationError,
            other => Self::classify_message(&other.to_string()),
        }
    }

    pub fn classify_message(message: &str) -> ErrorCategory {
        let message = message.to_lowercase();
        let mentions = |keywords: &[&str]| keywords.iter().any(|k| message.contains(k));

        if mentions(&["timeout", "timed out", "超时"]) {
            ErrorCategory::NetworkTimeout
        } else if mentions(&["connection", "unavailable", "refused", "连接"]) {
            ErrorCategory::SystemDown
        } else if mentions(&["validation", "invalid", "验证"]) {
            ErrorCategory::InvalidData
        } else if mentions(&["database", "sql", "数据库"]) {
            ErrorCategory::DatabaseError
        } else if mentions(&["queue", "broker", "队列"]) {
            ErrorCategory::QueueError
        } else {
            ErrorCategory::Unknown
        }
    }
}
