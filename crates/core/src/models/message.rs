use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{RegistrationRequest, RoutingPlan};

/// 提交队列中的注册消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationMessage {
    pub id: String,
    pub request: RegistrationRequest,
    pub routing: RoutingPlan,
    pub timestamp: DateTime<Utc>,
    /// 同一学生的幂等键
    pub correlation_id: String,
}

impl RegistrationMessage {
    pub fn new(request: RegistrationRequest, routing: RoutingPlan, timestamp: DateTime<Utc>) -> Self {
        let correlation_id = request.student_id.clone();
        Self {
            id: Uuid::new_v4().to_string(),
            request,
            routing,
            timestamp,
            correlation_id,
        }
    }

    pub fn to_json(&self) -> crate::RegistrationResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(payload: &str) -> crate::RegistrationResult<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}
