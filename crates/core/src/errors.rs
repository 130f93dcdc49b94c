use thiserror::Error;
use uuid::Uuid;

use crate::models::{RetryStatus, Subsystem};

/// 注册系统错误类型定义
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("仓储错误: {0}")]
    Repository(String),

    #[error("失败记录未找到: {id}")]
    UnitNotFound { id: Uuid },

    #[error("非法状态转换: 失败记录 {id} 处于 {from} 状态，无法执行 {action}")]
    InvalidTransition {
        id: Uuid,
        from: RetryStatus,
        action: String,
    },

    #[error("失败记录 {id} 正在被其他流程处理")]
    UnitLocked { id: Uuid },

    #[error("数据验证失败: {0}")]
    Validation(String),

    #[error("子系统 {subsystem} 不可用: {message}")]
    SubsystemUnavailable { subsystem: Subsystem, message: String },

    #[error("操作超时: {0}")]
    Timeout(String),

    #[error("消息队列错误: {0}")]
    MessageQueue(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("路由错误: {0}")]
    Routing(String),

    #[error("格式转换错误: {0}")]
    Translation(String),

    #[error("聚合错误: {0}")]
    Aggregation(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type RegistrationResult<T> = Result<T, RegistrationError>;

impl RegistrationError {
    pub fn repository<S: Into<String>>(msg: S) -> Self {
        Self::Repository(msg.into())
    }

    pub fn unit_not_found(id: Uuid) -> Self {
        Self::UnitNotFound { id }
    }

    pub fn invalid_transition<S: Into<String>>(id: Uuid, from: RetryStatus, action: S) -> Self {
        Self::InvalidTransition {
            id,
            from,
            action: action.into(),
        }
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn subsystem_unavailable<S: Into<String>>(subsystem: Subsystem, msg: S) -> Self {
        Self::SubsystemUnavailable {
            subsystem,
            message: msg.into(),
        }
    }

    pub fn queue<S: Into<String>>(msg: S) -> Self {
        Self::MessageQueue(msg.into())
    }

    /// 是否属于瞬时基础设施故障（系统宕机、超时、队列）
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RegistrationError::SubsystemUnavailable { .. }
                | RegistrationError::Timeout(_)
                | RegistrationError::MessageQueue(_)
        )
    }
}

impl From<serde_json::Error> for RegistrationError {
    fn from(err: serde_json::Error) -> Self {
        RegistrationError::Serialization(err.to_string())
    }
}
