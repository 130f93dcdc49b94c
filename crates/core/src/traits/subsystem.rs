use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::models::{RegistrationRequest, Subsystem, SubsystemResponse};
use crate::RegistrationResult;

/// 单次子系统调用的上下文
#[derive(Debug, Clone)]
pub struct InvocationContext {
    /// 幂等键，固定为学号
    pub idempotency_key: String,
    /// 0 表示首次处理，大于0表示重试或人工重试
    pub attempt: u32,
    /// 聚合截止时间到达后被取消
    pub cancellation: CancellationToken,
}

impl InvocationContext {
    pub fn new(request: &RegistrationRequest, attempt: u32, cancellation: CancellationToken) -> Self {
        Self {
            idempotency_key: request.student_id.clone(),
            attempt,
            cancellation,
        }
    }

    pub fn is_retry(&self) -> bool {
        self.attempt > 0
    }
}

/// 下游子系统客户端
///
/// 调用不保证幂等；重复调用的去重由客户端依据 `idempotency_key` 负责。
#[async_trait]
pub trait SubsystemClient: Send + Sync {
    fn subsystem(&self) -> Subsystem;

    async fn invoke(
        &self,
        request: &RegistrationRequest,
        ctx: &InvocationContext,
    ) -> RegistrationResult<SubsystemResponse>;
}
