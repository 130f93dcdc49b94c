use async_trait::async_trait;

use crate::{models::RegistrationRequest, RegistrationResult};

/// 重处理一个已捕获的注册请求
///
/// `Ok(true)` 表示本次处理完整成功；`Ok(false)` 与 `Err` 都按失败计入重试。
/// `attempt` 从1开始，实现方应将学号作为幂等键向下游传递。
#[async_trait]
pub trait Reprocessor: Send + Sync {
    async fn reprocess(&self, request: &RegistrationRequest, attempt: u32)
        -> RegistrationResult<bool>;
}
