use async_trait::async_trait;

use crate::{models::RegistrationMessage, RegistrationResult};

/// 消息队列抽象接口
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// 发布消息到指定队列
    async fn publish_message(
        &self,
        queue: &str,
        message: &RegistrationMessage,
    ) -> RegistrationResult<()>;

    /// 取出指定队列中当前的全部消息
    async fn consume_messages(&self, queue: &str) -> RegistrationResult<Vec<RegistrationMessage>>;

    /// 获取队列中的消息数量
    async fn get_queue_size(&self, queue: &str) -> RegistrationResult<u32>;
}
