use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use registration_core::{
    models::RegistrationMessage, traits::MessageQueue, RegistrationError, RegistrationResult,
};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// 内存消息队列实现
///
/// 使用 Tokio channels 实现，适用于单进程部署场景。
#[derive(Debug)]
pub struct InMemoryMessageQueue {
    /// 队列名 -> 通道
    queues: Arc<RwLock<HashMap<String, QueueChannels>>>,
    config: InMemoryQueueConfig,
}

#[derive(Debug)]
struct QueueChannels {
    sender: mpsc::UnboundedSender<RegistrationMessage>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<RegistrationMessage>>>,
    size: Arc<AtomicU32>,
}

#[derive(Debug, Clone)]
pub struct InMemoryQueueConfig {
    /// 队列最大容量（0表示无限制）
    pub max_queue_size: usize,
}

impl Default for InMemoryQueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 10000,
        }
    }
}

impl Default for InMemoryMessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMessageQueue {
    pub fn new() -> Self {
        Self::with_config(InMemoryQueueConfig::default())
    }

    pub fn with_config(config: InMemoryQueueConfig) -> Self {
        info!("Creating in-memory message queue with config: {:?}", config);
        Self {
            queues: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// 获取或创建队列，返回发送端与计数器
    async fn sender_for(
        &self,
        queue_name: &str,
    ) -> (mpsc::UnboundedSender<RegistrationMessage>, Arc<AtomicU32>) {
        {
            let queues = self.queues.read().await;
            if let Some(channels) = queues.get(queue_name) {
                return (channels.sender.clone(), channels.size.clone());
            }
        }

        let mut queues = self.queues.write().await;
        let channels = queues.entry(queue_name.to_string()).or_insert_with(|| {
            debug!("Creating new queue: {}", queue_name);
            let (sender, receiver) = mpsc::unbounded_channel();
            QueueChannels {
                sender,
                receiver: Arc::new(Mutex::new(receiver)),
                size: Arc::new(AtomicU32::new(0)),
            }
        });
        (channels.sender.clone(), channels.size.clone())
    }
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn publish_message(
        &self,
        queue: &str,
        message: &RegistrationMessage,
    ) -> RegistrationResult<()> {
        let (sender, size) = self.sender_for(queue).await;

        if self.config.max_queue_size > 0
            && size.load(Ordering::Relaxed) as usize >= self.config.max_queue_size
        {
            warn!("Queue '{}' is full, message {} rejected", queue, message.id);
            return Err(RegistrationError::queue(format!(
                "Queue '{queue}' reached capacity {}",
                self.config.max_queue_size
            )));
        }

        sender.send(message.clone()).map_err(|e| {
            error!("Failed to send message to queue '{}': {}", queue, e);
            RegistrationError::queue(format!("Failed to send message to queue '{queue}': {e}"))
        })?;
        size.fetch_add(1, Ordering::Relaxed);

        debug!("Published message {} to queue '{}'", message.id, queue);
        Ok(())
    }

    async fn consume_messages(&self, queue: &str) -> RegistrationResult<Vec<RegistrationMessage>> {
        let (receiver, size) = {
            let queues = self.queues.read().await;
            match queues.get(queue) {
                Some(channels) => (channels.receiver.clone(), channels.size.clone()),
                None => return Ok(Vec::new()),
            }
        };

        let mut messages = Vec::new();
        {
            let mut rx = receiver.lock().await;
            while let Ok(message) = rx.try_recv() {
                messages.push(message);
            }
        }

        if !messages.is_empty() {
            size.fetch_sub(messages.len() as u32, Ordering::Relaxed);
            debug!("Consumed {} messages from queue '{}'", messages.len(), queue);
        }
        Ok(messages)
    }

    async fn get_queue_size(&self, queue: &str) -> RegistrationResult<u32> {
        let queues = self.queues.read().await;
        Ok(queues
            .get(queue)
            .map(|channels| channels.size.load(Ordering::Relaxed))
            .unwrap_or(0))
    }
}
