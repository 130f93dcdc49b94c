use std::sync::Arc;

use futures::stream::{self, StreamExt};
use registration_aggregator::RegistrationPipeline;
use registration_core::config::WorkerConfig;
use registration_core::models::{
    stages, AggregatedProfile, CompletionStatus, ErrorCategory, RegistrationMessage,
};
use registration_core::traits::MessageQueue;
use registration_core::{RegistrationError, RegistrationResult};
use registration_infrastructure::MetricsCollector;
use registration_recovery::RetryService;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// 单次轮询的处理结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub consumed: usize,
    pub completed: usize,
    /// 已交给重试流程
    pub captured: usize,
    pub capture_failures: usize,
}

enum MessageOutcome {
    Completed,
    Captured,
    CaptureFailed,
}

/// 注册队列消费者
pub struct RegistrationConsumer {
    message_queue: Arc<dyn MessageQueue>,
    pipeline: Arc<RegistrationPipeline>,
    retry_service: Arc<dyn RetryService>,
    queue_name: String,
    config: WorkerConfig,
    metrics: Option<Arc<MetricsCollector>>,
}

impl RegistrationConsumer {
    pub fn new(
        message_queue: Arc<dyn MessageQueue>,
        pipeline: Arc<RegistrationPipeline>,
        retry_service: Arc<dyn RetryService>,
        queue_name: impl Into<String>,
        config: Option<WorkerConfig>,
    ) -> Self {
        Self {
            message_queue,
            pipeline,
            retry_service,
            queue_name: queue_name.into(),
            config: config.unwrap_or_default(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// 取出队列中当前全部消息并处理
    pub async fn poll_once(&self) -> RegistrationResult<PollReport> {
        let messages = self.message_queue.consume_messages(&self.queue_name).await?;
        if let Some(metrics) = &self.metrics {
            match self.message_queue.get_queue_size(&self.queue_name).await {
                Ok(depth) => metrics.update_queue_depth(f64::from(depth)),
                Err(e) => warn!(
                    "读取队列 {} 深度失败，继续处理已取出的消息: {}",
                    self.queue_name, e
                ),
            }
        }

        let mut report = PollReport {
            consumed: messages.len(),
            ..PollReport::default()
        };
        if messages.is_empty() {
            return Ok(report);
        }
        debug!("从 {} 取出 {} 条注册消息", self.queue_name, messages.len());

        let outcomes: Vec<MessageOutcome> = stream::iter(messages)
            .map(|message| self.handle(message))
            .buffer_unordered(self.config.max_concurrent_messages.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                MessageOutcome::Completed => report.completed += 1,
                MessageOutcome::Captured => report.captured += 1,
                MessageOutcome::CaptureFailed => report.capture_failures += 1,
            }
        }
        Ok(report)
    }

    /// 按轮询间隔持续消费直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "注册消费者启动: 队列 {}，轮询间隔 {:?}",
            self.queue_name,
            self.config.poll_interval()
        );
        let mut ticker = interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        error!("轮询注册队列失败: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("注册消费者收到关闭信号");
                    break;
                }
            }
        }
    }

    async fn handle(&self, message: RegistrationMessage) -> MessageOutcome {
        let request = &message.request;
        let captured = match self
            .pipeline
            .process_routed(&message.routing, request, 0)
            .await
        {
            Ok(profile) if profile.is_complete() => return MessageOutcome::Completed,
            Ok(profile) => {
                warn!(
                    "学生 {} 的档案未完整 ({})，交给重试流程",
                    request.student_id, profile.completion_status
                );
                self.retry_service
                    .capture(
                        request,
                        stages::AGGREGATION,
                        incomplete_category(&profile),
                        &incomplete_reason(&profile),
                    )
                    .await
            }
            Err(e) => {
                warn!("学生 {} 的注册处理失败: {}", request.student_id, e);
                let stage = match e {
                    RegistrationError::Repository(_) => stages::PROFILE_STORAGE,
                    _ => stages::AGGREGATION,
                };
                self.retry_service.capture_error(request, stage, &e).await
            }
        };

        match captured {
            Ok(_) => MessageOutcome::Captured,
            Err(e) => {
                error!("学生 {} 的失败单元未能保存: {}", request.student_id, e);
                MessageOutcome::CaptureFailed
            }
        }
    }
}

fn incomplete_category(profile: &AggregatedProfile) -> ErrorCategory {
    match profile.completion_status {
        CompletionStatus::Timeout => ErrorCategory::NetworkTimeout,
        _ => ErrorCategory::AggregationError,
    }
}

fn incomplete_reason(profile: &AggregatedProfile) -> String {
    format!(
        "聚合未完成: {} ({}/{} 个子系统响应)",
        profile.completion_status, profile.responses_received, profile.responses_expected
    )
}
