use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use registration_aggregator::{ProfileAggregator, RegistrationPipeline, SimulatedSubsystemClient};
use registration_core::traits::{
    Clock, ErrorLogRepository, FailedUnitRepository, MessageQueue, ProfileRepository, SystemClock,
};
use registration_core::AppConfig;
use registration_infrastructure::{
    InMemoryErrorLogRepository, InMemoryFailedUnitRepository, InMemoryMessageQueue,
    InMemoryProfileRepository, MetricsCollector,
};
use registration_recovery::{
    ErrorLogService, RegistrationRetryService, RegistrationStatusService, RetryService,
    RetrySweepScheduler,
};
use registration_worker::{RegistrationConsumer, RegistrationIntake};
use tokio::sync::broadcast;
use tracing::info;

use crate::shutdown::ShutdownManager;

/// 后台循环在关闭信号后的最长退出时间
const LOOP_SHUTDOWN_GRACE: Duration = Duration::from_secs(35);

/// 主应用程序
///
/// 组装内存存储、模拟子系统、聚合管道、重试服务、提交入口与队列消费者。
pub struct Application {
    config: AppConfig,
    intake: Arc<RegistrationIntake>,
    consumer: Arc<RegistrationConsumer>,
    retry_service: Arc<RegistrationRetryService>,
    error_log: Arc<ErrorLogService>,
    status_service: Arc<RegistrationStatusService>,
    sweep_scheduler: Arc<RetrySweepScheduler>,
}

impl Application {
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;
        info!(
            "初始化应用程序: 聚合超时 {}s，重试退避 {:?}s，最大自动重试 {} 次",
            config.aggregator.timeout_seconds,
            config.retry.backoff_delays_seconds,
            config.retry.max_attempts
        );

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let metrics = Arc::new(MetricsCollector::new());

        let message_queue: Arc<dyn MessageQueue> = Arc::new(InMemoryMessageQueue::new());
        let profiles: Arc<dyn ProfileRepository> = Arc::new(InMemoryProfileRepository::new());
        let failed_units: Arc<dyn FailedUnitRepository> =
            Arc::new(InMemoryFailedUnitRepository::new());
        let error_logs: Arc<dyn ErrorLogRepository> = Arc::new(InMemoryErrorLogRepository::new());
        let error_log = Arc::new(ErrorLogService::new(error_logs, clock.clone()));

        let clients = SimulatedSubsystemClient::all(&config.simulation, clock.clone());
        let aggregator = Arc::new(
            ProfileAggregator::new(clients, clock.clone(), Some(config.aggregator.clone()))
                .with_metrics(metrics.clone()),
        );
        let pipeline = Arc::new(RegistrationPipeline::new(aggregator, profiles.clone()));

        let retry_service = Arc::new(
            RegistrationRetryService::new(
                failed_units.clone(),
                pipeline.clone(),
                clock.clone(),
                Some(config.retry.clone()),
            )
            .with_metrics(metrics.clone())
            .with_error_log(error_log.clone()),
        );
        let retry_handle: Arc<dyn RetryService> = retry_service.clone();

        let intake = Arc::new(RegistrationIntake::new(
            message_queue.clone(),
            retry_handle.clone(),
            clock,
            config.queue.registration_queue.clone(),
        ));
        let consumer = Arc::new(
            RegistrationConsumer::new(
                message_queue,
                pipeline,
                retry_handle.clone(),
                config.queue.registration_queue.clone(),
                Some(config.worker.clone()),
            )
            .with_metrics(metrics),
        );
        let sweep_scheduler = Arc::new(RetrySweepScheduler::new(
            retry_handle,
            config.retry.sweep_interval(),
        ));
        let status_service = Arc::new(RegistrationStatusService::new(profiles, failed_units));

        Ok(Self {
            config,
            intake,
            consumer,
            retry_service,
            error_log,
            status_service,
            sweep_scheduler,
        })
    }

    pub fn intake(&self) -> Arc<RegistrationIntake> {
        Arc::clone(&self.intake)
    }

    pub fn retry_service(&self) -> Arc<RegistrationRetryService> {
        Arc::clone(&self.retry_service)
    }

    pub fn error_log(&self) -> Arc<ErrorLogService> {
        Arc::clone(&self.error_log)
    }

    pub fn status_service(&self) -> Arc<RegistrationStatusService> {
        Arc::clone(&self.status_service)
    }

    /// 运行后台循环直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let mut handles = Vec::new();

        if self.config.worker.enabled {
            let consumer = Arc::clone(&self.consumer);
            let rx = shutdown_rx.resubscribe();
            handles.push((
                "注册队列消费者",
                tokio::spawn(async move { consumer.run(rx).await }),
            ));
        } else {
            info!("队列消费者已在配置中禁用");
        }

        if self.config.retry.enabled {
            let scheduler = Arc::clone(&self.sweep_scheduler);
            let rx = shutdown_rx.resubscribe();
            handles.push((
                "重试扫描器",
                tokio::spawn(async move { scheduler.run(rx).await }),
            ));
        } else {
            info!("自动重试已在配置中禁用");
        }

        let _ = shutdown_rx.recv().await;
        info!("应用程序收到关闭信号，等待后台循环退出");

        let total = handles.len();
        let stopped = ShutdownManager::drain(handles, LOOP_SHUTDOWN_GRACE).await;
        info!("后台循环已停止 {}/{}", stopped, total);

        let stats = self.retry_service.statistics().await?;
        info!(
            "失败单元统计: 共 {}，已解决 {}，未解决 {}，死信 {}",
            stats.total, stats.resolved, stats.unresolved, stats.in_dead_letter_queue
        );
        let error_stats = self.error_log.statistics().await?;
        info!(
            "错误日志统计: 共 {}，未解决 {}",
            error_stats.total, error_stats.unresolved
        );
        Ok(())
    }
}
