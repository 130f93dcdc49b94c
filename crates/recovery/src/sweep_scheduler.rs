use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::retry_service::RetryService;

/// 按固定节拍触发重试扫描
pub struct RetrySweepScheduler {
    retry_service: Arc<dyn RetryService>,
    interval: Duration,
}

impl RetrySweepScheduler {
    pub fn new(retry_service: Arc<dyn RetryService>, interval: Duration) -> Self {
        Self {
            retry_service,
            interval,
        }
    }

    /// 循环扫描直到收到关闭信号
    ///
    /// 上一轮扫描未结束时不会开始下一轮，错过的节拍直接跳过。
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("重试扫描器启动，间隔 {:?}", self.interval);
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.retry_service.run_sweep().await {
                        Ok(report) if report.due > 0 => {
                            debug!("本轮扫描处理 {} 个单元", report.processed());
                        }
                        Ok(_) => {}
                        Err(e) => error!("重试扫描失败: {}", e),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("重试扫描器收到关闭信号");
                    break;
                }
            }
        }
    }
}
