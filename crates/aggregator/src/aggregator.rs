use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use registration_core::config::AggregatorConfig;
use registration_core::models::{
    AggregatedProfile, CompletionStatus, RegistrationRequest, RoutingPlan, Subsystem,
    SubsystemResponse,
};
use registration_core::traits::{Clock, InvocationContext, SubsystemClient};
use registration_core::RegistrationResult;
use registration_infrastructure::{MetricsCollector, StructuredLogger};
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// 学生档案聚合器
///
/// 对路由计划中的三个子系统并发发起调用，在全局截止时间内汇总结果。
/// 单个子系统的失败只会让对应槽位为空，不会中断其余调用；
/// 截止时间到达后，未完成的调用先收到取消信号，随后任务被中止。
pub struct ProfileAggregator {
    clients: HashMap<Subsystem, Arc<dyn SubsystemClient>>,
    timeout: Duration,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl ProfileAggregator {
    pub fn new(
        clients: Vec<Arc<dyn SubsystemClient>>,
        clock: Arc<dyn Clock>,
        config: Option<AggregatorConfig>,
    ) -> Self {
        let config = config.unwrap_or_default();
        let clients = clients
            .into_iter()
            .map(|client| (client.subsystem(), client))
            .collect();

        Self {
            clients,
            timeout: config.timeout(),
            clock,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 扇出调用并聚合，总是返回一个档案
    pub async fn aggregate(
        &self,
        plan: &RoutingPlan,
        request: &RegistrationRequest,
        attempt: u32,
    ) -> AggregatedProfile {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let cancellation = CancellationToken::new();
        let mut profile = AggregatedProfile::empty(request, self.clock.now());

        let mut tasks: JoinSet<(Subsystem, RegistrationResult<SubsystemResponse>)> =
            JoinSet::new();
        for subsystem in plan.subsystems_to_invoke() {
            let Some(client) = self.clients.get(&subsystem).cloned() else {
                warn!("未注册 {} 子系统客户端，视为无响应", subsystem);
                continue;
            };
            let request = request.clone();
            let ctx = InvocationContext::new(&request, attempt, cancellation.child_token());
            tasks.spawn(async move {
                let result = client.invoke(&request, &ctx).await;
                (subsystem, result)
            });
        }

        let timer = sleep_until(deadline);
        tokio::pin!(timer);
        let mut timed_out = false;

        loop {
            tokio::select! {
                biased;
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((subsystem, Ok(response)))) => {
                        if response.subsystem() != subsystem {
                            warn!(
                                "{} 子系统返回了 {} 类型的响应，已丢弃",
                                subsystem,
                                response.subsystem()
                            );
                        } else if response.student_id() != request.student_id {
                            warn!(
                                "{} 子系统返回了学生 {} 的响应，与请求学生 {} 不符，已丢弃",
                                subsystem,
                                response.student_id(),
                                request.student_id
                            );
                        } else {
                            debug!("学生 {} 收到 {} 响应", request.student_id, subsystem);
                            profile.absorb(response);
                        }
                    }
                    Some(Ok((subsystem, Err(e)))) => {
                        warn!("学生 {} 的 {} 调用失败: {}", request.student_id, subsystem, e);
                    }
                    Some(Err(e)) => {
                        error!("学生 {} 的子系统调用任务异常终止: {}", request.student_id, e);
                    }
                },
                _ = &mut timer => {
                    timed_out = true;
                    break;
                }
            }
        }

        if timed_out {
            warn!(
                "学生 {} 聚合超过 {:?}，放弃 {} 个未完成调用",
                request.student_id,
                self.timeout,
                tasks.len()
            );
            cancellation.cancel();
            tasks.abort_all();
        }

        profile.completion_status = if timed_out {
            CompletionStatus::Timeout
        } else {
            CompletionStatus::from_settled(profile.responses_received)
        };
        profile.aggregation_time_ms =
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        profile.aggregated_at = self.clock.now();

        if let Some(metrics) = &self.metrics {
            metrics.record_aggregation(profile.completion_status, profile.aggregation_time_ms);
        }
        StructuredLogger::log_aggregation_completed(&profile, attempt);

        profile
    }
}
