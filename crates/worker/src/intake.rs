use std::sync::Arc;

use registration_aggregator::ContentBasedRouter;
use registration_core::models::{stages, RegistrationMessage, RegistrationRequest, RoutingPlan, Subsystem};
use registration_core::traits::{Clock, MessageQueue};
use registration_core::RegistrationResult;
use registration_recovery::RetryService;
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    Submitted,
    Retrying,
}

/// 提交回执
///
/// 无论处理成功与否都会返回回执；失败时请求已交给重试流程。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub student_id: String,
    pub success: bool,
    pub status: SubmissionStatus,
    pub message: String,
    pub is_first_year: Option<bool>,
    pub routed_to: Vec<Subsystem>,
    pub routing_message: Option<String>,
    /// 失败时生成的失败单元
    pub failed_unit_id: Option<Uuid>,
}

/// 注册提交入口：校验、路由并发布到注册队列
pub struct RegistrationIntake {
    router: ContentBasedRouter,
    message_queue: Arc<dyn MessageQueue>,
    retry_service: Arc<dyn RetryService>,
    clock: Arc<dyn Clock>,
    queue_name: String,
}

impl RegistrationIntake {
    pub fn new(
        message_queue: Arc<dyn MessageQueue>,
        retry_service: Arc<dyn RetryService>,
        clock: Arc<dyn Clock>,
        queue_name: impl Into<String>,
    ) -> Self {
        Self {
            router: ContentBasedRouter::new(),
            message_queue,
            retry_service,
            clock,
            queue_name: queue_name.into(),
        }
    }

    #[instrument(skip(self, request), fields(student_id = %request.student_id))]
    pub async fn submit(&self, request: RegistrationRequest) -> SubmissionReceipt {
        match self.enqueue(&request).await {
            Ok(plan) => {
                info!(
                    "学生 {} 的注册已提交，路由至 {:?}",
                    request.student_id,
                    plan.subsystems_to_invoke()
                );
                SubmissionReceipt {
                    student_id: request.student_id,
                    success: true,
                    status: SubmissionStatus::Submitted,
                    message: "注册已提交，正在处理。".to_string(),
                    is_first_year: Some(plan.is_first_year),
                    routed_to: plan.subsystems_to_invoke(),
                    routing_message: Some(plan.routing_message()),
                    failed_unit_id: None,
                }
            }
            Err(e) => {
                warn!("学生 {} 的注册提交失败: {}", request.student_id, e);
                let failed_unit_id = match self
                    .retry_service
                    .capture_error(&request, stages::REGISTRATION_SUBMISSION, &e)
                    .await
                {
                    Ok(unit) => Some(unit.id),
                    Err(capture_error) => {
                        error!(
                            "学生 {} 的失败单元未能保存: {}",
                            request.student_id, capture_error
                        );
                        None
                    }
                };

                SubmissionReceipt {
                    student_id: request.student_id,
                    success: false,
                    status: SubmissionStatus::Retrying,
                    message: "注册暂时失败，系统正在自动重试，请稍后查看注册状态。".to_string(),
                    is_first_year: None,
                    routed_to: Vec::new(),
                    routing_message: None,
                    failed_unit_id,
                }
            }
        }
    }

    async fn enqueue(&self, request: &RegistrationRequest) -> RegistrationResult<RoutingPlan> {
        request.validate()?;
        let plan = self.router.route(request);
        let message = RegistrationMessage::new(request.clone(), plan.clone(), self.clock.now());
        self.message_queue
            .publish_message(&self.queue_name, &message)
            .await?;
        Ok(plan)
    }
}
