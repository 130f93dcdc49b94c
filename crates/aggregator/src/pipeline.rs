use std::sync::Arc;

use async_trait::async_trait;
use registration_core::models::{AggregatedProfile, RegistrationRequest, RoutingPlan};
use registration_core::traits::{ProfileRepository, Reprocessor};
use registration_core::RegistrationResult;
use tracing::{info, instrument};

use crate::aggregator::ProfileAggregator;
use crate::router::ContentBasedRouter;

/// 注册处理管道：路由 → 聚合 → 保存档案
///
/// 档案按学号覆盖写入；已完整的档案不会被之后不完整的结果覆盖，
/// 因此同一请求的重放在存储端是幂等的。
pub struct RegistrationPipeline {
    router: ContentBasedRouter,
    aggregator: Arc<ProfileAggregator>,
    profile_repository: Arc<dyn ProfileRepository>,
}

impl RegistrationPipeline {
    pub fn new(
        aggregator: Arc<ProfileAggregator>,
        profile_repository: Arc<dyn ProfileRepository>,
    ) -> Self {
        Self {
            router: ContentBasedRouter::new(),
            aggregator,
            profile_repository,
        }
    }

    pub fn router(&self) -> &ContentBasedRouter {
        &self.router
    }

    /// 重新路由后处理
    pub async fn process(
        &self,
        request: &RegistrationRequest,
        attempt: u32,
    ) -> RegistrationResult<AggregatedProfile> {
        let plan = self.router.route(request);
        self.process_routed(&plan, request, attempt).await
    }

    /// 按已有路由计划处理
    #[instrument(skip(self, plan, request), fields(student_id = %request.student_id))]
    pub async fn process_routed(
        &self,
        plan: &RoutingPlan,
        request: &RegistrationRequest,
        attempt: u32,
    ) -> RegistrationResult<AggregatedProfile> {
        let profile = self.aggregator.aggregate(plan, request, attempt).await;

        if !profile.is_complete() {
            if let Some(existing) = self
                .profile_repository
                .find_by_student_id(&request.student_id)
                .await?
                .filter(|existing| existing.is_complete())
            {
                info!(
                    "学生 {} 已有完整档案，保留既有结果 (本次: {})",
                    request.student_id, profile.completion_status
                );
                return Ok(existing);
            }
        }

        self.profile_repository.save(&profile).await
    }
}

#[async_trait]
impl Reprocessor for RegistrationPipeline {
    async fn reprocess(
        &self,
        request: &RegistrationRequest,
        attempt: u32,
    ) -> RegistrationResult<bool> {
        request.validate()?;
        let profile = self.process(request, attempt).await?;
        Ok(profile.is_complete())
    }
}
