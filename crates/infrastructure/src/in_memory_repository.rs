use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use registration_core::{
    models::{AggregatedProfile, ErrorCategory, FailedUnit, RetryStatus},
    traits::{FailedUnitRepository, ProfileRepository},
    RegistrationResult,
};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// 内存失败单元仓储
///
/// 状态的条件更新在写锁内完成，读取与比较之间不会被其他写者插入。
#[derive(Debug, Clone, Default)]
pub struct InMemoryFailedUnitRepository {
    units: Arc<RwLock<HashMap<Uuid, FailedUnit>>>,
}

impl InMemoryFailedUnitRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn select<F>(&self, predicate: F) -> Vec<FailedUnit>
    where
        F: Fn(&FailedUnit) -> bool,
    {
        let units = self.units.read().await;
        let mut selected: Vec<FailedUnit> = units.values().filter(|u| predicate(u)).cloned().collect();
        selected.sort_by(|a, b| a.failed_at.cmp(&b.failed_at).then(a.id.cmp(&b.id)));
        selected
    }
}

#[async_trait]
impl FailedUnitRepository for InMemoryFailedUnitRepository {
    async fn save(&self, unit: &FailedUnit) -> RegistrationResult<FailedUnit> {
        let mut units = self.units.write().await;
        units.insert(unit.id, unit.clone());
        debug!("保存失败单元 {} (状态: {})", unit.id, unit.status);
        Ok(unit.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> RegistrationResult<Option<FailedUnit>> {
        Ok(self.units.read().await.get(&id).cloned())
    }

    async fn find_by_student_id(&self, student_id: &str) -> RegistrationResult<Vec<FailedUnit>> {
        let mut units = self.select(|u| u.request.student_id == student_id).await;
        units.reverse();
        Ok(units)
    }

    async fn find_by_status(&self, status: RetryStatus) -> RegistrationResult<Vec<FailedUnit>> {
        Ok(self.select(|u| u.status == status).await)
    }

    async fn find_dead_letters(&self) -> RegistrationResult<Vec<FailedUnit>> {
        Ok(self.select(|u| u.in_dead_letter_queue).await)
    }

    async fn find_by_category(
        &self,
        category: ErrorCategory,
    ) -> RegistrationResult<Vec<FailedUnit>> {
        Ok(self.select(|u| u.error_category == category).await)
    }

    async fn find_due(&self, now: DateTime<Utc>) -> RegistrationResult<Vec<FailedUnit>> {
        Ok(self.select(|u| u.is_due(now)).await)
    }

    async fn find_unresolved(&self) -> RegistrationResult<Vec<FailedUnit>> {
        Ok(self.select(|u| !u.status.is_terminal()).await)
    }

    async fn find_all(&self) -> RegistrationResult<Vec<FailedUnit>> {
        Ok(self.select(|_| true).await)
    }

    async fn update_status_if(
        &self,
        id: Uuid,
        expected: RetryStatus,
        new: RetryStatus,
    ) -> RegistrationResult<bool> {
        let mut units = self.units.write().await;
        match units.get_mut(&id) {
            Some(unit) if unit.status == expected => {
                unit.status = new;
                Ok(true)
            }
            Some(unit) => {
                debug!(
                    "条件更新失败: 单元 {} 当前状态 {}，期望 {}",
                    id, unit.status, expected
                );
                Ok(false)
            }
            None => Ok(false),
        }
    }
}

/// 内存档案仓储，以学号为键覆盖写入
#[derive(Debug, Clone, Default)]
pub struct InMemoryProfileRepository {
    profiles: Arc<RwLock<HashMap<String, AggregatedProfile>>>,
}

impl InMemoryProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileRepository for InMemoryProfileRepository {
    async fn save(&self, profile: &AggregatedProfile) -> RegistrationResult<AggregatedProfile> {
        let mut profiles = self.profiles.write().await;
        profiles.insert(profile.student_id.clone(), profile.clone());
        Ok(profile.clone())
    }

    async fn find_by_student_id(
        &self,
        student_id: &str,
    ) -> RegistrationResult<Option<AggregatedProfile>> {
        Ok(self.profiles.read().await.get(student_id).cloned())
    }

    async fn count(&self) -> RegistrationResult<usize> {
        Ok(self.profiles.read().await.len())
    }
}
