use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use registration_core::{
    models::{ErrorLogCriteria, ErrorLogEntry},
    traits::ErrorLogRepository,
    RegistrationResult,
};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// 内存错误日志仓储
#[derive(Debug, Clone, Default)]
pub struct InMemoryErrorLogRepository {
    entries: Arc<RwLock<HashMap<Uuid, ErrorLogEntry>>>,
}

impl InMemoryErrorLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn select<F>(&self, predicate: F) -> Vec<ErrorLogEntry>
    where
        F: Fn(&ErrorLogEntry) -> bool,
    {
        let entries = self.entries.read().await;
        let mut selected: Vec<ErrorLogEntry> =
            entries.values().filter(|e| predicate(e)).cloned().collect();
        selected.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at).then(a.id.cmp(&b.id)));
        selected
    }
}

#[async_trait]
impl ErrorLogRepository for InMemoryErrorLogRepository {
    async fn save(&self, entry: &ErrorLogEntry) -> RegistrationResult<ErrorLogEntry> {
        self.entries.write().await.insert(entry.id, entry.clone());
        debug!(
            "保存错误日志 {} (学生: {}, 阶段: {})",
            entry.id, entry.student_id, entry.error_stage
        );
        Ok(entry.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> RegistrationResult<Option<ErrorLogEntry>> {
        Ok(self.entries.read().await.get(&id).cloned())
    }

    async fn find_since(&self, since: DateTime<Utc>) -> RegistrationResult<Vec<ErrorLogEntry>> {
        Ok(self.select(|e| e.occurred_at >= since).await)
    }

    async fn search(&self, criteria: &ErrorLogCriteria) -> RegistrationResult<Vec<ErrorLogEntry>> {
        Ok(self.select(|e| criteria.matches(e)).await)
    }

    async fn mark_resolved(
        &self,
        student_id: &str,
        stage: Option<&str>,
        resolved_by: &str,
        notes: &str,
        now: DateTime<Utc>,
    ) -> RegistrationResult<usize> {
        let mut entries = self.entries.write().await;
        let mut resolved = 0;
        for entry in entries.values_mut() {
            let in_scope = entry.student_id == student_id
                && stage.map_or(true, |s| s == entry.error_stage);
            if in_scope && entry.resolve(resolved_by, notes, now) {
                resolved += 1;
            }
        }
        Ok(resolved)
    }

    async fn delete_resolved_before(&self, before: DateTime<Utc>) -> RegistrationResult<usize> {
        let mut entries = self.entries.write().await;
        let original = entries.len();
        entries.retain(|_, e| !(e.resolved && e.resolved_at.is_some_and(|at| at < before)));
        Ok(original - entries.len())
    }

    async fn find_all(&self) -> RegistrationResult<Vec<ErrorLogEntry>> {
        Ok(self.select(|_| true).await)
    }
}
