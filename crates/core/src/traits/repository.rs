//! 数据仓储层接口定义
//!
//! - 失败单元仓储接口 (FailedUnitRepository)
//! - 聚合档案仓储接口 (ProfileRepository)
//! - 错误日志仓储接口 (ErrorLogRepository)
//!
//! 接口与具体实现分离；工作区内提供内存实现，关系型数据库实现只需满足相同契约。
//!
//! ## 并发约束
//!
//! `update_status_if` 必须是原子的比较并交换：只有当持久化的状态仍等于
//! `expected` 时才写入 `new`。定时扫描与人工重试都依赖它获得单元的独占处理权。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    AggregatedProfile, ErrorCategory, ErrorLogCriteria, ErrorLogEntry, FailedUnit, RetryStatus,
};
use crate::RegistrationResult;

/// 失败单元仓储接口
#[async_trait]
pub trait FailedUnitRepository: Send + Sync {
    /// 新增或整体覆盖一个失败单元
    async fn save(&self, unit: &FailedUnit) -> RegistrationResult<FailedUnit>;

    async fn find_by_id(&self, id: Uuid) -> RegistrationResult<Option<FailedUnit>>;

    /// 按学号查询，按失败时间倒序
    async fn find_by_student_id(&self, student_id: &str) -> RegistrationResult<Vec<FailedUnit>>;

    async fn find_by_status(&self, status: RetryStatus) -> RegistrationResult<Vec<FailedUnit>>;

    /// 死信标记为真的全部单元
    async fn find_dead_letters(&self) -> RegistrationResult<Vec<FailedUnit>>;

    async fn find_by_category(&self, category: ErrorCategory)
        -> RegistrationResult<Vec<FailedUnit>>;

    /// 到期待重试的单元：PENDING_RETRY、next_retry_at <= now、未超过最大次数
    async fn find_due(&self, now: DateTime<Utc>) -> RegistrationResult<Vec<FailedUnit>>;

    /// 尚未进入终态的单元
    async fn find_unresolved(&self) -> RegistrationResult<Vec<FailedUnit>>;

    async fn find_all(&self) -> RegistrationResult<Vec<FailedUnit>>;

    /// 原子条件更新状态，返回是否更新成功
    async fn update_status_if(
        &self,
        id: Uuid,
        expected: RetryStatus,
        new: RetryStatus,
    ) -> RegistrationResult<bool>;
}

/// 聚合档案仓储接口，以学号为键
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// 按学号插入或覆盖，重放同一请求不会产生重复档案
    async fn save(&self, profile: &AggregatedProfile) -> RegistrationResult<AggregatedProfile>;

    async fn find_by_student_id(
        &self,
        student_id: &str,
    ) -> RegistrationResult<Option<AggregatedProfile>>;

    async fn count(&self) -> RegistrationResult<usize>;
}

/// 错误日志仓储接口
///
/// 查询结果按发生时间倒序。
#[async_trait]
pub trait ErrorLogRepository: Send + Sync {
    async fn save(&self, entry: &ErrorLogEntry) -> RegistrationResult<ErrorLogEntry>;

    async fn find_by_id(&self, id: Uuid) -> RegistrationResult<Option<ErrorLogEntry>>;

    /// 发生时间不早于 `since` 的日志
    async fn find_since(&self, since: DateTime<Utc>) -> RegistrationResult<Vec<ErrorLogEntry>>;

    /// 所有条件同时满足的日志
    async fn search(&self, criteria: &ErrorLogCriteria) -> RegistrationResult<Vec<ErrorLogEntry>>;

    /// 将学生的未解决日志标记为已解决，`stage` 为空时不限阶段，返回标记条数
    async fn mark_resolved(
        &self,
        student_id: &str,
        stage: Option<&str>,
        resolved_by: &str,
        notes: &str,
        now: DateTime<Utc>,
    ) -> RegistrationResult<usize>;

    /// 删除在 `before` 之前已解决的日志，返回删除条数
    async fn delete_resolved_before(&self, before: DateTime<Utc>) -> RegistrationResult<usize>;

    async fn find_all(&self) -> RegistrationResult<Vec<ErrorLogEntry>>;
}
