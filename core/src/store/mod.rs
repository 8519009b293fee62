// Store module - 评审持久化
// ReviewStore 接口，以及 SQLite / 内存两种实现

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::review::{Review, ReviewStatus, SecurityIssue};

pub use memory::InMemoryReviewStore;
pub use sqlite::SqliteReviewStore;

/// 评审存储接口
///
/// 所有操作都不做归属检查，由 `ReviewService` 负责。
/// 写操作以 `generation` 做乐观并发校验：行被删除返回 `NotFound`，
/// 被 reanalyze 重置过返回 `StaleGeneration`，已删除的行不会被重新写回。
#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn create(&self, review: &Review) -> Result<(), StoreError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Review, StoreError>;

    /// 按创建时间倒序分页，返回 (当前页, 总数)；page 从 1 开始
    async fn get_by_user_id(
        &self,
        user_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Review>, u64), StoreError>;

    /// 整行覆盖，仅当存储中的 generation 等于 `expected_generation`
    async fn update(&self, review: &Review, expected_generation: i64) -> Result<(), StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;

    /// 仅当父评审仍处于 `generation` 时插入
    async fn create_security_issue(
        &self,
        issue: &SecurityIssue,
        generation: i64,
    ) -> Result<(), StoreError>;

    /// 按严重级别 (critical..info) 再按创建时间排序
    async fn get_issues_by_review_id(&self, review_id: Uuid)
        -> Result<Vec<SecurityIssue>, StoreError>;

    async fn delete_issues_by_review_id(&self, review_id: Uuid) -> Result<u64, StoreError>;

    /// 仅当父评审仍处于 `generation` 时删除其全部问题
    async fn clear_issues(&self, review_id: Uuid, generation: i64) -> Result<u64, StoreError>;

    /// 启动恢复用
    async fn get_by_status(&self, statuses: &[ReviewStatus]) -> Result<Vec<Review>, StoreError>;
}

pub(crate) fn page_offset(page: u32, page_size: u32) -> u64 {
    u64::from(page.max(1) - 1) * u64::from(page_size)
}
