// Lifecycle module - 评审生命周期
// ReviewService 负责所有同步入口和状态迁移，后台流程由 AnalysisRunner 执行

pub mod runner;
pub mod scheduler;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ReviewError, StoreError};
use crate::report::{ReviewListResponse, ReviewResponse};
use crate::review::{
    CodeOrigin, CreateReviewInput, RepoRef, Review, ReviewStatus, SecurityIssue,
    REPOSITORY_PLACEHOLDER,
};
use crate::store::ReviewStore;

pub use runner::{AnalysisRunner, RunOutcome};
pub use scheduler::{JobScheduler, ManualScheduler, WorkerPool};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

const INTERRUPTED_MESSAGE: &str = "Analysis was interrupted by a server restart";

/// 一次后台分析
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub review_id: Uuid,
    /// 调度时的 generation，后台写入都以此为条件
    pub generation: i64,
    /// 需要先拉取仓库内容时存在
    pub repository: Option<RepoRef>,
}

/// 启动恢复统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoverySummary {
    pub rescheduled: usize,
    pub failed: usize,
}

/// page 至少为 1；page_size 超出 [1, 100] 时取默认 20
pub fn normalize_paging(page: i64, page_size: i64) -> (u32, u32) {
    let page = page.clamp(1, i64::from(u32::MAX)) as u32;
    let page_size = if (1..=i64::from(MAX_PAGE_SIZE)).contains(&page_size) {
        page_size as u32
    } else {
        DEFAULT_PAGE_SIZE
    };
    (page, page_size)
}

pub struct ReviewService {
    store: Arc<dyn ReviewStore>,
    scheduler: Arc<dyn JobScheduler>,
}

impl ReviewService {
    pub fn new(store: Arc<dyn ReviewStore>, scheduler: Arc<dyn JobScheduler>) -> Self {
        Self { store, scheduler }
    }

    /// 保存 pending 评审并立即返回，分析在后台进行
    pub async fn create_review(
        &self,
        user_id: Uuid,
        input: &CreateReviewInput,
    ) -> Result<ReviewResponse, ReviewError> {
        let title = input.validated_title()?;
        let (code, language, repository) = match input.origin()? {
            CodeOrigin::Inline { code, language } => (code, language, None),
            CodeOrigin::Repository { repo, language } => {
                (REPOSITORY_PLACEHOLDER.to_string(), language, Some(repo))
            }
        };

        let review = Review::new(
            user_id,
            title,
            code,
            language,
            input.custom_prompt(),
            repository.clone(),
        );
        self.store.create(&review).await?;

        tracing::info!(
            review_id = %review.id,
            %user_id,
            ?repository,
            "Review created"
        );

        self.scheduler.schedule(AnalysisJob {
            review_id: review.id,
            generation: review.generation,
            repository,
        });

        Ok(ReviewResponse::new(review, Vec::new()))
    }

    pub async fn get_by_id(
        &self,
        user_id: Uuid,
        review_id: Uuid,
    ) -> Result<ReviewResponse, ReviewError> {
        let (review, issues) = self.get_with_issues(user_id, review_id).await?;
        Ok(ReviewResponse::new(review, issues))
    }

    /// 归属检查后返回评审及其问题列表
    pub async fn get_with_issues(
        &self,
        user_id: Uuid,
        review_id: Uuid,
    ) -> Result<(Review, Vec<SecurityIssue>), ReviewError> {
        let review = self.owned_review(user_id, review_id).await?;
        let issues = self.issues_or_empty(review.id).await;
        Ok((review, issues))
    }

    pub async fn get_user_reviews(
        &self,
        user_id: Uuid,
        page: i64,
        page_size: i64,
    ) -> Result<ReviewListResponse, ReviewError> {
        let (page, page_size) = normalize_paging(page, page_size);
        let (reviews, total) = self
            .store
            .get_by_user_id(user_id, page, page_size)
            .await?;

        let mut projected = Vec::with_capacity(reviews.len());
        for review in reviews {
            let issues = self.issues_or_empty(review.id).await;
            projected.push(ReviewResponse::new(review, issues));
        }

        Ok(ReviewListResponse::new(projected, total, page, page_size))
    }

    pub async fn delete(&self, user_id: Uuid, review_id: Uuid) -> Result<(), ReviewError> {
        let review = self.owned_review(user_id, review_id).await?;

        // 先删子记录，不依赖存储层的级联
        self.store.delete_issues_by_review_id(review.id).await?;
        self.store.delete(review.id).await?;

        tracing::info!(review_id = %review.id, "Review deleted");
        Ok(())
    }

    /// completed/failed -> pending，清除旧问题后重新调度，复用当前保存的代码
    ///
    /// 清除问题失败时评审停留在 pending 且未调度，下次启动恢复时重新调度
    pub async fn reanalyze(
        &self,
        user_id: Uuid,
        review_id: Uuid,
    ) -> Result<ReviewResponse, ReviewError> {
        let mut review = self.owned_review(user_id, review_id).await?;
        if !review.status.is_terminal() {
            return Err(ReviewError::AnalysisInProgress);
        }

        let expected = review.generation;
        review.reset_for_reanalysis()?;

        // 先以 generation 抢占，成功后才清除旧问题
        match self.store.update(&review, expected).await {
            Ok(()) => {}
            // 并发的另一次 reanalyze 已经抢先
            Err(StoreError::StaleGeneration { .. }) => return Err(ReviewError::AnalysisInProgress),
            Err(e) => return Err(e.into()),
        }
        self.store.clear_issues(review.id, review.generation).await?;

        tracing::info!(
            review_id = %review.id,
            generation = review.generation,
            "Review queued for reanalysis"
        );

        self.scheduler.schedule(AnalysisJob {
            review_id: review.id,
            generation: review.generation,
            repository: None,
        });

        Ok(ReviewResponse::new(review, Vec::new()))
    }

    /// 启动时处理上次进程遗留的评审：pending 重新调度，processing 标记失败
    pub async fn recover_interrupted(&self) -> Result<RecoverySummary, ReviewError> {
        let stranded = self
            .store
            .get_by_status(&[ReviewStatus::Pending, ReviewStatus::Processing])
            .await?;

        let mut summary = RecoverySummary::default();
        for mut review in stranded {
            match review.status {
                ReviewStatus::Pending => {
                    let repository = if review.awaiting_repository_content() {
                        review.repository.clone()
                    } else {
                        None
                    };
                    self.scheduler.schedule(AnalysisJob {
                        review_id: review.id,
                        generation: review.generation,
                        repository,
                    });
                    summary.rescheduled += 1;
                }
                ReviewStatus::Processing => {
                    let generation = review.generation;
                    review.fail(INTERRUPTED_MESSAGE)?;
                    match self.store.update(&review, generation).await {
                        Ok(()) => summary.failed += 1,
                        Err(e) => tracing::warn!(
                            review_id = %review.id,
                            "Failed to mark interrupted review as failed: {}",
                            e
                        ),
                    }
                }
                _ => {}
            }
        }

        if summary != RecoverySummary::default() {
            tracing::info!(
                "Recovered interrupted reviews: {} rescheduled, {} failed",
                summary.rescheduled,
                summary.failed
            );
        }
        Ok(summary)
    }

    async fn owned_review(&self, user_id: Uuid, review_id: Uuid) -> Result<Review, ReviewError> {
        let review = self.store.get_by_id(review_id).await?;
        if !review.is_owned_by(user_id) {
            return Err(ReviewError::AccessDenied);
        }
        Ok(review)
    }

    async fn issues_or_empty(&self, review_id: Uuid) -> Vec<SecurityIssue> {
        match self.store.get_issues_by_review_id(review_id).await {
            Ok(issues) => issues,
            Err(e) => {
                tracing::warn!(%review_id, "Failed to load security issues: {}", e);
                Vec::new()
            }
        }
    }
}
