use std::sync::Arc;

use super::AnalysisJob;
use crate::analysis::{AnalysisRequest, CodeAnalyzer};
use crate::error::StoreError;
use crate::review::{Review, ReviewStatus, SecurityIssue};
use crate::source::CodeSourceResolver;
use crate::store::ReviewStore;

const ABORTED_MESSAGE: &str = "Analysis aborted unexpectedly";

/// 单次运行的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed,
    /// 评审已删除、已被重置或不处于 pending，本次运行放弃
    Abandoned,
}

pub struct AnalysisRunner {
    store: Arc<dyn ReviewStore>,
    resolver: CodeSourceResolver,
    analyzer: Arc<dyn CodeAnalyzer>,
}

impl AnalysisRunner {
    pub fn new(
        store: Arc<dyn ReviewStore>,
        resolver: CodeSourceResolver,
        analyzer: Arc<dyn CodeAnalyzer>,
    ) -> Self {
        Self {
            store,
            resolver,
            analyzer,
        }
    }

    pub async fn run(&self, job: AnalysisJob) -> RunOutcome {
        let generation = job.generation;

        let mut review = match self.store.get_by_id(job.review_id).await {
            Ok(review) => review,
            Err(e) => {
                tracing::info!(review_id = %job.review_id, "Skipping analysis: {}", e);
                return RunOutcome::Abandoned;
            }
        };

        if review.generation != generation || review.status != ReviewStatus::Pending {
            tracing::info!(
                review_id = %review.id,
                status = %review.status,
                "Skipping analysis: review is no longer pending at generation {}",
                generation
            );
            return RunOutcome::Abandoned;
        }

        // 1. pending -> processing，写入失败不影响后续流程
        if let Err(e) = review.start_processing() {
            tracing::warn!(review_id = %review.id, "{}", e);
            return RunOutcome::Abandoned;
        }
        match self.store.update(&review, generation).await {
            Ok(()) => tracing::info!(review_id = %review.id, "Review processing started"),
            Err(e) if e.is_obsolete() => return abandon(&review, &e),
            Err(e) => tracing::warn!(
                review_id = %review.id,
                "Failed to persist processing status: {}",
                e
            ),
        }

        // 2. 仓库来源：先拉取代码
        if let Some(repo) = &job.repository {
            match self.resolver.fetch(review.user_id, repo).await {
                Ok(code) => {
                    review.replace_code(code);
                    match self.store.update(&review, generation).await {
                        Ok(()) => {}
                        Err(e) if e.is_obsolete() => return abandon(&review, &e),
                        Err(e) => tracing::warn!(
                            review_id = %review.id,
                            "Failed to persist fetched repository content: {}",
                            e
                        ),
                    }
                }
                Err(e) => {
                    tracing::warn!(review_id = %review.id, "Repository fetch failed: {}", e);
                    return self
                        .finish_failed(review, format!("Failed to fetch repository: {}", e))
                        .await;
                }
            }
        }

        // 3. 调用分析后端
        let request = AnalysisRequest {
            code: review.code.clone(),
            language: review.language.clone(),
            custom_prompt: review.custom_prompt.clone(),
        };
        let analysis = match self.analyzer.analyze(&request).await {
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::warn!(review_id = %review.id, "Analysis failed: {}", e);
                return self.finish_failed(review, e.to_string()).await;
            }
        };

        // 4. 保存问题，单条失败只记录日志
        let mut stored = 0usize;
        for finding in &analysis.security_issues {
            let issue = SecurityIssue::from_finding(review.id, finding);
            match self.store.create_security_issue(&issue, generation).await {
                Ok(()) => stored += 1,
                Err(e) if e.is_obsolete() => return abandon(&review, &e),
                Err(e) => tracing::warn!(
                    review_id = %review.id,
                    "Failed to save security issue '{}': {}",
                    issue.title,
                    e
                ),
            }
        }

        // 5. processing -> completed
        if let Err(e) = review.complete(&analysis) {
            tracing::error!(review_id = %review.id, "{}", e);
            return RunOutcome::Abandoned;
        }
        match self.store.update(&review, generation).await {
            Ok(()) => {
                tracing::info!(
                    review_id = %review.id,
                    score = analysis.overall_score,
                    issues = stored,
                    "Review analysis completed"
                );
                RunOutcome::Completed
            }
            Err(e) if e.is_obsolete() => abandon(&review, &e),
            Err(e) => {
                tracing::error!(review_id = %review.id, "Failed to persist completed review: {}", e);
                RunOutcome::Completed
            }
        }
    }

    /// 任务异常中止后把仍未结束的评审落到 failed，以任务的 generation 为条件
    pub async fn abort(&self, job: &AnalysisJob) -> RunOutcome {
        let mut review = match self.store.get_by_id(job.review_id).await {
            Ok(review) => review,
            Err(e) => {
                tracing::info!(review_id = %job.review_id, "Nothing to abort: {}", e);
                return RunOutcome::Abandoned;
            }
        };
        if review.generation != job.generation || review.status.is_terminal() {
            return RunOutcome::Abandoned;
        }

        // processing 状态可能没有写入成功
        if review.status == ReviewStatus::Pending {
            if let Err(e) = review.start_processing() {
                tracing::error!(review_id = %review.id, "{}", e);
                return RunOutcome::Abandoned;
            }
        }
        tracing::warn!(review_id = %review.id, "Marking aborted analysis as failed");
        self.finish_failed(review, ABORTED_MESSAGE.to_string()).await
    }

    async fn finish_failed(&self, mut review: Review, message: String) -> RunOutcome {
        if let Err(e) = review.fail(message) {
            tracing::error!(review_id = %review.id, "{}", e);
            return RunOutcome::Abandoned;
        }
        match self.store.update(&review, review.generation).await {
            Ok(()) => RunOutcome::Failed,
            Err(e) if e.is_obsolete() => abandon(&review, &e),
            Err(e) => {
                tracing::error!(review_id = %review.id, "Failed to persist failed review: {}", e);
                RunOutcome::Failed
            }
        }
    }
}

fn abandon(review: &Review, err: &StoreError) -> RunOutcome {
    tracing::info!(review_id = %review.id, "Abandoning analysis run: {}", err);
    RunOutcome::Abandoned
}
