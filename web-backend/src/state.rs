use secure_review_core::{
    AnalysisRunner, CodeSourceResolver, GitHubArchiveProvider, JobScheduler, LlmCodeAnalyzer,
    OpenAiChatClient, ReviewService, SqliteReviewStore, WorkerPool,
};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub reviews: Arc<ReviewService>,
    pub db: Pool<Sqlite>,
}

impl AppState {
    /// 组装存储、代码来源、分析后端和后台 worker
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        tracing::info!("Database: {}", config.database_url);
        let store = SqliteReviewStore::connect(&config.database_url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to initialize database: {}", e))?;

        if config.openai_api_key.is_empty() {
            tracing::warn!("OPENAI_API_KEY is not set, analyses will fail");
        }
        let chat = OpenAiChatClient::new(config.openai_api_key.clone())
            .with_base_url(config.openai_base_url.clone())
            .with_model(config.openai_model.clone());
        let analyzer = LlmCodeAnalyzer::new(Arc::new(chat));

        let store = Arc::new(store);
        // 用户关联的令牌优先，GITHUB_TOKEN 兜底
        let provider = GitHubArchiveProvider::new(
            config.github_api_url.clone(),
            config.github_token.clone(),
        )
        .with_credentials(store.clone());

        let runner = AnalysisRunner::new(
            store.clone(),
            CodeSourceResolver::new(Arc::new(provider)),
            Arc::new(analyzer),
        );
        let pool = WorkerPool::start(
            Arc::new(runner),
            config.analysis_workers,
            config.analysis_queue_capacity,
        );

        Ok(Self::from_parts(store, Arc::new(pool)))
    }

    pub fn from_parts(store: Arc<SqliteReviewStore>, scheduler: Arc<dyn JobScheduler>) -> Self {
        let db = store.pool().clone();
        Self {
            reviews: Arc::new(ReviewService::new(store, scheduler)),
            db,
        }
    }
}
