// Source module - 代码来源解析
// 从仓库归档中提取可分析的文本

pub mod archive;
pub mod filter;
pub mod github;

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::SourceError;
use crate::review::RepoRef;

pub use archive::flatten_archive;
pub use github::GitHubArchiveProvider;

/// 仓库归档获取接口
#[async_trait]
pub trait RepositoryContentProvider: Send + Sync {
    /// 返回 zip 归档的原始字节
    async fn fetch_archive(&self, user_id: Uuid, repo: &RepoRef) -> Result<Vec<u8>, SourceError>;
}

/// 按用户查找 GitHub 访问令牌（OAuth / 安装令牌），令牌的签发在外部完成
#[async_trait]
pub trait GitHubCredentials: Send + Sync {
    async fn token_for(&self, user_id: Uuid) -> Result<Option<String>, SourceError>;
}

#[derive(Clone)]
pub struct CodeSourceResolver {
    provider: Arc<dyn RepositoryContentProvider>,
}

impl CodeSourceResolver {
    pub fn new(provider: Arc<dyn RepositoryContentProvider>) -> Self {
        Self { provider }
    }

    /// 下载归档并拼接成单个文本
    pub async fn fetch(&self, user_id: Uuid, repo: &RepoRef) -> Result<String, SourceError> {
        let bytes = self.provider.fetch_archive(user_id, repo).await?;
        tracing::info!("Downloaded archive for {} ({} bytes)", repo, bytes.len());

        // 解压是 CPU 密集操作，放到阻塞线程池
        tokio::task::spawn_blocking(move || flatten_archive(&bytes))
            .await
            .map_err(|e| SourceError::Fetch(format!("archive extraction aborted: {}", e)))?
    }
}
