use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use std::sync::Arc;
use uuid::Uuid;

use super::{GitHubCredentials, RepositoryContentProvider};
use crate::error::SourceError;
use crate::review::RepoRef;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const API_VERSION: &str = "2022-11-28";

#[derive(Clone)]
pub struct GitHubArchiveProvider {
    client: reqwest::Client,
    api_base: String,
    credentials: Option<Arc<dyn GitHubCredentials>>,
    /// 用户没有关联令牌时使用
    fallback_token: Option<String>,
}

fn non_blank(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.trim().is_empty())
}

impl GitHubArchiveProvider {
    pub fn new(api_base: impl Into<String>, fallback_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            credentials: None,
            fallback_token: non_blank(fallback_token),
        }
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn GitHubCredentials>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn archive_url(&self, repo: &RepoRef) -> String {
        format!(
            "{}/repos/{}/{}/zipball/{}",
            self.api_base, repo.owner, repo.name, repo.branch
        )
    }

    /// 用户自己的令牌优先，其次是全局令牌；都没有时匿名访问
    pub async fn token_for(&self, user_id: Uuid) -> Result<Option<String>, SourceError> {
        if let Some(credentials) = &self.credentials {
            if let Some(token) = non_blank(credentials.token_for(user_id).await?) {
                return Ok(Some(token));
            }
        }
        Ok(self.fallback_token.clone())
    }

    fn archive_request(
        &self,
        repo: &RepoRef,
        token: Option<&str>,
    ) -> Result<reqwest::Request, SourceError> {
        let mut request = self
            .client
            .get(self.archive_url(repo))
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, "secure-review")
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        Ok(request.build()?)
    }
}

#[async_trait]
impl RepositoryContentProvider for GitHubArchiveProvider {
    async fn fetch_archive(&self, user_id: Uuid, repo: &RepoRef) -> Result<Vec<u8>, SourceError> {
        let token = self.token_for(user_id).await?;
        let request = self.archive_request(repo, token.as_deref())?;
        tracing::debug!(
            %user_id,
            authenticated = token.is_some(),
            "Downloading archive {}",
            request.url()
        );

        // reqwest 默认跟随重定向到 codeload
        let response = self.client.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Fetch(format!(
                "failed to download archive for {}: HTTP {}",
                repo, status
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FixedCredentials(HashMap<Uuid, String>);

    #[async_trait]
    impl GitHubCredentials for FixedCredentials {
        async fn token_for(&self, user_id: Uuid) -> Result<Option<String>, SourceError> {
            Ok(self.0.get(&user_id).cloned())
        }
    }

    fn repo() -> RepoRef {
        RepoRef {
            owner: "acme".into(),
            name: "shop".into(),
            branch: "main".into(),
        }
    }

    fn bearer(request: &reqwest::Request) -> Option<&str> {
        request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
    }

    #[test]
    fn builds_zipball_url() {
        let provider = GitHubArchiveProvider::new("https://ghe.example.com/api/v3/", None);
        assert_eq!(
            provider.archive_url(&repo()),
            "https://ghe.example.com/api/v3/repos/acme/shop/zipball/main"
        );
    }

    #[tokio::test]
    async fn blank_tokens_are_ignored() {
        let user = Uuid::new_v4();
        let provider = GitHubArchiveProvider::new(DEFAULT_API_URL, Some("  ".into()))
            .with_credentials(Arc::new(FixedCredentials(HashMap::from([(
                user,
                String::new(),
            )]))));

        assert_eq!(provider.token_for(user).await.unwrap(), None);
        let request = provider.archive_request(&repo(), None).unwrap();
        assert!(bearer(&request).is_none());
    }

    #[tokio::test]
    async fn bearer_token_follows_the_user() {
        let linked = Uuid::new_v4();
        let other = Uuid::new_v4();
        let provider = GitHubArchiveProvider::new(DEFAULT_API_URL, Some("global".into()))
            .with_credentials(Arc::new(FixedCredentials(HashMap::from([(
                linked,
                "user-token".to_string(),
            )]))));

        let token = provider.token_for(linked).await.unwrap();
        let request = provider.archive_request(&repo(), token.as_deref()).unwrap();
        assert_eq!(bearer(&request), Some("Bearer user-token"));
        assert_eq!(
            request.headers().get("X-GitHub-Api-Version").unwrap(),
            API_VERSION
        );

        let token = provider.token_for(other).await.unwrap();
        let request = provider.archive_request(&repo(), token.as_deref()).unwrap();
        assert_eq!(bearer(&request), Some("Bearer global"));
    }
}
