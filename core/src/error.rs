use thiserror::Error;
use uuid::Uuid;

use crate::review::ReviewStatus;

/// 存储层错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("review {0} not found")]
    NotFound(Uuid),

    /// 行在读取之后被重置（reanalyze）过，本次写入已过期
    #[error("review {id} changed since generation {expected}")]
    StaleGeneration { id: Uuid, expected: i64 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt review row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// 行已被删除或已被重置，后台任务不应继续写入
    pub fn is_obsolete(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::StaleGeneration { .. })
    }
}

/// 仓库内容获取错误
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("{0}")]
    Fetch(String),

    #[error("no suitable source files found in repository")]
    NoSuitableContent,
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Fetch("repository download timed out".to_string())
        } else if err.is_connect() {
            Self::Fetch("failed to connect to repository host".to_string())
        } else {
            Self::Fetch(format!("failed to download archive: {}", err))
        }
    }
}

/// LLM 回复解析错误
#[derive(Error, Debug)]
pub enum ResponseParseError {
    #[error("analysis response is empty")]
    Empty,

    #[error("failed to parse analysis response: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// 分析后端错误
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("LLM backend is not configured")]
    NotConfigured,

    #[error("LLM request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("LLM API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("code analysis failed: the model returned no choices")]
    EmptyResponse,

    #[error(transparent)]
    Parse(#[from] ResponseParseError),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid status transition from {from} to {to}")]
pub struct TransitionError {
    pub from: ReviewStatus,
    pub to: ReviewStatus,
}

/// 评审服务对调用方暴露的错误
#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("code review not found")]
    NotFound,

    #[error("access denied to this review")]
    AccessDenied,

    #[error("review analysis is still in progress")]
    AnalysisInProgress,

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ReviewError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::NotFound,
            other => Self::Store(other),
        }
    }
}

/// 报告导出错误
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to render PDF: {0}")]
    Pdf(String),
}
