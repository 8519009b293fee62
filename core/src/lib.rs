// Secure Review Core Library
// 核心功能库，包含评审模型、存储、代码来源解析、LLM 分析、评审生命周期和报告导出

pub mod analysis;
pub mod error;
pub mod lifecycle;
pub mod report;
pub mod review;
pub mod source;
pub mod store;

// 重新导出常用类型
pub use analysis::{
    AnalysisRequest, AnalysisResult, ChatCompletion, CodeAnalyzer, LlmCodeAnalyzer,
    OpenAiChatClient, SecurityIssueInput,
};
pub use error::{
    AnalysisError, ReportError, ResponseParseError, ReviewError, SourceError, StoreError,
    TransitionError,
};
pub use lifecycle::{
    AnalysisJob, AnalysisRunner, JobScheduler, ManualScheduler, ReviewService, WorkerPool,
};
pub use report::{render_pdf, ReportDocument, ReviewListResponse, ReviewResponse};
pub use review::{CreateReviewInput, RepoRef, Review, ReviewStatus, SecurityIssue, Severity};
pub use source::{
    CodeSourceResolver, GitHubArchiveProvider, GitHubCredentials, RepositoryContentProvider,
};
pub use store::{InMemoryReviewStore, ReviewStore, SqliteReviewStore};
