// Review module - 评审领域模型

pub mod input;
pub mod model;

pub use input::{CodeOrigin, CreateReviewInput};
pub use model::{
    RepoRef, Review, ReviewStatus, SecurityIssue, Severity, REPOSITORY_LANGUAGE,
    REPOSITORY_PLACEHOLDER, UNSPECIFIED_LANGUAGE,
};
