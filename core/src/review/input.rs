use serde::Deserialize;

use super::model::{RepoRef, REPOSITORY_LANGUAGE, UNSPECIFIED_LANGUAGE};
use crate::error::ReviewError;

const MAX_TITLE_LEN: usize = 255;

/// 创建评审的请求体
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateReviewInput {
    pub title: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub repo_owner: Option<String>,
    #[serde(default)]
    pub repo_name: Option<String>,
    #[serde(default)]
    pub repo_branch: Option<String>,
    #[serde(default)]
    pub custom_prompt: Option<String>,
}

/// 待分析代码的来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeOrigin {
    Inline { code: String, language: String },
    Repository { repo: RepoRef, language: String },
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl CreateReviewInput {
    pub fn validated_title(&self) -> Result<String, ReviewError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ReviewError::InvalidInput("title is required".into()));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(ReviewError::InvalidInput(format!(
                "title must be at most {} characters",
                MAX_TITLE_LEN
            )));
        }
        Ok(title.to_string())
    }

    pub fn custom_prompt(&self) -> Option<String> {
        non_empty(&self.custom_prompt).map(str::to_string)
    }

    /// 必须且只能给出一种来源：内联代码，或完整的 (owner, repo, branch)
    pub fn origin(&self) -> Result<CodeOrigin, ReviewError> {
        let repo_fields = [&self.repo_owner, &self.repo_name, &self.repo_branch];
        let given = repo_fields.iter().filter(|f| f.is_some()).count();
        let has_code = self.code.is_some();

        if given > 0 && has_code {
            return Err(ReviewError::InvalidInput(
                "provide either code or repository details, not both".into(),
            ));
        }

        if given > 0 {
            let (Some(owner), Some(name), Some(branch)) = (
                non_empty(&self.repo_owner),
                non_empty(&self.repo_name),
                non_empty(&self.repo_branch),
            ) else {
                return Err(ReviewError::InvalidInput(
                    "repo_owner, repo_name and repo_branch are all required".into(),
                ));
            };
            let language = non_empty(&self.language)
                .unwrap_or(REPOSITORY_LANGUAGE)
                .to_string();
            return Ok(CodeOrigin::Repository {
                repo: RepoRef {
                    owner: owner.to_string(),
                    name: name.to_string(),
                    branch: branch.to_string(),
                },
                language,
            });
        }

        match self.code.as_deref() {
            Some(code) if !code.trim().is_empty() => {
                let language = non_empty(&self.language).unwrap_or(UNSPECIFIED_LANGUAGE);
                Ok(CodeOrigin::Inline {
                    code: code.to_string(),
                    language: language.to_string(),
                })
            }
            Some(_) => Err(ReviewError::InvalidInput("code content is empty".into())),
            None => Err(ReviewError::InvalidInput(
                "either code or repository details must be provided".into(),
            )),
        }
    }
}
