use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::analysis::{AnalysisResult, SecurityIssueInput};
use crate::error::TransitionError;

/// 仓库内容尚未下载完成时写入 code 字段的占位文本
pub const REPOSITORY_PLACEHOLDER: &str = "Repository content is being downloaded...";

/// 仓库来源且未指定语言时使用的语言标签
pub const REPOSITORY_LANGUAGE: &str = "Mixed (Repository)";

/// 内联代码未声明语言时使用
pub const UNSPECIFIED_LANGUAGE: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// completed / failed 是终态，只有 reanalyze 能离开
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(&self, next: ReviewStatus) -> bool {
        use ReviewStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Completed, Pending)
                | (Failed, Pending)
        )
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown review status: {}", other)),
        }
    }
}

/// 严重级别：critical > high > medium > low > info
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// 列表排序顺序
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Info => "info",
        }
    }

    /// 1 = critical ... 5 = info
    pub fn rank(&self) -> u8 {
        match self {
            Self::Critical => 1,
            Self::High => 2,
            Self::Medium => 3,
            Self::Low => 4,
            Self::Info => 5,
        }
    }

    /// 宽松解析模型返回的级别标签，无法识别时归为 info
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "critical" => Self::Critical,
            "high" => Self::High,
            "medium" | "moderate" => Self::Medium,
            "low" => Self::Low,
            _ => Self::Info,
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Self::Info
    }
}

impl From<String> for Severity {
    fn from(label: String) -> Self {
        Self::from_label(&label)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// GitHub 仓库引用 (owner, repo, branch/ref)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
    pub branch: String,
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.name, self.branch)
    }
}

/// 代码评审记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub code: String,
    pub language: String,
    pub custom_prompt: Option<String>,
    pub status: ReviewStatus,
    pub result: Option<String>,
    pub overall_score: Option<i32>,
    pub summary: Option<String>,
    pub suggestions: Option<Vec<String>>,
    pub repository: Option<RepoRef>,
    /// 每次 reanalyze 递增，后台写入以此做乐观并发校验
    pub generation: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Review {
    pub fn new(
        user_id: Uuid,
        title: String,
        code: String,
        language: String,
        custom_prompt: Option<String>,
        repository: Option<RepoRef>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            title,
            code,
            language,
            custom_prompt,
            status: ReviewStatus::Pending,
            result: None,
            overall_score: None,
            summary: None,
            suggestions: None,
            repository,
            generation: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }

    /// 仓库来源且内容还未替换占位文本
    pub fn awaiting_repository_content(&self) -> bool {
        self.repository.is_some() && self.code == REPOSITORY_PLACEHOLDER
    }

    fn transition(&mut self, next: ReviewStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn start_processing(&mut self) -> Result<(), TransitionError> {
        self.transition(ReviewStatus::Processing)
    }

    pub fn replace_code(&mut self, code: String) {
        self.code = code;
        self.updated_at = Utc::now();
    }

    pub fn complete(&mut self, analysis: &AnalysisResult) -> Result<(), TransitionError> {
        self.transition(ReviewStatus::Completed)?;
        self.result = Some(analysis.digest());
        self.overall_score = Some(analysis.overall_score);
        self.summary = Some(analysis.summary.clone());
        self.suggestions = Some(analysis.suggestions.clone());
        self.completed_at = Some(self.updated_at);
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(ReviewStatus::Failed)?;
        let message = message.into();
        // result 在 failed 状态下必须非空
        self.result = Some(if message.trim().is_empty() {
            "Analysis failed".to_string()
        } else {
            message
        });
        self.completed_at = Some(self.updated_at);
        Ok(())
    }

    /// completed/failed -> pending，清空结果并进入新一代
    pub fn reset_for_reanalysis(&mut self) -> Result<(), TransitionError> {
        self.transition(ReviewStatus::Pending)?;
        self.result = None;
        self.overall_score = None;
        self.summary = None;
        self.suggestions = None;
        self.completed_at = None;
        self.generation += 1;
        Ok(())
    }
}

/// 评审发现的单个安全问题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityIssue {
    pub id: Uuid,
    pub review_id: Uuid,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_start: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_end: Option<i64>,
    pub suggestion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwe: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_snippet: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SecurityIssue {
    pub fn from_finding(review_id: Uuid, finding: &SecurityIssueInput) -> Self {
        Self {
            id: Uuid::new_v4(),
            review_id,
            severity: finding.severity,
            title: finding.title.clone(),
            description: finding.description.clone(),
            file_path: finding.file_path.clone(),
            line_start: finding.line_start,
            line_end: finding.line_end,
            suggestion: finding.suggestion.clone(),
            cwe: finding.cwe.clone(),
            code_snippet: finding.code_snippet.clone(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_review() -> Review {
        Review::new(
            Uuid::new_v4(),
            "login handler".into(),
            "a=1".into(),
            "python".into(),
            None,
            None,
        )
    }

    fn sample_result() -> AnalysisResult {
        AnalysisResult {
            summary: "Looks fine".into(),
            security_issues: vec![],
            suggestions: vec!["Add tests".into()],
            overall_score: 88,
        }
    }

    #[test]
    fn only_diagram_edges_are_valid() {
        use ReviewStatus::*;
        let all = [Pending, Processing, Completed, Failed];
        let allowed = [
            (Pending, Processing),
            (Processing, Completed),
            (Processing, Failed),
            (Completed, Pending),
            (Failed, Pending),
        ];
        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn completion_sets_result_and_timestamp() {
        let mut review = sample_review();
        review.start_processing().unwrap();
        assert!(review.completed_at.is_none());
        assert!(review.result.is_none());

        review.complete(&sample_result()).unwrap();
        assert_eq!(review.status, ReviewStatus::Completed);
        assert!(review.completed_at.is_some());
        assert!(review.result.as_deref().unwrap().contains("88/100"));
        assert_eq!(review.overall_score, Some(88));
    }

    #[test]
    fn failure_sets_non_empty_result() {
        let mut review = sample_review();
        review.start_processing().unwrap();
        review.fail("").unwrap();
        assert_eq!(review.status, ReviewStatus::Failed);
        assert_eq!(review.result.as_deref(), Some("Analysis failed"));
        assert!(review.completed_at.is_some());
    }

    #[test]
    fn processing_cannot_go_back_to_pending() {
        let mut review = sample_review();
        review.start_processing().unwrap();
        let err = review.reset_for_reanalysis().unwrap_err();
        assert_eq!(err.from, ReviewStatus::Processing);
        assert_eq!(review.status, ReviewStatus::Processing);
        assert_eq!(review.generation, 0);
    }

    #[test]
    fn reset_clears_results_and_bumps_generation() {
        let mut review = sample_review();
        review.start_processing().unwrap();
        review.complete(&sample_result()).unwrap();

        review.reset_for_reanalysis().unwrap();
        assert_eq!(review.status, ReviewStatus::Pending);
        assert!(review.result.is_none());
        assert!(review.completed_at.is_none());
        assert!(review.suggestions.is_none());
        assert_eq!(review.generation, 1);
        assert_eq!(review.code, "a=1");
    }

    #[test]
    fn severity_labels_are_lenient() {
        assert_eq!(Severity::from_label("CRITICAL"), Severity::Critical);
        assert_eq!(Severity::from_label(" Moderate "), Severity::Medium);
        assert_eq!(Severity::from_label("informational"), Severity::Info);
        assert_eq!(Severity::from_label("whatever"), Severity::Info);

        let parsed: Severity = serde_json::from_str("\"High\"").unwrap();
        assert_eq!(parsed, Severity::High);
        assert_eq!(serde_json::to_string(&Severity::Low).unwrap(), "\"low\"");
    }
}
