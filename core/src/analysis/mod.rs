// Analysis module - LLM 分析后端
// 定义分析器接口、请求/结果类型，以及基于聊天补全的实现

pub mod openai;
pub mod prompt;
pub mod response;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;

use crate::error::AnalysisError;
use crate::review::Severity;

pub use openai::OpenAiChatClient;

/// 分析请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisRequest {
    pub code: String,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
}

/// 模型返回的单个问题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityIssueInput {
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub line_start: Option<i64>,
    #[serde(default)]
    pub line_end: Option<i64>,
    #[serde(default)]
    pub suggestion: String,
    #[serde(default)]
    pub cwe: Option<String>,
    #[serde(default)]
    pub code_snippet: Option<String>,
}

/// 结构化分析结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub security_issues: Vec<SecurityIssueInput>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(deserialize_with = "score_from_number")]
    pub overall_score: i32,
}

fn score_from_number<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(raw.round().clamp(0.0, 100.0) as i32)
}

impl AnalysisResult {
    /// 写入 review.result 的可读摘要
    pub fn digest(&self) -> String {
        let mut out = String::new();
        out.push_str("# Analysis Result\n\n");
        let _ = write!(out, "**Overall Safe Score:** {}/100\n\n", self.overall_score);

        out.push_str("## Summary\n");
        out.push_str(&self.summary);
        out.push_str("\n\n");

        if !self.suggestions.is_empty() {
            out.push_str("## Code Quality Suggestions\n");
            for suggestion in &self.suggestions {
                let _ = writeln!(out, "- {}", suggestion);
            }
        }
        out
    }
}

/// 分析后端接口 - 无状态变换，不直接修改评审数据
#[async_trait]
pub trait CodeAnalyzer: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, AnalysisError>;
}

/// 单轮、无状态的聊天补全能力
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, AnalysisError>;
}

/// 通过聊天补全实现的分析器
#[derive(Clone)]
pub struct LlmCodeAnalyzer {
    chat: Arc<dyn ChatCompletion>,
}

impl LlmCodeAnalyzer {
    pub fn new(chat: Arc<dyn ChatCompletion>) -> Self {
        Self { chat }
    }
}

#[async_trait]
impl CodeAnalyzer for LlmCodeAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        let user_prompt = prompt::review_prompt(request);
        tracing::debug!(
            language = %request.language,
            code_bytes = request.code.len(),
            "requesting code analysis"
        );

        let reply = self
            .chat
            .complete(prompt::SYSTEM_PROMPT, &user_prompt)
            .await?;

        Ok(response::parse_analysis(&reply)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CannedChat {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatCompletion for CannedChat {
        async fn complete(
            &self,
            _system_prompt: &str,
            user_prompt: &str,
        ) -> Result<String, AnalysisError> {
            self.prompts.lock().unwrap().push(user_prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    fn canned(reply: &str) -> Arc<CannedChat> {
        Arc::new(CannedChat {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn analyzes_fenced_reply() {
        let chat = canned(
            "```json\n{\"summary\":\"s\",\"security_issues\":[{\"severity\":\"HIGH\",\"title\":\"SQLi\",\"description\":\"d\",\"line_start\":3,\"line_end\":null,\"suggestion\":\"bind params\",\"cwe\":\"CWE-89\"}],\"suggestions\":[\"x\"],\"overall_score\":72}\n```",
        );
        let analyzer = LlmCodeAnalyzer::new(chat.clone());
        let request = AnalysisRequest {
            code: "query(\"select \" + id)".into(),
            language: "python".into(),
            custom_prompt: Some("Focus on SQL".into()),
        };

        let result = analyzer.analyze(&request).await.unwrap();
        assert_eq!(result.overall_score, 72);
        assert_eq!(result.security_issues.len(), 1);
        assert_eq!(result.security_issues[0].severity, Severity::High);
        assert_eq!(result.security_issues[0].line_start, Some(3));
        assert_eq!(result.security_issues[0].line_end, None);

        let prompts = chat.prompts.lock().unwrap();
        assert!(prompts[0].contains("Focus on SQL"));
        assert!(prompts[0].contains("python"));
    }

    #[tokio::test]
    async fn unparseable_reply_is_a_hard_failure() {
        let analyzer = LlmCodeAnalyzer::new(canned("I could not review this code."));
        let request = AnalysisRequest {
            code: "a=1".into(),
            language: "python".into(),
            custom_prompt: None,
        };
        let err = analyzer.analyze(&request).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Parse(_)));
    }

    #[test]
    fn score_is_rounded_and_clamped() {
        let result: AnalysisResult =
            serde_json::from_str(r#"{"summary":"s","overall_score":140.2}"#).unwrap();
        assert_eq!(result.overall_score, 100);
        assert!(result.security_issues.is_empty());

        let result: AnalysisResult =
            serde_json::from_str(r#"{"summary":"s","overall_score":67.6}"#).unwrap();
        assert_eq!(result.overall_score, 68);
    }

    #[test]
    fn digest_lists_suggestions() {
        let result = AnalysisResult {
            summary: "Parses config".into(),
            security_issues: vec![],
            suggestions: vec!["Validate input".into(), "Add logging".into()],
            overall_score: 64,
        };
        let digest = result.digest();
        assert!(digest.starts_with("# Analysis Result"));
        assert!(digest.contains("**Overall Safe Score:** 64/100"));
        assert!(digest.contains("## Summary\nParses config"));
        assert!(digest.contains("- Validate input\n- Add logging\n"));

        let bare = AnalysisResult {
            suggestions: vec![],
            ..result
        };
        assert!(!bare.digest().contains("Code Quality Suggestions"));
    }
}
