use chrono::{DateTime, Utc};

use crate::review::{Review, SecurityIssue, Severity};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Clone, PartialEq)]
pub struct ReportIssue {
    pub number: usize,
    pub severity: Severity,
    pub title: String,
    pub lines: Option<String>,
    pub cwe: Option<String>,
    pub file_path: Option<String>,
    pub description: String,
    pub recommendation: Option<String>,
    pub code_snippet: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportDocument {
    pub heading: String,
    /// (标签, 值)
    pub details: Vec<(String, String)>,
    /// 只包含数量非零的级别，按严重程度排序
    pub severity_counts: Vec<(Severity, usize)>,
    pub issues: Vec<ReportIssue>,
    pub analysis: Option<String>,
    pub footer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStyle {
    Title,
    Heading,
    Label,
    Body,
    Muted,
    Code,
    Badge(Severity),
    Spacer,
}

/// 渲染单元：一段带样式的文本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub style: BlockStyle,
    pub text: String,
}

impl Block {
    fn new(style: BlockStyle, text: impl Into<String>) -> Self {
        Self {
            style,
            text: text.into(),
        }
    }

    fn spacer() -> Self {
        Self::new(BlockStyle::Spacer, "")
    }
}

fn line_range(issue: &SecurityIssue) -> Option<String> {
    let start = issue.line_start?;
    Some(match issue.line_end {
        Some(end) if end != start => format!("Lines: {}-{}", start, end),
        _ => format!("Lines: {}", start),
    })
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// 由已加载的评审与问题构建报告，不做任何 I/O
pub fn build_report(
    review: &Review,
    issues: &[SecurityIssue],
    generated_at: DateTime<Utc>,
) -> ReportDocument {
    let mut details = vec![
        ("Title".to_string(), review.title.clone()),
        ("Language".to_string(), review.language.clone()),
        ("Status".to_string(), review.status.to_string()),
        (
            "Created".to_string(),
            review.created_at.format(DATE_FORMAT).to_string(),
        ),
    ];
    if let Some(completed) = review.completed_at {
        details.push((
            "Completed".to_string(),
            completed.format(DATE_FORMAT).to_string(),
        ));
    }
    if let Some(repo) = &review.repository {
        details.push(("Repository".to_string(), repo.to_string()));
    }
    details.push(("Review ID".to_string(), review.id.to_string()));

    let severity_counts = Severity::ALL
        .iter()
        .map(|severity| {
            let count = issues.iter().filter(|i| i.severity == *severity).count();
            (*severity, count)
        })
        .filter(|(_, count)| *count > 0)
        .collect();

    let issues = issues
        .iter()
        .enumerate()
        .map(|(index, issue)| ReportIssue {
            number: index + 1,
            severity: issue.severity,
            title: issue.title.clone(),
            lines: line_range(issue),
            cwe: non_blank(&issue.cwe),
            file_path: non_blank(&issue.file_path),
            description: issue.description.clone(),
            recommendation: Some(issue.suggestion.trim().to_string()).filter(|s| !s.is_empty()),
            code_snippet: non_blank(&issue.code_snippet),
        })
        .collect();

    ReportDocument {
        heading: "Security Code Review Report".to_string(),
        details,
        severity_counts,
        issues,
        analysis: non_blank(&review.result),
        footer: format!(
            "Generated by Secure Review on {}",
            generated_at.format("%Y-%m-%d %H:%M:%S")
        ),
    }
}

impl ReportDocument {
    /// 按阅读顺序展开为渲染单元（页脚单独处理）
    pub fn blocks(&self) -> Vec<Block> {
        let mut blocks = vec![Block::new(BlockStyle::Title, &self.heading), Block::spacer()];

        for (label, value) in &self.details {
            blocks.push(Block::new(BlockStyle::Body, format!("{}: {}", label, value)));
        }
        blocks.push(Block::spacer());

        blocks.push(Block::new(BlockStyle::Heading, "Security Issues Summary"));
        if self.severity_counts.is_empty() {
            blocks.push(Block::new(
                BlockStyle::Body,
                "No security issues found. Great job!",
            ));
        } else {
            for (severity, count) in &self.severity_counts {
                blocks.push(Block::new(
                    BlockStyle::Badge(*severity),
                    format!("{}: {}", severity.as_str().to_uppercase(), count),
                ));
            }
            blocks.push(Block::spacer());

            blocks.push(Block::new(BlockStyle::Heading, "Detailed Issues"));
            for issue in &self.issues {
                blocks.push(Block::new(
                    BlockStyle::Badge(issue.severity),
                    format!(
                        "#{} [{}] {}",
                        issue.number,
                        issue.severity.as_str().to_uppercase(),
                        issue.title
                    ),
                ));
                for meta in [
                    issue.lines.clone(),
                    issue.cwe.as_ref().map(|c| format!("CWE: {}", c)),
                    issue.file_path.as_ref().map(|f| format!("File: {}", f)),
                ]
                .into_iter()
                .flatten()
                {
                    blocks.push(Block::new(BlockStyle::Muted, meta));
                }

                blocks.push(Block::new(BlockStyle::Label, "Description:"));
                blocks.push(Block::new(BlockStyle::Body, &issue.description));

                if let Some(recommendation) = &issue.recommendation {
                    blocks.push(Block::new(BlockStyle::Label, "Recommendation:"));
                    blocks.push(Block::new(BlockStyle::Body, recommendation));
                }
                if let Some(snippet) = &issue.code_snippet {
                    blocks.push(Block::new(BlockStyle::Label, "Code:"));
                    blocks.push(Block::new(BlockStyle::Code, snippet));
                }
                blocks.push(Block::spacer());
            }
        }

        if let Some(analysis) = &self.analysis {
            blocks.push(Block::new(BlockStyle::Heading, "Analysis Summary"));
            blocks.push(Block::new(BlockStyle::Body, analysis));
        }

        blocks
    }
}
