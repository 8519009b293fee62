// Report module - 对外输出
// JSON 投影、分页信封，以及可打印报告 / PDF 导出

pub mod document;
pub mod pdf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::review::{Review, ReviewStatus, SecurityIssue};

pub use document::{build_report, Block, BlockStyle, ReportDocument, ReportIssue};
pub use pdf::render_pdf;

/// 评审的对外 JSON 形态，前端依赖其结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub code: String,
    pub language: String,
    pub status: ReviewStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_issues: Vec<SecurityIssue>,
    pub overall_score: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ReviewResponse {
    pub fn new(review: Review, security_issues: Vec<SecurityIssue>) -> Self {
        Self {
            id: review.id,
            user_id: review.user_id,
            title: review.title,
            code: review.code,
            language: review.language,
            status: review.status,
            result: review.result,
            custom_prompt: review.custom_prompt,
            security_issues,
            overall_score: review.overall_score.unwrap_or(0),
            summary: review.summary.unwrap_or_default(),
            suggestions: review.suggestions.unwrap_or_default(),
            created_at: review.created_at,
            completed_at: review.completed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewListResponse {
    pub reviews: Vec<ReviewResponse>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u64,
}

impl ReviewListResponse {
    pub fn new(reviews: Vec<ReviewResponse>, total: u64, page: u32, page_size: u32) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            total.div_ceil(u64::from(page_size))
        };
        Self {
            reviews,
            total,
            page,
            page_size,
            total_pages,
        }
    }
}
