use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use super::{page_offset, ReviewStore};
use crate::source::GitHubCredentials;
use crate::error::{SourceError, StoreError};
use crate::review::{RepoRef, Review, ReviewStatus, SecurityIssue, Severity};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS code_reviews (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    title TEXT NOT NULL,
    code TEXT NOT NULL,
    language TEXT NOT NULL,
    custom_prompt TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    result TEXT,
    overall_score INTEGER,
    summary TEXT,
    suggestions TEXT,
    repo_owner TEXT,
    repo_name TEXT,
    repo_branch TEXT,
    generation INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_code_reviews_user ON code_reviews(user_id, created_at);
CREATE INDEX IF NOT EXISTS idx_code_reviews_status ON code_reviews(status);

CREATE TABLE IF NOT EXISTS security_issues (
    id TEXT PRIMARY KEY NOT NULL,
    review_id TEXT NOT NULL,
    severity TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    file_path TEXT,
    line_start INTEGER,
    line_end INTEGER,
    suggestion TEXT NOT NULL,
    cwe TEXT,
    code_snippet TEXT,
    created_at TEXT NOT NULL,
    FOREIGN KEY(review_id) REFERENCES code_reviews(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_security_issues_review ON security_issues(review_id);

CREATE TABLE IF NOT EXISTS github_credentials (
    user_id TEXT PRIMARY KEY NOT NULL,
    access_token TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

const REVIEW_COLUMNS: &str = "id, user_id, title, code, language, custom_prompt, status, result, \
     overall_score, summary, suggestions, repo_owner, repo_name, repo_branch, generation, \
     created_at, updated_at, completed_at";

#[derive(Clone)]
pub struct SqliteReviewStore {
    pool: Pool<Sqlite>,
}

impl SqliteReviewStore {
    /// 连接数据库（不存在则创建），开启 WAL 和外键约束，并建表
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: Pool<Sqlite>) -> Result<Self, StoreError> {
        sqlx::query(SCHEMA).execute(&pool).await?;
        tracing::info!("Review database initialized");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// 保存用户关联的 GitHub 令牌（账号关联流程写入）
    pub async fn save_github_token(&self, user_id: Uuid, token: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO github_credentials (user_id, access_token, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                access_token = excluded.access_token,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id.to_string())
        .bind(token)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// 条件写入未命中时，区分行已删除与 generation 已变化
    async fn miss_reason(&self, id: Uuid, expected: i64) -> StoreError {
        let current: Result<Option<(i64,)>, sqlx::Error> =
            sqlx::query_as("SELECT generation FROM code_reviews WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await;

        match current {
            Ok(Some(_)) => StoreError::StaleGeneration { id, expected },
            Ok(None) => StoreError::NotFound(id),
            Err(e) => StoreError::Database(e),
        }
    }
}

#[derive(Debug, FromRow)]
struct ReviewRow {
    id: String,
    user_id: String,
    title: String,
    code: String,
    language: String,
    custom_prompt: Option<String>,
    status: String,
    result: Option<String>,
    overall_score: Option<i32>,
    summary: Option<String>,
    suggestions: Option<String>,
    repo_owner: Option<String>,
    repo_name: Option<String>,
    repo_branch: Option<String>,
    generation: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

fn parse_uuid(value: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(value).map_err(|e| StoreError::Corrupt(format!("bad id {}: {}", value, e)))
}

impl TryFrom<ReviewRow> for Review {
    type Error = StoreError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        let status = ReviewStatus::from_str(&row.status).map_err(StoreError::Corrupt)?;

        let suggestions = match row.suggestions {
            Some(raw) => Some(serde_json::from_str::<Vec<String>>(&raw).map_err(|e| {
                StoreError::Corrupt(format!("bad suggestions for review {}: {}", row.id, e))
            })?),
            None => None,
        };

        let repository = match (row.repo_owner, row.repo_name, row.repo_branch) {
            (Some(owner), Some(name), Some(branch)) => Some(RepoRef {
                owner,
                name,
                branch,
            }),
            _ => None,
        };

        Ok(Review {
            id: parse_uuid(&row.id)?,
            user_id: parse_uuid(&row.user_id)?,
            title: row.title,
            code: row.code,
            language: row.language,
            custom_prompt: row.custom_prompt,
            status,
            result: row.result,
            overall_score: row.overall_score,
            summary: row.summary,
            suggestions,
            repository,
            generation: row.generation,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct IssueRow {
    id: String,
    review_id: String,
    severity: String,
    title: String,
    description: String,
    file_path: Option<String>,
    line_start: Option<i64>,
    line_end: Option<i64>,
    suggestion: String,
    cwe: Option<String>,
    code_snippet: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<IssueRow> for SecurityIssue {
    type Error = StoreError;

    fn try_from(row: IssueRow) -> Result<Self, Self::Error> {
        Ok(SecurityIssue {
            id: parse_uuid(&row.id)?,
            review_id: parse_uuid(&row.review_id)?,
            severity: Severity::from_label(&row.severity),
            title: row.title,
            description: row.description,
            file_path: row.file_path,
            line_start: row.line_start,
            line_end: row.line_end,
            suggestion: row.suggestion,
            cwe: row.cwe,
            code_snippet: row.code_snippet,
            created_at: row.created_at,
        })
    }
}

fn suggestions_json(review: &Review) -> Result<Option<String>, StoreError> {
    review
        .suggestions
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| StoreError::Corrupt(format!("unserializable suggestions: {}", e)))
}

fn into_reviews(rows: Vec<ReviewRow>) -> Result<Vec<Review>, StoreError> {
    rows.into_iter().map(Review::try_from).collect()
}

#[async_trait]
impl ReviewStore for SqliteReviewStore {
    async fn create(&self, review: &Review) -> Result<(), StoreError> {
        let repo = review.repository.as_ref();
        sqlx::query(&format!(
            "INSERT INTO code_reviews ({}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            REVIEW_COLUMNS
        ))
        .bind(review.id.to_string())
        .bind(review.user_id.to_string())
        .bind(&review.title)
        .bind(&review.code)
        .bind(&review.language)
        .bind(&review.custom_prompt)
        .bind(review.status.as_str())
        .bind(&review.result)
        .bind(review.overall_score)
        .bind(&review.summary)
        .bind(suggestions_json(review)?)
        .bind(repo.map(|r| r.owner.clone()))
        .bind(repo.map(|r| r.name.clone()))
        .bind(repo.map(|r| r.branch.clone()))
        .bind(review.generation)
        .bind(review.created_at)
        .bind(review.updated_at)
        .bind(review.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Review, StoreError> {
        let row: Option<ReviewRow> = sqlx::query_as(&format!(
            "SELECT {} FROM code_reviews WHERE id = ?",
            REVIEW_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(StoreError::NotFound(id))?.try_into()
    }

    async fn get_by_user_id(
        &self,
        user_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Review>, u64), StoreError> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM code_reviews WHERE user_id = ?")
            .bind(user_id.to_string())
            .fetch_one(&self.pool)
            .await?;

        let rows: Vec<ReviewRow> = sqlx::query_as(&format!(
            "SELECT {} FROM code_reviews WHERE user_id = ? \
             ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            REVIEW_COLUMNS
        ))
        .bind(user_id.to_string())
        .bind(i64::from(page_size))
        .bind(page_offset(page, page_size) as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok((into_reviews(rows)?, total.max(0) as u64))
    }

    async fn update(&self, review: &Review, expected_generation: i64) -> Result<(), StoreError> {
        let repo = review.repository.as_ref();
        let outcome = sqlx::query(
            r#"
            UPDATE code_reviews SET
                title = ?, code = ?, language = ?, custom_prompt = ?, status = ?,
                result = ?, overall_score = ?, summary = ?, suggestions = ?,
                repo_owner = ?, repo_name = ?, repo_branch = ?, generation = ?,
                updated_at = ?, completed_at = ?
            WHERE id = ? AND generation = ?
            "#,
        )
        .bind(&review.title)
        .bind(&review.code)
        .bind(&review.language)
        .bind(&review.custom_prompt)
        .bind(review.status.as_str())
        .bind(&review.result)
        .bind(review.overall_score)
        .bind(&review.summary)
        .bind(suggestions_json(review)?)
        .bind(repo.map(|r| r.owner.clone()))
        .bind(repo.map(|r| r.name.clone()))
        .bind(repo.map(|r| r.branch.clone()))
        .bind(review.generation)
        .bind(review.updated_at)
        .bind(review.completed_at)
        .bind(review.id.to_string())
        .bind(expected_generation)
        .execute(&self.pool)
        .await?;

        if outcome.rows_affected() == 0 {
            return Err(self.miss_reason(review.id, expected_generation).await);
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let outcome = sqlx::query("DELETE FROM code_reviews WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if outcome.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn create_security_issue(
        &self,
        issue: &SecurityIssue,
        generation: i64,
    ) -> Result<(), StoreError> {
        let outcome = sqlx::query(
            r#"
            INSERT INTO security_issues (
                id, review_id, severity, title, description, file_path,
                line_start, line_end, suggestion, cwe, code_snippet, created_at
            )
            SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
            WHERE EXISTS (SELECT 1 FROM code_reviews WHERE id = ? AND generation = ?)
            "#,
        )
        .bind(issue.id.to_string())
        .bind(issue.review_id.to_string())
        .bind(issue.severity.as_str())
        .bind(&issue.title)
        .bind(&issue.description)
        .bind(&issue.file_path)
        .bind(issue.line_start)
        .bind(issue.line_end)
        .bind(&issue.suggestion)
        .bind(&issue.cwe)
        .bind(&issue.code_snippet)
        .bind(issue.created_at)
        .bind(issue.review_id.to_string())
        .bind(generation)
        .execute(&self.pool)
        .await?;

        if outcome.rows_affected() == 0 {
            return Err(self.miss_reason(issue.review_id, generation).await);
        }
        Ok(())
    }

    async fn get_issues_by_review_id(
        &self,
        review_id: Uuid,
    ) -> Result<Vec<SecurityIssue>, StoreError> {
        let rows: Vec<IssueRow> = sqlx::query_as(
            r#"
            SELECT id, review_id, severity, title, description, file_path,
                   line_start, line_end, suggestion, cwe, code_snippet, created_at
            FROM security_issues
            WHERE review_id = ?
            ORDER BY CASE severity
                WHEN 'critical' THEN 1
                WHEN 'high' THEN 2
                WHEN 'medium' THEN 3
                WHEN 'low' THEN 4
                ELSE 5
            END, created_at, rowid
            "#,
        )
        .bind(review_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SecurityIssue::try_from).collect()
    }

    async fn delete_issues_by_review_id(&self, review_id: Uuid) -> Result<u64, StoreError> {
        let outcome = sqlx::query("DELETE FROM security_issues WHERE review_id = ?")
            .bind(review_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(outcome.rows_affected())
    }

    async fn clear_issues(&self, review_id: Uuid, generation: i64) -> Result<u64, StoreError> {
        let outcome = sqlx::query(
            r#"
            DELETE FROM security_issues
            WHERE review_id = ?
              AND EXISTS (SELECT 1 FROM code_reviews WHERE id = ? AND generation = ?)
            "#,
        )
        .bind(review_id.to_string())
        .bind(review_id.to_string())
        .bind(generation)
        .execute(&self.pool)
        .await?;

        if outcome.rows_affected() > 0 {
            return Ok(outcome.rows_affected());
        }

        // 没有删除任何行：可能本来就没有问题，也可能 generation 不匹配
        let current: Option<(i64,)> =
            sqlx::query_as("SELECT generation FROM code_reviews WHERE id = ?")
                .bind(review_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        match current {
            Some((g,)) if g == generation => Ok(0),
            Some(_) => Err(StoreError::StaleGeneration {
                id: review_id,
                expected: generation,
            }),
            None => Err(StoreError::NotFound(review_id)),
        }
    }

    async fn get_by_status(&self, statuses: &[ReviewStatus]) -> Result<Vec<Review>, StoreError> {
        let mut reviews = Vec::new();
        for status in statuses {
            let rows: Vec<ReviewRow> = sqlx::query_as(&format!(
                "SELECT {} FROM code_reviews WHERE status = ? ORDER BY created_at",
                REVIEW_COLUMNS
            ))
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
            reviews.extend(into_reviews(rows)?);
        }
        Ok(reviews)
    }
}

#[async_trait]
impl GitHubCredentials for SqliteReviewStore {
    async fn token_for(&self, user_id: Uuid) -> Result<Option<String>, SourceError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT access_token FROM github_credentials WHERE user_id = ?")
                .bind(user_id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| SourceError::Fetch(format!("failed to load GitHub credentials: {}", e)))?;
        Ok(row.map(|(token,)| token))
    }
}
