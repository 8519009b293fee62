use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{page_offset, ReviewStore};
use crate::error::StoreError;
use crate::review::{Review, ReviewStatus, SecurityIssue};

#[derive(Default)]
struct Tables {
    // 插入序号用于同一时间戳下的稳定排序
    reviews: HashMap<Uuid, (u64, Review)>,
    issues: HashMap<Uuid, Vec<SecurityIssue>>,
    next_seq: u64,
}

impl Tables {
    fn check_generation(&self, id: Uuid, expected: i64) -> Result<(), StoreError> {
        match self.reviews.get(&id) {
            None => Err(StoreError::NotFound(id)),
            Some((_, stored)) if stored.generation != expected => {
                Err(StoreError::StaleGeneration { id, expected })
            }
            Some(_) => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct InMemoryReviewStore {
    tables: RwLock<Tables>,
}

impl InMemoryReviewStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReviewStore for InMemoryReviewStore {
    async fn create(&self, review: &Review) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.reviews.contains_key(&review.id) {
            return Err(StoreError::Corrupt(format!(
                "review {} already exists",
                review.id
            )));
        }
        let seq = tables.next_seq;
        tables.next_seq += 1;
        tables.reviews.insert(review.id, (seq, review.clone()));
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Review, StoreError> {
        let tables = self.tables.read().await;
        tables
            .reviews
            .get(&id)
            .map(|(_, review)| review.clone())
            .ok_or(StoreError::NotFound(id))
    }

    async fn get_by_user_id(
        &self,
        user_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Review>, u64), StoreError> {
        let tables = self.tables.read().await;
        let mut owned: Vec<&(u64, Review)> = tables
            .reviews
            .values()
            .filter(|(_, review)| review.user_id == user_id)
            .collect();
        owned.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| seq_b.cmp(seq_a))
        });

        let total = owned.len() as u64;
        let offset = page_offset(page, page_size) as usize;
        let reviews = owned
            .into_iter()
            .skip(offset)
            .take(page_size as usize)
            .map(|(_, review)| review.clone())
            .collect();
        Ok((reviews, total))
    }

    async fn update(&self, review: &Review, expected_generation: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.check_generation(review.id, expected_generation)?;
        if let Some((_, stored)) = tables.reviews.get_mut(&review.id) {
            let created_at = stored.created_at;
            *stored = review.clone();
            stored.created_at = created_at;
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.reviews.remove(&id).is_none() {
            return Err(StoreError::NotFound(id));
        }
        tables.issues.remove(&id);
        Ok(())
    }

    async fn create_security_issue(
        &self,
        issue: &SecurityIssue,
        generation: i64,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.check_generation(issue.review_id, generation)?;
        tables
            .issues
            .entry(issue.review_id)
            .or_default()
            .push(issue.clone());
        Ok(())
    }

    async fn get_issues_by_review_id(
        &self,
        review_id: Uuid,
    ) -> Result<Vec<SecurityIssue>, StoreError> {
        let tables = self.tables.read().await;
        let mut issues = tables.issues.get(&review_id).cloned().unwrap_or_default();
        issues.sort_by(|a, b| {
            a.severity
                .rank()
                .cmp(&b.severity.rank())
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(issues)
    }

    async fn delete_issues_by_review_id(&self, review_id: Uuid) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .issues
            .remove(&review_id)
            .map(|issues| issues.len() as u64)
            .unwrap_or(0))
    }

    async fn clear_issues(&self, review_id: Uuid, generation: i64) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        tables.check_generation(review_id, generation)?;
        Ok(tables
            .issues
            .remove(&review_id)
            .map(|issues| issues.len() as u64)
            .unwrap_or(0))
    }

    async fn get_by_status(&self, statuses: &[ReviewStatus]) -> Result<Vec<Review>, StoreError> {
        let tables = self.tables.read().await;
        let mut matching: Vec<&(u64, Review)> = tables
            .reviews
            .values()
            .filter(|(_, review)| statuses.contains(&review.status))
            .collect();
        matching.sort_by_key(|(seq, _)| *seq);
        Ok(matching.into_iter().map(|(_, r)| r.clone()).collect())
    }
}
