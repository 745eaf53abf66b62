use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::DatabaseError;
use super::models::{Category, CycleWrite, EventQuery, EventRecord, StoredEvent};
use crate::config::FailurePolicy;

#[async_trait]
pub trait CategoryStore: Send + Sync {
    async fn count_categories(&self) -> Result<i64, DatabaseError>;
    async fn upsert_categories(&self, categories: &[Category]) -> Result<usize, DatabaseError>;
    async fn list_categories(&self) -> Result<Vec<Category>, DatabaseError>;
    async fn find_category_by_name(&self, name: &str) -> Result<Option<Category>, DatabaseError>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn write_cycle(
        &self,
        records: Vec<EventRecord>,
        policy: FailurePolicy,
    ) -> Result<CycleWrite, DatabaseError>;
    async fn get_event(&self, id: i64) -> Result<Option<StoredEvent>, DatabaseError>;
    async fn count_events(&self) -> Result<i64, DatabaseError>;
    async fn list_events(&self, query: &EventQuery) -> Result<Vec<StoredEvent>, DatabaseError>;
    async fn delete_events_ended_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, DatabaseError>;
}
