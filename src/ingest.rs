mod categories;
mod fetcher;
mod normalizer;
mod sweeper;
mod venue;

pub use self::categories::{SyncOutcome, sync_categories};
pub use self::fetcher::{FetchSettings, FetchSummary, fetch_events};
pub use self::normalizer::NormalizeError;
pub use self::sweeper::clear_old_events;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::eventbrite::EventbriteError;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Upstream(#[from] EventbriteError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("malformed event record: {0}")]
    MalformedRecord(#[from] serde_json::Error),
    #[error("event {id}: {source}")]
    Normalize {
        id: String,
        source: NormalizeError,
    },
    #[error("category id {0:?} is not numeric")]
    InvalidCategoryId(String),
}
