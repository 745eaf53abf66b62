use tracing::{debug, info};

use crate::db::{Category, CategoryStore};
use crate::eventbrite::{EventSource, RawCategory};

use super::IngestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped { existing: i64 },
    Synced { upserted: usize },
}

pub async fn sync_categories(
    source: &dyn EventSource,
    store: &dyn CategoryStore,
    force: bool,
) -> Result<SyncOutcome, IngestError> {
    if !force {
        let existing = store.count_categories().await?;
        if existing > 0 {
            debug!("{} categories already stored, skipping sync", existing);
            return Ok(SyncOutcome::Skipped { existing });
        }
    }

    let categories = source
        .categories()
        .await?
        .iter()
        .map(to_category)
        .collect::<Result<Vec<_>, _>>()?;

    let upserted = store.upsert_categories(&categories).await?;
    info!("synchronized {} categories (force={})", upserted, force);
    Ok(SyncOutcome::Synced { upserted })
}

fn to_category(raw: &RawCategory) -> Result<Category, IngestError> {
    let category_id = raw
        .id
        .trim()
        .parse()
        .map_err(|_| IngestError::InvalidCategoryId(raw.id.clone()))?;
    Ok(Category::new(category_id, &raw.name))
}
