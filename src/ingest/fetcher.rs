use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{Config, FailurePolicy};
use crate::db::{DatabaseManager, EventRecord};
use crate::eventbrite::{EventSource, RawEvent, SearchPage, SearchQuery};

use super::{IngestError, categories::sync_categories, normalizer::prepare_event, venue::resolve_venue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSettings {
    pub page_cap: u32,
    pub failure_policy: FailurePolicy,
}

impl FetchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_cap: config.eventbrite.event_pages,
            failure_policy: config.collection.failure_policy,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchSummary {
    pub pages_available: u32,
    pub pages_fetched: u32,
    pub events_seen: usize,
    pub events_written: usize,
    pub events_skipped: usize,
    pub last_page: SearchPage,
}

pub fn pages_to_fetch(page_count: u32, page_cap: u32) -> u32 {
    page_count.min(page_cap)
}

pub async fn fetch_events(
    source: &dyn EventSource,
    db: &DatabaseManager,
    query: &SearchQuery,
    settings: FetchSettings,
) -> Result<FetchSummary, IngestError> {
    info!(
        "fetch cycle starting lat={} lon={} radius={}",
        query.latitude, query.longitude, query.radius
    );
    sync_categories(source, db.category_store().as_ref(), false).await?;

    let mut current = source.search(query, 1).await?;
    let mut pages_fetched = 1;
    let pages_available = current.pagination.page_count;
    let page_limit = pages_to_fetch(pages_available, settings.page_cap);
    if pages_available > settings.page_cap {
        info!(
            "upstream reports {} pages, capping at {}",
            pages_available, settings.page_cap
        );
    }

    let mut records = Vec::new();
    let mut events_seen = 0;
    let mut events_skipped = 0;

    for page in 1..=page_limit {
        if page > 1 {
            current = source.search(query, page).await?;
            pages_fetched += 1;
        }
        debug!("page {}/{} has {} events", page, page_limit, current.events.len());

        for raw in &current.events {
            events_seen += 1;
            match prepare_record(source, raw).await {
                Ok(record) => records.push(record),
                Err(e) => match settings.failure_policy {
                    FailurePolicy::FailFast => return Err(e),
                    FailurePolicy::Skip => {
                        warn!("skipping event on page {}: {}", page, e);
                        events_skipped += 1;
                    }
                },
            }
        }
    }

    let written = db
        .event_store()
        .write_cycle(records, settings.failure_policy)
        .await?;

    let summary = FetchSummary {
        pages_available,
        pages_fetched,
        events_seen,
        events_written: written.written,
        events_skipped: events_skipped + written.skipped,
        last_page: current,
    };
    info!(
        "fetch cycle complete pages={}/{} seen={} written={} skipped={}",
        summary.pages_fetched,
        summary.pages_available,
        summary.events_seen,
        summary.events_written,
        summary.events_skipped
    );
    Ok(summary)
}

async fn prepare_record(source: &dyn EventSource, raw: &Value) -> Result<EventRecord, IngestError> {
    let event = RawEvent::deserialize(raw)?;
    let venue = resolve_venue(source, &event).await?;
    prepare_event(&event, venue.as_ref()).map_err(|source| IngestError::Normalize {
        id: event.id.clone(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{FetchSettings, fetch_events, pages_to_fetch};
    use crate::config::FailurePolicy;
    use crate::db::{Category, GeoPoint};
    use crate::db::sqlite::tests::{seed_attendees, sqlite_manager};
    use crate::ingest::IngestError;
    use crate::ingest::testing::{FakeSource, raw_category, raw_event_json, search_query, venue};

    fn settings(page_cap: u32, failure_policy: FailurePolicy) -> FetchSettings {
        FetchSettings {
            page_cap,
            failure_policy,
        }
    }

    // Five events: three at real venues, one at (0, 0), one without a venue.
    fn five_event_source() -> FakeSource {
        let mut webinar = raw_event_json("5", "Webinar", None);
        webinar["online_event"] = json!(true);
        let mut source = FakeSource {
            page_count: 1,
            categories: vec![raw_category("103", "Music")],
            ..FakeSource::default()
        };
        source.pages.insert(
            1,
            vec![
                raw_event_json("1", "So much good stuff", Some("17")),
                raw_event_json("2", "Jazz night", Some("18")),
                raw_event_json("3", "Choir", Some("17")),
                raw_event_json("4", "Streamed gig", Some("0")),
                webinar,
            ],
        );
        for (day, event) in (5u32..).zip(source.pages.get_mut(&1).expect("page 1")) {
            event["start"]["utc"] = json!(format!("2016-05-{day:02}T01:02:00Z"));
            event["start"]["local"] = json!(format!("2016-05-{:02}T18:02:00", day - 1));
            event["end"]["utc"] = json!(format!("2016-05-{day:02}T03:30:00Z"));
            event["end"]["local"] = json!(format!("2016-05-{:02}T20:30:00", day - 1));
        }
        source.venues.insert("17".to_string(), venue(49.333, -123.1512));
        source.venues.insert("18".to_string(), venue(49.2827, -123.1207));
        source.venues.insert("0".to_string(), venue(0.0, 0.0));
        source
    }

    #[test]
    fn page_walk_respects_the_cap() {
        assert_eq!(pages_to_fetch(100, 40), 40);
        assert_eq!(pages_to_fetch(3, 40), 3);
        assert_eq!(pages_to_fetch(0, 40), 0);
    }

    #[tokio::test]
    async fn ingests_fixture_into_store() {
        let (_file, manager) = sqlite_manager().await;
        manager
            .category_store()
            .upsert_categories(&[Category::new(103, "Music")])
            .await
            .expect("seed categories");
        let source = five_event_source();

        let summary = fetch_events(
            &source,
            &manager,
            &search_query(),
            settings(40, FailurePolicy::FailFast),
        )
        .await
        .expect("fetch");

        assert_eq!(summary.pages_fetched, 1);
        assert_eq!(summary.events_seen, 5);
        assert_eq!(summary.events_written, 5);
        assert_eq!(summary.events_skipped, 0);
        assert_eq!(source.category_calls(), 0);

        let store = manager.event_store();
        assert_eq!(store.count_events().await.expect("count"), 5);

        let at = |longitude, latitude| Some(GeoPoint { longitude, latitude });
        let expected = [
            (1, "So much good stuff", at(-123.1512, 49.333), false),
            (2, "Jazz night", at(-123.1207, 49.2827), false),
            (3, "Choir", at(-123.1512, 49.333), false),
            (4, "Streamed gig", at(0.0, 0.0), true),
            (5, "Webinar", None, true),
        ];
        for (id, title, location, online) in expected {
            let day = 4 + id as u32;
            let event = store.get_event(id).await.expect("query").expect("stored");
            assert_eq!(event.record.title, title, "event {id}");
            assert_eq!(
                event.record.start_time,
                Utc.with_ymd_and_hms(2016, 5, day, 1, 2, 0).unwrap(),
                "event {id}"
            );
            assert_eq!(
                event.record.end_time,
                Utc.with_ymd_and_hms(2016, 5, day, 3, 30, 0).unwrap(),
                "event {id}"
            );
            assert_eq!(event.record.location, location, "event {id}");
            assert_eq!(event.record.online_event, online, "event {id}");
            assert_eq!(event.record.category_id, Some(103), "event {id}");
            assert!(event.attendees.is_empty(), "event {id}");
        }
        assert_eq!(source.venue_calls(), vec!["17", "18", "17", "0"]);
    }

    #[tokio::test]
    async fn syncs_categories_into_an_empty_store_first() {
        let (_file, manager) = sqlite_manager().await;
        let source = five_event_source();

        fetch_events(
            &source,
            &manager,
            &search_query(),
            settings(40, FailurePolicy::FailFast),
        )
        .await
        .expect("fetch");

        assert_eq!(source.category_calls(), 1);
        assert_eq!(manager.event_store().count_events().await.expect("count"), 5);
    }

    #[tokio::test]
    async fn requests_exactly_capped_page_count() {
        let (_file, manager) = sqlite_manager().await;
        let mut source = FakeSource {
            page_count: 100,
            categories: vec![raw_category("103", "Music")],
            ..FakeSource::default()
        };
        for page in 1..=100u32 {
            source
                .pages
                .insert(page, vec![raw_event_json(&page.to_string(), "Paged", None)]);
        }

        let summary = fetch_events(
            &source,
            &manager,
            &search_query(),
            settings(40, FailurePolicy::FailFast),
        )
        .await
        .expect("fetch");

        assert_eq!(source.searched_pages(), (1..=40).collect::<Vec<u32>>());
        assert_eq!(summary.pages_available, 100);
        assert_eq!(summary.pages_fetched, 40);
        assert_eq!(summary.events_written, 40);
        assert_eq!(summary.last_page.pagination.page_number, Some(40));
        assert_eq!(manager.event_store().count_events().await.expect("count"), 40);
    }

    #[tokio::test]
    async fn refetch_updates_fields_and_keeps_attendees() {
        let (file, manager) = sqlite_manager().await;
        let mut source = five_event_source();

        fetch_events(&source, &manager, &search_query(), settings(40, FailurePolicy::FailFast))
            .await
            .expect("first fetch");
        seed_attendees(&file, 1, &["alice", "bob"]);

        source.pages.get_mut(&1).expect("page 1")[0]["name"]["text"] =
            json!("So much MORE good stuff!");
        fetch_events(&source, &manager, &search_query(), settings(40, FailurePolicy::FailFast))
            .await
            .expect("second fetch");

        let store = manager.event_store();
        assert_eq!(store.count_events().await.expect("count"), 5);
        let event = store.get_event(1).await.expect("query").expect("event 1");
        assert_eq!(event.record.title, "So much MORE good stuff!");
        assert_eq!(event.attendees, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[tokio::test]
    async fn fail_fast_writes_nothing_when_a_venue_lookup_fails() {
        let (_file, manager) = sqlite_manager().await;
        let mut source = five_event_source();
        source
            .pages
            .get_mut(&1)
            .expect("page 1")
            .push(raw_event_json("6", "Lost venue", Some("404")));

        let err = fetch_events(
            &source,
            &manager,
            &search_query(),
            settings(40, FailurePolicy::FailFast),
        )
        .await
        .expect_err("venue failure aborts");

        assert!(matches!(err, IngestError::Upstream(_)), "got {err}");
        assert_eq!(manager.event_store().count_events().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn skip_policy_drops_bad_records_and_keeps_the_rest() {
        let (_file, manager) = sqlite_manager().await;
        let mut source = five_event_source();
        let page = source.pages.get_mut(&1).expect("page 1");
        page.push(raw_event_json("6", "Lost venue", Some("404")));
        page.push(json!({ "id": "7", "name": "not an object" }));

        let summary = fetch_events(
            &source,
            &manager,
            &search_query(),
            settings(40, FailurePolicy::Skip),
        )
        .await
        .expect("fetch with skips");

        assert_eq!(summary.events_seen, 7);
        assert_eq!(summary.events_written, 5);
        assert_eq!(summary.events_skipped, 2);
        assert_eq!(manager.event_store().count_events().await.expect("count"), 5);
    }

    #[tokio::test]
    async fn empty_search_makes_one_request() {
        let (_file, manager) = sqlite_manager().await;
        let source = FakeSource {
            page_count: 0,
            categories: vec![raw_category("103", "Music")],
            ..FakeSource::default()
        };

        let summary = fetch_events(
            &source,
            &manager,
            &search_query(),
            settings(40, FailurePolicy::FailFast),
        )
        .await
        .expect("fetch");

        assert_eq!(source.searched_pages(), vec![1]);
        assert_eq!(summary.events_seen, 0);
        assert_eq!(summary.events_written, 0);
    }
}
