use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use tracing::info;

use crate::db::EventStore;

use super::IngestError;

pub fn staleness_cutoff(today: NaiveDate, stale_event_days: u32) -> DateTime<Utc> {
    today
        .checked_sub_days(Days::new(u64::from(stale_event_days)))
        .unwrap_or(NaiveDate::MIN)
        .and_time(NaiveTime::MIN)
        .and_utc()
}

pub async fn clear_old_events(
    store: &dyn EventStore,
    stale_event_days: u32,
    today: NaiveDate,
) -> Result<usize, IngestError> {
    let cutoff = staleness_cutoff(today, stale_event_days);
    let deleted = store.delete_events_ended_before(cutoff).await?;
    info!("removed {} events that ended before {}", deleted, cutoff);
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    use super::{clear_old_events, staleness_cutoff};
    use crate::config::FailurePolicy;
    use crate::db::sqlite::tests::{event_record, sqlite_manager};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn cutoff_is_midnight_of_the_stale_day() {
        assert_eq!(
            staleness_cutoff(day(2016, 5, 6), 0),
            Utc.with_ymd_and_hms(2016, 5, 6, 0, 0, 0).unwrap()
        );
        assert_eq!(
            staleness_cutoff(day(2016, 5, 6), 5),
            Utc.with_ymd_and_hms(2016, 5, 1, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn zero_days_clears_everything_that_ended_before_today() {
        let (_file, manager) = sqlite_manager().await;
        let store = manager.event_store();

        let ended_yesterday = event_record(1, "Yesterday");
        let mut ends_today = event_record(2, "Today");
        ends_today.end_time = Utc.with_ymd_and_hms(2016, 5, 6, 0, 0, 0).unwrap();
        let mut upcoming = event_record(3, "Tomorrow");
        upcoming.start_time = Utc.with_ymd_and_hms(2016, 5, 7, 1, 0, 0).unwrap();
        upcoming.end_time = upcoming.start_time + Duration::hours(2);
        store
            .write_cycle(vec![ended_yesterday, ends_today, upcoming], FailurePolicy::FailFast)
            .await
            .expect("seed events");

        let deleted = clear_old_events(store.as_ref(), 0, day(2016, 5, 6))
            .await
            .expect("sweep");

        assert_eq!(deleted, 1);
        assert!(store.get_event(1).await.expect("query").is_none());
        assert!(store.get_event(2).await.expect("query").is_some());
        assert!(store.get_event(3).await.expect("query").is_some());

        let deleted = clear_old_events(store.as_ref(), 0, day(2016, 5, 6))
            .await
            .expect("second sweep");
        assert_eq!(deleted, 0);
    }

    #[tokio::test]
    async fn retention_window_keeps_recent_events() {
        let (_file, manager) = sqlite_manager().await;
        let store = manager.event_store();
        store
            .write_cycle(vec![event_record(1, "Recent")], FailurePolicy::FailFast)
            .await
            .expect("seed");

        let deleted = clear_old_events(store.as_ref(), 5, day(2016, 5, 6))
            .await
            .expect("sweep");

        assert_eq!(deleted, 0);
        assert_eq!(store.count_events().await.expect("count"), 1);
    }
}
