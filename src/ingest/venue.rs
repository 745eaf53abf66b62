use crate::eventbrite::{EventSource, EventbriteError, RawEvent, Venue};

pub async fn resolve_venue(
    source: &dyn EventSource,
    event: &RawEvent,
) -> Result<Option<Venue>, EventbriteError> {
    match event.venue_id.as_deref().map(str::trim) {
        Some(venue_id) if !venue_id.is_empty() => source.venue(venue_id).await.map(Some),
        _ => Ok(None),
    }
}

/// An event is online when the provider says so, or when its venue sits at
/// exactly latitude 0, longitude 0.
pub fn is_online(online_flag: bool, venue: Option<&Venue>) -> bool {
    online_flag || venue.is_some_and(Venue::is_null_island)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::{is_online, resolve_venue};
    use crate::eventbrite::RawEvent;
    use crate::ingest::testing::{FakeSource, raw_event_json, venue};

    #[test_case(false, None => false; "no venue and no flag")]
    #[test_case(true, None => true; "flagged without venue")]
    #[test_case(false, Some((0.0, 0.0)) => true; "null island venue")]
    #[test_case(false, Some((49.28, -123.12)) => false; "physical venue")]
    #[test_case(true, Some((49.28, -123.12)) => true; "flag wins over physical venue")]
    #[test_case(false, Some((0.0, -123.12)) => false; "zero latitude only")]
    #[test_case(false, Some((49.28, 0.0)) => false; "zero longitude only")]
    fn online_classification(flag: bool, coords: Option<(f64, f64)>) -> bool {
        let venue = coords.map(|(lat, lon)| venue(lat, lon));
        is_online(flag, venue.as_ref())
    }

    #[tokio::test]
    async fn resolves_referenced_venue() {
        let mut source = FakeSource::default();
        source.venues.insert("17".to_string(), venue(49.333, -123.1512));
        let event: RawEvent =
            serde_json::from_value(raw_event_json("1", "Talk", Some("17"))).expect("event");

        let resolved = resolve_venue(&source, &event).await.expect("venue lookup");

        assert_eq!(resolved, Some(venue(49.333, -123.1512)));
        assert_eq!(source.venue_calls(), vec!["17".to_string()]);
    }

    #[tokio::test]
    async fn skips_lookup_without_venue_reference() {
        let source = FakeSource::default();
        let event: RawEvent =
            serde_json::from_value(raw_event_json("1", "Talk", None)).expect("event");

        let resolved = resolve_venue(&source, &event).await.expect("no lookup");

        assert_eq!(resolved, None);
        assert!(source.venue_calls().is_empty());
    }

    #[tokio::test]
    async fn lookup_failure_propagates() {
        let source = FakeSource::default();
        let event: RawEvent =
            serde_json::from_value(raw_event_json("1", "Talk", Some("404"))).expect("event");

        assert!(resolve_venue(&source, &event).await.is_err());
    }
}
