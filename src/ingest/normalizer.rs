use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

use crate::db::{EventRecord, GeoPoint};
use crate::eventbrite::{RawEvent, Venue};

use super::venue::is_online;

pub const EVENTBRITE_DATE_FMT_UTC: &str = "%Y-%m-%dT%H:%M:%SZ";
pub const EVENTBRITE_DATE_FMT_LOCAL: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("missing field {0}")]
    MissingField(&'static str),
    #[error("invalid {field} {value:?}")]
    InvalidId { field: &'static str, value: String },
    #[error("invalid {field} timestamp {value:?}")]
    InvalidTimestamp { field: &'static str, value: String },
}

pub fn prepare_event(raw: &RawEvent, venue: Option<&Venue>) -> Result<EventRecord, NormalizeError> {
    let id = parse_id("id", &raw.id)?;
    let title = raw
        .name
        .text
        .clone()
        .ok_or(NormalizeError::MissingField("name.text"))?;
    let category_id = raw
        .category_id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| parse_id("category_id", value))
        .transpose()?;

    Ok(EventRecord {
        id,
        start_time: parse_utc("start.utc", &raw.start.utc)?,
        end_time: parse_utc("end.utc", &raw.end.utc)?,
        start_time_local: parse_local("start.local", &raw.start.local)?,
        end_time_local: parse_local("end.local", &raw.end.local)?,
        timezone: raw.start.timezone.clone(),
        location: venue.map(|venue| GeoPoint {
            longitude: venue.longitude,
            latitude: venue.latitude,
        }),
        title,
        description_text: raw.description.as_ref().and_then(|d| d.text.clone()),
        description_html: raw.description.as_ref().and_then(|d| d.html.clone()),
        url: raw.url.clone(),
        logo: raw.logo.clone().filter(|logo| !logo.is_null()),
        capacity: raw.capacity,
        is_free: raw.is_free,
        online_event: is_online(raw.online_event, venue),
        category_id,
    })
}

fn parse_id(field: &'static str, value: &str) -> Result<i64, NormalizeError> {
    value.trim().parse().map_err(|_| NormalizeError::InvalidId {
        field,
        value: value.to_string(),
    })
}

fn parse_utc(field: &'static str, value: &str) -> Result<DateTime<Utc>, NormalizeError> {
    NaiveDateTime::parse_from_str(value, EVENTBRITE_DATE_FMT_UTC)
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc)))
        .map_err(|_| NormalizeError::InvalidTimestamp {
            field,
            value: value.to_string(),
        })
}

fn parse_local(field: &'static str, value: &str) -> Result<NaiveDateTime, NormalizeError> {
    NaiveDateTime::parse_from_str(value, EVENTBRITE_DATE_FMT_LOCAL).map_err(|_| {
        NormalizeError::InvalidTimestamp {
            field,
            value: value.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde_json::json;

    use super::{NormalizeError, prepare_event};
    use crate::db::GeoPoint;
    use crate::eventbrite::RawEvent;
    use crate::ingest::testing::{raw_event_json, venue};

    fn raw_event(value: serde_json::Value) -> RawEvent {
        serde_json::from_value(value).expect("raw event")
    }

    #[test]
    fn maps_every_field_from_a_physical_event() {
        let raw = raw_event(raw_event_json("1", "So much good stuff", Some("17")));
        let venue = venue(49.333, -123.1512);

        let record = prepare_event(&raw, Some(&venue)).expect("normalizes");

        assert_eq!(record.id, 1);
        assert_eq!(record.title, "So much good stuff");
        assert_eq!(
            record.start_time,
            Utc.with_ymd_and_hms(2016, 5, 5, 1, 2, 0).unwrap()
        );
        assert_eq!(
            record.end_time_local,
            NaiveDate::from_ymd_opt(2016, 5, 4)
                .unwrap()
                .and_hms_opt(18, 7, 0)
                .unwrap()
        );
        assert_eq!(record.timezone, "America/Vancouver");
        assert_eq!(
            record.location,
            Some(GeoPoint {
                longitude: -123.1512,
                latitude: 49.333
            })
        );
        assert_eq!(record.description_html.as_deref(), Some("<p>So much good stuff</p>"));
        assert_eq!(record.capacity, Some(100));
        assert_eq!(record.category_id, Some(103));
        assert!(record.is_free);
        assert!(!record.online_event);
    }

    #[test]
    fn event_without_venue_has_no_location() {
        let mut value = raw_event_json("2", "Webinar", None);
        value["online_event"] = json!(true);
        let record = prepare_event(&raw_event(value), None).expect("normalizes");

        assert_eq!(record.location, None);
        assert!(record.online_event);
    }

    #[test]
    fn null_island_venue_marks_event_online() {
        let raw = raw_event(raw_event_json("3", "Somewhere", Some("0")));
        let record = prepare_event(&raw, Some(&venue(0.0, 0.0))).expect("normalizes");
        assert!(record.online_event);
    }

    #[test]
    fn null_category_stays_absent() {
        let mut value = raw_event_json("4", "Uncategorized", None);
        value["category_id"] = serde_json::Value::Null;
        let record = prepare_event(&raw_event(value), None).expect("normalizes");
        assert_eq!(record.category_id, None);
    }

    #[test]
    fn missing_title_is_reported() {
        let mut value = raw_event_json("5", "x", None);
        value["name"] = json!({ "html": "<b>x</b>" });
        assert_eq!(
            prepare_event(&raw_event(value), None),
            Err(NormalizeError::MissingField("name.text"))
        );
    }

    #[test]
    fn malformed_timestamp_is_reported_with_field() {
        let mut value = raw_event_json("6", "Bad clock", None);
        value["start"]["utc"] = json!("yesterday");
        match prepare_event(&raw_event(value), None) {
            Err(NormalizeError::InvalidTimestamp { field, value }) => {
                assert_eq!(field, "start.utc");
                assert_eq!(value, "yesterday");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn non_numeric_id_is_rejected() {
        let value = raw_event_json("abc", "Bad id", None);
        assert!(matches!(
            prepare_event(&raw_event(value), None),
            Err(NormalizeError::InvalidId { field: "id", .. })
        ));
    }
}
