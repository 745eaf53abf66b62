use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CATEGORY_NAME_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn from_columns(longitude: Option<f64>, latitude: Option<f64>) -> Option<Self> {
        match (longitude, latitude) {
            (Some(longitude), Some(latitude)) => Some(Self {
                longitude,
                latitude,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub start_time_local: NaiveDateTime,
    pub end_time_local: NaiveDateTime,
    pub timezone: String,
    pub location: Option<GeoPoint>,
    pub title: String,
    pub description_text: Option<String>,
    pub description_html: Option<String>,
    pub url: Option<String>,
    pub logo: Option<Value>,
    pub capacity: Option<i32>,
    pub is_free: bool,
    pub online_event: bool,
    pub category_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    #[serde(flatten)]
    pub record: EventRecord,
    pub attendees: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub category_id: i64,
    pub name: String,
}

impl Category {
    pub fn new(category_id: i64, name: &str) -> Self {
        Self {
            category_id,
            name: name.chars().take(CATEGORY_NAME_MAX_CHARS).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventQuery {
    pub starts_after: Option<DateTime<Utc>>,
    pub starts_before: Option<DateTime<Utc>>,
    pub category_id: Option<i64>,
    pub limit: i64,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            starts_after: None,
            starts_before: None,
            category_id: None,
            limit: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleWrite {
    pub written: usize,
    pub skipped: usize,
}
