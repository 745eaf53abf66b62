use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One page of `events/search/`. Events stay raw so each can be decoded on
/// its own.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SearchPage {
    #[serde(default)]
    pub events: Vec<Value>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Pagination {
    pub page_count: u32,
    #[serde(default)]
    pub page_number: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub object_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawEvent {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: TextContent,
    #[serde(default)]
    pub description: Option<TextContent>,
    pub start: EventTime,
    pub end: EventTime,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub logo: Option<Value>,
    #[serde(default)]
    pub capacity: Option<i32>,
    #[serde(default)]
    pub is_free: bool,
    #[serde(default)]
    pub online_event: bool,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub category_id: Option<String>,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub venue_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextContent {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventTime {
    pub utc: String,
    pub local: String,
    pub timezone: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Venue {
    #[serde(deserialize_with = "coordinate")]
    pub latitude: f64,
    #[serde(deserialize_with = "coordinate")]
    pub longitude: f64,
}

impl Venue {
    /// The provider marks "no physical location" with a venue at exactly (0, 0).
    pub fn is_null_island(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CategoryList {
    #[serde(default)]
    pub categories: Vec<RawCategory>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawCategory {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Number(serde_json::Number),
    Text(String),
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Number(n) => n.to_string(),
        Scalar::Text(s) => s,
    })
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Scalar>::deserialize(deserializer)? {
        Some(Scalar::Number(n)) => Some(n.to_string()),
        Some(Scalar::Text(s)) => Some(s),
        None => None,
    })
}

fn coordinate<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Scalar::deserialize(deserializer)? {
        Scalar::Number(n) => n
            .as_f64()
            .ok_or_else(|| de::Error::custom(format!("coordinate {n} is not a float"))),
        Scalar::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid coordinate {s:?}"))),
    }
}
