pub mod types;

pub use self::types::{CategoryList, RawCategory, RawEvent, SearchPage, Venue};

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::{CollectionConfig, EventbriteConfig};

#[derive(Debug, Error)]
pub enum EventbriteError {
    #[error("EVENTBRITE_APP_KEY is not configured")]
    MissingAppKey,
    #[error("invalid eventbrite url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("invalid venue id {0:?}")]
    InvalidVenueId(String),
    #[error("eventbrite request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("eventbrite returned {status} for {path}: {body}")]
    Status {
        status: u16,
        path: String,
        body: String,
    },
    #[error("failed to decode eventbrite response from {path}: {source}")]
    Decode {
        path: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub radius: String,
    pub extra_params: BTreeMap<String, String>,
}

impl SearchQuery {
    pub fn from_config(collection: &CollectionConfig, eventbrite: &EventbriteConfig) -> Self {
        Self {
            latitude: collection.latitude,
            longitude: collection.longitude,
            radius: collection.radius.clone(),
            extra_params: eventbrite.extra_params.clone(),
        }
    }
}

/// The upstream event provider. Pages are 1-based.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn search(&self, query: &SearchQuery, page: u32) -> Result<SearchPage, EventbriteError>;

    async fn venue(&self, venue_id: &str) -> Result<Venue, EventbriteError>;

    async fn categories(&self) -> Result<Vec<RawCategory>, EventbriteError>;
}

pub struct EventbriteClient {
    client: Client,
    base_url: Url,
    app_key: SecretString,
}

impl EventbriteClient {
    pub fn new(config: &EventbriteConfig) -> Result<Self, EventbriteError> {
        let app_key = config
            .app_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(EventbriteError::MissingAppKey)?;

        let mut api_url = config.api_url.clone();
        if !api_url.ends_with('/') {
            api_url.push('/');
        }
        let base_url = Url::parse(&api_url)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url,
            app_key: SecretString::from(app_key.to_string()),
        })
    }

    fn search_url(&self, query: &SearchQuery, page: u32) -> Result<Url, EventbriteError> {
        let mut url = self.base_url.join("events/search/")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("location.latitude", &query.latitude.to_string());
            pairs.append_pair("location.longitude", &query.longitude.to_string());
            pairs.append_pair("location.within", &query.radius);
            for (key, value) in &query.extra_params {
                pairs.append_pair(key, value);
            }
            pairs.append_pair("page", &page.to_string());
        }
        Ok(url)
    }

    fn venue_url(&self, venue_id: &str) -> Result<Url, EventbriteError> {
        if matches!(venue_id.trim(), "" | "." | "..") {
            return Err(EventbriteError::InvalidVenueId(venue_id.to_string()));
        }
        let mut url = self.base_url.join("venues/")?;
        url.path_segments_mut()
            .map_err(|_| EventbriteError::InvalidVenueId(venue_id.to_string()))?
            .pop_if_empty()
            .push(venue_id)
            .push("");
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, EventbriteError> {
        let path = url.path().to_string();
        debug!("eventbrite GET {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(self.app_key.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EventbriteError::Status {
                status: status.as_u16(),
                path,
                body,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|source| EventbriteError::Decode { path, source })
    }
}

#[async_trait]
impl EventSource for EventbriteClient {
    async fn search(&self, query: &SearchQuery, page: u32) -> Result<SearchPage, EventbriteError> {
        let url = self.search_url(query, page)?;
        self.get_json(url).await
    }

    async fn venue(&self, venue_id: &str) -> Result<Venue, EventbriteError> {
        let url = self.venue_url(venue_id)?;
        self.get_json(url).await
    }

    async fn categories(&self) -> Result<Vec<RawCategory>, EventbriteError> {
        let url = self.base_url.join("categories/")?;
        let list: CategoryList = self.get_json(url).await?;
        Ok(list.categories)
    }
}
