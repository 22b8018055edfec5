//! Radarr/Sonarr v3 API client
//!
//! Features:
//! - `X-Api-Key` authentication
//! - Paged reads of the wanted lists with a per-list cap
//! - Retry with exponential backoff for list reads
//! - Rate limiting of search commands with governor

use std::num::NonZeroU32;

use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::{ClientError, MediaServerClient};
use crate::config::ClientConfig;
use crate::models::{Item, ServerRef, ServerType};
use crate::utils::retry::{with_retry_if, RetryConfig};
use crate::utils::truncate_text;

const API_KEY_HEADER: &str = "X-Api-Key";
const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Clone, Copy)]
enum WantedList {
    Missing,
    Cutoff,
}

impl WantedList {
    fn path(self) -> &'static str {
        match self {
            Self::Missing => "api/v3/wanted/missing",
            Self::Cutoff => "api/v3/wanted/cutoff",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PagedResponse {
    #[serde(default)]
    total_records: u64,
    #[serde(default)]
    records: Vec<WantedRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WantedRecord {
    id: i64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    season_number: Option<i32>,
    #[serde(default)]
    episode_number: Option<i32>,
    #[serde(default)]
    series: Option<SeriesRecord>,
}

#[derive(Debug, Deserialize)]
struct SeriesRecord {
    #[serde(default)]
    title: Option<String>,
}

impl WantedRecord {
    fn into_item(self, server_type: ServerType) -> Item {
        let title = self.title.unwrap_or_default();
        let display = match server_type {
            ServerType::Radarr => match self.year {
                Some(year) if year > 0 => format!("{title} ({year})"),
                _ => title,
            },
            ServerType::Sonarr => {
                let series = self
                    .series
                    .and_then(|s| s.title)
                    .unwrap_or_else(|| String::from("Unknown Series"));
                format!(
                    "{series} - S{:02}E{:02} - {title}",
                    self.season_number.unwrap_or(0),
                    self.episode_number.unwrap_or(0)
                )
            }
        };
        Item::new(self.id, display)
    }
}

/// Client for one Radarr or Sonarr server
pub struct ArrClient {
    server: ServerRef,
    base_url: Url,
    api_key: String,
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    retry: RetryConfig,
    page_size: usize,
    max_items: usize,
}

impl ArrClient {
    /// Create a client for `server` rooted at `base_url`
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidUrl` for an unparsable base URL and
    /// `ClientError::Http` if the HTTP client cannot be built.
    pub fn new(
        server: ServerRef,
        base_url: &str,
        api_key: impl Into<String>,
        settings: &ClientConfig,
        searches_per_second: u32,
    ) -> Result<Self, ClientError> {
        let base_url = normalize_base_url(base_url)?;

        let client = Client::builder()
            .timeout(settings.request_timeout())
            .gzip(true)
            .user_agent(settings.user_agent.as_str())
            .build()?;

        let rate = NonZeroU32::new(searches_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            server,
            base_url,
            api_key: api_key.into(),
            client,
            rate_limiter,
            retry: RetryConfig::new(settings.max_retries),
            page_size: settings.page_size.max(1),
            max_items: settings.max_items_per_list,
        })
    }

    /// Override the backoff used for list reads
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn server(&self) -> &ServerRef {
        &self.server
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))
    }

    async fn fetch_wanted(&self, list: WantedList) -> Result<Vec<Item>, ClientError> {
        let mut items = Vec::new();
        let mut page: u64 = 1;

        while items.len() < self.max_items {
            let response = with_retry_if(
                &self.retry,
                || self.fetch_page(list, page),
                ClientError::is_recoverable,
            )
            .await?;

            let fetched = response.records.len();
            let remaining = self.max_items - items.len();
            items.extend(
                response
                    .records
                    .into_iter()
                    .take(remaining)
                    .map(|r| r.into_item(self.server.server_type)),
            );

            let seen = page * self.page_size as u64;
            if fetched == 0 || seen >= response.total_records {
                break;
            }
            page += 1;
        }

        tracing::debug!(
            server = %self.server.name,
            list = ?list,
            count = items.len(),
            "Fetched wanted list"
        );
        Ok(items)
    }

    async fn fetch_page(&self, list: WantedList, page: u64) -> Result<PagedResponse, ClientError> {
        let url = self.endpoint(list.path())?;

        let mut query = vec![
            ("page", page.to_string()),
            ("pageSize", self.page_size.to_string()),
            ("monitored", String::from("true")),
        ];
        if self.server.server_type == ServerType::Sonarr {
            query.push(("includeSeries", String::from("true")));
        }

        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(&query)
            .send()
            .await?;

        check_status(response)
            .await?
            .json::<PagedResponse>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }
}

#[async_trait]
impl MediaServerClient for ArrClient {
    async fn get_missing(&self) -> Result<Vec<Item>, ClientError> {
        self.fetch_wanted(WantedList::Missing).await
    }

    async fn get_cutoff_unmet(&self) -> Result<Vec<Item>, ClientError> {
        self.fetch_wanted(WantedList::Cutoff).await
    }

    async fn trigger_search(&self, item: &Item) -> Result<(), ClientError> {
        self.rate_limiter.until_ready().await;

        let body = match self.server.server_type {
            ServerType::Radarr => json!({ "name": "MoviesSearch", "movieIds": [item.id] }),
            ServerType::Sonarr => json!({ "name": "EpisodeSearch", "episodeIds": [item.id] }),
        };

        let response = self
            .client
            .post(self.endpoint("api/v3/command")?)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await?;
        check_status(response).await?;

        tracing::debug!(server = %self.server.name, item_id = item.id, "Search command accepted");
        Ok(())
    }
}

impl std::fmt::Debug for ArrClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrClient")
            .field("server", &self.server)
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

fn normalize_base_url(base_url: &str) -> Result<Url, ClientError> {
    let mut normalized = base_url.trim().trim_end_matches('/').to_string();
    normalized.push('/');
    Url::parse(&normalized).map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))
}

async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(ClientError::Unauthorized);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ClientError::status(
        status.as_u16(),
        truncate_text(body.trim(), MAX_ERROR_BODY_CHARS),
    ))
}
