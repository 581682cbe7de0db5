//! Video search.
//!
//! [`YouTubeSearch`] queries the YouTube Data API `search` endpoint.
//! [`CachedVideoSearch`] wraps any [`VideoSearch`] with a [`VideoSearchCache`]
//! keyed by the normalized query.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::{GatewayError, Result};

/// A single search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoResult {
    /// YouTube video id.
    pub video_id: String,
    /// Video title.
    pub title: String,
    /// Video description.
    pub description: String,
    /// Channel name.
    pub channel_title: String,
    /// Medium-size thumbnail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// Watch URL.
    pub url: String,
}

impl VideoResult {
    /// Creates a result with a watch URL derived from `video_id`.
    #[must_use]
    pub fn new(video_id: impl Into<String>, title: impl Into<String>) -> Self {
        let video_id = video_id.into();
        Self {
            url: format!("https://www.youtube.com/watch?v={video_id}"),
            video_id,
            title: title.into(),
            description: String::new(),
            channel_title: String::new(),
            thumbnail_url: None,
        }
    }
}

/// Resolves a search query to videos.
#[async_trait]
pub trait VideoSearch: Send + Sync {
    /// Searches for videos matching `query`.
    async fn search(&self, query: &str) -> Result<Vec<VideoResult>>;
}

/// Lower-cases, trims and collapses internal whitespace.
///
/// ```
/// use coursegen_gateway::normalize_query;
///
/// assert_eq!(normalize_query("  Rust   Ownership\tBasics "), "rust ownership basics");
/// ```
#[must_use]
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// ============================================================================
// Configuration
// ============================================================================

fn default_base_url() -> String {
    "https://www.googleapis.com/youtube/v3".to_string()
}

const fn default_max_results() -> u32 {
    5
}

const fn default_cache_ttl_secs() -> u64 {
    3600
}

const fn default_cache_capacity() -> usize {
    100
}

const fn default_timeout_secs() -> u64 {
    10
}

/// Settings for [`YouTubeSearch`] and its cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YouTubeConfig {
    /// API key. Usually supplied through `YOUTUBE_API_KEY`.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// API root, without a trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Results requested per query.
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// Seconds a cached result stays fresh.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Maximum cached queries.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Per-request HTTP timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            max_results: default_max_results(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_capacity: default_cache_capacity(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl YouTubeConfig {
    /// Returns `true` if an API key is present.
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|key| !key.trim().is_empty())
    }
}

// ============================================================================
// YouTube Client
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: Option<ItemId>,
    snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemId {
    video_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    channel_title: String,
    thumbnails: Option<Thumbnails>,
}

#[derive(Debug, Deserialize)]
struct Thumbnails {
    medium: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

impl SearchItem {
    fn into_result(self) -> Option<VideoResult> {
        let video_id = self.id?.video_id?;
        let snippet = self.snippet.unwrap_or_default();
        let mut result = VideoResult::new(video_id, snippet.title);
        result.description = snippet.description;
        result.channel_title = snippet.channel_title;
        result.thumbnail_url = snippet
            .thumbnails
            .and_then(|thumbnails| thumbnails.medium)
            .map(|thumbnail| thumbnail.url);
        Some(result)
    }
}

/// Client for the YouTube Data API v3 `search` endpoint.
#[derive(Debug, Clone)]
pub struct YouTubeSearch {
    client: Client,
    config: YouTubeConfig,
    api_key: String,
}

impl YouTubeSearch {
    /// Creates a client. Fails when no API key is configured.
    pub fn new(config: YouTubeConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(GatewayError::NotConfigured {
                service: "video search",
                hint: "set YOUTUBE_API_KEY or videoSearch.apiKey in coursegen.json",
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Client(e.to_string()))?;

        Ok(Self {
            client,
            config,
            api_key,
        })
    }
}

#[async_trait]
impl VideoSearch for YouTubeSearch {
    #[instrument(skip(self))]
    async fn search(&self, query: &str) -> Result<Vec<VideoResult>> {
        let url = format!("{}/search", self.config.base_url.trim_end_matches('/'));
        let max_results = self.config.max_results.to_string();

        let response = self
            .client
            .get(url)
            .query(&[
                ("part", "snippet"),
                ("type", "video"),
                ("maxResults", max_results.as_str()),
                ("q", query),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| GatewayError::api(format!("video search request failed: {e}"), None))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::api(
                format!("video search returned {status}"),
                Some(status.as_u16()),
            ));
        }

        let body: SearchResponse = response.json().await.map_err(|e| {
            GatewayError::api(
                format!("unreadable video search response: {e}"),
                Some(status.as_u16()),
            )
        })?;

        let results: Vec<VideoResult> = body
            .items
            .into_iter()
            .filter_map(SearchItem::into_result)
            .collect();
        debug!(count = results.len(), "video search completed");
        Ok(results)
    }
}

// ============================================================================
// Cache
// ============================================================================

#[derive(Debug, Clone)]
struct CacheEntry {
    results: Vec<VideoResult>,
    stored_at: Instant,
}

/// Query cache with a fixed TTL and a size bound.
///
/// When full, the oldest inserted key still present is evicted. Refreshing
/// an existing key keeps its original position, so eviction follows
/// insertion order rather than recency of use.
#[derive(Debug)]
pub struct VideoSearchCache {
    entries: IndexMap<String, CacheEntry>,
    ttl: Duration,
    capacity: usize,
}

impl VideoSearchCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Returns fresh results for `key`, dropping the entry if it expired.
    pub fn get(&mut self, key: &str, now: Instant) -> Option<Vec<VideoResult>> {
        let fresh = self
            .entries
            .get(key)
            .map(|entry| now.saturating_duration_since(entry.stored_at) < self.ttl)?;

        if fresh {
            self.entries.get(key).map(|entry| entry.results.clone())
        } else {
            self.entries.shift_remove(key);
            None
        }
    }

    /// Stores results for `key`, evicting the oldest keys past capacity.
    pub fn insert(&mut self, key: impl Into<String>, results: Vec<VideoResult>, now: Instant) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                results,
                stored_at: now,
            },
        );
        while self.entries.len() > self.capacity {
            self.entries.shift_remove_index(0);
        }
    }

    /// Number of cached keys, fresh or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if `key` has an entry, fresh or not.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

/// A [`VideoSearch`] that answers repeated queries from a cache.
pub struct CachedVideoSearch {
    inner: Arc<dyn VideoSearch>,
    cache: Mutex<VideoSearchCache>,
}

impl CachedVideoSearch {
    /// Wraps `inner` with a cache of the given TTL and capacity.
    #[must_use]
    pub fn new(inner: Arc<dyn VideoSearch>, ttl: Duration, capacity: usize) -> Self {
        Self {
            inner,
            cache: Mutex::new(VideoSearchCache::new(ttl, capacity)),
        }
    }

    /// Wraps `inner` using the cache settings from `config`.
    #[must_use]
    pub fn from_config(inner: Arc<dyn VideoSearch>, config: &YouTubeConfig) -> Self {
        Self::new(
            inner,
            Duration::from_secs(config.cache_ttl_secs),
            config.cache_capacity,
        )
    }

    /// Number of cached queries.
    pub async fn cached_queries(&self) -> usize {
        self.cache.lock().await.len()
    }
}

#[async_trait]
impl VideoSearch for CachedVideoSearch {
    async fn search(&self, query: &str) -> Result<Vec<VideoResult>> {
        let key = normalize_query(query);
        if key.is_empty() {
            return Err(GatewayError::invalid_request("search query is empty"));
        }

        if let Some(results) = self.cache.lock().await.get(&key, Instant::now()) {
            debug!(query = %key, "video search cache hit");
            return Ok(results);
        }

        // Not held across the remote call; concurrent misses may both fetch.
        let results = self.inner.search(&key).await?;
        self.cache
            .lock()
            .await
            .insert(key, results.clone(), Instant::now());
        Ok(results)
    }
}
