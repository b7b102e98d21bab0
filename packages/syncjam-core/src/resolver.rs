//! Audio URL resolver: turns a catalog track id into a playable URL.
//!
//! Defined as an `#[async_trait]` rather than a concrete HTTP client, so the
//! coordinator and `api::http` stream-proxy route can be tested against a
//! fake resolver with no network access.

use async_trait::async_trait;
use thiserror::Error;

/// A resolved, playable audio source. URLs are short-lived — callers must
/// not cache one past `expires_after`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAudio {
    pub url: String,
    pub content_type: String,
    pub duration_s: Option<f64>,
    pub bitrate_kbps: Option<u32>,
    /// How long the URL remains valid, from the moment it was resolved.
    pub expires_after: std::time::Duration,
}

/// Failure modes a resolver may report. Both are treated as transient by
/// callers: neither should ever close a websocket or fail a room mutation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolverError {
    #[error("track {0} is unavailable")]
    Unavailable(String),
    #[error("resolving track {0} timed out")]
    Timeout(String),
}

/// Resolves catalog track ids to playable audio URLs.
///
/// A slow or failing resolver must never block the room: callers (the
/// stream-proxy handler, or a client's own pre-buffer path) are expected to
/// treat failures as client-local rather than propagating them
/// into `PlaybackCoordinator`.
#[async_trait]
pub trait AudioUrlResolver: Send + Sync {
    async fn resolve(&self, track_id: &str) -> Result<ResolvedAudio, ResolverError>;
}

/// Reports every track as unavailable. The default when no catalog host is
/// configured, so the server can still start and run the sync protocol
/// (queue/playback/chat of positions) even without a working stream proxy.
#[derive(Debug, Default)]
pub struct UnconfiguredResolver;

#[async_trait]
impl AudioUrlResolver for UnconfiguredResolver {
    async fn resolve(&self, track_id: &str) -> Result<ResolvedAudio, ResolverError> {
        Err(ResolverError::Unavailable(track_id.to_string()))
    }
}

/// Resolves a track id against a configured catalog host over HTTP.
///
/// The catalog is expected to expose `GET {base_url}/tracks/{id}/stream-url`
/// returning `{ "url":..., "contentType":..., "durationS":...,
/// "bitrateKbps":... }`. This is the one real external collaborator SyncJam
/// talks to; everything else (the room, the sessions) is in-process.
pub struct HttpCatalogResolver {
    client: reqwest::Client,
    base_url: String,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogStreamUrl {
    url: String,
    #[serde(default = "default_content_type")]
    content_type: String,
    duration_s: Option<f64>,
    bitrate_kbps: Option<u32>,
}

fn default_content_type() -> String {
    "audio/mpeg".to_string()
}

impl HttpCatalogResolver {
    /// Builds a resolver against `base_url`, with a short request timeout so
    /// a stalled catalog host degrades to a resolver error rather than
    /// hanging the stream-proxy route indefinitely.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl AudioUrlResolver for HttpCatalogResolver {
    async fn resolve(&self, track_id: &str) -> Result<ResolvedAudio, ResolverError> {
        let url = format!("{}/tracks/{}/stream-url", self.base_url, track_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ResolverError::Timeout(track_id.to_string())
                } else {
                    ResolverError::Unavailable(track_id.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(ResolverError::Unavailable(track_id.to_string()));
        }

        let parsed: CatalogStreamUrl = response
            .json()
            .await
            .map_err(|_| ResolverError::Unavailable(track_id.to_string()))?;

        Ok(ResolvedAudio {
            url: parsed.url,
            content_type: parsed.content_type,
            duration_s: parsed.duration_s,
            bitrate_kbps: parsed.bitrate_kbps,
            expires_after: std::time::Duration::from_secs(300),
        })
    }
}
