// Extraction strategy trait and its per-strategy configuration

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use super::errors::StrategyError;
use super::models::{MediaKind, Platform, RawAssetReference, ResolvedUrl};

/// Configuration for one extraction strategy
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// Request headers sent with every call the strategy makes
    pub headers: BTreeMap<String, String>,
    /// Upper bound for one attempt (the request deadline may cut it shorter)
    pub timeout: Duration,
    /// Preferred output format (yt-dlp format selector or API quality flag)
    pub output_format: String,
    /// Strategy-specific parameters (extractor args, API query params)
    pub extra_params: BTreeMap<String, String>,
    /// Extra attempts allowed after a transient network error
    pub retries: u32,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            headers: BTreeMap::new(),
            timeout: Duration::from_secs(30),
            output_format: "best".to_string(),
            extra_params: BTreeMap::new(),
            retries: 1,
        }
    }
}

impl StrategyConfig {
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_headers(mut self, headers: &BTreeMap<String, String>) -> Self {
        self.headers
            .extend(headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_output_format(mut self, format: &str) -> Self {
        self.output_format = format.to_string();
        self
    }

    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.extra_params.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.extra_params.get(name).map(String::as_str)
    }
}

/// One self-contained way of locating media for a URL.
///
/// Implementations are stateless apart from their configuration and must not
/// depend on what earlier strategies in the same set did.
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    /// Name of the strategy (for logging and result attribution)
    fn name(&self) -> &str;

    /// Platform this strategy is tuned for
    fn platform(&self) -> Platform;

    fn config(&self) -> &StrategyConfig;

    /// Whether the strategy can produce media of this kind
    fn supports(&self, kind: MediaKind) -> bool {
        kind == MediaKind::Video
    }

    /// Locate remote media without downloading it
    async fn attempt(&self, url: &ResolvedUrl) -> Result<RawAssetReference, StrategyError>;
}
