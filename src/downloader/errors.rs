// Error types for the acquisition pipeline
//
// Three layers:
// - FetchFailure: one asset download failed validation
// - StrategyError: one extraction strategy failed (absorbed by the strategy set)
// - AcquisitionError: terminal, the only thing the caller ever sees

use std::time::Duration;

use thiserror::Error;

use super::models::{AssetKind, Platform};

/// Why a single asset fetch was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    /// Server answered 404/410
    #[error("resource not found (HTTP {0})")]
    NotFound(u16),

    /// Transfer finished but nothing was written
    #[error("response body was empty")]
    EmptyBody,

    /// Content-type does not belong to the expected kind
    #[error("expected {expected} but server sent '{content_type}'")]
    KindMismatch {
        expected: AssetKind,
        content_type: String,
    },

    /// Asset exceeded the configured size cap
    #[error("asset exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    /// Connection problems or unexpected HTTP status
    #[error("network error: {0}")]
    NetworkError(String),

    /// Scratch directory could not be written
    #[error("io error: {0}")]
    Io(String),
}

impl FetchFailure {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkError(_) | Self::Timeout(_))
    }
}

impl FetchFailure {
    /// Failure of a request bounded by `limit`
    pub fn from_request(e: reqwest::Error, limit: Duration) -> Self {
        if e.is_timeout() {
            return Self::Timeout(limit);
        }
        Self::NetworkError(e.to_string())
    }
}

impl From<std::io::Error> for FetchFailure {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Failure of one extraction strategy
#[derive(Debug, Clone, Error)]
pub enum StrategyError {
    #[error("strategy timed out after {0:?}")]
    Timeout(Duration),

    /// Transient network problem, eligible for the strategy's retry budget
    #[error("network error: {0}")]
    Network(String),

    /// Page or API answered but exposed no usable media link
    #[error("no media found: {0}")]
    NoMedia(String),

    /// Platform refused the request (429, bot detection, login wall)
    #[error("blocked by platform: {0}")]
    Blocked(String),

    #[error("parse error: {0}")]
    Parse(String),

    /// External extractor binary missing
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("execution error: {0}")]
    Execution(String),

    /// Extraction succeeded but the discovered asset failed validation
    #[error("asset fetch failed: {0}")]
    Fetch(#[from] FetchFailure),
}

impl StrategyError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Fetch(f) => matches!(f, FetchFailure::NetworkError(_)),
            _ => false,
        }
    }

    /// Map extractor tool output (yt-dlp stderr) to a typed error
    pub fn from_tool_output(output: &str) -> Self {
        let lower = output.to_lowercase();

        if lower.contains("timed out") || lower.contains("timeout") {
            return Self::Network(output.trim().to_string());
        }

        if lower.contains("429")
            || lower.contains("too many requests")
            || lower.contains("rate-limit")
            || lower.contains("rate limit")
            || lower.contains("bot")
            || lower.contains("blocked")
            || lower.contains("login required")
            || lower.contains("log in")
        {
            return Self::Blocked(output.trim().to_string());
        }

        if lower.contains("unsupported url")
            || lower.contains("404")
            || lower.contains("not found")
            || lower.contains("unavailable")
            || lower.contains("no video")
        {
            return Self::NoMedia(output.trim().to_string());
        }

        if lower.contains("json") || lower.contains("parse") {
            return Self::Parse(output.trim().to_string());
        }

        Self::Execution(output.trim().to_string())
    }
}

impl StrategyError {
    /// Failure of a page or API request bounded by `limit`
    pub fn from_request(e: reqwest::Error, limit: Duration) -> Self {
        if e.is_timeout() {
            return Self::Timeout(limit);
        }
        if let Some(status) = e.status() {
            return Self::from_status(status.as_u16());
        }
        Self::Network(e.to_string())
    }

    /// Typed error for a non-success HTTP status on a page or API call
    pub fn from_status(status: u16) -> Self {
        match status {
            403 | 429 => Self::Blocked(format!("HTTP {}", status)),
            404 | 410 => Self::NoMedia(format!("HTTP {}", status)),
            500..=599 => Self::Network(format!("HTTP {}", status)),
            _ => Self::Execution(format!("HTTP {}", status)),
        }
    }
}

/// Terminal failure returned by `acquire`
#[derive(Debug, Clone, Error)]
pub enum AcquisitionError {
    #[error("unsupported platform for URL: {url}")]
    UnsupportedPlatform { url: String },

    #[error("{platform} download timed out after {elapsed:?} (last strategy: {})", .last_strategy.as_deref().unwrap_or("none"))]
    Timeout {
        platform: Platform,
        elapsed: Duration,
        last_strategy: Option<String>,
        last_error: Option<String>,
    },

    #[error("all {platform} strategies failed (last strategy: {}, last error: {})", .last_strategy.as_deref().unwrap_or("none"), .last_error.as_deref().unwrap_or("none"))]
    AllStrategiesExhausted {
        platform: Platform,
        last_strategy: Option<String>,
        last_error: Option<String>,
    },

    /// Worker pool is saturated; the request was not queued
    #[error("too many downloads in progress, try again later")]
    QueueFull,
}

impl AcquisitionError {
    pub fn platform(&self) -> Option<Platform> {
        match self {
            Self::Timeout { platform, .. } | Self::AllStrategiesExhausted { platform, .. } => {
                Some(*platform)
            }
            _ => None,
        }
    }

    /// Short message suitable for showing to an end user
    pub fn user_message(&self) -> String {
        match self {
            Self::UnsupportedPlatform { .. } => {
                "This link is not supported. Send a TikTok, Instagram, YouTube or Pinterest URL."
                    .to_string()
            }
            Self::Timeout { platform, .. } => format!(
                "{} is taking too long to respond. Please try again later.",
                platform
            ),
            Self::AllStrategiesExhausted { platform, .. } => format!(
                "Could not download this {} post. It may be private, removed, or temporarily blocked.",
                platform
            ),
            Self::QueueFull => "The downloader is busy right now. Please try again in a minute."
                .to_string(),
        }
    }
}
