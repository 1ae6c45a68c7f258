// Common data models for the acquisition pipeline

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

/// Supported source platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    TikTok,
    Instagram,
    YouTube,
    Pinterest,
    Unknown,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TikTok => "tiktok",
            Self::Instagram => "instagram",
            Self::YouTube => "youtube",
            Self::Pinterest => "pinterest",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TikTok => write!(f, "TikTok"),
            Self::Instagram => write!(f, "Instagram"),
            Self::YouTube => write!(f, "YouTube"),
            Self::Pinterest => write!(f, "Pinterest"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// What a post contains. Decided once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Video,
    Image,
    /// Ordered images plus optional background audio
    Slideshow,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Image => write!(f, "image"),
            Self::Slideshow => write!(f, "slideshow"),
        }
    }
}

/// Kind of one individual remote or local file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetKind {
    Video,
    Image,
    Audio,
}

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "mkv", "avi", "flv", "wmv", "m4v"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "heic", "avif", "bmp"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "aac", "ogg", "wav", "flac", "opus"];

impl AssetKind {
    /// Extension used when neither the server nor the URL tells us anything
    pub fn default_extension(&self) -> &'static str {
        match self {
            Self::Video => "mp4",
            Self::Image => "jpg",
            Self::Audio => "mp3",
        }
    }

    /// Known file extensions for this kind
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Video => VIDEO_EXTENSIONS,
            Self::Image => IMAGE_EXTENSIONS,
            Self::Audio => AUDIO_EXTENSIONS,
        }
    }

    /// Guess kind from a file extension (with or without the dot)
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_lowercase();
        [Self::Video, Self::Image, Self::Audio]
            .into_iter()
            .find(|kind| kind.extensions().contains(&ext.as_str()))
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Image => write!(f, "image"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

/// URL after shortener resolution. Re-resolving it is a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUrl {
    original: String,
    url: Url,
}

impl ResolvedUrl {
    pub fn new(original: impl Into<String>, url: Url) -> Self {
        Self {
            original: original.into(),
            url,
        }
    }

    /// The raw string the caller submitted
    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Lowercased host without a leading `www.`
    pub fn domain(&self) -> String {
        let host = self.url.host_str().unwrap_or("").to_lowercase();
        host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
    }

    pub fn path_segments(&self) -> Vec<String> {
        self.url
            .path_segments()
            .map(|segments| {
                segments
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn query_params(&self) -> BTreeMap<String, String> {
        self.url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// Numeric post identifier: the segment after `video`/`photo`, or the last
    /// all-digit segment
    pub fn item_id(&self) -> Option<String> {
        let segments = self.path_segments();
        for pair in segments.windows(2) {
            if matches!(pair[0].as_str(), "video" | "photo" | "pin" | "p" | "reel" | "reels" | "tv" | "shorts")
            {
                return Some(pair[1].clone());
            }
        }
        segments
            .iter()
            .rev()
            .find(|s| s.chars().all(|c| c.is_ascii_digit()))
            .cloned()
    }
}

impl fmt::Display for ResolvedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Output of the URL classifier
#[derive(Debug, Clone)]
pub struct Classification {
    pub url: ResolvedUrl,
    pub platform: Platform,
    pub kind: MediaKind,
}

/// One remote file discovered by a strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLink {
    pub url: String,
    pub kind: AssetKind,
    /// Headers the CDN expects (Referer, User-Agent, cookies)
    pub headers: BTreeMap<String, String>,
}

impl AssetLink {
    pub fn new(url: impl Into<String>, kind: AssetKind) -> Self {
        Self {
            url: url.into(),
            kind,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }
}

/// Candidate media found by a strategy, not yet downloaded
#[derive(Debug, Clone)]
pub struct RawAssetReference {
    pub kind: MediaKind,
    pub links: Vec<AssetLink>,
}

impl RawAssetReference {
    pub fn video(link: AssetLink) -> Self {
        Self {
            kind: MediaKind::Video,
            links: vec![link],
        }
    }

    pub fn image(link: AssetLink) -> Self {
        Self {
            kind: MediaKind::Image,
            links: vec![link],
        }
    }

    /// Images in display order, audio (if any) last
    pub fn slideshow(images: Vec<AssetLink>, audio: Option<AssetLink>) -> Self {
        let mut links = images;
        links.extend(audio);
        Self {
            kind: MediaKind::Slideshow,
            links,
        }
    }

    pub fn first_of(&self, kind: AssetKind) -> Option<&AssetLink> {
        self.links.iter().find(|l| l.kind == kind)
    }

    pub fn all_of(&self, kind: AssetKind) -> Vec<AssetLink> {
        self.links.iter().filter(|l| l.kind == kind).cloned().collect()
    }
}

/// A downloaded and validated file in the scratch directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquiredAsset {
    pub path: PathBuf,
    pub size: u64,
    /// Extension without the dot
    pub extension: String,
    pub content_type: Option<String>,
    pub kind: AssetKind,
    pub source_url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub fetched_at: OffsetDateTime,
}

impl AcquiredAsset {
    /// Delete the file; missing files are not an error
    pub async fn discard(&self) -> std::io::Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Ordered slideshow images plus optional audio. Never empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlideshowBundle {
    images: Vec<AcquiredAsset>,
    audio: Option<AcquiredAsset>,
}

impl SlideshowBundle {
    /// Returns `None` when there are no images
    pub fn new(images: Vec<AcquiredAsset>, audio: Option<AcquiredAsset>) -> Option<Self> {
        if images.is_empty() {
            return None;
        }
        Some(Self { images, audio })
    }

    pub fn images(&self) -> &[AcquiredAsset] {
        &self.images
    }

    pub fn audio(&self) -> Option<&AcquiredAsset> {
        self.audio.as_ref()
    }
}

/// Payload of a finished acquisition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MediaContent {
    Single(AcquiredAsset),
    Slideshow(SlideshowBundle),
}

/// Result handed to the caller, who then owns the files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquiredMedia {
    pub platform: Platform,
    /// Name of the strategy that produced the result
    pub strategy: String,
    pub content: MediaContent,
}

impl AcquiredMedia {
    pub fn kind(&self) -> MediaKind {
        match &self.content {
            MediaContent::Single(asset) if asset.kind == AssetKind::Image => MediaKind::Image,
            MediaContent::Single(_) => MediaKind::Video,
            MediaContent::Slideshow(_) => MediaKind::Slideshow,
        }
    }

    pub fn assets(&self) -> Vec<&AcquiredAsset> {
        match &self.content {
            MediaContent::Single(asset) => vec![asset],
            MediaContent::Slideshow(bundle) => {
                bundle.images.iter().chain(bundle.audio.iter()).collect()
            }
        }
    }

    pub fn asset_count(&self) -> usize {
        self.assets().len()
    }

    /// Delete every file belonging to this result
    pub async fn discard(&self) -> std::io::Result<()> {
        for asset in self.assets() {
            asset.discard().await?;
        }
        Ok(())
    }
}

/// Network configuration shared by all HTTP callers
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// SOCKS5/HTTP proxy URL (e.g., "socks5://127.0.0.1:1080")
    pub proxy: Option<String>,
    pub user_agent: String,
    /// Timeout for shortener resolution
    pub resolve_timeout: Duration,
    /// Timeout for page fetches made while classifying or scraping
    pub page_timeout: Duration,
}

pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            user_agent: DESKTOP_USER_AGENT.to_string(),
            resolve_timeout: Duration::from_secs(10),
            page_timeout: Duration::from_secs(20),
        }
    }
}
