// Top-level configuration for the acquisition engine

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use super::models::NetworkConfig;

/// Tuning for the slideshow asset extractor
#[derive(Debug, Clone)]
pub struct SlideshowConfig {
    /// Stop scanning once this many images (and an audio track) are known
    pub min_images: usize,
    /// Hard cap on images collected from one page
    pub max_images: usize,
    /// Host fragments of the platform's media CDN
    pub cdn_hosts: Vec<String>,
    /// Public lookup endpoint; `{id}` is replaced by the item identifier
    pub lookup_endpoint: Option<String>,
    /// Concurrent image downloads per bundle
    pub fan_out: usize,
}

impl Default for SlideshowConfig {
    fn default() -> Self {
        Self {
            min_images: 2,
            max_images: 35,
            cdn_hosts: vec![
                "tiktokcdn".to_string(),
                "tiktokv".to_string(),
                "muscdn".to_string(),
                "byteimg".to_string(),
            ],
            lookup_endpoint: Some("https://www.tiktok.com/api/item/detail/?itemId={id}".to_string()),
            fan_out: 4,
        }
    }
}

impl SlideshowConfig {
    pub fn with_min_images(mut self, n: usize) -> Self {
        self.min_images = n.max(1);
        self
    }

    pub fn with_cdn_hosts(mut self, hosts: &[&str]) -> Self {
        self.cdn_hosts = hosts.iter().map(|h| h.to_string()).collect();
        self
    }

    pub fn with_lookup_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.lookup_endpoint = endpoint;
        self
    }

    pub fn with_fan_out(mut self, n: usize) -> Self {
        self.fan_out = n.max(1);
        self
    }
}

/// Configuration for a coordinator and its worker pool
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    /// Where fetched files are written
    pub scratch_dir: PathBuf,
    /// Wall-clock budget for one request, classification included
    pub deadline: Duration,
    /// Timeout for a single asset download
    pub fetch_timeout: Duration,
    /// Assets larger than this are discarded
    pub max_asset_bytes: u64,
    /// Path or name of the yt-dlp binary
    pub ytdlp_path: Option<String>,
    pub workers: usize,
    pub queue_capacity: usize,
    pub network: NetworkConfig,
    pub slideshow: SlideshowConfig,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        let scratch_dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("social_media_downloads");

        Self {
            scratch_dir,
            deadline: Duration::from_secs(120),
            fetch_timeout: Duration::from_secs(60),
            max_asset_bytes: 512 * 1024 * 1024,
            ytdlp_path: None,
            workers: 4,
            queue_capacity: 32,
            network: NetworkConfig::default(),
            slideshow: SlideshowConfig::default(),
        }
    }
}

impl AcquisitionConfig {
    /// Defaults overlaid with `MEDIA_SCRATCH_DIR`, `MEDIA_PROXY`,
    /// `MEDIA_DEADLINE_SECS` and `YTDLP_PATH`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("MEDIA_SCRATCH_DIR") {
            config.scratch_dir = PathBuf::from(dir);
        }
        if let Ok(proxy) = std::env::var("MEDIA_PROXY") {
            if !proxy.trim().is_empty() {
                config.network.proxy = Some(proxy);
            }
        }
        if let Ok(secs) = std::env::var("MEDIA_DEADLINE_SECS") {
            match secs.parse::<u64>() {
                Ok(secs) if secs > 0 => config.deadline = Duration::from_secs(secs),
                _ => warn!(value = %secs, "ignoring invalid MEDIA_DEADLINE_SECS"),
            }
        }
        if let Ok(path) = std::env::var("YTDLP_PATH") {
            config.ytdlp_path = Some(path);
        }

        config
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_max_asset_bytes(mut self, bytes: u64) -> Self {
        self.max_asset_bytes = bytes;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.network.proxy = proxy;
        self
    }

    pub fn with_ytdlp_path(mut self, path: Option<String>) -> Self {
        self.ytdlp_path = path;
        self
    }

    pub fn with_workers(mut self, workers: usize, queue_capacity: usize) -> Self {
        self.workers = workers.max(1);
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_network(mut self, network: NetworkConfig) -> Self {
        self.network = network;
        self
    }

    pub fn with_slideshow(mut self, slideshow: SlideshowConfig) -> Self {
        self.slideshow = slideshow;
        self
    }
}
