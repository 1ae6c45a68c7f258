// Slideshow asset extractor
//
// Runs a waterfall of independent heuristics over a post page and collects an
// ordered, deduplicated list of image URLs plus at most one audio URL:
// 1. metadata tags
// 2. embedded JSON state
// 3. <img>/<picture> elements on the media CDN
// 4. inline background images
// 5. raw-text URL sweep (only when 1-4 found nothing)
// 6. platform lookup endpoint by item id (final fallback)

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::json_walk::find_slideshow_assets;
use super::page_scan::{
    scan_dom_images, scan_inline_styles, scan_meta, script_json_blobs, sweep_raw_text, PageAssets,
};
use crate::downloader::config::SlideshowConfig;
use crate::downloader::errors::StrategyError;
use crate::downloader::fetcher::AssetFetcher;
use crate::downloader::models::{AcquiredAsset, AssetKind, AssetLink, ResolvedUrl, SlideshowBundle};
use crate::downloader::utils::{fetch_json, fetch_page};

/// Name used when attributing results and failures
pub const SLIDESHOW_STRATEGY: &str = "slideshow-scraper";

/// Waterfall step, for logging which heuristic produced assets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStep {
    MetaTags,
    EmbeddedJson,
    DomImages,
    InlineStyles,
    RawSweep,
    LookupApi,
}

impl fmt::Display for ScanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MetaTags => "meta-tags",
            Self::EmbeddedJson => "embedded-json",
            Self::DomImages => "dom-images",
            Self::InlineStyles => "inline-styles",
            Self::RawSweep => "raw-sweep",
            Self::LookupApi => "lookup-api",
        };
        write!(f, "{}", name)
    }
}

fn merge(into: &mut PageAssets, from: PageAssets, step: ScanStep) {
    let before = into.images.len();
    for url in from.images {
        into.push_image(url);
    }
    let had_audio = into.audio.is_some();
    into.set_audio(from.audio);

    let added = into.images.len() - before;
    if added > 0 || (!had_audio && into.audio.is_some()) {
        debug!(step = %step, images = added, audio = into.audio.is_some(), "slideshow candidates found");
    }
}

fn satisfied(assets: &PageAssets, config: &SlideshowConfig) -> bool {
    assets.images.len() >= config.min_images && assets.audio.is_some()
}

/// Steps 1-5 over an already fetched page
pub fn discover_in_page(html: &str, config: &SlideshowConfig) -> PageAssets {
    let mut assets = PageAssets::default();

    merge(&mut assets, scan_meta(html), ScanStep::MetaTags);
    if satisfied(&assets, config) {
        return assets;
    }

    for blob in script_json_blobs(html) {
        let findings = find_slideshow_assets(&blob);
        merge(
            &mut assets,
            PageAssets {
                images: findings.images,
                audio: findings.audio,
            },
            ScanStep::EmbeddedJson,
        );
    }
    if satisfied(&assets, config) {
        return assets;
    }

    merge(
        &mut assets,
        PageAssets {
            images: scan_dom_images(html, &config.cdn_hosts),
            audio: None,
        },
        ScanStep::DomImages,
    );
    if satisfied(&assets, config) {
        return assets;
    }

    merge(
        &mut assets,
        PageAssets {
            images: scan_inline_styles(html, &config.cdn_hosts),
            audio: None,
        },
        ScanStep::InlineStyles,
    );

    if assets.images.is_empty() {
        merge(&mut assets, sweep_raw_text(html, &config.cdn_hosts), ScanStep::RawSweep);
    }

    assets
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

/// Recovers slideshow images and audio from a post page and downloads them
pub struct SlideshowExtractor {
    client: reqwest::Client,
    fetcher: Arc<AssetFetcher>,
    config: SlideshowConfig,
    headers: BTreeMap<String, String>,
    page_timeout: Duration,
}

impl SlideshowExtractor {
    pub fn new(client: reqwest::Client, fetcher: Arc<AssetFetcher>, config: SlideshowConfig) -> Self {
        Self {
            client,
            fetcher,
            config,
            headers: BTreeMap::new(),
            page_timeout: Duration::from_secs(20),
        }
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = timeout;
        self
    }

    pub fn config(&self) -> &SlideshowConfig {
        &self.config
    }

    /// Locate candidate URLs without downloading anything
    pub async fn discover(&self, url: &ResolvedUrl, deadline: Instant) -> Result<PageAssets, StrategyError> {
        let limit = self.page_timeout.min(remaining(deadline));
        let mut assets = match fetch_page(&self.client, url.as_str(), &self.headers, limit).await {
            Ok(html) => discover_in_page(&html, &self.config),
            Err(e) => {
                warn!(url = %url, error = %e, "slideshow page fetch failed, trying lookup endpoint");
                PageAssets::default()
            }
        };

        if assets.images.len() < self.config.min_images {
            if let Some(found) = self.lookup(url, deadline).await {
                merge(&mut assets, found, ScanStep::LookupApi);
            }
        }

        assets.images.truncate(self.config.max_images);
        if assets.images.is_empty() {
            return Err(StrategyError::NoMedia(format!("no slideshow images found at {}", url)));
        }
        Ok(assets)
    }

    /// Step 6: the platform's item lookup endpoint
    async fn lookup(&self, url: &ResolvedUrl, deadline: Instant) -> Option<PageAssets> {
        let template = self.config.lookup_endpoint.as_deref()?;
        let id = url.item_id()?;
        let endpoint = template.replace("{id}", &id);
        let limit = self.page_timeout.min(remaining(deadline));

        match fetch_json(&self.client, &endpoint, &self.headers, limit).await {
            Ok(body) => {
                let findings = find_slideshow_assets(&body);
                Some(PageAssets {
                    images: findings.images,
                    audio: findings.audio,
                })
            }
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "slideshow lookup failed");
                None
            }
        }
    }

    /// Discover and download a full bundle
    pub async fn extract(&self, url: &ResolvedUrl, deadline: Instant) -> Result<SlideshowBundle, StrategyError> {
        let assets = self.discover(url, deadline).await?;
        info!(
            url = %url,
            images = assets.images.len(),
            audio = assets.audio.is_some(),
            "slideshow candidates collected"
        );

        let mut headers = self.headers.clone();
        headers.insert("Referer".to_string(), url.as_str().to_string());

        let images = assets
            .images
            .into_iter()
            .map(|u| AssetLink::new(u, AssetKind::Image).with_headers(headers.clone()))
            .collect();
        let audio = assets
            .audio
            .map(|u| AssetLink::new(u, AssetKind::Audio).with_headers(headers.clone()));

        fetch_bundle(&self.fetcher, self.config.fan_out, images, audio, deadline).await
    }
}

/// Download images (bounded fan-out, discovery order kept) and optional audio.
/// Individual image failures are skipped; audio failure drops the audio.
pub async fn fetch_bundle(
    fetcher: &AssetFetcher,
    fan_out: usize,
    images: Vec<AssetLink>,
    audio: Option<AssetLink>,
    deadline: Instant,
) -> Result<SlideshowBundle, StrategyError> {
    let total = images.len();
    let started = Instant::now();

    let images_fut = stream::iter(images.into_iter().enumerate())
        .map(|(index, link)| async move {
            match fetcher.fetch_within(&link, remaining(deadline)).await {
                Ok(asset) => Some(asset),
                Err(e) => {
                    warn!(index, url = %link.url, reason = %e, "skipping slideshow image");
                    None
                }
            }
        })
        .buffered(fan_out.max(1))
        .collect::<Vec<Option<AcquiredAsset>>>();

    let audio_fut = async {
        let link = audio?;
        match fetcher.fetch_within(&link, remaining(deadline)).await {
            Ok(asset) => Some(asset),
            Err(e) => {
                warn!(url = %link.url, reason = %e, "slideshow audio unavailable, continuing without it");
                None
            }
        }
    };

    let (fetched, audio) = tokio::join!(images_fut, audio_fut);
    let fetched: Vec<AcquiredAsset> = fetched.into_iter().flatten().collect();

    if fetched.len() < total {
        warn!(fetched = fetched.len(), total, "some slideshow images were skipped");
    }

    match SlideshowBundle::new(fetched, audio.clone()) {
        Some(bundle) => Ok(bundle),
        None => {
            if let Some(orphan) = audio {
                if let Err(e) = orphan.discard().await {
                    warn!(path = %orphan.path.display(), error = %e, "could not remove orphan slideshow audio");
                }
            }
            if remaining(deadline).is_zero() {
                Err(StrategyError::Timeout(started.elapsed()))
            } else {
                Err(StrategyError::NoMedia(format!(
                    "none of {} slideshow images could be downloaded",
                    total
                )))
            }
        }
    }
}
