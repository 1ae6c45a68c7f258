// Last-resort direct HTML scrape
//
// Searches the raw page body and inline scripts for literal video URLs:
// video meta tags, known JSON field names ("playAddr", "video_url", ...) and
// URLs on the platform CDN that carry a video extension.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info};

use crate::downloader::errors::StrategyError;
use crate::downloader::extractors::page_scan::{all_urls, meta_contents, unescape_page, VIDEO_META};
use crate::downloader::models::{AssetKind, AssetLink, Platform, RawAssetReference, ResolvedUrl};
use crate::downloader::traits::{ExtractionStrategy, StrategyConfig};
use crate::downloader::utils::{fetch_page, normalize_media_url, url_extension, with_retries};

lazy_static! {
    static ref VIDEO_FIELD_RE: Regex = Regex::new(
        r#"\\?"(?:playAddr|play_addr|downloadAddr|download_addr|video_url|videoUrl|contentUrl|media_url|mediaUrl)\\?"\s*:\s*\\?"([^"\\]+)"#
    )
    .unwrap();
}

fn video_extension(url: &str) -> bool {
    url_extension(url)
        .and_then(|e| AssetKind::from_extension(&e))
        .is_some_and(|k| k == AssetKind::Video)
}

fn rejected(url: &str) -> bool {
    url_extension(url)
        .and_then(|e| AssetKind::from_extension(&e))
        .is_some_and(|k| k != AssetKind::Video)
        || url.contains(".m3u8")
}

fn on_cdn(url: &str, cdn_hosts: &[String]) -> bool {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .is_some_and(|host| cdn_hosts.iter().any(|h| host.contains(h.as_str())))
}

/// First direct video link in a page, strongest evidence first
pub fn find_direct_video(html: &str, cdn_hosts: &[String]) -> Option<String> {
    if let Some(url) = meta_contents(html, VIDEO_META).into_iter().find(|u| !rejected(u)) {
        debug!(source = "meta", "direct video link");
        return Some(url);
    }

    let text = unescape_page(html);
    if let Some(url) = VIDEO_FIELD_RE
        .captures_iter(&text)
        .filter_map(|caps| normalize_media_url(&caps[1]))
        .find(|u| !rejected(u))
    {
        debug!(source = "json-field", "direct video link");
        return Some(url);
    }

    let urls = all_urls(html);
    let on_platform_cdn = |u: &str| cdn_hosts.is_empty() || on_cdn(u, cdn_hosts);
    if let Some(url) = urls
        .iter()
        .find(|u| video_extension(u) && on_platform_cdn(u.as_str()))
        .or_else(|| urls.iter().find(|u| video_extension(u)))
    {
        debug!(source = "url-sweep", "direct video link");
        return Some(url.clone());
    }
    None
}

/// Fetch a page (optionally an embed variant of it) and regex out a video link
pub struct PageScrapeStrategy {
    name: String,
    platform: Platform,
    client: reqwest::Client,
    config: StrategyConfig,
    /// `{id}` is replaced by the post identifier; `None` scrapes the post URL itself
    page_template: Option<String>,
    cdn_hosts: Vec<String>,
}

impl PageScrapeStrategy {
    pub fn new(name: &str, platform: Platform, client: reqwest::Client, config: StrategyConfig) -> Self {
        Self {
            name: name.to_string(),
            platform,
            client,
            config,
            page_template: None,
            cdn_hosts: Vec::new(),
        }
    }

    pub fn with_page_template(mut self, template: &str) -> Self {
        self.page_template = Some(template.to_string());
        self
    }

    pub fn with_cdn_hosts(mut self, hosts: &[&str]) -> Self {
        self.cdn_hosts = hosts.iter().map(|h| h.to_string()).collect();
        self
    }

    fn page_url(&self, url: &ResolvedUrl) -> Result<String, StrategyError> {
        match &self.page_template {
            None => Ok(url.as_str().to_string()),
            Some(template) => {
                let id = url
                    .item_id()
                    .ok_or_else(|| StrategyError::NoMedia(format!("no post id in {}", url)))?;
                Ok(template.replace("{id}", &id))
            }
        }
    }
}

#[async_trait]
impl ExtractionStrategy for PageScrapeStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> Platform {
        self.platform
    }

    fn config(&self) -> &StrategyConfig {
        &self.config
    }

    async fn attempt(&self, url: &ResolvedUrl) -> Result<RawAssetReference, StrategyError> {
        let page = self.page_url(url)?;
        let html = with_retries(&self.name, self.config.retries, || {
            fetch_page(&self.client, &page, &self.config.headers, self.config.timeout)
        })
        .await?;

        let video = find_direct_video(&html, &self.cdn_hosts)
            .ok_or_else(|| StrategyError::NoMedia(format!("no video link in {}", page)))?;
        info!(strategy = %self.name, url = %video, "scraped video link");

        let mut headers = self.config.headers.clone();
        headers.insert("Referer".to_string(), page);
        Ok(RawAssetReference::video(
            AssetLink::new(video, AssetKind::Video).with_headers(headers),
        ))
    }
}
