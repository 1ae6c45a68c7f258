// Pinterest pin page strategies
//
// Image pins: og:image, then the largest pinimg.com <img>, then the closeup
// image element. Video pins: og:video, og:video:url, <video>/<source>,
// JSON-LD contentUrl, then the Redux state's video_list.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, info};

use crate::downloader::errors::StrategyError;
use crate::downloader::extractors::json_walk::path;
use crate::downloader::extractors::page_scan::meta_contents;
use crate::downloader::models::{AssetKind, AssetLink, MediaKind, Platform, RawAssetReference, ResolvedUrl};
use crate::downloader::traits::{ExtractionStrategy, StrategyConfig};
use crate::downloader::utils::{fetch_page, normalize_media_url, url_extension, with_retries};

lazy_static! {
    static ref IMG_SELECTOR: Selector = Selector::parse("img[src]").unwrap();
    static ref CLOSEUP_SELECTOR: Selector =
        Selector::parse(r#"[data-test-id="pin-closeup-image"] img[src]"#).unwrap();
    static ref VIDEO_SELECTOR: Selector = Selector::parse("video[src], video source[src]").unwrap();
    static ref LD_JSON_SELECTOR: Selector =
        Selector::parse(r#"script[type="application/ld+json"]"#).unwrap();
    static ref JSON_SCRIPT_SELECTOR: Selector =
        Selector::parse(r#"script[type="application/json"]"#).unwrap();
    static ref SIZE_RE: Regex = Regex::new(r"/(\d+)x(?:\d+)?/").unwrap();
}

fn pin_image_width(element: &scraper::ElementRef, src: &str) -> u32 {
    element
        .value()
        .attr("width")
        .and_then(|w| w.trim().parse().ok())
        .or_else(|| SIZE_RE.captures(src).and_then(|c| c[1].parse().ok()))
        .unwrap_or(0)
}

/// Best image URL on a pin page
pub fn find_pin_image(html: &str) -> Option<String> {
    if let Some(url) = meta_contents(html, &["og:image"]).into_iter().next() {
        debug!(source = "og:image", "pin image");
        return Some(url);
    }

    let document = Html::parse_document(html);

    // first of the widest wins
    let mut best: Option<(u32, String)> = None;
    for element in document.select(&IMG_SELECTOR) {
        let Some(src) = element.value().attr("src") else {
            continue;
        };
        if !(src.contains("pinimg.com") || src.contains("pinterest.com")) {
            continue;
        }
        let Some(url) = normalize_media_url(src) else {
            continue;
        };
        let width = pin_image_width(&element, src);
        if best.as_ref().map_or(true, |(w, _)| width > *w) {
            best = Some((width, url));
        }
    }
    if let Some((_, url)) = best {
        debug!(source = "img", "pin image");
        return Some(url);
    }

    document
        .select(&CLOSEUP_SELECTOR)
        .find_map(|e| e.value().attr("src").and_then(normalize_media_url))
}

fn ld_json_video(document: &Html) -> Option<String> {
    document.select(&LD_JSON_SELECTOR).find_map(|script| {
        let text: String = script.text().collect();
        let data: Value = serde_json::from_str(text.trim()).ok()?;
        path(&data, &["video", "contentUrl"])
            .and_then(Value::as_str)
            .and_then(normalize_media_url)
    })
}

/// Widest entry of `props.initialReduxState.pins.<first>.videos.video_list`,
/// skipping HLS playlists
fn redux_video(document: &Html) -> Option<String> {
    document.select(&JSON_SCRIPT_SELECTOR).find_map(|script| {
        let text: String = script.text().collect();
        if !text.contains("\"videos\"") {
            return None;
        }
        let data: Value = serde_json::from_str(text.trim()).ok()?;
        let pins = path(&data, &["props", "initialReduxState", "pins"])?.as_object()?;
        let (_, pin) = pins.iter().next()?;
        let list = path(pin, &["videos", "video_list"])?.as_object()?;

        list.values()
            .filter_map(|v| {
                let url = v.get("url")?.as_str()?;
                if url.contains(".m3u8") {
                    return None;
                }
                Some((v.get("width").and_then(Value::as_u64).unwrap_or(0), url))
            })
            .fold(None, |best: Option<(u64, &str)>, (w, url)| match best {
                Some((bw, _)) if bw >= w => best,
                _ => Some((w, url)),
            })
            .and_then(|(_, url)| normalize_media_url(url))
    })
}

fn looks_like_image(url: &str) -> bool {
    url_extension(url)
        .and_then(|e| AssetKind::from_extension(&e))
        .is_some_and(|k| k == AssetKind::Image)
}

/// Best video URL on a pin page; image URLs are never returned
pub fn find_pin_video(html: &str) -> Option<String> {
    let candidate = meta_contents(html, &["og:video"])
        .into_iter()
        .next()
        .or_else(|| meta_contents(html, &["og:video:url"]).into_iter().next())
        .or_else(|| {
            let document = Html::parse_document(html);
            document
                .select(&VIDEO_SELECTOR)
                .find_map(|e| e.value().attr("src").and_then(normalize_media_url))
                .or_else(|| ld_json_video(&document))
                .or_else(|| redux_video(&document))
        })?;

    if looks_like_image(&candidate) {
        debug!(url = %candidate, "pin video candidate is an image, rejecting");
        return None;
    }
    Some(candidate)
}

/// Which pin chain a strategy runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinTarget {
    Image,
    Video,
}

pub struct PinterestPageStrategy {
    name: String,
    target: PinTarget,
    client: reqwest::Client,
    config: StrategyConfig,
}

impl PinterestPageStrategy {
    pub fn new(target: PinTarget, client: reqwest::Client, config: StrategyConfig) -> Self {
        let name = match target {
            PinTarget::Image => "pinterest-image-page",
            PinTarget::Video => "pinterest-video-page",
        };
        Self {
            name: name.to_string(),
            target,
            client,
            config,
        }
    }
}

#[async_trait]
impl ExtractionStrategy for PinterestPageStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> Platform {
        Platform::Pinterest
    }

    fn config(&self) -> &StrategyConfig {
        &self.config
    }

    fn supports(&self, kind: MediaKind) -> bool {
        match self.target {
            PinTarget::Image => kind == MediaKind::Image,
            PinTarget::Video => kind == MediaKind::Video,
        }
    }

    async fn attempt(&self, url: &ResolvedUrl) -> Result<RawAssetReference, StrategyError> {
        let html = with_retries(&self.name, self.config.retries, || {
            fetch_page(&self.client, url.as_str(), &self.config.headers, self.config.timeout)
        })
        .await?;

        let found = match self.target {
            PinTarget::Image => find_pin_image(&html),
            PinTarget::Video => find_pin_video(&html),
        }
        .ok_or_else(|| StrategyError::NoMedia(format!("no pin {:?} found on {}", self.target, url)))?;
        info!(strategy = %self.name, url = %found, "pin media found");

        let link = match self.target {
            PinTarget::Image => AssetLink::new(found, AssetKind::Image),
            PinTarget::Video => AssetLink::new(found, AssetKind::Video),
        }
        .with_headers(self.config.headers.clone());

        Ok(match self.target {
            PinTarget::Image => RawAssetReference::image(link),
            PinTarget::Video => RawAssetReference::video(link),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_og_image_first() {
        let html = r#"<meta property="og:image" content="https://i.pinimg.com/originals/a.jpg">
            <img src="https://i.pinimg.com/736x/b.jpg">"#;
        assert_eq!(find_pin_image(html).as_deref(), Some("https://i.pinimg.com/originals/a.jpg"));
    }

    #[test]
    fn test_largest_pin_image() {
        let html = r#"<img src="https://i.pinimg.com/236x/small.jpg">
            <img src="https://i.pinimg.com/736x/large.jpg">
            <img src="https://s.pinimg.com/avatar.png" width="60">
            <img src="https://other.com/2000x/unrelated.jpg">"#;
        assert_eq!(find_pin_image(html).as_deref(), Some("https://i.pinimg.com/736x/large.jpg"));
    }

    #[test]
    fn test_video_from_tag() {
        let html = r#"<video><source src="https://v.pinimg.com/videos/mc/720p/a.mp4"></video>"#;
        assert_eq!(
            find_pin_video(html).as_deref(),
            Some("https://v.pinimg.com/videos/mc/720p/a.mp4")
        );
    }

    #[test]
    fn test_video_from_ld_json() {
        let html = r#"<script type="application/ld+json">{"video":{"contentUrl":"https://v.pinimg.com/v.mp4"}}</script>"#;
        assert_eq!(find_pin_video(html).as_deref(), Some("https://v.pinimg.com/v.mp4"));
    }

    #[test]
    fn test_video_from_redux_state() {
        let html = r#"<script type="application/json">{"props":{"initialReduxState":{"pins":{"99":{"videos":{"video_list":{
            "V_HLSV4":{"url":"https://v.pinimg.com/hls.m3u8","width":1080},
            "V_720P":{"url":"https://v.pinimg.com/720.mp4","width":720},
            "V_480P":{"url":"https://v.pinimg.com/480.mp4","width":480}}}}}}}}</script>"#;
        assert_eq!(find_pin_video(html).as_deref(), Some("https://v.pinimg.com/720.mp4"));
    }

    #[test]
    fn test_image_as_video_rejected() {
        let html = r#"<meta property="og:video" content="https://i.pinimg.com/originals/a.jpg">"#;
        assert_eq!(find_pin_video(html), None);
    }
}
