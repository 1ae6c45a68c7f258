// HTML heuristics for locating media links in a fetched page
//
// All functions are synchronous and take the raw page text: scraper's `Html`
// is not Send, so parsing never lives across an await point.

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use crate::downloader::models::AssetKind;
use crate::downloader::utils::{normalize_media_url, url_extension};

/// Script contents that announce an embedded state object
pub const STATE_MARKERS: &[&str] = &[
    "__UNIVERSAL_DATA_FOR_REHYDRATION__",
    "SIGI_STATE",
    "__NEXT_DATA__",
    "__INITIAL_STATE__",
    "window._sharedData",
    "__additionalDataLoaded",
    "ItemModule",
    "imagePost",
];

pub const IMAGE_META: &[&str] = &[
    "og:image",
    "og:image:url",
    "og:image:secure_url",
    "twitter:image",
    "twitter:image:src",
];

pub const AUDIO_META: &[&str] = &["og:audio", "og:audio:url", "og:audio:secure_url"];

pub const VIDEO_META: &[&str] = &[
    "og:video",
    "og:video:url",
    "og:video:secure_url",
    "twitter:player:stream",
];

lazy_static! {
    static ref META_SELECTOR: Selector = Selector::parse("meta[content]").unwrap();
    static ref SCRIPT_SELECTOR: Selector = Selector::parse("script").unwrap();
    static ref IMG_SELECTOR: Selector =
        Selector::parse("img[src], img[data-src], img[srcset], picture source[srcset]").unwrap();
    static ref STYLE_SELECTOR: Selector = Selector::parse("[style]").unwrap();
    static ref CSS_URL_RE: Regex = Regex::new(r#"url\(\s*['"]?([^'")]+?)['"]?\s*\)"#).unwrap();
    static ref ABSOLUTE_URL_RE: Regex =
        Regex::new(r#"(?i)(?:https?:)?//[a-z0-9.-]+\.[a-z]{2,}/[^\s"'<>\\)]+"#).unwrap();
}

/// Ordered, deduplicated media URLs found on one page
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PageAssets {
    pub images: Vec<String>,
    pub audio: Option<String>,
}

impl PageAssets {
    pub fn push_image(&mut self, url: String) -> bool {
        if self.images.contains(&url) {
            return false;
        }
        self.images.push(url);
        true
    }

    pub fn set_audio(&mut self, url: Option<String>) {
        if self.audio.is_none() {
            self.audio = url;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.audio.is_none()
    }
}

fn host_matches(url: &str, cdn_hosts: &[String]) -> bool {
    if cdn_hosts.is_empty() {
        return true;
    }
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .is_some_and(|host| cdn_hosts.iter().any(|h| host.contains(h.as_str())))
}

/// `content` of meta tags whose `property`/`name` is in `names`, document order
pub fn meta_contents(html: &str, names: &[&str]) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut urls = Vec::new();
    for tag in document.select(&META_SELECTOR) {
        let marker = tag
            .value()
            .attr("property")
            .or_else(|| tag.value().attr("name"))
            .or_else(|| tag.value().attr("itemprop"))
            .unwrap_or("")
            .to_ascii_lowercase();
        if !names.contains(&marker.as_str()) {
            continue;
        }
        if let Some(url) = tag.value().attr("content").and_then(normalize_media_url) {
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
    }
    urls
}

/// Step 1: structured metadata tags
pub fn scan_meta(html: &str) -> PageAssets {
    let mut assets = PageAssets::default();
    for url in meta_contents(html, IMAGE_META) {
        assets.push_image(url);
    }
    assets.set_audio(meta_contents(html, AUDIO_META).into_iter().next());
    assets
}

fn parse_first_json(text: &str) -> Option<Value> {
    serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .next()
        .and_then(Result::ok)
}

/// Pull a JSON value out of a script body: either the whole body, or the first
/// object following an assignment like `window.X = {...};`
fn script_json(text: &str, declared_json: bool) -> Option<Value> {
    let trimmed = text.trim();
    if declared_json || trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return Some(value);
        }
    }

    for marker in STATE_MARKERS {
        let Some(pos) = trimmed.find(marker) else {
            continue;
        };
        let Some(brace) = trimmed[pos..].find('{') else {
            continue;
        };
        if let Some(value) = parse_first_json(&trimmed[pos + brace..]) {
            return Some(value);
        }
    }
    None
}

/// Step 2 input: every inline script that parses as (or embeds) JSON state
pub fn script_json_blobs(html: &str) -> Vec<Value> {
    let document = Html::parse_document(html);
    let mut blobs = Vec::new();
    for script in document.select(&SCRIPT_SELECTOR) {
        if script.value().attr("src").is_some() {
            continue;
        }
        let declared_json = script
            .value()
            .attr("type")
            .is_some_and(|t| t.to_ascii_lowercase().contains("json"));
        let text: String = script.text().collect();
        if !declared_json && !STATE_MARKERS.iter().any(|m| text.contains(m)) {
            continue;
        }
        if let Some(value) = script_json(&text, declared_json) {
            blobs.push(value);
        }
    }
    blobs
}

/// Largest candidate of a `srcset` list (by `w` or `x` descriptor)
pub fn best_from_srcset(srcset: &str) -> Option<String> {
    let mut best: Option<(f64, String)> = None;
    for entry in srcset.split(',') {
        let mut parts = entry.split_whitespace();
        let Some(raw) = parts.next() else {
            continue;
        };
        let weight = parts
            .next()
            .and_then(|d| d.trim_end_matches(['w', 'x']).parse::<f64>().ok())
            .unwrap_or(1.0);
        if best.as_ref().map_or(true, |(w, _)| weight > *w) {
            best = Some((weight, raw.to_string()));
        }
    }
    best.and_then(|(_, url)| normalize_media_url(&url))
}

fn element_image(element: &ElementRef) -> Option<String> {
    let value = element.value();
    if let Some(url) = value.attr("srcset").and_then(best_from_srcset) {
        return Some(url);
    }
    value
        .attr("data-src")
        .or_else(|| value.attr("src"))
        .and_then(normalize_media_url)
}

/// Step 3: `<img>` / `<picture>` elements hosted on the media CDN
pub fn scan_dom_images(html: &str, cdn_hosts: &[String]) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut urls: Vec<String> = Vec::new();
    for element in document.select(&IMG_SELECTOR) {
        if let Some(url) = element_image(&element) {
            if host_matches(&url, cdn_hosts) && !urls.contains(&url) {
                urls.push(url);
            }
        }
    }
    urls
}

/// Step 4: `background-image: url(...)` in inline styles
pub fn scan_inline_styles(html: &str, cdn_hosts: &[String]) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut urls: Vec<String> = Vec::new();
    for element in document.select(&STYLE_SELECTOR) {
        let Some(style) = element.value().attr("style") else {
            continue;
        };
        for caps in CSS_URL_RE.captures_iter(style) {
            let Some(url) = normalize_media_url(&caps[1]) else {
                continue;
            };
            if host_matches(&url, cdn_hosts) && !urls.contains(&url) {
                urls.push(url);
            }
        }
    }
    urls
}

/// Undo the escaping that inline JSON applies to URLs
pub fn unescape_page(html: &str) -> String {
    html.replace("\\u002F", "/")
        .replace("\\u002f", "/")
        .replace("\\u0026", "&")
        .replace("\\/", "/")
}

/// Every absolute (or protocol-relative) URL in the raw text, normalized
pub fn all_urls(html: &str) -> Vec<String> {
    let text = unescape_page(html);
    let mut urls: Vec<String> = Vec::new();
    for m in ABSOLUTE_URL_RE.find_iter(&text) {
        if let Some(url) = normalize_media_url(m.as_str()) {
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
    }
    urls
}

/// Step 5: broad sweep over the raw text for image/audio URLs
pub fn sweep_raw_text(html: &str, cdn_hosts: &[String]) -> PageAssets {
    let mut assets = PageAssets::default();
    for url in all_urls(html) {
        let kind = url_extension(&url).and_then(|e| AssetKind::from_extension(&e));
        match kind {
            Some(AssetKind::Image) => {
                assets.push_image(url);
            }
            Some(AssetKind::Audio) => assets.set_audio(Some(url)),
            Some(AssetKind::Video) => {}
            None if !cdn_hosts.is_empty() && host_matches(&url, cdn_hosts) => {
                assets.push_image(url);
            }
            None => {}
        }
    }
    assets
}

/// Case-insensitive count of `needle` in `haystack`
pub fn count_occurrences(haystack: &str, needle: &str) -> usize {
    haystack.to_lowercase().matches(&needle.to_lowercase()).count()
}
