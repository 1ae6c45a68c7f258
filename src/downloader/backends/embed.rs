// Third-party mirror ("embed API") backends
//
// Services such as tikwm or tiklydown proxy a post through their own JSON API.
// Response shapes differ between services and change over time, so the body is
// searched with the key vocabulary instead of a fixed schema.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::downloader::errors::StrategyError;
use crate::downloader::extractors::json_walk::{find_by_priority, find_slideshow_assets, VIDEO_KEYS};
use crate::downloader::models::{AssetKind, AssetLink, MediaKind, Platform, RawAssetReference, ResolvedUrl};
use crate::downloader::traits::{ExtractionStrategy, StrategyConfig};
use crate::downloader::utils::{fetch_json, url_extension, with_retries};

pub const TIKWM_ENDPOINT: &str = "https://www.tikwm.com/api/";
pub const TIKLYDOWN_ENDPOINT: &str = "https://api.tiklydown.eu.org/api/download";

/// GET `{endpoint}?url=<post>&<extra params>` and read the media links from JSON
pub struct EmbedApiStrategy {
    name: String,
    platform: Platform,
    endpoint: String,
    client: reqwest::Client,
    config: StrategyConfig,
}

impl EmbedApiStrategy {
    pub fn new(
        name: &str,
        platform: Platform,
        endpoint: &str,
        client: reqwest::Client,
        config: StrategyConfig,
    ) -> Self {
        Self {
            name: name.to_string(),
            platform,
            endpoint: endpoint.to_string(),
            client,
            config,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_url(&self, post: &ResolvedUrl) -> Result<Url, StrategyError> {
        let mut pairs = vec![("url".to_string(), post.as_str().to_string())];
        pairs.extend(
            self.config
                .extra_params
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        Url::parse_with_params(&self.endpoint, &pairs)
            .map_err(|e| StrategyError::Execution(format!("invalid endpoint {}: {}", self.endpoint, e)))
    }
}

fn is_image_url(url: &str) -> bool {
    url_extension(url)
        .and_then(|e| AssetKind::from_extension(&e))
        .is_some_and(|k| k == AssetKind::Image)
}

fn is_audio_url(url: &str) -> bool {
    url_extension(url)
        .and_then(|e| AssetKind::from_extension(&e))
        .is_some_and(|k| k == AssetKind::Audio)
}

/// Mirrors report failures in-band (`{"code": -1, "msg": "..."}`)
fn api_error(body: &Value) -> Option<String> {
    let code = body.get("code").and_then(Value::as_i64)?;
    if code == 0 || code == 200 {
        return None;
    }
    let msg = body
        .get("msg")
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    Some(format!("code {}: {}", code, msg))
}

/// Turn a mirror response into a reference. A body that lists images but no
/// playable video is a slideshow; its `play` field is then the soundtrack.
pub fn interpret_response(
    body: &Value,
    headers: &BTreeMap<String, String>,
) -> Result<RawAssetReference, StrategyError> {
    if let Some(message) = api_error(body) {
        return Err(StrategyError::NoMedia(message));
    }

    let video = find_by_priority(body, VIDEO_KEYS);
    let findings = find_slideshow_assets(body);

    let playable = video
        .as_deref()
        .filter(|u| !is_image_url(u) && !is_audio_url(u));

    if let Some(url) = playable {
        if findings.images.is_empty() {
            return Ok(RawAssetReference::video(
                AssetLink::new(url, AssetKind::Video).with_headers(headers.clone()),
            ));
        }
    }

    if !findings.images.is_empty() {
        let audio = findings
            .audio
            .or_else(|| video.filter(|u| is_audio_url(u)))
            .map(|u| AssetLink::new(u, AssetKind::Audio).with_headers(headers.clone()));
        let images = findings
            .images
            .into_iter()
            .map(|u| AssetLink::new(u, AssetKind::Image).with_headers(headers.clone()))
            .collect();
        return Ok(RawAssetReference::slideshow(images, audio));
    }

    Err(StrategyError::NoMedia("mirror response has no media link".to_string()))
}

#[async_trait]
impl ExtractionStrategy for EmbedApiStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> Platform {
        self.platform
    }

    fn config(&self) -> &StrategyConfig {
        &self.config
    }

    fn supports(&self, kind: MediaKind) -> bool {
        matches!(kind, MediaKind::Video | MediaKind::Slideshow)
    }

    async fn attempt(&self, url: &ResolvedUrl) -> Result<RawAssetReference, StrategyError> {
        let request = self.request_url(url)?;
        debug!(strategy = %self.name, endpoint = %self.endpoint, "querying mirror");

        let body = with_retries(&self.name, self.config.retries, || {
            fetch_json(&self.client, request.as_str(), &self.config.headers, self.config.timeout)
        })
        .await?;

        let reference = interpret_response(&body, &self.config.headers)?;
        info!(strategy = %self.name, kind = %reference.kind, links = reference.links.len(), "mirror found media");
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_video_response() {
        let body = json!({"code": 0, "data": {"play": "https://v.tikwm.com/sd.mp4", "hdplay": "https://v.tikwm.com/hd.mp4", "cover": "https://p.tikwm.com/c.jpeg"}});
        let reference = interpret_response(&body, &BTreeMap::new()).unwrap();
        assert_eq!(reference.kind, MediaKind::Video);
        assert_eq!(reference.links[0].url, "https://v.tikwm.com/hd.mp4");
    }

    #[test]
    fn test_slideshow_response() {
        let body = json!({"code": 0, "data": {
            "play": "https://sf16.tiktokcdn.com/music.mp3",
            "images": ["https://p16.tiktokcdn.com/1.jpeg", "https://p16.tiktokcdn.com/2.jpeg"]
        }});
        let reference = interpret_response(&body, &BTreeMap::new()).unwrap();
        assert_eq!(reference.kind, MediaKind::Slideshow);
        assert_eq!(reference.all_of(AssetKind::Image).len(), 2);
        assert_eq!(
            reference.first_of(AssetKind::Audio).map(|l| l.url.as_str()),
            Some("https://sf16.tiktokcdn.com/music.mp3")
        );
    }

    #[test]
    fn test_in_band_error() {
        let body = json!({"code": -1, "msg": "Url parsing is failed!"});
        let err = interpret_response(&body, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, StrategyError::NoMedia(m) if m.contains("parsing")));
    }

    #[test]
    fn test_empty_response() {
        assert!(interpret_response(&json!({"data": {}}), &BTreeMap::new()).is_err());
    }

    #[test]
    fn test_request_url_carries_post_and_params() {
        let strategy = EmbedApiStrategy::new(
            "tikwm",
            Platform::TikTok,
            TIKWM_ENDPOINT,
            reqwest::Client::new(),
            StrategyConfig::default().with_param("hd", "1"),
        );
        let post = ResolvedUrl::new(
            "https://www.tiktok.com/@a/video/1",
            Url::parse("https://www.tiktok.com/@a/video/1").unwrap(),
        );
        let request = strategy.request_url(&post).unwrap();
        let params: BTreeMap<String, String> = request.query_pairs().into_owned().collect();
        assert_eq!(params.get("url").map(String::as_str), Some("https://www.tiktok.com/@a/video/1"));
        assert_eq!(params.get("hd").map(String::as_str), Some("1"));
    }
}
