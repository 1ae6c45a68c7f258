// Network-backed strategies against mock services

mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use common::*;
use serde_json::json;
use social_media_downloader::downloader::backends::{EmbedApiStrategy, PageScrapeStrategy, PinTarget, PinterestPageStrategy};
use social_media_downloader::downloader::utils::fetch_page;
use social_media_downloader::downloader::{
    AssetFetcher, AssetKind, AssetLink, ExtractionStrategy, FetchFailure, MediaKind, Platform, StrategyConfig,
    StrategyError,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const POST: &str = "https://www.tiktok.com/@user/video/7101";

fn api(server: &MockServer) -> EmbedApiStrategy {
    EmbedApiStrategy::new(
        "mock-api",
        Platform::TikTok,
        &format!("{}/api/", server.uri()),
        reqwest::Client::new(),
        StrategyConfig::default().with_param("hd", "1"),
    )
}

#[tokio::test]
async fn test_mirror_video_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/"))
        .and(query_param("url", POST))
        .and(query_param("hd", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {"hdplay": "https://cdn.example.com/v/hd.mp4", "cover": "https://cdn.example.com/c.jpg"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reference = api(&server).attempt(&resolved(POST)).await.unwrap();
    assert_eq!(reference.kind, MediaKind::Video);
    assert_eq!(reference.first_of(AssetKind::Video).unwrap().url, "https://cdn.example.com/v/hd.mp4");
}

#[tokio::test]
async fn test_mirror_slideshow_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {
                "play": "https://cdn.example.com/music/track.mp3",
                "images": ["https://cdn.example.com/p/1.jpg", "https://cdn.example.com/p/2.jpg"]
            }
        })))
        .mount(&server)
        .await;

    let reference = api(&server).attempt(&resolved(POST)).await.unwrap();
    assert_eq!(reference.kind, MediaKind::Slideshow);
    let images: Vec<String> = reference.all_of(AssetKind::Image).into_iter().map(|l| l.url).collect();
    assert_eq!(images, vec!["https://cdn.example.com/p/1.jpg", "https://cdn.example.com/p/2.jpg"]);
    assert_eq!(
        reference.first_of(AssetKind::Audio).map(|l| l.url.as_str()),
        Some("https://cdn.example.com/music/track.mp3")
    );
}

#[tokio::test]
async fn test_mirror_in_band_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": -1, "msg": "Url parsing is failed!"})))
        .mount(&server)
        .await;

    let err = api(&server).attempt(&resolved(POST)).await.unwrap_err();
    assert!(matches!(err, StrategyError::NoMedia(ref m) if m.contains("Url parsing is failed")));
}

#[tokio::test]
async fn test_mirror_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = api(&server).attempt(&resolved(POST)).await.unwrap_err();
    assert!(matches!(err, StrategyError::Blocked(_)));
}

#[tokio::test]
async fn test_page_scrape_finds_video() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/@user/video/7102"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><head><meta property="og:video" content="https://v16.tiktokcdn.com/abc/video.mp4"></head></html>"#,
        ))
        .mount(&server)
        .await;

    let page = format!("{}/@user/video/7102", server.uri());
    let strategy = PageScrapeStrategy::new("page-scrape", Platform::TikTok, reqwest::Client::new(), StrategyConfig::default())
        .with_cdn_hosts(&["tiktokcdn"]);
    let reference = strategy.attempt(&resolved(&page)).await.unwrap();

    let link = reference.first_of(AssetKind::Video).unwrap();
    assert_eq!(link.url, "https://v16.tiktokcdn.com/abc/video.mp4");
    assert_eq!(link.headers.get("Referer").map(String::as_str), Some(page.as_str()));
}

#[tokio::test]
async fn test_page_scrape_uses_template() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/p/CxYz/embed/captioned/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<script>{"video_url":"https:\/\/scontent.cdninstagram.com\/v\/clip.mp4?oh=1"}</script>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let strategy = PageScrapeStrategy::new("embed-scrape", Platform::Instagram, reqwest::Client::new(), StrategyConfig::default())
        .with_page_template(&format!("{}/p/{{id}}/embed/captioned/", server.uri()))
        .with_cdn_hosts(&["cdninstagram"]);
    let reference = strategy
        .attempt(&resolved("https://www.instagram.com/p/CxYz/"))
        .await
        .unwrap();
    assert_eq!(
        reference.first_of(AssetKind::Video).unwrap().url,
        "https://scontent.cdninstagram.com/v/clip.mp4?oh=1"
    );
}

#[tokio::test]
async fn test_page_without_video_is_no_media() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/@user/video/7103"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>nothing</body></html>"))
        .mount(&server)
        .await;

    let strategy = PageScrapeStrategy::new("page-scrape", Platform::TikTok, reqwest::Client::new(), StrategyConfig::default());
    let err = strategy
        .attempt(&resolved(&format!("{}/@user/video/7103", server.uri())))
        .await
        .unwrap_err();
    assert!(matches!(err, StrategyError::NoMedia(_)));
}

#[tokio::test]
async fn test_pin_image_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pin/123/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<img src="https://i.pinimg.com/236x/s.jpg"><img src="https://i.pinimg.com/736x/l.jpg">"#,
        ))
        .mount(&server)
        .await;

    let strategy = PinterestPageStrategy::new(PinTarget::Image, reqwest::Client::new(), StrategyConfig::default());
    assert!(strategy.supports(MediaKind::Image));
    assert!(!strategy.supports(MediaKind::Video));

    let reference = strategy
        .attempt(&resolved(&format!("{}/pin/123/", server.uri())))
        .await
        .unwrap();
    assert_eq!(reference.kind, MediaKind::Image);
    assert_eq!(reference.first_of(AssetKind::Image).unwrap().url, "https://i.pinimg.com/736x/l.jpg");
}

#[tokio::test]
async fn test_client_timeout_reports_the_call_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(JPEG_BYTES.to_vec())
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;
    // the client gives up well before the per-call limit fires
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    let limit = Duration::from_secs(3);

    let err = fetch_page(&client, &format!("{}/page", server.uri()), &BTreeMap::new(), limit)
        .await
        .unwrap_err();
    match err {
        StrategyError::Timeout(waited) => assert_eq!(waited, limit),
        other => panic!("unexpected error: {:?}", other),
    }

    let dir = tempfile::tempdir().unwrap();
    let fetcher = AssetFetcher::new(client, dir.path()).with_timeout(limit);
    let link = AssetLink::new(format!("{}/img/1.jpg", server.uri()), AssetKind::Image);
    match fetcher.fetch(&link).await.unwrap_err() {
        FetchFailure::Timeout(waited) => assert_eq!(waited, limit),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(files_in(dir.path()), 0);
}
