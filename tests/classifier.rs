// Classification against a local mock server

mod common;

use common::*;
use social_media_downloader::downloader::classifier::SlideshowSignals;
use social_media_downloader::downloader::{KindRule, MediaKind, NetworkConfig, Platform, PlatformRule, UrlClassifier};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn classifier(rules: Vec<PlatformRule>) -> UrlClassifier {
    UrlClassifier::new(reqwest::Client::new(), NetworkConfig::default()).with_rules(rules)
}

async fn serve_page(server: &MockServer, route: &str, status: u16, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(status)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_page_keyword_marks_slideshow() {
    let server = MockServer::start().await;
    let page = r#"<html><body><script>window.__STATE__={"imagePost":{"images":[]}}</script></body></html>"#;
    serve_page(&server, "/@user/video/7201", 200, page.to_string()).await;

    let classification = classifier(slideshow_rules())
        .classify(&format!("{}/@user/video/7201", server.uri()))
        .await
        .unwrap();
    assert_eq!(classification.platform, Platform::TikTok);
    assert_eq!(classification.kind, MediaKind::Slideshow);
}

#[tokio::test]
async fn test_word_frequency_marks_slideshow() {
    let server = MockServer::start().await;
    let page = format!("<html><body>{}</body></html>", "<span>photo</span>".repeat(70));
    serve_page(&server, "/@user/video/7202", 200, page).await;

    let classification = classifier(slideshow_rules())
        .classify(&format!("{}/@user/video/7202", server.uri()))
        .await
        .unwrap();
    assert_eq!(classification.kind, MediaKind::Slideshow);
}

#[tokio::test]
async fn test_plain_page_stays_video() {
    let server = MockServer::start().await;
    serve_page(&server, "/@user/video/7203", 200, "<html><body><video></video></body></html>".to_string()).await;

    let classification = classifier(slideshow_rules())
        .classify(&format!("{}/@user/video/7203", server.uri()))
        .await
        .unwrap();
    assert_eq!(classification.kind, MediaKind::Video);
}

#[tokio::test]
async fn test_failed_page_fetch_defaults_to_video() {
    let server = MockServer::start().await;
    serve_page(&server, "/@user/video/7204", 500, "imagePost".to_string()).await;

    let classification = classifier(slideshow_rules())
        .classify(&format!("{}/@user/video/7204", server.uri()))
        .await
        .unwrap();
    assert_eq!(classification.platform, Platform::TikTok);
    assert_eq!(classification.kind, MediaKind::Video);
}

#[tokio::test]
async fn test_short_link_keeps_target_of_rejected_redirect() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/t/ZT9/"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/@user/photo/7300"))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/@user/photo/7300"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let rules = vec![PlatformRule::new(
        Platform::TikTok,
        &["127.0.0.1"],
        KindRule::Slideshow(SlideshowSignals::default()),
    )
    .with_short_paths(&["/t/"])];

    let classification = classifier(rules)
        .classify(&format!("{}/t/ZT9/", server.uri()))
        .await
        .unwrap();
    assert!(classification.url.as_str().ends_with("/@user/photo/7300"));
    assert_eq!(classification.url.original(), format!("{}/t/ZT9/", server.uri()));
    assert_eq!(classification.kind, MediaKind::Slideshow);
}

#[tokio::test]
async fn test_unreachable_short_link_keeps_input() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/t/ZT8/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let rules = vec![PlatformRule::new(Platform::TikTok, &["127.0.0.1"], KindRule::Fixed(MediaKind::Video))
        .with_short_paths(&["/t/"])];

    let classification = classifier(rules)
        .classify(&format!("{}/t/ZT8/", server.uri()))
        .await
        .unwrap();
    assert_eq!(classification.url.as_str(), format!("{}/t/ZT8/", server.uri()));
    assert_eq!(classification.kind, MediaKind::Video);
}
