// Worker pool admission

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use social_media_downloader::downloader::{AcquisitionError, AcquisitionPool, Coordinator, Platform};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn slow_video_server(delay: Duration) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.mp4"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "video/mp4")
                .set_body_bytes(MP4_BYTES.to_vec())
                .set_delay(delay),
        )
        .mount(&server)
        .await;
    server
}

fn pool_for(server: &MockServer, dir: &std::path::Path, workers: usize, queue: usize) -> AcquisitionPool {
    let coordinator = Coordinator::builder(test_config(dir).with_workers(workers, queue))
        .with_rules(video_rules())
        .with_strategies(
            Platform::TikTok,
            vec![Scripted::new("direct", Script::Video(format!("{}/slow.mp4", server.uri()))).boxed()],
        )
        .build();
    AcquisitionPool::new(Arc::new(coordinator))
}

#[tokio::test]
async fn test_full_pool_rejects_immediately() {
    let server = slow_video_server(Duration::from_millis(500)).await;
    let dir = tempfile::tempdir().unwrap();
    let pool = pool_for(&server, dir.path(), 1, 0);

    let first = pool.submit(format!("{}/@user/video/1", server.uri())).unwrap();
    assert_eq!(pool.available(), 0);

    let err = pool.submit(format!("{}/@user/video/2", server.uri())).unwrap_err();
    assert!(matches!(err, AcquisitionError::QueueFull));

    let media = first.await.unwrap().unwrap();
    assert_eq!(media.strategy, "direct");

    // capacity is released once the request finishes
    assert_eq!(pool.available(), 1);
    let again = pool.submit(format!("{}/@user/video/3", server.uri())).unwrap();
    assert!(again.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_queued_requests_all_complete() {
    let server = slow_video_server(Duration::from_millis(50)).await;
    let dir = tempfile::tempdir().unwrap();
    let pool = pool_for(&server, dir.path(), 2, 3);

    let handles: Vec<_> = (0..5)
        .map(|i| pool.submit(format!("{}/@user/video/{}", server.uri(), i)).unwrap())
        .collect();
    assert!(matches!(
        pool.submit(format!("{}/@user/video/99", server.uri())),
        Err(AcquisitionError::QueueFull)
    ));

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    assert_eq!(files_in(dir.path()), 5);
}
