// Strategy set: ordered fallback over extraction strategies

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use super::errors::{AcquisitionError, StrategyError};
use super::extractors::slideshow::{fetch_bundle, SlideshowExtractor, SLIDESHOW_STRATEGY};
use super::fetcher::AssetFetcher;
use super::models::{AcquiredMedia, AssetKind, MediaContent, MediaKind, Platform, RawAssetReference, ResolvedUrl};
use super::traits::ExtractionStrategy;

/// Absolute point after which a request is abandoned
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    at: Instant,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            at: started + budget,
        }
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// What the last failed attempt was, for the terminal error
#[derive(Debug, Default)]
struct LastFailure {
    strategy: Option<String>,
    error: Option<String>,
}

impl LastFailure {
    fn record(&mut self, strategy: &str, error: &StrategyError) {
        self.strategy = Some(strategy.to_string());
        self.error = Some(error.to_string());
    }
}

/// Ordered strategies for one platform. Strategies run one at a time in
/// declared order; the first that yields a validated asset wins.
pub struct StrategySet {
    platform: Platform,
    strategies: Vec<Box<dyn ExtractionStrategy>>,
    fetcher: Arc<AssetFetcher>,
    slideshow: Option<Arc<SlideshowExtractor>>,
    fan_out: usize,
}

impl StrategySet {
    pub fn new(platform: Platform, fetcher: Arc<AssetFetcher>) -> Self {
        Self {
            platform,
            strategies: Vec::new(),
            fetcher,
            slideshow: None,
            fan_out: 4,
        }
    }

    pub fn add_strategy(&mut self, strategy: Box<dyn ExtractionStrategy>) {
        self.strategies.push(strategy);
    }

    pub fn with_strategies(mut self, strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        self.strategies.extend(strategies);
        self
    }

    /// Slideshow requests go to the extractor before any strategy
    pub fn with_slideshow_extractor(mut self, extractor: Arc<SlideshowExtractor>) -> Self {
        self.fan_out = extractor.config().fan_out;
        self.slideshow = Some(extractor);
        self
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Strategy names in the order they would run for `kind`
    pub fn plan(&self, kind: MediaKind) -> Vec<&str> {
        let mut names = Vec::new();
        if kind == MediaKind::Slideshow && self.slideshow.is_some() {
            names.push(SLIDESHOW_STRATEGY);
        }
        names.extend(
            self.strategies
                .iter()
                .filter(|s| s.supports(kind))
                .map(|s| s.name()),
        );
        names
    }

    fn media(&self, strategy: &str, content: MediaContent) -> AcquiredMedia {
        AcquiredMedia {
            platform: self.platform,
            strategy: strategy.to_string(),
            content,
        }
    }

    fn timeout_error(&self, deadline: &Deadline, last: LastFailure) -> AcquisitionError {
        AcquisitionError::Timeout {
            platform: self.platform,
            elapsed: deadline.elapsed(),
            last_strategy: last.strategy,
            last_error: last.error,
        }
    }

    /// Run the set for a classified URL
    pub async fn run(
        &self,
        url: &ResolvedUrl,
        kind: MediaKind,
        deadline: &Deadline,
    ) -> Result<AcquiredMedia, AcquisitionError> {
        let mut last = LastFailure::default();

        if kind == MediaKind::Slideshow {
            if let Some(extractor) = &self.slideshow {
                info!(platform = %self.platform, strategy = SLIDESHOW_STRATEGY, "Trying strategy");
                match extractor.extract(url, deadline.instant()).await {
                    Ok(bundle) => {
                        info!(
                            platform = %self.platform,
                            strategy = SLIDESHOW_STRATEGY,
                            images = bundle.images().len(),
                            audio = bundle.audio().is_some(),
                            "Success with strategy"
                        );
                        return Ok(self.media(SLIDESHOW_STRATEGY, MediaContent::Slideshow(bundle)));
                    }
                    Err(e) => {
                        warn!(platform = %self.platform, strategy = SLIDESHOW_STRATEGY, error = %e, "strategy failed");
                        last.record(SLIDESHOW_STRATEGY, &e);
                    }
                }
            }
        }

        for strategy in self.strategies.iter().filter(|s| s.supports(kind)) {
            if deadline.expired() {
                warn!(platform = %self.platform, skipped = strategy.name(), "deadline exceeded, abandoning remaining strategies");
                return Err(self.timeout_error(deadline, last));
            }

            let name = strategy.name();
            let limit = strategy.config().timeout.min(deadline.remaining());
            info!(platform = %self.platform, strategy = %name, timeout = ?limit, "Trying strategy");

            let reference = match tokio::time::timeout(limit, strategy.attempt(url)).await {
                Ok(Ok(reference)) => reference,
                Ok(Err(e)) => {
                    warn!(platform = %self.platform, strategy = %name, error = %e, "strategy failed");
                    last.record(name, &e);
                    continue;
                }
                Err(_) => {
                    let e = StrategyError::Timeout(limit);
                    warn!(platform = %self.platform, strategy = %name, error = %e, "strategy failed");
                    last.record(name, &e);
                    continue;
                }
            };

            match self.materialize(reference, kind, deadline).await {
                Ok(content) => {
                    info!(platform = %self.platform, strategy = %name, "Success with strategy");
                    return Ok(self.media(name, content));
                }
                Err(e) => {
                    warn!(platform = %self.platform, strategy = %name, error = %e, "strategy result rejected");
                    last.record(name, &e);
                }
            }
        }

        if deadline.expired() {
            return Err(self.timeout_error(deadline, last));
        }
        Err(AcquisitionError::AllStrategiesExhausted {
            platform: self.platform,
            last_strategy: last.strategy,
            last_error: last.error,
        })
    }

    /// Download what a strategy found. The reference must match the kind
    /// decided at classification.
    async fn materialize(
        &self,
        reference: RawAssetReference,
        kind: MediaKind,
        deadline: &Deadline,
    ) -> Result<MediaContent, StrategyError> {
        if reference.kind != kind {
            return Err(StrategyError::NoMedia(format!(
                "expected {} but strategy found {}",
                kind, reference.kind
            )));
        }

        match kind {
            MediaKind::Slideshow => {
                let images = reference.all_of(AssetKind::Image);
                let audio = reference.first_of(AssetKind::Audio).cloned();
                let bundle = fetch_bundle(&self.fetcher, self.fan_out, images, audio, deadline.instant()).await?;
                Ok(MediaContent::Slideshow(bundle))
            }
            MediaKind::Video | MediaKind::Image => {
                let expected = if kind == MediaKind::Image {
                    AssetKind::Image
                } else {
                    AssetKind::Video
                };
                let link = reference
                    .first_of(expected)
                    .ok_or_else(|| StrategyError::NoMedia(format!("no {} link in result", expected)))?;
                let asset = self.fetcher.fetch_within(link, deadline.remaining()).await?;
                Ok(MediaContent::Single(asset))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::AssetLink;
    use crate::downloader::traits::StrategyConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Failing {
        name: &'static str,
        calls: Arc<AtomicUsize>,
        config: StrategyConfig,
    }

    #[async_trait]
    impl ExtractionStrategy for Failing {
        fn name(&self) -> &str {
            self.name
        }

        fn platform(&self) -> Platform {
            Platform::TikTok
        }

        fn config(&self) -> &StrategyConfig {
            &self.config
        }

        async fn attempt(&self, _url: &ResolvedUrl) -> Result<RawAssetReference, StrategyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StrategyError::NoMedia(format!("{} found nothing", self.name)))
        }
    }

    struct WrongKind {
        config: StrategyConfig,
    }

    #[async_trait]
    impl ExtractionStrategy for WrongKind {
        fn name(&self) -> &str {
            "wrong-kind"
        }

        fn platform(&self) -> Platform {
            Platform::TikTok
        }

        fn config(&self) -> &StrategyConfig {
            &self.config
        }

        async fn attempt(&self, _url: &ResolvedUrl) -> Result<RawAssetReference, StrategyError> {
            Ok(RawAssetReference::image(AssetLink::new("https://x/y.jpg", AssetKind::Image)))
        }
    }

    fn url() -> ResolvedUrl {
        ResolvedUrl::new("https://www.tiktok.com/@a/video/1", url::Url::parse("https://www.tiktok.com/@a/video/1").unwrap())
    }

    fn fetcher() -> Arc<AssetFetcher> {
        Arc::new(AssetFetcher::new(reqwest::Client::new(), std::env::temp_dir()))
    }

    #[tokio::test]
    async fn test_exhausted_reports_last_strategy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let set = StrategySet::new(Platform::TikTok, fetcher()).with_strategies(vec![
            Box::new(Failing { name: "first", calls: calls.clone(), config: StrategyConfig::default() }),
            Box::new(Failing { name: "second", calls: calls.clone(), config: StrategyConfig::default() }),
        ]);

        let err = set
            .run(&url(), MediaKind::Video, &Deadline::after(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match err {
            AcquisitionError::AllStrategiesExhausted { platform, last_strategy, last_error } => {
                assert_eq!(platform, Platform::TikTok);
                assert_eq!(last_strategy.as_deref(), Some("second"));
                assert!(last_error.unwrap_or_default().contains("second found nothing"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_expired_deadline_skips_strategies() {
        let calls = Arc::new(AtomicUsize::new(0));
        let set = StrategySet::new(Platform::TikTok, fetcher()).with_strategies(vec![Box::new(Failing {
            name: "first",
            calls: calls.clone(),
            config: StrategyConfig::default(),
        })]);

        let err = set
            .run(&url(), MediaKind::Video, &Deadline::after(Duration::ZERO))
            .await
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::Timeout { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reference_of_other_kind_rejected() {
        let set = StrategySet::new(Platform::TikTok, fetcher())
            .with_strategies(vec![Box::new(WrongKind { config: StrategyConfig::default() })]);
        let err = set
            .run(&url(), MediaKind::Video, &Deadline::after(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::AllStrategiesExhausted { .. }));
    }

    #[test]
    fn test_plan_filters_by_kind() {
        let calls = Arc::new(AtomicUsize::new(0));
        let set = StrategySet::new(Platform::TikTok, fetcher()).with_strategies(vec![Box::new(Failing {
            name: "video-only",
            calls,
            config: StrategyConfig::default(),
        })]);
        assert_eq!(set.plan(MediaKind::Video), vec!["video-only"]);
        assert!(set.plan(MediaKind::Image).is_empty());
    }
}
