// Shared fixtures for the integration tests
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use social_media_downloader::downloader::classifier::SlideshowSignals;
use social_media_downloader::downloader::{
    AcquisitionConfig, AssetKind, AssetLink, ExtractionStrategy, KindRule, MediaKind, Platform,
    PlatformRule, RawAssetReference, ResolvedUrl, SlideshowConfig, StrategyConfig, StrategyError,
};

/// Leading bytes of an ISO media file
pub const MP4_BYTES: &[u8] = b"\x00\x00\x00\x18ftypisom\x00\x00\x02\x00isomiso2mp41 fake video payload";
pub const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01];
pub const MP3_BYTES: &[u8] = b"ID3\x03\x00\x00\x00\x00\x00\x00 fake audio";

/// Config writing into `dir`, with no real-network lookup endpoint
pub fn test_config(dir: &Path) -> AcquisitionConfig {
    AcquisitionConfig::default()
        .with_scratch_dir(dir)
        .with_deadline(Duration::from_secs(10))
        .with_fetch_timeout(Duration::from_secs(5))
        .with_slideshow(SlideshowConfig::default().with_lookup_endpoint(None))
}

/// Map the mock server host onto TikTok with the given kind rule
pub fn local_rules(kind_rule: KindRule) -> Vec<PlatformRule> {
    vec![PlatformRule::new(Platform::TikTok, &["127.0.0.1"], kind_rule)]
}

pub fn video_rules() -> Vec<PlatformRule> {
    local_rules(KindRule::Fixed(MediaKind::Video))
}

pub fn slideshow_rules() -> Vec<PlatformRule> {
    local_rules(KindRule::Slideshow(SlideshowSignals::default()))
}

pub fn resolved(raw: &str) -> ResolvedUrl {
    ResolvedUrl::new(raw, url::Url::parse(raw).unwrap())
}

/// Number of finished files (partials included) in the scratch directory
pub fn files_in(dir: &Path) -> usize {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(Result::ok).filter(|e| e.path().is_file()).count(),
        Err(_) => 0,
    }
}

/// What a scripted strategy does when attempted
#[derive(Clone)]
pub enum Script {
    /// Never answers
    Hang,
    Fail(StrategyError),
    Video(String),
    Reference(RawAssetReference),
}

/// Strategy driven by a script, counting its attempts
pub struct Scripted {
    name: String,
    script: Script,
    calls: Arc<AtomicUsize>,
    config: StrategyConfig,
    kinds: Vec<MediaKind>,
}

impl Scripted {
    pub fn new(name: &str, script: Script) -> Self {
        Self {
            name: name.to_string(),
            script,
            calls: Arc::new(AtomicUsize::new(0)),
            config: StrategyConfig::default(),
            kinds: vec![MediaKind::Video],
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_timeout(timeout);
        self
    }

    pub fn with_kinds(mut self, kinds: &[MediaKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    pub fn boxed(self) -> Box<dyn ExtractionStrategy> {
        Box::new(self)
    }
}

#[async_trait]
impl ExtractionStrategy for Scripted {
    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> Platform {
        Platform::TikTok
    }

    fn config(&self) -> &StrategyConfig {
        &self.config
    }

    fn supports(&self, kind: MediaKind) -> bool {
        self.kinds.contains(&kind)
    }

    async fn attempt(&self, _url: &ResolvedUrl) -> Result<RawAssetReference, StrategyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(StrategyError::Execution("woke up".to_string()))
            }
            Script::Fail(e) => Err(e.clone()),
            Script::Video(url) => Ok(RawAssetReference::video(AssetLink::new(url.clone(), AssetKind::Video))),
            Script::Reference(reference) => Ok(reference.clone()),
        }
    }
}

pub fn calls(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}
