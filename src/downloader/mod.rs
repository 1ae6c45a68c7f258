// Downloader module - classification, strategy fallback and asset fetching

pub mod backends;
pub mod classifier;
pub mod cleanup;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod extractors;
pub mod fetcher;
pub mod models;
pub mod orchestrator;
pub mod platforms;
pub mod traits;
pub mod utils;

pub use classifier::{default_rules, extract_supported_url, KindRule, PlatformRule, UrlClassifier};
pub use cleanup::sweep_scratch_dir;
pub use config::{AcquisitionConfig, SlideshowConfig};
pub use coordinator::{AcquisitionPool, Coordinator, CoordinatorBuilder};
pub use errors::{AcquisitionError, FetchFailure, StrategyError};
pub use fetcher::AssetFetcher;
pub use models::{
    AcquiredAsset, AcquiredMedia, AssetKind, AssetLink, Classification, MediaContent, MediaKind,
    NetworkConfig, Platform, RawAssetReference, ResolvedUrl, SlideshowBundle,
};
pub use orchestrator::{Deadline, StrategySet};
pub use traits::{ExtractionStrategy, StrategyConfig};
