//! Media acquisition for social-media post links.
//!
//! A [`Coordinator`] classifies a URL (platform and media kind), runs the
//! platform's ordered extraction strategies until one yields a validated
//! asset, and returns local copies of the media. [`AcquisitionPool`] runs
//! many acquisitions concurrently with a bounded queue.

pub mod downloader;

pub use downloader::{
    extract_supported_url, sweep_scratch_dir, AcquiredAsset, AcquiredMedia, AcquisitionConfig,
    AcquisitionError, AcquisitionPool, AssetKind, Classification, Coordinator, ExtractionStrategy,
    MediaContent, MediaKind, Platform, StrategyConfig,
};
