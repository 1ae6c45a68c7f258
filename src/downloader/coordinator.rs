// Acquisition coordinator and worker pool
//
// classify -> select strategy set -> run under the request deadline. The pool
// dispatches each request as its own task and rejects new work once
// `workers + queue_capacity` requests are admitted.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::classifier::{default_rules, PlatformRule, UrlClassifier};
use super::config::AcquisitionConfig;
use super::errors::AcquisitionError;
use super::extractors::slideshow::SlideshowExtractor;
use super::fetcher::AssetFetcher;
use super::models::{AcquiredMedia, Classification, Platform};
use super::orchestrator::{Deadline, StrategySet};
use super::platforms::{default_strategies, header_profile};
use super::traits::ExtractionStrategy;
use super::utils::build_http_client;

/// Entry point for one acquisition at a time
pub struct Coordinator {
    config: AcquisitionConfig,
    classifier: UrlClassifier,
    sets: HashMap<Platform, StrategySet>,
}

impl Coordinator {
    /// Coordinator with the built-in platform table and strategies
    pub fn new(config: AcquisitionConfig) -> Self {
        CoordinatorBuilder::new(config).build()
    }

    pub fn builder(config: AcquisitionConfig) -> CoordinatorBuilder {
        CoordinatorBuilder::new(config)
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    pub fn classifier(&self) -> &UrlClassifier {
        &self.classifier
    }

    pub fn strategy_set(&self, platform: Platform) -> Option<&StrategySet> {
        self.sets.get(&platform)
    }

    /// Classification alone, without fetching media
    pub async fn classify(&self, url: &str) -> Result<Classification, AcquisitionError> {
        self.classifier.classify(url).await
    }

    /// Produce a local copy of the media behind `url`
    pub async fn acquire(&self, url: &str) -> Result<AcquiredMedia, AcquisitionError> {
        let deadline = Deadline::after(self.config.deadline);
        info!(url = %url, deadline = ?self.config.deadline, "acquisition started");

        let classification = match tokio::time::timeout_at(deadline.instant(), self.classifier.classify(url)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(AcquisitionError::Timeout {
                    platform: Platform::Unknown,
                    elapsed: deadline.elapsed(),
                    last_strategy: None,
                    last_error: Some("classification did not finish".to_string()),
                })
            }
        };

        let Some(set) = self.sets.get(&classification.platform) else {
            return Err(AcquisitionError::AllStrategiesExhausted {
                platform: classification.platform,
                last_strategy: None,
                last_error: Some("no strategies configured".to_string()),
            });
        };

        let result = set.run(&classification.url, classification.kind, &deadline).await;
        match &result {
            Ok(media) => info!(
                platform = %media.platform,
                kind = %media.kind(),
                strategy = %media.strategy,
                assets = media.asset_count(),
                elapsed = ?deadline.elapsed(),
                "acquisition finished"
            ),
            Err(e) => error!(platform = %classification.platform, error = %e, "acquisition failed"),
        }
        result
    }
}

/// Builder for `Coordinator`; anything not set falls back to the defaults
pub struct CoordinatorBuilder {
    config: AcquisitionConfig,
    client: Option<reqwest::Client>,
    rules: Option<Vec<PlatformRule>>,
    strategies: HashMap<Platform, Vec<Box<dyn ExtractionStrategy>>>,
}

impl CoordinatorBuilder {
    pub fn new(config: AcquisitionConfig) -> Self {
        Self {
            config,
            client: None,
            rules: None,
            strategies: HashMap::new(),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_rules(mut self, rules: Vec<PlatformRule>) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Replace the default strategies of one platform
    pub fn with_strategies(mut self, platform: Platform, strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        self.strategies.insert(platform, strategies);
        self
    }

    pub fn build(mut self) -> Coordinator {
        let client = self
            .client
            .take()
            .unwrap_or_else(|| build_http_client(&self.config.network));
        let rules = self.rules.take().unwrap_or_else(default_rules);
        let fetcher = Arc::new(AssetFetcher::from_config(client.clone(), &self.config));

        let mut sets = HashMap::new();
        for rule in &rules {
            if sets.contains_key(&rule.platform) {
                continue;
            }
            let strategies = self
                .strategies
                .remove(&rule.platform)
                .unwrap_or_else(|| default_strategies(rule.platform, &self.config, &client));

            let mut set = StrategySet::new(rule.platform, fetcher.clone()).with_strategies(strategies);
            if rule.is_slideshow_capable() {
                let extractor = SlideshowExtractor::new(client.clone(), fetcher.clone(), self.config.slideshow.clone())
                    .with_headers(header_profile(rule.platform))
                    .with_page_timeout(self.config.network.page_timeout);
                set = set.with_slideshow_extractor(Arc::new(extractor));
            }
            sets.insert(rule.platform, set);
        }

        for platform in self.strategies.keys() {
            warn!(platform = %platform, "strategies given for a platform without a rule, ignoring");
        }

        let classifier = UrlClassifier::new(client, self.config.network.clone()).with_rules(rules);
        Coordinator {
            config: self.config,
            classifier,
            sets,
        }
    }
}

/// Bounded pool running acquisitions as independent tasks
#[derive(Clone)]
pub struct AcquisitionPool {
    coordinator: Arc<Coordinator>,
    admission: Arc<Semaphore>,
    workers: Arc<Semaphore>,
}

impl AcquisitionPool {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        let workers = coordinator.config().workers.max(1);
        let capacity = workers + coordinator.config().queue_capacity;
        Self {
            coordinator,
            admission: Arc::new(Semaphore::new(capacity)),
            workers: Arc::new(Semaphore::new(workers)),
        }
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Free admission slots (running plus queued requests not yet admitted)
    pub fn available(&self) -> usize {
        self.admission.available_permits()
    }

    /// Dispatch `url` without waiting for it. Fails immediately with
    /// `QueueFull` when the pool is saturated.
    pub fn submit(
        &self,
        url: impl Into<String>,
    ) -> Result<JoinHandle<Result<AcquiredMedia, AcquisitionError>>, AcquisitionError> {
        let admitted = self
            .admission
            .clone()
            .try_acquire_owned()
            .map_err(|_| AcquisitionError::QueueFull)?;

        let url = url.into();
        let coordinator = self.coordinator.clone();
        let workers = self.workers.clone();

        Ok(tokio::spawn(async move {
            let _admitted = admitted;
            let _worker = workers
                .acquire_owned()
                .await
                .map_err(|_| AcquisitionError::QueueFull)?;
            coordinator.acquire(&url).await
        }))
    }
}
