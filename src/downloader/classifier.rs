// URL classifier
//
// Resolves shortened links, maps the host onto a supported platform and
// decides once per request whether the post is a video, an image or a
// slideshow.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, warn};
use url::Url;

use super::errors::AcquisitionError;
use super::extractors::page_scan::count_occurrences;
use super::models::{Classification, MediaKind, NetworkConfig, Platform, ResolvedUrl};
use super::platforms::header_profile;
use super::utils::{fetch_page, header_map};

lazy_static! {
    static ref TEXT_URL_RE: Regex = Regex::new(r#"https?://[^\s<>"']+"#).unwrap();
}

/// Signals that mark a post of a slideshow-capable platform as a slideshow,
/// evaluated strictly in field order
#[derive(Debug, Clone)]
pub struct SlideshowSignals {
    /// Path fragments such as `/photo/`
    pub path_markers: Vec<String>,
    /// Query parameter carrying a post type, with the values meaning "photo"
    pub type_param: Option<(String, Vec<String>)>,
    /// Numeric picture count query parameter
    pub count_param: Option<String>,
    /// Structural markers searched for in the fetched page
    pub page_keywords: Vec<String>,
    /// Words counted by the frequency heuristic
    pub frequency_words: Vec<String>,
    pub frequency_threshold: usize,
}

impl Default for SlideshowSignals {
    fn default() -> Self {
        Self {
            path_markers: vec!["/photo/".to_string()],
            type_param: Some((
                "aweme_type".to_string(),
                vec!["150".to_string(), "151".to_string()],
            )),
            count_param: Some("pic_cnt".to_string()),
            page_keywords: [
                "imagePost",
                "image_post_info",
                "\"imageList\"",
                "photo-mode",
                "photomode",
                "slideshow",
                "swiper-slide",
                "carousel-item",
                "data-e2e=\"photo",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            frequency_words: vec!["photo".to_string(), "image".to_string()],
            frequency_threshold: 60,
        }
    }
}

/// Which signal decided a slideshow classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideshowSignal {
    PathMarker,
    TypeParam,
    CountParam,
    PageKeyword,
    Frequency,
}

impl fmt::Display for SlideshowSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PathMarker => "path-marker",
            Self::TypeParam => "type-param",
            Self::CountParam => "count-param",
            Self::PageKeyword => "page-keyword",
            Self::Frequency => "frequency",
        };
        write!(f, "{}", name)
    }
}

impl SlideshowSignals {
    /// Signals 1-3, answerable from the URL alone
    pub fn from_url(&self, url: &ResolvedUrl) -> Option<SlideshowSignal> {
        let path = url.url().path().to_lowercase();
        if self.path_markers.iter().any(|m| path.contains(&m.to_lowercase())) {
            return Some(SlideshowSignal::PathMarker);
        }

        let params = url.query_params();
        if let Some((name, values)) = &self.type_param {
            if params.get(name).is_some_and(|v| values.contains(v)) {
                return Some(SlideshowSignal::TypeParam);
            }
        }
        if let Some(name) = &self.count_param {
            if params
                .get(name)
                .and_then(|v| v.parse::<u32>().ok())
                .is_some_and(|n| n > 0)
            {
                return Some(SlideshowSignal::CountParam);
            }
        }
        None
    }

    /// Signals 4-5 over the raw page
    pub fn from_page(&self, html: &str) -> Option<SlideshowSignal> {
        if self.page_keywords.iter().any(|k| html.contains(k.as_str())) {
            return Some(SlideshowSignal::PageKeyword);
        }

        let hits: usize = self
            .frequency_words
            .iter()
            .map(|w| count_occurrences(html, w))
            .sum();
        if hits >= self.frequency_threshold {
            return Some(SlideshowSignal::Frequency);
        }
        None
    }
}

/// How a platform's posts map onto a media kind
#[derive(Debug, Clone)]
pub enum KindRule {
    /// Every post has the same kind
    Fixed(MediaKind),
    /// Video unless a slideshow signal fires
    Slideshow(SlideshowSignals),
    /// Image unless the path contains one of these fragments
    ImageUnlessPath(Vec<String>),
}

/// One row of the supported-platform table
#[derive(Debug, Clone)]
pub struct PlatformRule {
    pub platform: Platform,
    /// Registrable domains; subdomains match too
    pub domains: Vec<String>,
    /// Hosts that only redirect to the real post
    pub shorteners: Vec<String>,
    /// Path prefixes that mark a short link on a regular domain (`/t/`)
    pub short_path_prefixes: Vec<String>,
    pub kind_rule: KindRule,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn host_in(host: &str, domains: &[String]) -> bool {
    domains
        .iter()
        .any(|d| host == d || host.ends_with(&format!(".{}", d)))
}

impl PlatformRule {
    pub fn new(platform: Platform, domains: &[&str], kind_rule: KindRule) -> Self {
        Self {
            platform,
            domains: strings(domains),
            shorteners: Vec::new(),
            short_path_prefixes: Vec::new(),
            kind_rule,
        }
    }

    pub fn with_shorteners(mut self, hosts: &[&str]) -> Self {
        self.shorteners = strings(hosts);
        self
    }

    pub fn with_short_paths(mut self, prefixes: &[&str]) -> Self {
        self.short_path_prefixes = strings(prefixes);
        self
    }

    pub fn matches_host(&self, host: &str) -> bool {
        host_in(host, &self.domains) || host_in(host, &self.shorteners)
    }

    /// Whether the URL must be resolved before it can be classified
    pub fn is_short_link(&self, url: &Url) -> bool {
        let host = url.host_str().unwrap_or("").to_lowercase();
        host_in(&host, &self.shorteners)
            || self
                .short_path_prefixes
                .iter()
                .any(|p| url.path().starts_with(p.as_str()))
    }

    pub fn is_slideshow_capable(&self) -> bool {
        matches!(self.kind_rule, KindRule::Slideshow(_))
    }
}

/// TikTok, Instagram, YouTube and Pinterest
pub fn default_rules() -> Vec<PlatformRule> {
    vec![
        PlatformRule::new(
            Platform::TikTok,
            &["tiktok.com"],
            KindRule::Slideshow(SlideshowSignals::default()),
        )
        .with_shorteners(&["vm.tiktok.com", "vt.tiktok.com"])
        .with_short_paths(&["/t/"]),
        PlatformRule::new(
            Platform::Instagram,
            &["instagram.com"],
            KindRule::Fixed(MediaKind::Video),
        )
        .with_shorteners(&["instagr.am"]),
        PlatformRule::new(
            Platform::YouTube,
            &["youtube.com", "youtu.be"],
            KindRule::Fixed(MediaKind::Video),
        ),
        PlatformRule::new(
            Platform::Pinterest,
            &[
                "pinterest.com",
                "pinterest.co.uk",
                "pinterest.ca",
                "pinterest.de",
                "pinterest.fr",
                "pinterest.es",
                "pinterest.it",
                "pinterest.com.au",
                "pinterest.jp",
                "pinterest.ru",
            ],
            KindRule::ImageUnlessPath(strings(&["/video/", "watch/", "player/", "reel/"])),
        )
        .with_shorteners(&["pin.it"]),
    ]
}

fn parse_input(raw: &str) -> Option<Url> {
    let trimmed = raw.trim();
    let parsed = Url::parse(trimmed).or_else(|_| {
        if trimmed.contains("://") {
            Err(url::ParseError::RelativeUrlWithoutBase)
        } else {
            Url::parse(&format!("https://{}", trimmed))
        }
    });
    parsed
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
}

fn rule_for<'a>(rules: &'a [PlatformRule], url: &Url) -> Option<&'a PlatformRule> {
    let host = url.host_str()?.to_lowercase();
    rules.iter().find(|r| r.matches_host(&host))
}

/// First URL in free text, returned only when its host is a supported platform
pub fn find_supported_url(text: &str, rules: &[PlatformRule]) -> Option<String> {
    let candidate = TEXT_URL_RE.find(text)?.as_str();
    let candidate = candidate.trim_end_matches(['.', ',', ')', '!', '?', ';', ':']);
    let url = Url::parse(candidate).ok()?;
    rule_for(rules, &url).map(|_| candidate.to_string())
}

/// `find_supported_url` against the built-in platform table
pub fn extract_supported_url(text: &str) -> Option<String> {
    find_supported_url(text, &default_rules())
}

/// Decides platform and media kind for incoming URLs
pub struct UrlClassifier {
    client: reqwest::Client,
    rules: Vec<PlatformRule>,
    network: NetworkConfig,
}

impl UrlClassifier {
    pub fn new(client: reqwest::Client, network: NetworkConfig) -> Self {
        Self {
            client,
            rules: default_rules(),
            network,
        }
    }

    pub fn with_rules(mut self, rules: Vec<PlatformRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn rules(&self) -> &[PlatformRule] {
        &self.rules
    }

    pub fn extract_supported_url(&self, text: &str) -> Option<String> {
        find_supported_url(text, &self.rules)
    }

    /// Follow a short link with a bounded HEAD request. The final hop's URL is
    /// kept even when its status is not 2xx; a failed request leaves the URL
    /// as it was.
    async fn resolve_short_link(&self, url: Url, platform: Platform) -> Url {
        let request = self
            .client
            .head(url.clone())
            .headers(header_map(&header_profile(platform)))
            .timeout(self.network.resolve_timeout)
            .send();

        match request.await {
            Ok(response) if response.status().is_success() => {
                let resolved = response.url().clone();
                if resolved != url {
                    info!(from = %url, to = %resolved, "resolved short link");
                }
                resolved
            }
            // a redirect that ends on an error page still names the target
            Ok(response) if *response.url() != url => {
                let resolved = response.url().clone();
                info!(from = %url, to = %resolved, status = %response.status(), "resolved short link");
                resolved
            }
            Ok(response) => {
                debug!(url = %url, status = %response.status(), "short link did not resolve");
                url
            }
            Err(e) => {
                warn!(url = %url, error = %e, "short link resolution failed, keeping original");
                url
            }
        }
    }

    /// Parse and, where needed, resolve a raw URL
    pub async fn resolve(&self, raw: &str) -> Result<(ResolvedUrl, &PlatformRule), AcquisitionError> {
        let unsupported = || AcquisitionError::UnsupportedPlatform {
            url: raw.trim().to_string(),
        };

        let mut url = parse_input(raw).ok_or_else(unsupported)?;
        let mut rule = rule_for(&self.rules, &url).ok_or_else(unsupported)?;

        if rule.is_short_link(&url) {
            url = self.resolve_short_link(url, rule.platform).await;
            // the redirect target decides the platform; an unknown target falls back
            // to the shortener's own platform
            if let Some(target) = rule_for(&self.rules, &url) {
                rule = target;
            }
        }

        Ok((ResolvedUrl::new(raw.trim(), url), rule))
    }

    /// Resolve, match the platform table and detect the media kind
    pub async fn classify(&self, raw: &str) -> Result<Classification, AcquisitionError> {
        let (url, rule) = self.resolve(raw).await?;
        let kind = self.detect_kind(&url, rule).await;

        info!(url = %url, platform = %rule.platform, kind = %kind, "classified");
        Ok(Classification {
            url,
            platform: rule.platform,
            kind,
        })
    }

    async fn detect_kind(&self, url: &ResolvedUrl, rule: &PlatformRule) -> MediaKind {
        match &rule.kind_rule {
            KindRule::Fixed(kind) => *kind,
            KindRule::ImageUnlessPath(markers) => {
                let path = url.url().path().to_lowercase();
                if markers.iter().any(|m| path.contains(m.as_str())) {
                    MediaKind::Video
                } else {
                    MediaKind::Image
                }
            }
            KindRule::Slideshow(signals) => {
                if let Some(signal) = signals.from_url(url) {
                    debug!(url = %url, signal = %signal, "slideshow signal");
                    return MediaKind::Slideshow;
                }

                let headers = header_profile(rule.platform);
                match fetch_page(&self.client, url.as_str(), &headers, self.network.page_timeout).await {
                    Ok(html) => match signals.from_page(&html) {
                        Some(signal) => {
                            debug!(url = %url, signal = %signal, "slideshow signal");
                            MediaKind::Slideshow
                        }
                        None => MediaKind::Video,
                    },
                    Err(e) => {
                        debug!(url = %url, error = %e, "page scan skipped, assuming video");
                        MediaKind::Video
                    }
                }
            }
        }
    }
}
