// Per-platform request profiles and default strategy sets

use std::collections::BTreeMap;
use std::time::Duration;

use super::backends::embed::{EmbedApiStrategy, TIKLYDOWN_ENDPOINT, TIKWM_ENDPOINT};
use super::backends::pinterest::{PinTarget, PinterestPageStrategy};
use super::backends::scrape::PageScrapeStrategy;
use super::backends::ytdlp::{find_ytdlp, YtDlpStrategy};
use super::config::AcquisitionConfig;
use super::models::{MediaKind, Platform, DESKTOP_USER_AGENT};
use super::traits::{ExtractionStrategy, StrategyConfig};

const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8";

/// YouTube clients tried in order: android is least likely to be blocked,
/// web is the fallback for age-gated content
pub const YOUTUBE_PLAYER_CLIENTS: &[&str] = &["android", "tv", "web"];

/// Browser-like headers a platform expects on page and CDN requests
pub fn header_profile(platform: Platform) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert("User-Agent".to_string(), DESKTOP_USER_AGENT.to_string());
    headers.insert("Accept-Language".to_string(), "en-US,en;q=0.9".to_string());

    let referer = match platform {
        Platform::TikTok => Some("https://www.tiktok.com/"),
        Platform::Instagram => Some("https://www.instagram.com/"),
        Platform::Pinterest => Some("https://www.pinterest.com/"),
        Platform::YouTube | Platform::Unknown => None,
    };
    if let Some(referer) = referer {
        headers.insert("Referer".to_string(), referer.to_string());
    }
    if platform == Platform::Pinterest {
        headers.insert("Accept".to_string(), ACCEPT_HTML.to_string());
    }
    headers
}

fn base_config(platform: Platform, timeout: Duration) -> StrategyConfig {
    StrategyConfig::default()
        .with_headers(&header_profile(platform))
        .with_timeout(timeout)
}

fn ytdlp_binary(config: &AcquisitionConfig) -> String {
    config.ytdlp_path.clone().unwrap_or_else(find_ytdlp)
}

/// Ordered strategies for a platform, cheapest and most reliable first
pub fn default_strategies(
    platform: Platform,
    config: &AcquisitionConfig,
    client: &reqwest::Client,
) -> Vec<Box<dyn ExtractionStrategy>> {
    let binary = ytdlp_binary(config);
    let network = config.network.clone();
    let page_timeout = config.network.page_timeout;

    match platform {
        Platform::TikTok => vec![
            Box::new(YtDlpStrategy::new(
                platform,
                binary,
                base_config(platform, Duration::from_secs(45)),
                network,
            )),
            Box::new(EmbedApiStrategy::new(
                "tikwm-api",
                platform,
                TIKWM_ENDPOINT,
                client.clone(),
                base_config(platform, page_timeout).with_param("hd", "1"),
            )),
            Box::new(EmbedApiStrategy::new(
                "tiklydown-api",
                platform,
                TIKLYDOWN_ENDPOINT,
                client.clone(),
                base_config(platform, page_timeout),
            )),
            Box::new(
                PageScrapeStrategy::new(
                    "tiktok-page-scrape",
                    platform,
                    client.clone(),
                    base_config(platform, page_timeout),
                )
                .with_cdn_hosts(&["tiktokcdn", "tiktokv", "muscdn"]),
            ),
        ],
        Platform::Instagram => vec![
            Box::new(YtDlpStrategy::new(
                platform,
                binary,
                base_config(platform, Duration::from_secs(45)),
                network,
            )),
            Box::new(
                PageScrapeStrategy::new(
                    "instagram-embed-scrape",
                    platform,
                    client.clone(),
                    base_config(platform, page_timeout),
                )
                .with_page_template("https://www.instagram.com/p/{id}/embed/captioned/")
                .with_cdn_hosts(&["cdninstagram", "fbcdn"]),
            ),
            Box::new(
                PageScrapeStrategy::new(
                    "instagram-page-scrape",
                    platform,
                    client.clone(),
                    base_config(platform, page_timeout),
                )
                .with_cdn_hosts(&["cdninstagram", "fbcdn"]),
            ),
        ],
        Platform::YouTube => YOUTUBE_PLAYER_CLIENTS
            .iter()
            .map(|player| {
                Box::new(
                    YtDlpStrategy::new(
                        platform,
                        binary.clone(),
                        base_config(platform, Duration::from_secs(60))
                            .with_output_format("best[ext=mp4]/best"),
                        network.clone(),
                    )
                    .with_player_client(player),
                ) as Box<dyn ExtractionStrategy>
            })
            .collect(),
        Platform::Pinterest => vec![
            Box::new(
                YtDlpStrategy::new(
                    platform,
                    binary,
                    base_config(platform, Duration::from_secs(45)),
                    network,
                )
                .with_kinds(&[MediaKind::Video]),
            ),
            Box::new(PinterestPageStrategy::new(
                PinTarget::Video,
                client.clone(),
                base_config(platform, page_timeout),
            )),
            Box::new(PinterestPageStrategy::new(
                PinTarget::Image,
                client.clone(),
                base_config(platform, page_timeout),
            )),
            Box::new(
                PageScrapeStrategy::new(
                    "pinterest-page-scrape",
                    platform,
                    client.clone(),
                    base_config(platform, page_timeout),
                )
                .with_cdn_hosts(&["pinimg"]),
            ),
        ],
        Platform::Unknown => Vec::new(),
    }
}
