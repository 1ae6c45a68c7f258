// Generic extractor backed by the yt-dlp binary
//
// Runs `yt-dlp --dump-json` and reads the direct media URL (plus the request
// headers the CDN expects) from the JSON dump. Nothing is downloaded here;
// the asset fetcher streams the file afterwards.

use std::collections::BTreeMap;
use std::process::Command as StdCommand;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::downloader::errors::StrategyError;
use crate::downloader::models::{
    AssetKind, AssetLink, MediaKind, NetworkConfig, Platform, RawAssetReference, ResolvedUrl,
};
use crate::downloader::traits::{ExtractionStrategy, StrategyConfig};
use crate::downloader::utils::{get_proxy_args, get_timeout_args, run_output_with_timeout, with_retries};

/// Find yt-dlp executable in common paths
pub fn find_ytdlp() -> String {
    if let Ok(path) = std::env::var("YTDLP_PATH") {
        if !path.trim().is_empty() {
            return path;
        }
    }

    let common_paths = [
        "/opt/homebrew/bin/yt-dlp", // Homebrew on Apple Silicon
        "/usr/local/bin/yt-dlp",    // Homebrew on Intel Mac
        "/usr/bin/yt-dlp",          // System installation
    ];

    for path in common_paths {
        if std::path::Path::new(path).exists() {
            return path.to_string();
        }
    }

    // Try to find via `which`
    if let Ok(output) = StdCommand::new("which").arg("yt-dlp").output() {
        if output.status.success() {
            if let Ok(path) = String::from_utf8(output.stdout) {
                let trimmed = path.trim();
                if !trimmed.is_empty() {
                    return trimmed.to_string();
                }
            }
        }
    }

    "yt-dlp".to_string()
}

/// yt-dlp in JSON-dump mode
pub struct YtDlpStrategy {
    name: String,
    platform: Platform,
    binary: String,
    config: StrategyConfig,
    network: NetworkConfig,
    kinds: Vec<MediaKind>,
}

impl YtDlpStrategy {
    pub fn new(platform: Platform, binary: impl Into<String>, config: StrategyConfig, network: NetworkConfig) -> Self {
        Self {
            name: format!("{}-yt-dlp", platform.as_str()),
            platform,
            binary: binary.into(),
            config,
            network,
            kinds: vec![MediaKind::Video],
        }
    }

    /// Pin a YouTube player client (`android`, `tv`, `web`)
    pub fn with_player_client(mut self, client: &str) -> Self {
        self.name = format!("{}-yt-dlp-{}", self.platform.as_str(), client);
        self.config = self
            .config
            .with_param("extractor_args", &format!("youtube:player_client={}", client));
        self
    }

    pub fn with_kinds(mut self, kinds: &[MediaKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Build command arguments
    pub fn build_args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "-f".to_string(),
            self.config.output_format.clone(),
        ];
        args.extend(get_timeout_args(self.config.timeout));

        for (name, value) in &self.config.headers {
            if name.eq_ignore_ascii_case("user-agent") {
                args.push("--user-agent".to_string());
                args.push(value.clone());
            } else {
                args.push("--add-header".to_string());
                args.push(format!("{}:{}", name, value));
            }
        }

        if let Some(extractor_args) = self.config.param("extractor_args") {
            args.push("--extractor-args".to_string());
            args.push(extractor_args.to_string());
        }

        if let Some(cookies) = self.config.param("cookies") {
            args.push("--cookies".to_string());
            args.push(cookies.to_string());
        }

        args.extend(get_proxy_args(&self.network));
        args.push(url.to_string());
        args
    }
}

fn string_map(value: &Value) -> BTreeMap<String, String> {
    value
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn has_codec(format: &Value, key: &str) -> bool {
    format[key].as_str().map_or(true, |c| c != "none")
}

fn is_direct(format: &Value) -> bool {
    format["protocol"]
        .as_str()
        .map_or(true, |p| p.starts_with("http") && !p.contains("m3u8") && !p.contains("dash"))
}

/// Pick a single progressive (audio+video) format. yt-dlp lists formats
/// worst first, so the last match is the best one.
fn best_progressive(info: &Value) -> Option<&Value> {
    info["formats"].as_array().and_then(|formats| {
        formats.iter().rev().find(|f| {
            f["url"].is_string() && is_direct(f) && has_codec(f, "vcodec") && has_codec(f, "acodec")
        })
    })
}

/// Read the direct media link out of a `--dump-json` document
pub fn parse_dump(stdout: &[u8]) -> Result<RawAssetReference, StrategyError> {
    let json_str = String::from_utf8_lossy(stdout);
    // a playlist dump prints one JSON document per line
    let first_line = json_str.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let mut info: Value = serde_json::from_str(first_line)
        .map_err(|e| StrategyError::Parse(format!("Invalid JSON: {}", e)))?;

    if let Some(entries) = info.get_mut("entries").and_then(Value::as_array_mut) {
        if entries.is_empty() {
            return Err(StrategyError::NoMedia("playlist has no entries".to_string()));
        }
        info = entries.swap_remove(0);
    }

    let format = if info["url"].is_string() {
        &info
    } else {
        best_progressive(&info)
            .or_else(|| info["requested_formats"].as_array().and_then(|f| f.first()))
            .ok_or_else(|| StrategyError::NoMedia("no direct media URL in yt-dlp output".to_string()))?
    };

    let url = format["url"]
        .as_str()
        .ok_or_else(|| StrategyError::NoMedia("format without URL".to_string()))?
        .to_string();
    let ext = format["ext"].as_str().or_else(|| info["ext"].as_str()).unwrap_or("mp4");
    let kind = AssetKind::from_extension(ext).unwrap_or(AssetKind::Video);

    let mut headers = string_map(&info["http_headers"]);
    headers.extend(string_map(&format["http_headers"]));

    let link = AssetLink::new(url, kind).with_headers(headers);
    Ok(match kind {
        AssetKind::Image => RawAssetReference::image(link),
        _ => RawAssetReference::video(link),
    })
}

#[async_trait]
impl ExtractionStrategy for YtDlpStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> Platform {
        self.platform
    }

    fn config(&self) -> &StrategyConfig {
        &self.config
    }

    fn supports(&self, kind: MediaKind) -> bool {
        self.kinds.contains(&kind)
    }

    async fn attempt(&self, url: &ResolvedUrl) -> Result<RawAssetReference, StrategyError> {
        let args = self.build_args(url.as_str());
        debug!(strategy = %self.name, command = %format!("{} {}", self.binary, args.join(" ")), "running extractor");

        with_retries(&self.name, self.config.retries, || {
            let args = args.clone();
            async move {
                let output = run_output_with_timeout(&self.binary, args, self.config.timeout).await?;
                if output.status.success() {
                    let reference = parse_dump(&output.stdout)?;
                    info!(strategy = %self.name, links = reference.links.len(), "extractor found media");
                    Ok(reference)
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(StrategyError::from_tool_output(&stderr))
                }
            }
        })
        .await
    }
}
