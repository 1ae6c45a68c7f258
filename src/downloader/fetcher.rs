// Asset fetcher - streams remote files into the scratch directory
//
// Every fetch ends in one of two states:
// - a validated file (status ok, non-empty, kind matches) renamed to its final name
// - nothing on disk and a FetchFailure explaining why

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::AcquisitionConfig;
use super::errors::FetchFailure;
use super::models::{AcquiredAsset, AssetKind, AssetLink};
use super::utils::{header_map, sanitize_filename, url_extension};

/// Bytes kept from the start of the body for signature sniffing
const SNIFF_LEN: usize = 16;

/// Broad class of a declared content-type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentClass {
    Kind(AssetKind),
    /// octet-stream or missing: decide from URL and file signature
    Generic,
    Other,
}

fn classify_content_type(content_type: Option<&str>) -> ContentClass {
    let Some(ct) = content_type else {
        return ContentClass::Generic;
    };
    let mime = ct.split(';').next().unwrap_or("").trim().to_lowercase();

    if mime.is_empty()
        || mime == "application/octet-stream"
        || mime == "binary/octet-stream"
        || mime == "application/binary"
    {
        ContentClass::Generic
    } else if mime.starts_with("video/") {
        ContentClass::Kind(AssetKind::Video)
    } else if mime.starts_with("image/") {
        ContentClass::Kind(AssetKind::Image)
    } else if mime.starts_with("audio/") {
        ContentClass::Kind(AssetKind::Audio)
    } else {
        ContentClass::Other
    }
}

/// File extension for a declared content-type
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next().unwrap_or("").trim().to_lowercase();
    let ext = match mime.as_str() {
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "video/x-matroska" => "mkv",
        "video/x-flv" => "flv",
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/heic" => "heic",
        "image/avif" => "avif",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/mp4" | "audio/x-m4a" | "audio/m4a" => "m4a",
        "audio/aac" => "aac",
        "audio/ogg" => "ogg",
        "audio/wav" | "audio/x-wav" => "wav",
        _ => return None,
    };
    Some(ext)
}

/// Identify a file from its leading bytes
pub fn sniff_kind(head: &[u8]) -> Option<(AssetKind, &'static str)> {
    if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some((AssetKind::Image, "jpg"));
    }
    if head.starts_with(&[0x89, b'P', b'N', b'G']) {
        return Some((AssetKind::Image, "png"));
    }
    if head.starts_with(b"GIF8") {
        return Some((AssetKind::Image, "gif"));
    }
    if head.len() >= 12 && head.starts_with(b"RIFF") && &head[8..12] == b"WEBP" {
        return Some((AssetKind::Image, "webp"));
    }
    if head.len() >= 12 && &head[4..8] == b"ftyp" {
        return match &head[8..12] {
            b"M4A " | b"M4B " => Some((AssetKind::Audio, "m4a")),
            b"heic" | b"heix" | b"mif1" => Some((AssetKind::Image, "heic")),
            b"avif" => Some((AssetKind::Image, "avif")),
            _ => Some((AssetKind::Video, "mp4")),
        };
    }
    if head.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some((AssetKind::Video, "webm"));
    }
    if head.starts_with(b"ID3") || head.starts_with(&[0xFF, 0xFB]) || head.starts_with(&[0xFF, 0xF3]) {
        return Some((AssetKind::Audio, "mp3"));
    }
    if head.starts_with(b"OggS") {
        return Some((AssetKind::Audio, "ogg"));
    }
    None
}

/// Pick the extension: declared content-type, then URL, then signature, then default
fn choose_extension(
    expected: AssetKind,
    content_type: Option<&str>,
    url: &str,
    sniffed: Option<(AssetKind, &'static str)>,
) -> String {
    if let Some(ext) = content_type.and_then(extension_for_content_type) {
        if AssetKind::from_extension(ext) == Some(expected) {
            return ext.to_string();
        }
    }
    if let Some(ext) = url_extension(url) {
        if AssetKind::from_extension(&ext) == Some(expected) {
            return if ext == "jpeg" { "jpg".to_string() } else { ext };
        }
    }
    if let Some((kind, ext)) = sniffed {
        if kind == expected {
            return ext.to_string();
        }
    }
    expected.default_extension().to_string()
}

/// Check the declared content-type against the expected kind before writing anything
fn precheck_kind(expected: AssetKind, content_type: Option<&str>, url: &str) -> Result<(), FetchFailure> {
    let mismatch = || FetchFailure::KindMismatch {
        expected,
        content_type: content_type.unwrap_or("").to_string(),
    };

    match classify_content_type(content_type) {
        ContentClass::Kind(kind) if kind == expected => Ok(()),
        ContentClass::Kind(_) | ContentClass::Other => Err(mismatch()),
        ContentClass::Generic => match url_extension(url).and_then(|e| AssetKind::from_extension(&e)) {
            Some(kind) if kind != expected => Err(mismatch()),
            _ => Ok(()),
        },
    }
}

/// `<kind>_<remote name>_<uuid>`; unique per fetch so concurrent requests never collide
fn file_stem(link: &AssetLink) -> String {
    let remote = url::Url::parse(&link.url)
        .ok()
        .and_then(|u| u.path_segments().and_then(|s| s.last()).map(str::to_string))
        .map(|name| match name.rsplit_once('.') {
            Some((stem, _)) => stem.to_string(),
            None => name,
        })
        .unwrap_or_default();
    format!("{}_{}_{}", link.kind, sanitize_filename(&remote), Uuid::new_v4().simple())
}

/// Streams remote assets to uniquely named files and validates them
#[derive(Debug, Clone)]
pub struct AssetFetcher {
    client: reqwest::Client,
    scratch_dir: PathBuf,
    timeout: Duration,
    max_bytes: u64,
}

impl AssetFetcher {
    pub fn new(client: reqwest::Client, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            scratch_dir: scratch_dir.into(),
            timeout: Duration::from_secs(60),
            max_bytes: 512 * 1024 * 1024,
        }
    }

    pub fn from_config(client: reqwest::Client, config: &AcquisitionConfig) -> Self {
        Self::new(client, config.scratch_dir.clone())
            .with_timeout(config.fetch_timeout)
            .with_max_bytes(config.max_asset_bytes)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch with the configured timeout
    pub async fn fetch(&self, link: &AssetLink) -> Result<AcquiredAsset, FetchFailure> {
        self.fetch_within(link, self.timeout).await
    }

    /// Fetch with an explicit time limit (the caller's remaining deadline)
    pub async fn fetch_within(
        &self,
        link: &AssetLink,
        limit: Duration,
    ) -> Result<AcquiredAsset, FetchFailure> {
        let limit = limit.min(self.timeout);
        tokio::fs::create_dir_all(&self.scratch_dir).await?;

        let stem = file_stem(link);
        let part_path = self.scratch_dir.join(format!("{}.part", stem));

        debug!(url = %link.url, kind = %link.kind, "fetching asset");
        let outcome = match tokio::time::timeout(limit, self.stream_to(link, &stem, &part_path, limit)).await {
            Ok(result) => result,
            Err(_) => Err(FetchFailure::Timeout(limit)),
        };

        match outcome {
            Ok(asset) => {
                info!(
                    path = %asset.path.display(),
                    size = asset.size,
                    kind = %asset.kind,
                    "asset fetched"
                );
                Ok(asset)
            }
            Err(failure) => {
                if let Err(e) = tokio::fs::remove_file(&part_path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %part_path.display(), error = %e, "could not remove partial file");
                    }
                }
                warn!(url = %link.url, reason = %failure, "asset fetch failed");
                Err(failure)
            }
        }
    }

    async fn stream_to(
        &self,
        link: &AssetLink,
        stem: &str,
        part_path: &Path,
        limit: Duration,
    ) -> Result<AcquiredAsset, FetchFailure> {
        let response = self
            .client
            .get(&link.url)
            .headers(header_map(&link.headers))
            .send()
            .await
            .map_err(|e| FetchFailure::from_request(e, limit))?;

        let status = response.status();
        if status.as_u16() == 404 || status.as_u16() == 410 {
            return Err(FetchFailure::NotFound(status.as_u16()));
        }
        if !status.is_success() {
            return Err(FetchFailure::NetworkError(format!("HTTP {}", status.as_u16())));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        precheck_kind(link.kind, content_type.as_deref(), &link.url)?;

        let declared_len = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if declared_len.is_some_and(|len| len > self.max_bytes) {
            return Err(FetchFailure::TooLarge {
                limit: self.max_bytes,
            });
        }

        let mut file = tokio::fs::File::create(part_path).await?;
        let mut head: Vec<u8> = Vec::with_capacity(SNIFF_LEN);
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchFailure::from_request(e, limit))?;
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Err(FetchFailure::TooLarge {
                    limit: self.max_bytes,
                });
            }
            if head.len() < SNIFF_LEN {
                let take = (SNIFF_LEN - head.len()).min(chunk.len());
                head.extend_from_slice(&chunk[..take]);
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        if written == 0 {
            return Err(FetchFailure::EmptyBody);
        }

        let sniffed = sniff_kind(&head);
        if classify_content_type(content_type.as_deref()) == ContentClass::Generic {
            if let Some((kind, _)) = sniffed {
                if kind != link.kind {
                    return Err(FetchFailure::KindMismatch {
                        expected: link.kind,
                        content_type: format!("{} (sniffed)", kind),
                    });
                }
            }
        }

        let extension = choose_extension(link.kind, content_type.as_deref(), &link.url, sniffed);
        let final_path = self.scratch_dir.join(format!("{}.{}", stem, extension));
        tokio::fs::rename(part_path, &final_path).await?;

        Ok(AcquiredAsset {
            path: final_path,
            size: written,
            extension,
            content_type,
            kind: link.kind,
            source_url: link.url.clone(),
            fetched_at: OffsetDateTime::now_utc(),
        })
    }
}
