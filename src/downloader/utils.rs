// Helper functions shared by strategies, the classifier and the fetcher

use std::collections::BTreeMap;
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::errors::StrategyError;
use super::models::NetworkConfig;

lazy_static! {
    static ref UNICODE_ESCAPE_RE: Regex = Regex::new(r"\\u([0-9a-fA-F]{4})").unwrap();
    static ref INVALID_FILENAME_RE: Regex = Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).unwrap();
}

/// Build the shared HTTP client, honoring the configured proxy
pub fn build_http_client(config: &NetworkConfig) -> reqwest::Client {
    let builder = reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .redirect(reqwest::redirect::Policy::limited(10))
        .connect_timeout(Duration::from_secs(10));

    let builder = match config.proxy.as_deref() {
        Some(proxy_url) => match reqwest::Proxy::all(proxy_url) {
            Ok(proxy) => builder.proxy(proxy),
            Err(e) => {
                warn!(proxy = %proxy_url, error = %e, "invalid proxy URL, using direct connection");
                builder
            }
        },
        None => builder,
    };

    builder.build().unwrap_or_else(|e| {
        warn!(error = %e, "failed to build configured HTTP client, falling back to defaults");
        reqwest::Client::new()
    })
}

/// Convert a plain header table into a reqwest header map, skipping invalid entries
pub fn header_map(headers: &BTreeMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => debug!(header = %name, "skipping invalid header"),
        }
    }
    map
}

/// GET a page as text, mapping failures to strategy errors
pub async fn fetch_page(
    client: &reqwest::Client,
    url: &str,
    headers: &BTreeMap<String, String>,
    limit: Duration,
) -> Result<String, StrategyError> {
    let request = client.get(url).headers(header_map(headers)).send();
    let response = timeout(limit, request)
        .await
        .map_err(|_| StrategyError::Timeout(limit))?
        .map_err(|e| StrategyError::from_request(e, limit))?;

    let status = response.status();
    if !status.is_success() {
        return Err(StrategyError::from_status(status.as_u16()));
    }

    timeout(limit, response.text())
        .await
        .map_err(|_| StrategyError::Timeout(limit))?
        .map_err(|e| StrategyError::from_request(e, limit))
}

/// GET a JSON document
pub async fn fetch_json(
    client: &reqwest::Client,
    url: &str,
    headers: &BTreeMap<String, String>,
    limit: Duration,
) -> Result<serde_json::Value, StrategyError> {
    let body = fetch_page(client, url, headers, limit).await?;
    serde_json::from_str(&body).map_err(|e| StrategyError::Parse(format!("Invalid JSON: {}", e)))
}

/// Run `op` once plus up to `retries` more times while it fails transiently
pub async fn with_retries<T, F, Fut>(label: &str, retries: u32, mut op: F) -> Result<T, StrategyError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StrategyError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < retries => {
                attempt += 1;
                warn!(strategy = %label, attempt, error = %e, "transient failure, retrying");
                tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt))).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Run command with timeout, capturing stdout and stderr
pub async fn run_output_with_timeout(
    program: &str,
    args: Vec<String>,
    limit: Duration,
) -> Result<std::process::Output, StrategyError> {
    let mut child = TokioCommand::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StrategyError::ToolNotFound(program.to_string())
            } else {
                StrategyError::Execution(format!("Failed to start {}: {}", program, e))
            }
        })?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| StrategyError::Execution(format!("Failed to capture stdout from {}", program)))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| StrategyError::Execution(format!("Failed to capture stderr from {}", program)))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    match timeout(limit, child.wait()).await {
        Ok(status) => {
            let status = status
                .map_err(|e| StrategyError::Execution(format!("Failed to wait for {}: {}", program, e)))?;
            let stdout = join_pipe(stdout_task).await?;
            let stderr = join_pipe(stderr_task).await?;
            Ok(std::process::Output {
                status,
                stdout,
                stderr,
            })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(StrategyError::Timeout(limit))
        }
    }
}

async fn join_pipe(
    task: tokio::task::JoinHandle<std::io::Result<Vec<u8>>>,
) -> Result<Vec<u8>, StrategyError> {
    task.await
        .map_err(|e| StrategyError::Execution(format!("pipe reader failed: {}", e)))?
        .map_err(|e| StrategyError::Execution(format!("Failed to read output: {}", e)))
}

/// Build proxy arguments for yt-dlp
pub fn get_proxy_args(config: &NetworkConfig) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(proxy) = &config.proxy {
        args.push("--proxy".to_string());
        args.push(proxy.clone());
    }

    args
}

/// Build socket timeout arguments for yt-dlp
pub fn get_timeout_args(limit: Duration) -> Vec<String> {
    vec![
        "--socket-timeout".to_string(),
        limit.as_secs().max(1).to_string(),
    ]
}

/// Turn a scraped URL string into an absolute https URL.
///
/// Handles JSON-escaped slashes, `\uXXXX` escapes, HTML `&amp;` and
/// protocol-relative `//host/path` forms. Returns `None` for anything that is
/// not an http(s) URL afterwards.
pub fn normalize_media_url(raw: &str) -> Option<String> {
    let mut s = raw.trim().trim_matches(|c| c == '"' || c == '\'').to_string();

    s = UNICODE_ESCAPE_RE
        .replace_all(&s, |caps: &regex::Captures| {
            u32::from_str_radix(&caps[1], 16)
                .ok()
                .and_then(char::from_u32)
                .map(|c| c.to_string())
                .unwrap_or_default()
        })
        .into_owned();
    s = s.replace("\\/", "/").replace("&amp;", "&");

    if s.starts_with("//") {
        s = format!("https:{}", s);
    }

    let parsed = url::Url::parse(&s).ok()?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Some(parsed.to_string()),
        _ => None,
    }
}

/// Extension of the last path segment of a URL, lowercased
pub fn url_extension(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    let last = parsed.path_segments()?.last()?.to_string();
    let (_, ext) = last.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 5 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Make a string safe to use as a file name on every filesystem
pub fn sanitize_filename(name: &str) -> String {
    let sanitized = INVALID_FILENAME_RE.replace_all(name, "_");
    let truncated: String = sanitized.chars().take(50).collect();
    let trimmed = truncated.trim();

    if trimmed.is_empty() {
        "media_file".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_escaped_slashes() {
        assert_eq!(
            normalize_media_url(r"https:\/\/p16-sign.tiktokcdn.com\/obj\/img.jpeg").as_deref(),
            Some("https://p16-sign.tiktokcdn.com/obj/img.jpeg")
        );
    }

    #[test]
    fn test_normalize_unicode_escapes() {
        assert_eq!(
            normalize_media_url(r"https://cdn.example.com\u002Fa.mp3?x=1\u0026y=2").as_deref(),
            Some("https://cdn.example.com/a.mp3?x=1&y=2")
        );
    }

    #[test]
    fn test_normalize_protocol_relative() {
        assert_eq!(
            normalize_media_url("//i.pinimg.com/originals/a.jpg").as_deref(),
            Some("https://i.pinimg.com/originals/a.jpg")
        );
    }

    #[test]
    fn test_normalize_rejects_non_http() {
        assert_eq!(normalize_media_url("data:image/png;base64,AAAA"), None);
        assert_eq!(normalize_media_url("/relative/path.jpg"), None);
    }

    #[test]
    fn test_url_extension() {
        assert_eq!(url_extension("https://a.b/c/d.MP4?sig=1").as_deref(), Some("mp4"));
        assert_eq!(url_extension("https://a.b/c/d"), None);
        assert_eq!(url_extension("https://a.b/obj/tos-alisg~tplv-photomode.image"), Some("image".to_string()));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("a/b:c*d?"), "a_b_c_d_");
        assert_eq!(sanitize_filename("   "), "media_file");
        assert_eq!(sanitize_filename(&"x".repeat(80)).len(), 50);
    }

    #[test]
    fn test_proxy_args() {
        let config = NetworkConfig {
            proxy: Some("socks5://127.0.0.1:1080".to_string()),
            ..NetworkConfig::default()
        };
        assert_eq!(get_proxy_args(&config), vec!["--proxy", "socks5://127.0.0.1:1080"]);
        assert!(get_proxy_args(&NetworkConfig::default()).is_empty());
    }

    #[tokio::test]
    async fn test_with_retries_stops_on_permanent_error() {
        let mut calls = 0;
        let result: Result<(), _> = with_retries("t", 3, || {
            calls += 1;
            async { Err(StrategyError::NoMedia("gone".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_with_retries_retries_transient_error() {
        let mut calls = 0;
        let result: Result<(), _> = with_retries("t", 2, || {
            calls += 1;
            async { Err(StrategyError::Network("reset".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }
}
