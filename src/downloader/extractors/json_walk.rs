// Vocabulary-driven search over arbitrary JSON trees
//
// Page state blobs and mirror APIs change shape constantly, so instead of
// deserializing into fixed structs we walk the whole tree and collect string
// values sitting under keys from a fixed vocabulary.

use std::collections::HashSet;

use serde_json::Value;

use crate::downloader::models::AssetKind;
use crate::downloader::utils::{normalize_media_url, url_extension};

/// Keys whose subtree holds slideshow images
pub const IMAGE_KEYS: &[&str] = &[
    "images",
    "imageList",
    "image_list",
    "imagePost",
    "image_post_info",
    "displayImages",
    "display_image",
    "carousel_media",
];

/// Keys whose value (or subtree) holds the background audio
pub const AUDIO_KEYS: &[&str] = &[
    "audioUrl",
    "audio_url",
    "playUrl",
    "play_url",
    "musicUrl",
    "music_url",
    "music",
];

/// Keys naming the audio address itself inside an audio subtree, strongest first
const AUDIO_URL_KEYS: &[&str] = &["playUrl", "play_url", "audioUrl", "audio_url", "musicUrl", "music_url"];

/// Keys naming a playable video address, strongest first
pub const VIDEO_KEYS: &[&str] = &[
    "hdplay",
    "play",
    "playAddr",
    "play_addr",
    "downloadAddr",
    "download_addr",
    "video_url",
    "videoUrl",
    "contentUrl",
    "media_url",
    "mediaUrl",
];

/// What a walk found, in discovery order
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct JsonFindings {
    pub images: Vec<String>,
    pub audio: Option<String>,
}

fn key_matches(key: &str, vocabulary: &[&str]) -> bool {
    vocabulary.iter().any(|k| k.eq_ignore_ascii_case(key))
}

fn as_url(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if looks_like_url(s) => normalize_media_url(s),
        _ => None,
    }
}

fn looks_like_url(s: &str) -> bool {
    let s = s.trim();
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with("//") || s.starts_with(r"https:\/\/")
}

/// First URL-looking string anywhere below `value` (depth first)
pub fn first_url(value: &Value) -> Option<String> {
    match value {
        Value::String(_) => as_url(value),
        Value::Array(items) => items.iter().find_map(first_url),
        Value::Object(map) => map.values().find_map(first_url),
        _ => None,
    }
}

fn extension_kind(url: &str) -> Option<AssetKind> {
    url_extension(url).and_then(|ext| AssetKind::from_extension(&ext))
}

/// Audio below a matched key. Music objects also carry cover art, so the
/// address keys are tried first and image URLs are never accepted.
fn audio_url(value: &Value) -> Option<String> {
    let playable = |url: &String| extension_kind(url) != Some(AssetKind::Image);

    if let Value::String(_) = value {
        return as_url(value).filter(playable);
    }

    let by_key = AUDIO_URL_KEYS.iter().find_map(|key| {
        let mut found = Vec::new();
        urls_under_key(value, key, &mut found);
        found.into_iter().find(playable)
    });
    by_key.or_else(|| {
        let mut found = Vec::new();
        all_urls(value, &mut found);
        found.into_iter().find(|url| extension_kind(url) == Some(AssetKind::Audio))
    })
}

fn all_urls(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(_) => out.extend(as_url(value)),
        Value::Array(items) => items.iter().for_each(|item| all_urls(item, out)),
        Value::Object(map) => map.values().for_each(|child| all_urls(child, out)),
        _ => {}
    }
}

/// Images under a matched key: one URL per array element, so that mirrored
/// `urlList` variants of the same picture are not counted twice
fn collect_images(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(_) => out.extend(as_url(item)),
                    _ => out.extend(first_url(item)),
                }
            }
        }
        Value::Object(map) => {
            // `imagePost: { images: [...] }` nests the real list one level down
            if let Some((_, inner)) = map.iter().find(|(k, _)| key_matches(k, IMAGE_KEYS)) {
                collect_images(inner, out);
            } else {
                out.extend(first_url(value));
            }
        }
        Value::String(_) => out.extend(as_url(value)),
        _ => {}
    }
}

fn walk(value: &Value, findings: &mut JsonFindings) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if key_matches(key, IMAGE_KEYS) {
                    collect_images(child, &mut findings.images);
                } else if key_matches(key, AUDIO_KEYS) {
                    if findings.audio.is_none() {
                        findings.audio = audio_url(child);
                    }
                } else {
                    walk(child, findings);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, findings);
            }
        }
        _ => {}
    }
}

/// Walk a tree collecting slideshow images and at most one audio URL.
/// Image URLs are deduplicated, first occurrence wins.
pub fn find_slideshow_assets(value: &Value) -> JsonFindings {
    let mut findings = JsonFindings::default();
    walk(value, &mut findings);

    let mut seen = HashSet::new();
    findings.images.retain(|url| seen.insert(url.clone()));
    findings
}

/// All URLs stored directly under `key` anywhere in the tree
fn urls_under_key(value: &Value, key: &str, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (k, child) in map {
                if k.eq_ignore_ascii_case(key) {
                    out.extend(first_url(child));
                } else {
                    urls_under_key(child, key, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                urls_under_key(item, key, out);
            }
        }
        _ => {}
    }
}

/// First URL under the highest-priority key from `keys` that has one
pub fn find_by_priority(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        let mut found = Vec::new();
        urls_under_key(value, key, &mut found);
        found.into_iter().next()
    })
}

/// Follow a chain of object keys
pub fn path<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().try_fold(value, |current, key| current.get(*key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tiktok_image_post_one_url_per_image() {
        let state = json!({
            "itemInfo": {"itemStruct": {
                "imagePost": {"images": [
                    {"imageURL": {"urlList": ["https://p16.tiktokcdn.com/a.jpeg", "https://p19.tiktokcdn.com/a.jpeg"]}},
                    {"imageURL": {"urlList": ["https://p16.tiktokcdn.com/b.jpeg"]}}
                ]},
                "music": {"playUrl": "https://sf16.tiktokcdn.com/m.mp3", "title": "x"}
            }}
        });
        let findings = find_slideshow_assets(&state);
        assert_eq!(
            findings.images,
            vec!["https://p16.tiktokcdn.com/a.jpeg", "https://p16.tiktokcdn.com/b.jpeg"]
        );
        assert_eq!(findings.audio.as_deref(), Some("https://sf16.tiktokcdn.com/m.mp3"));
    }

    #[test]
    fn test_music_cover_art_is_not_audio() {
        let state = json!({
            "itemStruct": {
                "imagePost": {"images": [
                    {"imageURL": {"urlList": ["https://p16.tiktokcdn.com/a.jpeg"]}}
                ]},
                "music": {
                    "id": "1",
                    "title": "orig",
                    "coverLarge": "https://p16.tiktokcdn.com/cover_large.jpeg",
                    "coverMedium": "https://p16.tiktokcdn.com/cover_medium.jpeg",
                    "coverThumb": "https://p16.tiktokcdn.com/cover_thumb.jpeg",
                    "authorName": "someone",
                    "playUrl": "https://sf16.tiktokcdn.com/m.mp3"
                }
            }
        });
        let findings = find_slideshow_assets(&state);
        assert_eq!(findings.images, vec!["https://p16.tiktokcdn.com/a.jpeg"]);
        assert_eq!(findings.audio.as_deref(), Some("https://sf16.tiktokcdn.com/m.mp3"));
    }

    #[test]
    fn test_music_without_address_yields_no_audio() {
        let state = json!({
            "music": {"title": "orig", "coverLarge": "https://p16.tiktokcdn.com/cover_large.jpeg"}
        });
        assert_eq!(find_slideshow_assets(&state).audio, None);

        let state = json!({
            "music": {"title": "orig", "coverLarge": "https://p16.tiktokcdn.com/c.jpeg", "src": "https://cdn.example.com/t.m4a"}
        });
        assert_eq!(
            find_slideshow_assets(&state).audio.as_deref(),
            Some("https://cdn.example.com/t.m4a")
        );
    }

    #[test]
    fn test_flat_image_list_and_escaped_urls() {
        let state = json!({"data": {"images": [r"https:\/\/cdn.x\/1.webp", "//cdn.x/2.webp", "not a url"]}});
        let findings = find_slideshow_assets(&state);
        assert_eq!(findings.images, vec!["https://cdn.x/1.webp", "https://cdn.x/2.webp"]);
        assert_eq!(findings.audio, None);
    }

    #[test]
    fn test_duplicates_removed_in_order() {
        let state = json!({"a": {"images": ["https://c/1.jpg"]}, "b": {"imageList": ["https://c/1.jpg", "https://c/2.jpg"]}});
        let findings = find_slideshow_assets(&state);
        assert_eq!(findings.images, vec!["https://c/1.jpg", "https://c/2.jpg"]);
    }

    #[test]
    fn test_find_by_priority() {
        let body = json!({"data": {"play": "https://v/sd.mp4", "hdplay": "https://v/hd.mp4"}});
        assert_eq!(find_by_priority(&body, VIDEO_KEYS).as_deref(), Some("https://v/hd.mp4"));
        assert_eq!(find_by_priority(&json!({"x": 1}), VIDEO_KEYS), None);
    }

    #[test]
    fn test_path() {
        let v = json!({"a": {"b": {"c": 3}}});
        assert_eq!(path(&v, &["a", "b", "c"]), Some(&json!(3)));
        assert_eq!(path(&v, &["a", "x"]), None);
    }
}
