//! Video-id extraction from media-hosting URLs.

use std::sync::LazyLock;

use regex::Regex;

static VIDEO_ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?:^|//)(?:www\.|m\.)?youtube\.com/watch\?(?:[^#]*&)?v=([A-Za-z0-9_-]+)",
        r"(?:^|//)(?:www\.)?youtu\.be/([A-Za-z0-9_-]+)",
        r"(?:^|//)(?:www\.|m\.)?youtube(?:-nocookie)?\.com/(?:embed|shorts|live|v)/([A-Za-z0-9_-]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// The video id embedded in `url`, if any pattern recognizes it.
pub fn extract_video_id(url: &str) -> Option<String> {
    VIDEO_ID_PATTERNS
        .iter()
        .find_map(|re| re.captures(url.trim()))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn canonical_video_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}
