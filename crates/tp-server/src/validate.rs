//! Source URL validation.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Accepts or rejects a source URL before any resource is acquired.
pub trait UrlValidator: Send + Sync {
    fn validate(&self, url: &str) -> tp_core::Result<()>;
}

const ALLOWED_HOSTS: &[&str] = &["youtube.com", "www.youtube.com", "m.youtube.com", "youtu.be"];

static VIDEO_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://(?:www\.|m\.)?(?:youtube\.com/watch\?(?:[^#\s]*&)?v=[\w-]{11}|youtu\.be/[\w-]{11})")
        .expect("video reference pattern is valid")
});

/// Only single-video YouTube links: `youtube.com/watch?v=<id>` or
/// `youtu.be/<id>`. Playlists are refused.
#[derive(Debug, Clone, Copy, Default)]
pub struct YouTubeUrlValidator;

impl UrlValidator for YouTubeUrlValidator {
    fn validate(&self, raw: &str) -> tp_core::Result<()> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(invalid("A URL is required."));
        }

        let parsed = Url::parse(raw).map_err(|_| invalid("The URL is malformed."))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid("Only http and https URLs are supported."));
        }
        let host = parsed.host_str().unwrap_or_default();
        if !ALLOWED_HOSTS.contains(&host) {
            return Err(invalid("Only valid YouTube video links are allowed."));
        }
        if parsed.query_pairs().any(|(k, _)| k == "list") {
            return Err(invalid("Playlists are not supported. Please provide a single video URL."));
        }

        match VIDEO_REF.find_iter(raw).count() {
            1 => Ok(()),
            _ => Err(invalid("Only valid YouTube video links are allowed.")),
        }
    }
}

fn invalid(msg: &str) -> tp_core::Error {
    tp_core::Error::Validation(msg.to_string())
}
