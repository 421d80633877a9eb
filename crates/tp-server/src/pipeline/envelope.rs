//! Request envelope: file name and response headers, fixed before the first
//! body byte.

use std::path::Path;
use std::time::Duration;

use axum::http::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT_RANGES, CACHE_CONTROL, CONTENT_DISPOSITION,
    CONTENT_TYPE, EXPIRES, PRAGMA,
};

use super::deadline::{CancelReason, Deadline};

/// Title used when the probe fails or returns nothing usable.
pub const FALLBACK_TITLE: &str = "unknown";

/// Everything needed to describe the download before streaming starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Probed title, unmodified.
    pub title: String,
    /// Title with illegal characters replaced; never empty.
    pub stem: String,
    pub extension: String,
    pub duration: Option<Duration>,
}

impl Envelope {
    pub fn new(title: impl Into<String>, extension: &str, duration: Option<Duration>) -> Self {
        let title = title.into();
        Self {
            stem: sanitize_file_name(&title),
            title,
            extension: extension.to_string(),
            duration,
        }
    }

    /// Probe the title and duration. Probe failures fall back to
    /// [`FALLBACK_TITLE`]; only the deadline can fail this.
    pub async fn probe(
        ytdlp: &Path,
        url: &str,
        extension: &str,
        probe_timeout: Duration,
        deadline: &Deadline,
    ) -> Result<Self, CancelReason> {
        let timeout = probe_timeout.min(deadline.remaining());
        let probed = tokio::select! {
            r = tp_av::ytdlp::probe(ytdlp, url, timeout) => r,
            reason = deadline.expired() => return Err(reason),
        };
        match probed {
            Ok(info) => Ok(Self::new(info.title, extension, info.duration)),
            Err(e) => {
                tracing::warn!(url, error = %e, "Title probe failed, using fallback name");
                Ok(Self::new(FALLBACK_TITLE, extension, None))
            }
        }
    }

    /// `<stem>.<ext>` as recorded in the audit log.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.stem, self.extension)
    }

    /// `Content-Disposition` with an ASCII `filename` and an RFC 5987
    /// `filename*`.
    pub fn content_disposition(&self) -> String {
        format!(
            "attachment; filename=\"{}.{ext}\"; filename*=UTF-8''{}.{ext}",
            ascii_fallback(&self.stem),
            urlencoding::encode(&self.stem),
            ext = self.extension,
        )
    }

    /// The header value for [`Envelope::content_disposition`]. A value the
    /// header cannot carry degrades to a generic name, never to no header.
    fn disposition_value(&self) -> HeaderValue {
        HeaderValue::from_str(&self.content_disposition())
            .or_else(|_| {
                tracing::warn!(title = %self.title, "Unusable download name, sending a generic one");
                HeaderValue::from_str(&format!("attachment; filename=\"audio.{}\"", self.extension))
            })
            .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
    }

    /// Headers for a committed download response.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type(&self.extension)));
        headers.insert(CONTENT_DISPOSITION, self.disposition_value());
        headers.insert(
            CACHE_CONTROL,
            HeaderValue::from_static("no-store, no-cache, must-revalidate, max-age=0"),
        );
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(EXPIRES, HeaderValue::from_static("0"));
        headers.insert(ACCEPT_RANGES, HeaderValue::from_static("none"));
        headers.insert(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        );
        headers
    }
}

/// Replace every character that is not allowed in a file name with `_`.
pub fn sanitize_file_name(title: &str) -> String {
    let cleaned: String = title
        .trim()
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "audio".to_string()
    } else {
        cleaned
    }
}

/// Non-ASCII characters become `_`.
pub fn ascii_fallback(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '_' })
        .collect()
}

fn content_type(extension: &str) -> &'static str {
    match extension {
        "mp3" => "audio/mpeg",
        "m4a" | "aac" => "audio/mp4",
        "opus" | "vorbis" | "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "wav" => "audio/wav",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_illegal_characters() {
        assert_eq!(sanitize_file_name(r#"a<b>c:d"e/f\g|h?i*j"#), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_file_name("tab\there"), "tab_here");
        assert_eq!(sanitize_file_name("  "), "audio");
        assert_eq!(sanitize_file_name("AC/DC: Thunderstruck"), "AC_DC_ Thunderstruck");
    }

    #[test]
    fn unicode_title_headers() {
        let env = Envelope::new("ქართული სიმღერა", "mp3", None);
        let cd = env.content_disposition();
        assert!(cd.starts_with("attachment; filename=\""));
        assert!(cd.contains("filename=\"_______ _______.mp3\""));
        assert!(cd.contains("filename*=UTF-8''%E1%83%"));
        assert!(cd.is_ascii());
    }

    #[test]
    fn slash_title_becomes_underscore() {
        let env = Envelope::new("AC/DC", "mp3", None);
        assert_eq!(env.file_name(), "AC_DC.mp3");
        let headers = env.headers();
        let cd = headers[CONTENT_DISPOSITION].to_str().unwrap();
        assert!(cd.contains("filename=\"AC_DC.mp3\""));
        assert!(cd.contains("filename*=UTF-8''AC_DC.mp3"));
    }

    #[test]
    fn fixed_headers() {
        let headers = Envelope::new("x", "mp3", None).headers();
        assert_eq!(headers[CONTENT_TYPE], "audio/mpeg");
        assert_eq!(headers[ACCEPT_RANGES], "none");
        assert_eq!(headers[PRAGMA], "no-cache");
        assert_eq!(headers[EXPIRES], "0");
        assert!(headers[CACHE_CONTROL].to_str().unwrap().contains("no-store"));
    }

    #[test]
    fn unusable_extension_still_sends_attachment() {
        let headers = Envelope::new("Song", "mp3\r\nx-injected: 1", None).headers();
        assert_eq!(headers[CONTENT_DISPOSITION], "attachment");
        assert!(headers.get("x-injected").is_none());
    }

    #[tokio::test]
    async fn probe_failure_falls_back() {
        let root = tokio_util::sync::CancellationToken::new();
        let deadline = Deadline::new(Duration::from_secs(10), &root);
        let env = Envelope::probe(
            Path::new("/nonexistent/yt-dlp"),
            "https://youtu.be/dQw4w9WgXcQ",
            "mp3",
            Duration::from_secs(1),
            &deadline,
        )
        .await
        .unwrap();
        assert_eq!(env.title, FALLBACK_TITLE);
        assert_eq!(env.file_name(), "unknown.mp3");
    }
}
