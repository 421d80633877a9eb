//! Unified error type for tunepipe.
//!
//! All crates funnel their failures into [`Error`], which carries enough context
//! for the HTTP layer to derive a status code via [`Error::http_status`].

/// Unified error type covering all failure modes in tunepipe.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request data failed validation (bad URL, playlist, too long, ...).
    #[error("{0}")]
    Validation(String),

    /// Neither a proxy header nor the socket peer yielded a client address.
    #[error("Missing IP address.")]
    MissingClientIp,

    /// The caller exceeded the configured request quota.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// The request deadline elapsed (or the client went away) before the
    /// download finished.
    #[error("{0}")]
    Timeout(String),

    /// An external tool (yt-dlp) could not be run or exited with an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// A database operation failed.
    #[error("Database error: {source}")]
    Database {
        /// The underlying database error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::MissingClientIp => 400,
            Error::RateLimited => 429,
            Error::Timeout(_) => 504,
            Error::Tool { .. } => 500,
            Error::Database { .. } => 500,
            Error::Io { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Whether the message is safe to show to an HTTP client verbatim.
    ///
    /// Server-side failures are replaced by a fixed message at the HTTP edge.
    pub fn is_client_facing(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::MissingClientIp | Error::RateLimited | Error::Timeout(_)
        )
    }

    /// Convenience constructor for [`Error::Database`].
    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display() {
        let err = Error::Validation("Only valid YouTube links are allowed".into());
        assert_eq!(err.to_string(), "Only valid YouTube links are allowed");
        assert_eq!(err.http_status(), 400);
        assert!(err.is_client_facing());
    }

    #[test]
    fn missing_ip_display() {
        let err = Error::MissingClientIp;
        assert_eq!(err.to_string(), "Missing IP address.");
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn timeout_maps_to_gateway_timeout() {
        let err = Error::Timeout("deadline elapsed".into());
        assert_eq!(err.http_status(), 504);
        assert!(err.to_string().contains("deadline elapsed"));
    }

    #[test]
    fn tool_display() {
        let err = Error::tool("yt-dlp", "exit code 1");
        assert_eq!(err.to_string(), "Tool error [yt-dlp]: exit code 1");
        assert_eq!(err.http_status(), 500);
        assert!(!err.is_client_facing());
    }

    #[test]
    fn database_display() {
        let err = Error::database("connection refused");
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn rate_limited_is_429() {
        assert_eq!(Error::RateLimited.http_status(), 429);
    }

    #[test]
    fn internal_display() {
        let err = Error::Internal("unexpected state".into());
        assert_eq!(err.to_string(), "Internal error: unexpected state");
        assert_eq!(err.http_status(), 500);
    }
}
