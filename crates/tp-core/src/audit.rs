//! Audit domain types: what gets written to the download and error logs.
//!
//! Every pass through the download pipeline produces exactly one
//! [`OutcomeRecord`], which the reporter turns into either a
//! [`DownloadLogEntry`] or an [`ErrorLogEntry`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder used when a geolocation attribute could not be resolved.
pub const UNKNOWN: &str = "unknown";

/// Classification carried by an error log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// The deadline elapsed, the client disconnected, or the server shut down.
    Timeout,
    /// The extraction tool exited non-zero or its output could not be read.
    ProcessError,
    /// Recording the primary outcome itself failed.
    MonitorError,
    /// The probed duration exceeded the configured limit.
    DurationLimit,
    /// Anything else caught at the request boundary.
    Unhandled,
}

impl ErrorKind {
    /// Stable string stored in the `error_type` column.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::ProcessError => "process-error",
            ErrorKind::MonitorError => "monitor-error",
            ErrorKind::DurationLimit => "duration-limit",
            ErrorKind::Unhandled => "unhandled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "timeout" => Ok(Self::Timeout),
            "process-error" => Ok(Self::ProcessError),
            "monitor-error" => Ok(Self::MonitorError),
            "duration-limit" => Ok(Self::DurationLimit),
            "unhandled" => Ok(Self::Unhandled),
            other => Err(format!("Unknown error kind: {other}")),
        }
    }
}

/// Result of a geolocation lookup. Unresolved fields hold [`UNKNOWN`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoInfo {
    pub country: String,
    pub region: String,
}

impl GeoInfo {
    pub fn unknown() -> Self {
        Self {
            country: UNKNOWN.into(),
            region: UNKNOWN.into(),
        }
    }
}

impl Default for GeoInfo {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Network attributes of the requesting client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub geo: GeoInfo,
}

impl ClientInfo {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: Some(ip.into()),
            geo: GeoInfo::unknown(),
        }
    }

    #[must_use]
    pub fn with_geo(mut self, geo: GeoInfo) -> Self {
        self.geo = geo;
        self
    }
}

/// The single audit event describing how a pipeline run concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeRecord {
    Success {
        url: String,
        filename: String,
        client: ClientInfo,
    },
    Failure {
        url: String,
        kind: ErrorKind,
        message: String,
        detail: String,
        client: ClientInfo,
    },
}

impl OutcomeRecord {
    pub fn url(&self) -> &str {
        match self {
            OutcomeRecord::Success { url, .. } | OutcomeRecord::Failure { url, .. } => url,
        }
    }

    pub fn client(&self) -> &ClientInfo {
        match self {
            OutcomeRecord::Success { client, .. } | OutcomeRecord::Failure { client, .. } => client,
        }
    }

    pub fn client_mut(&mut self) -> &mut ClientInfo {
        match self {
            OutcomeRecord::Success { client, .. } | OutcomeRecord::Failure { client, .. } => client,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeRecord::Success { .. })
    }

    /// The error kind, or `None` for a success.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            OutcomeRecord::Success { .. } => None,
            OutcomeRecord::Failure { kind, .. } => Some(*kind),
        }
    }
}

/// A row for the download log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadLogEntry {
    pub url: String,
    pub file_name: String,
    pub country: Option<String>,
    pub region: Option<String>,
    pub ip_address: Option<String>,
}

/// A row for the error log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub url: String,
    pub error_message: String,
    pub detail: String,
    pub error_type: ErrorKind,
    pub country: Option<String>,
    pub region: Option<String>,
    pub ip_address: Option<String>,
}

impl ErrorLogEntry {
    /// A `monitor-error` row describing a failure to record `original`.
    pub fn monitor(original: &OutcomeRecord, failure: impl fmt::Display) -> Self {
        let client = original.client();
        Self {
            url: original.url().to_string(),
            error_message: format!("Failed to record download outcome: {failure}"),
            detail: match original.kind() {
                Some(kind) => format!("primary outcome: {kind}"),
                None => "primary outcome: success".into(),
            },
            error_type: ErrorKind::MonitorError,
            country: Some(client.geo.country.clone()),
            region: Some(client.geo.region.clone()),
            ip_address: client.ip.clone(),
        }
    }
}

/// Either log row, as produced from an [`OutcomeRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEntry {
    Download(DownloadLogEntry),
    Error(ErrorLogEntry),
}

impl From<OutcomeRecord> for AuditEntry {
    fn from(record: OutcomeRecord) -> Self {
        match record {
            OutcomeRecord::Success {
                url,
                filename,
                client,
            } => AuditEntry::Download(DownloadLogEntry {
                url,
                file_name: filename,
                country: Some(client.geo.country),
                region: Some(client.geo.region),
                ip_address: client.ip,
            }),
            OutcomeRecord::Failure {
                url,
                kind,
                message,
                detail,
                client,
            } => AuditEntry::Error(ErrorLogEntry {
                url,
                error_message: message,
                detail,
                error_type: kind,
                country: Some(client.geo.country),
                region: Some(client.geo.region),
                ip_address: client.ip,
            }),
        }
    }
}
