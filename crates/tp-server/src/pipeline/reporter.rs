//! Outcome reporter: turns a finished pipeline run into exactly one audit
//! record and writes it off the request path.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tp_core::{AuditEntry, ClientInfo, ErrorKind, ErrorLogEntry, OutcomeRecord};

use super::deadline::CancelReason;
use super::gate::AdmissionSlot;
use super::relay::{RelayOutcome, RelayReport};
use crate::audit::AuditSink;
use crate::geo::GeoResolver;

/// Classify a relay report.
///
/// Cancellation wins over everything else; the exit code is only looked at
/// when the relay itself did not fail.
pub fn classify(url: &str, filename: &str, client: ClientInfo, report: &RelayReport) -> OutcomeRecord {
    let fail = |kind, message: String, detail: String| OutcomeRecord::Failure {
        url: url.to_string(),
        kind,
        message,
        detail,
        client: client.clone(),
    };

    match &report.outcome {
        RelayOutcome::Cancelled(reason) => {
            fail(ErrorKind::Timeout, reason.message().to_string(), report.stderr.clone())
        }
        RelayOutcome::Failed(err) => fail(
            ErrorKind::ProcessError,
            "Failed to relay yt-dlp output.".to_string(),
            err.clone(),
        ),
        RelayOutcome::Completed => match report.exit_code {
            Some(0) => OutcomeRecord::Success {
                url: url.to_string(),
                filename: filename.to_string(),
                client: client.clone(),
            },
            Some(code) => fail(
                ErrorKind::ProcessError,
                format!("yt-dlp exited with code {code}."),
                report.stderr.clone(),
            ),
            None => fail(
                ErrorKind::ProcessError,
                "yt-dlp was terminated by a signal.".to_string(),
                report.stderr.clone(),
            ),
        },
    }
}

/// Build a failure record for a run that never reached the relay.
pub fn failure(url: &str, kind: ErrorKind, message: impl Into<String>, detail: impl Into<String>, client: ClientInfo) -> OutcomeRecord {
    OutcomeRecord::Failure {
        url: url.to_string(),
        kind,
        message: message.into(),
        detail: detail.into(),
        client,
    }
}

/// Fire-and-forget writer for [`OutcomeRecord`]s.
#[derive(Clone)]
pub struct OutcomeReporter {
    audit: Arc<dyn AuditSink>,
    geo: Arc<dyn GeoResolver>,
}

impl OutcomeReporter {
    pub fn new(audit: Arc<dyn AuditSink>, geo: Arc<dyn GeoResolver>) -> Self {
        Self { audit, geo }
    }

    /// Spawn the write of `record` and return immediately.
    ///
    /// Geolocation is resolved inside the task. A failed write is followed
    /// by one `monitor-error` row; a failed monitor row only reaches the log.
    pub fn report(&self, record: OutcomeRecord) -> JoinHandle<()> {
        let audit = self.audit.clone();
        let geo = self.geo.clone();
        tokio::spawn(async move {
            let inner = tokio::spawn(deliver(audit.clone(), geo, record.clone()));
            if let Err(e) = inner.await {
                if e.is_panic() {
                    tracing::error!(url = record.url(), "Audit task panicked");
                    write_monitor(audit.as_ref(), &record, "audit task panicked").await;
                }
            }
        })
    }
}

/// The outcome of a run that has not reached the relay yet.
///
/// Axum drops the handler future when the client goes away, and a panic
/// unwinds through it; in both cases the request still owes its audit row.
/// Dropping an unsettled `PendingOutcome` reports that row, naming the
/// stage the run was in. A held admission slot is released only after the
/// report is issued.
pub struct PendingOutcome {
    reporter: OutcomeReporter,
    url: String,
    client: ClientInfo,
    stage: &'static str,
    slot: Option<AdmissionSlot>,
    settled: bool,
}

impl PendingOutcome {
    pub fn new(reporter: OutcomeReporter, url: &str, client: ClientInfo) -> Self {
        Self {
            reporter,
            url: url.to_string(),
            client,
            stage: "waiting for a download slot",
            slot: None,
            settled: false,
        }
    }

    /// Keep `slot` until the outcome is reported or handed off.
    pub fn admit(&mut self, slot: AdmissionSlot) {
        self.slot = Some(slot);
    }

    /// Record which stage the run has entered.
    pub fn enter(&mut self, stage: &'static str) {
        self.stage = stage;
    }

    /// Report `record` as this request's outcome.
    pub fn settle(mut self, record: OutcomeRecord) {
        self.settled = true;
        self.reporter.report(record);
    }

    /// Hand the outcome, and the slot, over to the relay task.
    pub fn hand_off(mut self) -> Option<AdmissionSlot> {
        self.settled = true;
        self.slot.take()
    }
}

impl Drop for PendingOutcome {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let record = if std::thread::panicking() {
            tracing::error!(url = %self.url, stage = self.stage, "Download handler panicked");
            failure(
                &self.url,
                ErrorKind::Unhandled,
                "The download handler panicked.",
                self.stage,
                self.client.clone(),
            )
        } else {
            tracing::info!(url = %self.url, stage = self.stage, "Client went away before streaming started");
            failure(
                &self.url,
                ErrorKind::Timeout,
                CancelReason::ClientDisconnected.message(),
                self.stage,
                self.client.clone(),
            )
        };
        // Spawning needs a runtime; a drop outside one can only log.
        if tokio::runtime::Handle::try_current().is_ok() {
            self.reporter.report(record);
        } else {
            tracing::error!(url = %self.url, "No runtime to record the abandoned download");
        }
    }
}

async fn deliver(audit: Arc<dyn AuditSink>, geo: Arc<dyn GeoResolver>, mut record: OutcomeRecord) {
    if let Some(ip) = record.client().ip.clone() {
        record.client_mut().geo = geo.resolve(&ip).await;
    }

    let result = match AuditEntry::from(record.clone()) {
        AuditEntry::Download(entry) => audit.log_download(&entry).await,
        AuditEntry::Error(entry) => {
            tracing::warn!(
                url = %entry.url,
                kind = %entry.error_type,
                detail = %entry.detail,
                "{}",
                entry.error_message
            );
            audit.log_error(&entry).await
        }
    };

    match result {
        Ok(()) => tracing::debug!(url = record.url(), success = record.is_success(), "Outcome recorded"),
        Err(e) => {
            tracing::error!(url = record.url(), error = %e, "Failed to record download outcome");
            write_monitor(audit.as_ref(), &record, &e).await;
        }
    }
}

async fn write_monitor(audit: &dyn AuditSink, record: &OutcomeRecord, failure: impl std::fmt::Display) {
    let entry = ErrorLogEntry::monitor(record, failure);
    if let Err(e) = audit.log_error(&entry).await {
        tracing::error!(url = record.url(), error = %e, "Failed to record monitor error");
    }
}
