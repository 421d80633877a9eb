//! The download pipeline: admit, describe, spawn, relay, report.
//!
//! [`run`] drives one request end to end. The response is committed when
//! the first audio chunk arrives; a run that ends before that still gets a
//! proper error status. Whatever happens, one [`tp_core::OutcomeRecord`] is
//! reported and the admission slot is released after it. That includes a
//! client that disconnects, or a handler that panics, before yt-dlp starts.

pub mod deadline;
pub mod envelope;
pub mod gate;
pub mod relay;
pub mod reporter;

use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use futures::Stream;
use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;

use tp_av::{ytdlp, ProcessHandle, YTDLP};
use tp_core::{ClientInfo, DownloadId, Error, ErrorKind, OutcomeRecord};

use crate::context::AppContext;
pub use deadline::{CancelReason, Deadline};
pub use envelope::Envelope;
pub use gate::{AdmissionGate, AdmissionSlot};
use relay::{ChunkReceiver, CHANNEL_CAPACITY};
pub use reporter::{OutcomeReporter, PendingOutcome};

/// One admitted-or-not download.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub id: DownloadId,
    pub url: String,
    pub client: ClientInfo,
    pub deadline: Deadline,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, client: ClientInfo, deadline: Deadline) -> Self {
        Self {
            id: DownloadId::new(),
            url: url.into(),
            client,
            deadline,
        }
    }
}

/// How the relay ended, as far as the HTTP response is concerned.
type Verdict = tp_core::Result<()>;

/// Run the pipeline for an already validated request.
pub async fn run(ctx: &AppContext, request: DownloadRequest) -> tp_core::Result<Response> {
    let span = tracing::info_span!("download", download_id = %request.id, url = %request.url);
    execute(ctx.clone(), request).instrument(span).await
}

async fn execute(ctx: AppContext, request: DownloadRequest) -> tp_core::Result<Response> {
    let DownloadRequest {
        url,
        client,
        deadline,
        ..
    } = request;
    let reporter = ctx.reporter();
    let download = &ctx.config.download;
    // Owed until the relay task takes over; reports a disconnect on drop.
    let mut outcome = PendingOutcome::new(reporter.clone(), &url, client.clone());

    match ctx.gate.acquire_until(&deadline).await {
        Ok(slot) => outcome.admit(slot),
        Err(reason) => {
            tracing::warn!(%reason, "Gave up waiting for a download slot");
            outcome.settle(reporter::failure(
                &url,
                ErrorKind::Timeout,
                reason.message(),
                "waiting for a download slot",
                client,
            ));
            return Err(Error::Timeout(reason.message().into()));
        }
    }
    tracing::debug!(
        in_flight = ctx.gate.in_flight(),
        capacity = ctx.gate.capacity(),
        "Download admitted"
    );

    let ytdlp_path = match ctx.tools.require(YTDLP) {
        Ok(path) => path.to_path_buf(),
        Err(e) => {
            outcome.settle(reporter::failure(&url, ErrorKind::Unhandled, e.to_string(), "", client));
            return Err(e);
        }
    };

    outcome.enter("probing the title");
    let envelope = match Envelope::probe(
        &ytdlp_path,
        &url,
        &download.audio_format,
        ctx.config.tools.probe_timeout(),
        &deadline,
    )
    .await
    {
        Ok(envelope) => envelope,
        Err(reason) => {
            outcome.settle(reporter::failure(
                &url,
                ErrorKind::Timeout,
                reason.message(),
                "probing the title",
                client,
            ));
            return Err(Error::Timeout(reason.message().into()));
        }
    };

    if let (Some(limit), Some(duration)) = (download.max_duration(), envelope.duration) {
        if duration > limit {
            let message = format!(
                "The video is too long. The maximum allowed duration is {} minutes.",
                limit.as_secs() / 60
            );
            outcome.settle(reporter::failure(
                &url,
                ErrorKind::DurationLimit,
                message.clone(),
                format!("video duration is {}s", duration.as_secs()),
                client,
            ));
            return Err(Error::Validation(message));
        }
    }

    outcome.enter("starting yt-dlp");
    let command = ytdlp::download_command(&ytdlp_path, &url, &download.audio_format);
    let mut handle = match ProcessHandle::spawn(&command) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start yt-dlp");
            outcome.settle(reporter::failure(&url, ErrorKind::Unhandled, e.to_string(), "", client));
            return Err(e);
        }
    };
    let file_name = envelope.file_name();
    tracing::info!(pid = ?handle.pid(), file_name = %file_name, "Streaming started");

    let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (verdict_tx, verdict_rx) = oneshot::channel::<Verdict>();

    // From here a disconnect closes `rx`, which the relay reports itself.
    let slot = outcome.hand_off();
    tokio::spawn(
        async move {
            let report = relay::relay(&mut handle, &tx, &deadline).await;
            drop(tx);
            tracing::info!(
                outcome = ?report.outcome,
                exit_code = ?report.exit_code,
                bytes = report.bytes,
                "Relay finished"
            );
            let record = reporter::classify(&url, &file_name, client, &report);
            let verdict = verdict_of(&record);
            reporter.report(record);
            let _ = verdict_tx.send(verdict);
            drop(slot);
        }
        .in_current_span(),
    );

    match rx.recv().await {
        Some(first) => Ok(committed(&envelope, Some(first), rx, Some(verdict_rx))),
        None => match verdict_rx.await {
            Ok(Ok(())) => Ok(committed(&envelope, None, rx, None)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Internal("relay task ended without a verdict".into())),
        },
    }
}

fn verdict_of(record: &OutcomeRecord) -> Verdict {
    match record {
        OutcomeRecord::Success { .. } => Ok(()),
        OutcomeRecord::Failure {
            kind: ErrorKind::Timeout,
            message,
            ..
        } => Err(Error::Timeout(message.clone())),
        OutcomeRecord::Failure { message, .. } => Err(Error::tool(YTDLP, message.clone())),
    }
}

/// A 200 response streaming `first` and then everything left in `rx`. If the
/// relay fails after this point the body ends with an error, which aborts
/// the transfer.
fn committed(
    envelope: &Envelope,
    first: Option<Bytes>,
    rx: ChunkReceiver,
    verdict: Option<oneshot::Receiver<Verdict>>,
) -> Response {
    let mut response = Response::new(Body::from_stream(body_stream(first, rx, verdict)));
    *response.headers_mut() = envelope.headers();
    response
}

struct BodyState {
    first: Option<Bytes>,
    rx: ChunkReceiver,
    verdict: Option<oneshot::Receiver<Verdict>>,
}

fn body_stream(
    first: Option<Bytes>,
    rx: ChunkReceiver,
    verdict: Option<oneshot::Receiver<Verdict>>,
) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
    let state = BodyState { first, rx, verdict };
    futures::stream::unfold(state, |mut st| async move {
        if let Some(chunk) = st.first.take() {
            return Some((Ok(chunk), st));
        }
        if let Some(chunk) = st.rx.recv().await {
            return Some((Ok(chunk), st));
        }
        let verdict = st.verdict.take()?;
        match verdict.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some((Err(std::io::Error::other(e.to_string())), st)),
            Err(_) => Some((Err(std::io::Error::other("download aborted")), st)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn body_ends_cleanly_on_success() {
        let (tx, rx) = mpsc::channel(4);
        let (vtx, vrx) = oneshot::channel();
        tx.send(Bytes::from_static(b"bb")).await.unwrap();
        drop(tx);
        vtx.send(Ok(())).unwrap();

        let items: Vec<_> = body_stream(Some(Bytes::from_static(b"aa")), rx, Some(vrx))
            .collect()
            .await;
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.is_ok()));
    }

    #[tokio::test]
    async fn body_ends_with_error_on_failure() {
        let (tx, rx) = mpsc::channel(4);
        let (vtx, vrx) = oneshot::channel();
        drop(tx);
        vtx.send(Err(Error::Timeout("too slow".into()))).unwrap();

        let items: Vec<_> = body_stream(Some(Bytes::from_static(b"aa")), rx, Some(vrx))
            .collect()
            .await;
        assert_eq!(items.len(), 2);
        let err = items[1].as_ref().unwrap_err();
        assert!(err.to_string().contains("too slow"));
    }

    #[test]
    fn verdicts() {
        let client = ClientInfo::default();
        let timeout = reporter::failure("u", ErrorKind::Timeout, "late", "", client.clone());
        assert_eq!(verdict_of(&timeout).unwrap_err().http_status(), 504);
        let process = reporter::failure("u", ErrorKind::ProcessError, "exit 1", "", client);
        assert_eq!(verdict_of(&process).unwrap_err().http_status(), 500);
    }
}
