//! Audio download route.
//!
//! `GET /stream-mp3?url=<video url>` streams yt-dlp's audio output back as an
//! attachment. Validation failures are answered before any slot, probe or
//! process is touched and are not audited.

use axum::extract::{Query, State};
use axum::response::Response;
use axum::Extension;
use serde::Deserialize;
use tp_core::ClientInfo;

use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::client_ip::ClientIp;
use crate::middleware::request_id::RequestId;
use crate::pipeline::{self, Deadline, DownloadRequest};

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    pub url: Option<String>,
}

/// GET /stream-mp3
pub async fn stream_mp3(
    State(ctx): State<AppContext>,
    request_id: Option<Extension<RequestId>>,
    ClientIp(ip): ClientIp,
    Query(query): Query<StreamQuery>,
) -> Result<Response, AppError> {
    // Entry time is the start of the deadline.
    let deadline = Deadline::new(ctx.request_timeout, &ctx.shutdown);
    let request_id = request_id.map(|Extension(RequestId(id))| id);
    let fail = |e: tp_core::Error| AppError::new(e).with_request_id(request_id.clone());

    let url = query.url.unwrap_or_default().trim().to_string();
    ctx.validator.validate(&url).map_err(fail)?;
    let ip = ip.ok_or(tp_core::Error::MissingClientIp).map_err(fail)?;

    let request = DownloadRequest::new(url, ClientInfo::new(ip), deadline);
    pipeline::run(&ctx, request).await.map_err(fail)
}
