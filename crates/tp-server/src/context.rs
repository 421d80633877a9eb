//! Application context shared by every handler via Axum state.
//!
//! [`AppContext`] is cheap to clone: infrastructure sits behind `Arc`s, and
//! the admission gate and shutdown token are themselves shared handles.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tp_av::ToolRegistry;
use tp_core::config::Config;

use crate::audit::AuditSink;
use crate::geo::GeoResolver;
use crate::pipeline::{AdmissionGate, OutcomeReporter};
use crate::validate::{UrlValidator, YouTubeUrlValidator};

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub gate: AdmissionGate,
    pub tools: Arc<ToolRegistry>,
    pub audit: Arc<dyn AuditSink>,
    pub geo: Arc<dyn GeoResolver>,
    pub validator: Arc<dyn UrlValidator>,
    /// Cancelled once on server shutdown; every request deadline is a child.
    pub shutdown: CancellationToken,
    /// Per-request deadline, measured from request entry.
    pub request_timeout: Duration,
}

impl AppContext {
    /// Build a context from configuration. The gate is sized once here and
    /// never replaced.
    pub fn new(
        config: Config,
        tools: ToolRegistry,
        audit: Arc<dyn AuditSink>,
        geo: Arc<dyn GeoResolver>,
    ) -> Self {
        Self {
            gate: AdmissionGate::new(config.download.capacity()),
            request_timeout: config.download.timeout(),
            config: Arc::new(config),
            tools: Arc::new(tools),
            audit,
            geo,
            validator: Arc::new(YouTubeUrlValidator),
            shutdown: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn UrlValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn reporter(&self) -> OutcomeReporter {
        OutcomeReporter::new(self.audit.clone(), self.geo.clone())
    }
}
