//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which writes a fake `yt-dlp` shell script into a
//! temp dir, builds a full [`AppContext`] around an in-memory audit sink, and
//! (with [`TestHarness::serve`]) starts Axum on a random port.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use tp_av::{ToolRegistry, YTDLP};
use tp_core::config::Config;
use tp_server::audit::MemoryAuditSink;
use tp_server::context::AppContext;
use tp_server::geo::NoopGeoResolver;
use tp_server::router::build_router;

pub const VIDEO_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

/// Behaviour of the fake extraction tool.
#[derive(Debug, Clone)]
pub struct FakeTool {
    /// Shell run for `--get-title --get-duration ...`.
    pub probe: String,
    /// Shell run for the download invocation. `$STATE` is the temp dir.
    pub download: String,
}

impl FakeTool {
    pub fn new(download: &str) -> Self {
        Self {
            probe: "echo 'Test Song'; echo '3:33'".into(),
            download: download.into(),
        }
    }

    #[must_use]
    pub fn probe(mut self, probe: &str) -> Self {
        self.probe = probe.into();
        self
    }

    fn script(&self, state: &Path) -> String {
        format!(
            "#!/bin/sh\nSTATE='{}'\ncase \"$1\" in\n  --get-title)\n    {}\n    ;;\n  *)\n    {}\n    ;;\nesac\n",
            state.display(),
            self.probe,
            self.download
        )
    }
}

pub struct TestHarness {
    pub ctx: AppContext,
    pub audit: MemoryAuditSink,
    pub dir: TempDir,
}

impl TestHarness {
    /// Harness with a 10 second request timeout and default config.
    pub fn new(tool: FakeTool) -> Self {
        Self::with(tool, Duration::from_secs(10), |_| {})
    }

    pub fn with(tool: FakeTool, timeout: Duration, configure: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let script = dir.path().join("yt-dlp");
        std::fs::write(&script, tool.script(dir.path())).expect("failed to write fake tool");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
                .expect("failed to chmod fake tool");
        }

        let mut config = Config::default();
        config.server.rate_limit_per_minute = 0;
        config.geo.enabled = false;
        config.tools.ytdlp_path = Some(script.clone());
        config.tools.probe_timeout_secs = 5;
        configure(&mut config);

        let audit = MemoryAuditSink::new();
        let tools = ToolRegistry::default().with_tool(YTDLP, script);
        let ctx = AppContext::new(config, tools, Arc::new(audit.clone()), Arc::new(NoopGeoResolver))
            .with_request_timeout(timeout);

        Self { ctx, audit, dir }
    }

    /// Start an Axum server on a random port and return its address.
    pub async fn serve(&self) -> SocketAddr {
        let app = build_router(self.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .ok();
        });

        addr
    }

    pub fn state_file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Wait until at least `n` audit rows exist, or panic after 5 seconds.
    pub async fn wait_for_audit(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.audit.len() < n {
            if tokio::time::Instant::now() > deadline {
                panic!(
                    "expected {n} audit rows, have {}: {:?} {:?}",
                    self.audit.len(),
                    self.audit.downloads(),
                    self.audit.errors()
                );
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Wait until every admission slot is free, or panic after 5 seconds.
    pub async fn wait_for_idle(&self) {
        for _ in 0..250 {
            if self.ctx.gate.in_flight() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("{} download slots still held", self.ctx.gate.in_flight());
    }

    /// Read a PID written by the fake tool.
    pub async fn read_pid(&self, name: &str) -> u32 {
        let path = self.state_file(name);
        for _ in 0..250 {
            if let Ok(s) = std::fs::read_to_string(&path) {
                if let Ok(pid) = s.trim().parse() {
                    return pid;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("fake tool never wrote {}", path.display());
    }
}

pub fn stream_url(addr: SocketAddr, video: &str) -> String {
    format!("http://{addr}/stream-mp3?url={}", urlencoding::encode(video))
}

/// Whether `pid` names a live (non-zombie) process.
#[cfg(target_os = "linux")]
pub fn process_alive(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        // Third field is the state; `Z` means it is only awaiting reaping.
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .and_then(|rest| rest.split_whitespace().next())
            .is_some_and(|state| state != "Z" && state != "X"),
        Err(_) => false,
    }
}

/// Poll until `pid` is gone, up to 5 seconds.
#[cfg(target_os = "linux")]
pub async fn assert_process_gone(pid: u32) {
    for _ in 0..250 {
        if !process_alive(pid) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("process {pid} is still running");
}
