//! yt-dlp invocations: the streaming audio download and the metadata probe.

use std::path::Path;
use std::time::Duration;

use crate::command::ToolCommand;

/// Title and duration reported by `yt-dlp --get-title --get-duration`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeInfo {
    pub title: String,
    pub duration: Option<Duration>,
}

/// Download the best audio track, convert it to `audio_format`, and write it
/// to stdout.
pub fn download_command(program: &Path, url: &str, audio_format: &str) -> ToolCommand {
    let mut cmd = ToolCommand::new(program.to_path_buf());
    cmd.args([
        "-f",
        "bestaudio",
        "-x",
        "--audio-format",
        audio_format,
        "--no-playlist",
        "--no-progress",
        "-o",
        "-",
        "--",
        url,
    ]);
    cmd
}

/// Print the title and duration without downloading anything.
pub fn probe_command(program: &Path, url: &str, timeout: Duration) -> ToolCommand {
    let mut cmd = ToolCommand::new(program.to_path_buf());
    cmd.args([
        "--get-title",
        "--get-duration",
        "--no-playlist",
        "--skip-download",
        "--",
        url,
    ])
    .timeout(timeout);
    cmd
}

/// Run the probe and parse its output.
pub async fn probe(program: &Path, url: &str, timeout: Duration) -> tp_core::Result<ProbeInfo> {
    let output = probe_command(program, url, timeout).execute().await?;
    parse_probe_output(&output.stdout).ok_or_else(|| {
        tp_core::Error::tool(
            crate::tools::YTDLP,
            "probe produced no title".to_string(),
        )
    })
}

/// yt-dlp prints the title first and the duration on the following line.
pub fn parse_probe_output(stdout: &str) -> Option<ProbeInfo> {
    let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());
    let title = lines.next()?.to_string();
    let duration = lines.next().and_then(parse_duration);
    Some(ProbeInfo { title, duration })
}

/// Parse `ss`, `mm:ss` or `hh:mm:ss`.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let parts: Vec<&str> = s.trim().split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let mut secs: u64 = 0;
    for part in parts {
        let n: u64 = part.parse().ok()?;
        secs = secs.checked_mul(60)?.checked_add(n)?;
    }
    Some(Duration::from_secs(secs))
}
