//! # tp-av
//!
//! External tool management for the tunepipe download pipeline.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to yt-dlp
//!   and ffmpeg.
//! - **Command building** ([`ToolCommand`]) -- async builder used both for
//!   captured one-shot runs and for long-running supervised processes.
//! - **Process supervision** ([`ProcessHandle`]) -- owns one child, drains
//!   its stderr, and kills the whole process tree on demand.
//! - **yt-dlp invocations** ([`ytdlp`]) -- argument lists for the audio
//!   download and the title/duration probe.

pub mod command;
pub mod supervisor;
pub mod tools;
pub mod ytdlp;

pub use command::{ToolCommand, ToolOutput};
pub use supervisor::{ProcessHandle, STDERR_TAIL_LINES};
pub use tools::{ToolInfo, ToolRegistry, YTDLP};
pub use ytdlp::ProbeInfo;
