// Error types for the download core

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to start the external downloader
#[derive(Debug, Error)]
pub enum LaunchError {
    /// yt-dlp or ffmpeg could not be located
    #[error("{tool} not found (install it or set its path in the config)")]
    ToolNotFound { tool: &'static str },

    /// Output directory is gone by the time the download starts
    #[error("output directory does not exist: {}", .0.display())]
    MissingOutputDirectory(PathBuf),

    /// Process could not be spawned (permissions, bad executable, ...)
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Session-level errors surfaced to the caller of the orchestrator
#[derive(Debug, Error)]
pub enum SessionError {
    /// Another session is running; requests are rejected, never queued
    #[error("a download is already running")]
    Busy,

    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// The merged output stream broke mid-session
    #[error("failed to read downloader output: {0}")]
    Read(#[source] io::Error),

    #[error("failed to wait for downloader exit: {0}")]
    Wait(#[source] io::Error),

    /// The background task died before reporting
    #[error("download task aborted: {0}")]
    Aborted(String),
}

impl SessionError {
    /// Whether the caller can simply retry once the current session ends
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy)
    }
}
