// Common data models for the download core

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How a URL is fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadMode {
    /// One video, playlist context ignored
    #[default]
    Single,
    /// Whole playlist, archive-backed
    Playlist,
    /// Whole playlist with sleep/retry backoff against rate limiting
    LargePlaylist,
}

impl fmt::Display for DownloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Playlist => write!(f, "playlist"),
            Self::LargePlaylist => write!(f, "large_playlist"),
        }
    }
}

/// One submitted download. Consumed once by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub output_dir: PathBuf,
    pub mode: DownloadMode,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, output_dir: impl Into<PathBuf>, mode: DownloadMode) -> Self {
        Self {
            url: url.into(),
            output_dir: output_dir.into(),
            mode,
        }
    }
}

/// Whether an event concerns one item, the whole session, or the request itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventScope {
    Item,
    Session,
    Request,
}

/// Classification of one output line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    ItemSucceeded,
    ItemSkippedAlready,
    FailedPrivate,
    FailedAgeRestricted,
    FailedMembersOnly,
    FailedGeoBlocked,
    FailedLoginRequired,
    FailedLiveStream,
    FailedUnavailable,
    FailedNetworkError,
    FailedUnidentified,
    /// Session-wide; yt-dlp's own backoff is relied on to recover
    SessionRateLimited,
    InvalidUrlUnsupported,
    InvalidUrlNoFormats,
    InvalidUrlNotFound,
    InvalidUrlExtractFailed,
    InvalidUrlEmptyPlaylist,
}

impl EventKind {
    pub fn scope(&self) -> EventScope {
        match self {
            Self::SessionRateLimited => EventScope::Session,
            Self::InvalidUrlUnsupported
            | Self::InvalidUrlNoFormats
            | Self::InvalidUrlNotFound
            | Self::InvalidUrlExtractFailed
            | Self::InvalidUrlEmptyPlaylist => EventScope::Request,
            _ => EventScope::Item,
        }
    }

    /// Invalid-URL events describe the request, not a playlist item, so they never get a prefix
    pub fn carries_prefix(&self) -> bool {
        self.scope() != EventScope::Request
    }

    pub fn is_item_failure(&self) -> bool {
        self.scope() == EventScope::Item
            && !matches!(self, Self::ItemSucceeded | Self::ItemSkippedAlready)
    }

    /// User-facing text. `ItemSucceeded` is labelled by the mode policy instead.
    pub fn description(&self) -> &'static str {
        match self {
            Self::ItemSucceeded => "mp3 downloaded",
            Self::ItemSkippedAlready => "skipped (already downloaded)",
            Self::FailedPrivate => "download failed: private video",
            Self::FailedAgeRestricted => "download failed: age restricted",
            Self::FailedMembersOnly => "download failed: members-only video",
            Self::FailedGeoBlocked => "download failed: geo-blocked - try a new ip address",
            Self::FailedLoginRequired => "download failed: login required",
            Self::FailedLiveStream => "download failed: live stream",
            Self::FailedUnavailable => "download failed: video unavailable",
            Self::FailedNetworkError => "download failed: network error",
            Self::FailedUnidentified => "download failed: unidentified error",
            Self::SessionRateLimited => "session rate limited: try a new ip address",
            Self::InvalidUrlUnsupported => "invalid URL: unsupported or malformed link",
            Self::InvalidUrlNoFormats => "invalid URL: no downloadable video",
            Self::InvalidUrlNotFound => "invalid URL: video or playlist does not exist",
            Self::InvalidUrlExtractFailed => "invalid URL: could not extract video data",
            Self::InvalidUrlEmptyPlaylist => "invalid URL: empty or invalid playlist",
        }
    }
}

/// Parsed `[index/count]` marker. yt-dlp prints `NA` when a field is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistPosition {
    pub index: Option<u32>,
    pub count: Option<u32>,
}

/// Structured status notification produced by the line classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadEvent {
    /// Most recent playlist marker line, e.g. `[3/20]`
    pub prefix: Option<String>,
    pub kind: EventKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<PlaylistPosition>,
}

impl fmt::Display for DownloadEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{} {}", prefix, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// How a session that ran to the end terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Output stream exhausted naturally; exit code not considered
    Completed,
    /// Child was terminated on request
    Cancelled,
}

/// Returned by a finished session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    /// Informational only; the classified events are authoritative
    pub exit_code: Option<i32>,
    pub events: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Orchestrator state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl SessionPhase {
    /// Everything except `Running` accepts a new request
    pub fn accepts_requests(&self) -> bool {
        !matches!(self, Self::Running)
    }
}
