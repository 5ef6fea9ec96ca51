pub mod cli;
pub mod config;
pub mod downloader;
pub mod relay;
pub mod update;
pub mod validation;

pub use downloader::{
    classify, policy_for, DownloadEvent, DownloadMode, DownloadRequest, Downloader, EventKind,
    EventSink, LineClassifier, SessionError, SessionHandle, SessionPhase, SessionReport,
    ToolManager,
};
