// Downloader module - yt-dlp orchestration and output classification

pub mod classifier;
pub mod errors;
pub mod launcher;
pub mod models;
pub mod orchestrator;
pub mod policy;
pub mod tools;
pub mod traits;

pub use classifier::{classify, ClassifierState, LineClassifier};
pub use errors::{LaunchError, SessionError};
pub use models::{
    DownloadEvent, DownloadMode, DownloadRequest, EventKind, EventScope, PlaylistPosition,
    SessionOutcome, SessionPhase, SessionReport,
};
pub use orchestrator::{Canceller, Downloader, SessionHandle};
pub use policy::{policy_for, ModePolicy};
pub use tools::{ToolInfo, ToolManager, ToolType, Toolchain};
pub use traits::{CollectingSink, EventSink, LogSink};
