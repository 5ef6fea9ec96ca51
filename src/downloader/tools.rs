use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;

use super::errors::LaunchError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ToolType {
    YtDlp,
    Ffmpeg,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Ffmpeg => "ffmpeg",
        }
    }

    fn binary_name(&self) -> String {
        if cfg!(windows) {
            format!("{}.exe", self.as_str())
        } else {
            self.as_str().to_string()
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "--version",
            ToolType::Ffmpeg => "-version", // ffmpeg uses a single dash
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<PathBuf>,
    pub is_available: bool,
}

/// Located binaries for one launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub ytdlp: PathBuf,
    pub ffmpeg: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct ToolManager {
    ytdlp_override: Option<PathBuf>,
    ffmpeg_override: Option<PathBuf>,
}

impl ToolManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit paths are authoritative: when set, no other location is searched.
    pub fn with_overrides(ytdlp: Option<PathBuf>, ffmpeg: Option<PathBuf>) -> Self {
        Self {
            ytdlp_override: ytdlp,
            ffmpeg_override: ffmpeg,
        }
    }

    pub fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let path = self.locate(tool_type);
        let version = path.as_deref().and_then(|p| self.get_version(p, tool_type));

        ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            version,
            is_available: path.is_some(),
            path,
        }
    }

    pub fn get_all_tools(&self) -> Vec<ToolInfo> {
        vec![
            self.get_tool_info(ToolType::YtDlp),
            self.get_tool_info(ToolType::Ffmpeg),
        ]
    }

    pub fn resolve(&self) -> Result<Toolchain, LaunchError> {
        let ytdlp = self.locate(ToolType::YtDlp).ok_or(LaunchError::ToolNotFound {
            tool: ToolType::YtDlp.as_str(),
        })?;
        let ffmpeg = self.locate(ToolType::Ffmpeg).ok_or(LaunchError::ToolNotFound {
            tool: ToolType::Ffmpeg.as_str(),
        })?;
        Ok(Toolchain { ytdlp, ffmpeg })
    }

    pub fn locate(&self, tool_type: ToolType) -> Option<PathBuf> {
        let configured = match tool_type {
            ToolType::YtDlp => &self.ytdlp_override,
            ToolType::Ffmpeg => &self.ffmpeg_override,
        };
        if let Some(path) = configured {
            if path.is_file() {
                return Some(path.clone());
            }
            tracing::warn!(tool = tool_type.as_str(), path = %path.display(), "configured tool path does not exist");
            return None;
        }

        let binary_name = tool_type.binary_name();

        // 1. Bundled next to our own executable
        let bundled = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(&binary_name)));

        // 2. Common install locations
        let common_paths = [
            PathBuf::from(format!("/opt/homebrew/bin/{}", binary_name)),
            PathBuf::from(format!("/usr/local/bin/{}", binary_name)),
            PathBuf::from(format!("/usr/bin/{}", binary_name)),
        ];

        if let Some(path) = bundled.into_iter().chain(common_paths).find(|p| p.is_file()) {
            return Some(path);
        }

        // 3. PATH (PATHEXT-aware on Windows)
        find_in_path(tool_type.as_str())
    }

    fn get_version(&self, path: &Path, tool_type: ToolType) -> Option<String> {
        match Command::new(path).arg(tool_type.version_arg()).output() {
            Ok(output) if output.status.success() => {
                // ffmpeg prints a banner; the first line carries the version
                let out = String::from_utf8_lossy(&output.stdout);
                out.lines().next().map(|l| l.trim().to_string())
            }
            _ => None,
        }
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}
