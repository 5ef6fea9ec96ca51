//! Checks run by callers before a request reaches the download core.

use std::path::Path;

use thiserror::Error;

/// Only YouTube links are handed to yt-dlp
pub fn is_supported_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.contains("youtube.com") || lower.contains("youtu.be")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PathProblem {
    #[error("download path is empty")]
    Empty,
    #[error("download path does not exist")]
    Missing,
    #[error("download path is not a folder")]
    NotADirectory,
    #[error("no write permission for download path")]
    NotWritable,
}

pub fn validate_download_dir(path: &Path) -> Result<(), PathProblem> {
    if path.as_os_str().is_empty() {
        return Err(PathProblem::Empty);
    }
    let metadata = path.metadata().map_err(|_| PathProblem::Missing)?;
    if !metadata.is_dir() {
        return Err(PathProblem::NotADirectory);
    }
    // writable means a file can actually be created there
    tempfile::tempfile_in(path).map_err(|_| PathProblem::NotWritable)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_urls() {
        assert!(is_supported_url("https://www.youtube.com/watch?v=abc"));
        assert!(is_supported_url("https://youtu.be/abc"));
        assert!(is_supported_url("HTTPS://YOUTUBE.COM/playlist?list=x"));
        assert!(!is_supported_url("https://vimeo.com/123"));
        assert!(!is_supported_url(""));
    }

    #[test]
    fn test_download_dir_checks() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(validate_download_dir(dir.path()), Ok(()));
        assert_eq!(validate_download_dir(Path::new("")), Err(PathProblem::Empty));
        assert_eq!(validate_download_dir(&dir.path().join("nope")), Err(PathProblem::Missing));

        let file = dir.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();
        assert_eq!(validate_download_dir(&file), Err(PathProblem::NotADirectory));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_pseudo_filesystem_is_not_writable() {
        assert_eq!(validate_download_dir(Path::new("/proc")), Err(PathProblem::NotWritable));
    }

    #[cfg(unix)]
    #[test]
    fn test_read_only_dir_is_not_writable() {
        use std::os::unix::fs::PermissionsExt;

        // root ignores permission bits
        if unsafe { libc::geteuid() } == 0 {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let locked = dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o555)).unwrap();

        assert_eq!(validate_download_dir(&locked), Err(PathProblem::NotWritable));

        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_problem_messages() {
        assert_eq!(PathProblem::NotWritable.to_string(), "no write permission for download path");
    }
}
