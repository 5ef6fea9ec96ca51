// Per-mode yt-dlp options and classifier differences
//
// The three modes share one argument builder and one classifier; the only
// differences between them live in this table.

use super::models::DownloadMode;

pub const AUDIO_FORMAT: &str = "mp3";
pub const AUDIO_QUALITY: &str = "0";
pub const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";
pub const ARCHIVE_FILE_NAME: &str = "archive.txt";

/// Sleep/retry settings used against YouTube rate limiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitBackoff {
    pub sleep_interval_secs: u32,
    pub max_sleep_interval_secs: u32,
    pub retries: u32,
    pub fragment_retries: u32,
    pub skip_unavailable_fragments: bool,
}

const LARGE_PLAYLIST_BACKOFF: RateLimitBackoff = RateLimitBackoff {
    sleep_interval_secs: 5,
    max_sleep_interval_secs: 10,
    retries: 5,
    fragment_retries: 5,
    skip_unavailable_fragments: true,
};

const SINGLE_PRINTS: &[&str] = &["after_move:filepath"];
const PLAYLIST_PRINTS: &[&str] = &[
    "after_move:[%(playlist_index)s/%(playlist_count)s]",
    "after_move:%(filepath)s",
];

/// Static description of one mode. Never mutated.
#[derive(Debug, PartialEq, Eq)]
pub struct ModePolicy {
    pub mode: DownloadMode,
    /// Pass `--no-playlist`
    pub no_playlist: bool,
    /// Pass `--download-archive {dir}/archive.txt`
    pub use_archive: bool,
    pub backoff: Option<RateLimitBackoff>,
    /// `--print` templates, in order
    pub print_templates: &'static [&'static str],
    /// Message attached to `ItemSucceeded`
    pub success_label: &'static str,
    pub reports_archive_skips: bool,
    pub detects_live_streams: bool,
}

static SINGLE: ModePolicy = ModePolicy {
    mode: DownloadMode::Single,
    no_playlist: true,
    use_archive: false,
    backoff: None,
    print_templates: SINGLE_PRINTS,
    success_label: "mp3 downloaded",
    reports_archive_skips: true,
    detects_live_streams: false,
};

static PLAYLIST: ModePolicy = ModePolicy {
    mode: DownloadMode::Playlist,
    no_playlist: false,
    use_archive: true,
    backoff: None,
    print_templates: PLAYLIST_PRINTS,
    success_label: "video downloaded",
    reports_archive_skips: false,
    detects_live_streams: true,
};

static LARGE_PLAYLIST: ModePolicy = ModePolicy {
    mode: DownloadMode::LargePlaylist,
    no_playlist: false,
    use_archive: true,
    backoff: Some(LARGE_PLAYLIST_BACKOFF),
    print_templates: PLAYLIST_PRINTS,
    success_label: "mp3 downloaded",
    reports_archive_skips: false,
    detects_live_streams: true,
};

pub fn policy_for(mode: DownloadMode) -> &'static ModePolicy {
    match mode {
        DownloadMode::Single => &SINGLE,
        DownloadMode::Playlist => &PLAYLIST,
        DownloadMode::LargePlaylist => &LARGE_PLAYLIST,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_matches_mode() {
        for mode in [DownloadMode::Single, DownloadMode::Playlist, DownloadMode::LargePlaylist] {
            assert_eq!(policy_for(mode).mode, mode);
        }
    }

    #[test]
    fn test_only_single_forces_no_playlist() {
        assert!(policy_for(DownloadMode::Single).no_playlist);
        assert!(!policy_for(DownloadMode::Playlist).no_playlist);
        assert!(!policy_for(DownloadMode::LargePlaylist).no_playlist);
    }

    #[test]
    fn test_archive_and_backoff() {
        assert!(!policy_for(DownloadMode::Single).use_archive);
        assert!(policy_for(DownloadMode::Playlist).use_archive);
        assert!(policy_for(DownloadMode::Playlist).backoff.is_none());

        let backoff = policy_for(DownloadMode::LargePlaylist).backoff.unwrap();
        assert_eq!(backoff.sleep_interval_secs, 5);
        assert_eq!(backoff.max_sleep_interval_secs, 10);
        assert_eq!(backoff.retries, 5);
        assert_eq!(backoff.fragment_retries, 5);
    }

    #[test]
    fn test_success_labels() {
        assert_eq!(policy_for(DownloadMode::Single).success_label, "mp3 downloaded");
        assert_eq!(policy_for(DownloadMode::Playlist).success_label, "video downloaded");
        assert_eq!(policy_for(DownloadMode::LargePlaylist).success_label, "mp3 downloaded");
    }

    #[test]
    fn test_same_policy_instance_every_time() {
        assert!(std::ptr::eq(
            policy_for(DownloadMode::Playlist),
            policy_for(DownloadMode::Playlist)
        ));
    }
}
