// Line classifier - maps yt-dlp output lines to status events
//
// yt-dlp's error text is not a stable machine interface, so classification
// is ordered substring matching on the lowercased line. Earlier rules win when
// a line contains several known phrases (an age-gate error that also says
// "error:" is still an age restriction).

use lazy_static::lazy_static;
use regex::Regex;

use super::models::{DownloadEvent, EventKind, PlaylistPosition};
use super::policy::ModePolicy;

/// Mode gate for a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Always,
    ArchiveSkips,
    LiveStreams,
}

impl Gate {
    fn allows(self, policy: &ModePolicy) -> bool {
        match self {
            Self::Always => true,
            Self::ArchiveSkips => policy.reports_archive_skips,
            Self::LiveStreams => policy.detects_live_streams,
        }
    }
}

struct Rule {
    needles: &'static [&'static str],
    kind: EventKind,
    gate: Gate,
}

/// Priority order, first match wins
const RULES: &[Rule] = &[
    Rule {
        needles: &["already recorded in archive", "already been recorded in the archive"],
        kind: EventKind::ItemSkippedAlready,
        gate: Gate::ArchiveSkips,
    },
    Rule { needles: &["private video"], kind: EventKind::FailedPrivate, gate: Gate::Always },
    Rule {
        needles: &["age-restricted", "confirm your age"],
        kind: EventKind::FailedAgeRestricted,
        gate: Gate::Always,
    },
    Rule {
        needles: &["members-only", "join this channel"],
        kind: EventKind::FailedMembersOnly,
        gate: Gate::Always,
    },
    Rule {
        needles: &["not available in your country", "geo-restricted"],
        kind: EventKind::FailedGeoBlocked,
        gate: Gate::Always,
    },
    Rule {
        needles: &["requires login", "cookies"],
        kind: EventKind::FailedLoginRequired,
        gate: Gate::Always,
    },
    Rule {
        needles: &["live stream", "will begin shortly"],
        kind: EventKind::FailedLiveStream,
        gate: Gate::LiveStreams,
    },
    Rule {
        needles: &["video unavailable", "has been removed"],
        kind: EventKind::FailedUnavailable,
        gate: Gate::Always,
    },
    Rule {
        needles: &["429", "rate limit"],
        kind: EventKind::SessionRateLimited,
        gate: Gate::Always,
    },
    Rule {
        needles: &["timed out", "connection reset"],
        kind: EventKind::FailedNetworkError,
        gate: Gate::Always,
    },
    Rule { needles: &["unsupported url"], kind: EventKind::InvalidUrlUnsupported, gate: Gate::Always },
    Rule { needles: &["no video formats found"], kind: EventKind::InvalidUrlNoFormats, gate: Gate::Always },
    Rule { needles: &["does not exist"], kind: EventKind::InvalidUrlNotFound, gate: Gate::Always },
    Rule { needles: &["unable to extract"], kind: EventKind::InvalidUrlExtractFailed, gate: Gate::Always },
    Rule { needles: &["no entries found"], kind: EventKind::InvalidUrlEmptyPlaylist, gate: Gate::Always },
    Rule { needles: &["error:"], kind: EventKind::FailedUnidentified, gate: Gate::Always },
];

const AUDIO_EXTENSION: &str = ".mp3";

/// Per-session mutable state: the last playlist marker seen
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifierState {
    pub current_prefix: Option<String>,
    pub position: Option<PlaylistPosition>,
}

impl ClassifierState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Parse `[3/20]` (or `[NA/20]`) into a position
pub fn parse_position(prefix: &str) -> Option<PlaylistPosition> {
    lazy_static! {
        static ref POSITION_RE: Regex =
            Regex::new(r"^\[\s*(\d+|NA)\s*/\s*(\d+|NA)\s*\]$").unwrap();
    }

    let caps = POSITION_RE.captures(prefix)?;
    let field = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    Some(PlaylistPosition {
        index: field(1),
        count: field(2),
    })
}

/// Classify one line. Prefix lines update `state` and produce nothing;
/// unmatched lines are dropped.
pub fn classify(line: &str, policy: &ModePolicy, state: &mut ClassifierState) -> Option<DownloadEvent> {
    let line = line.trim();

    if line.starts_with('[') && line.contains(']') {
        state.current_prefix = Some(line.to_string());
        state.position = parse_position(line);
        return None;
    }

    if line.ends_with(AUDIO_EXTENSION) {
        return Some(event(EventKind::ItemSucceeded, policy.success_label, state));
    }

    let lower = line.to_lowercase();
    RULES
        .iter()
        .filter(|rule| rule.gate.allows(policy))
        .find(|rule| rule.needles.iter().any(|needle| lower.contains(needle)))
        .map(|rule| event(rule.kind, rule.kind.description(), state))
}

fn event(kind: EventKind, message: &str, state: &ClassifierState) -> DownloadEvent {
    let (prefix, position) = if kind.carries_prefix() {
        (state.current_prefix.clone(), state.position)
    } else {
        (None, None)
    };
    DownloadEvent {
        prefix,
        kind,
        message: message.to_string(),
        position,
    }
}

/// Classifier bound to one mode, owning its session state
#[derive(Debug)]
pub struct LineClassifier {
    policy: &'static ModePolicy,
    state: ClassifierState,
}

impl LineClassifier {
    pub fn new(policy: &'static ModePolicy) -> Self {
        Self {
            policy,
            state: ClassifierState::default(),
        }
    }

    pub fn classify(&mut self, line: &str) -> Option<DownloadEvent> {
        classify(line, self.policy, &mut self.state)
    }

    pub fn state(&self) -> &ClassifierState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::DownloadMode;
    use crate::downloader::policy::policy_for;

    fn run(mode: DownloadMode, lines: &[&str]) -> Vec<DownloadEvent> {
        let mut classifier = LineClassifier::new(policy_for(mode));
        lines.iter().filter_map(|l| classifier.classify(l)).collect()
    }

    fn kind_of(mode: DownloadMode, line: &str) -> Option<EventKind> {
        run(mode, &[line]).first().map(|e| e.kind)
    }

    #[test]
    fn test_prefix_lines_update_state_silently() {
        let mut classifier = LineClassifier::new(policy_for(DownloadMode::Playlist));
        assert!(classifier.classify("[youtube] abc: Downloading webpage").is_none());
        assert_eq!(
            classifier.state().current_prefix.as_deref(),
            Some("[youtube] abc: Downloading webpage")
        );
        assert!(classifier.classify("[4/9]").is_none());
        assert_eq!(classifier.state().current_prefix.as_deref(), Some("[4/9]"));
        assert_eq!(
            classifier.state().position,
            Some(PlaylistPosition { index: Some(4), count: Some(9) })
        );
    }

    #[test]
    fn test_single_mode_scenario() {
        let events = run(
            DownloadMode::Single,
            &["[ignored]", "[download] Destination: song.mp3", "/out/song.mp3"],
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::ItemSucceeded);
        assert_eq!(events[0].message, "mp3 downloaded");
    }

    #[test]
    fn test_playlist_scenario() {
        let events = run(
            DownloadMode::Playlist,
            &["[1/3]", "a.mp3", "[2/3]", "ERROR: Private video", "[3/3]", "c.mp3"],
        );
        let rendered: Vec<String> = events.iter().map(|e| e.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "[1/3] video downloaded",
                "[2/3] download failed: private video",
                "[3/3] video downloaded",
            ]
        );
        assert_eq!(events[1].kind, EventKind::FailedPrivate);
        assert_eq!(events[2].position, Some(PlaylistPosition { index: Some(3), count: Some(3) }));
    }

    #[test]
    fn test_invalid_url_has_no_prefix() {
        let events = run(DownloadMode::Single, &["Unsupported URL: foo://bar"]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::InvalidUrlUnsupported);
        assert_eq!(events[0].prefix, None);

        // even with a marker in effect
        let events = run(DownloadMode::Playlist, &["[1/2]", "ERROR: No entries found in playlist"]);
        assert_eq!(events[0].kind, EventKind::InvalidUrlEmptyPlaylist);
        assert_eq!(events[0].prefix, None);
        assert_eq!(events[0].to_string(), "invalid URL: empty or invalid playlist");
    }

    #[test]
    fn test_age_restriction_beats_generic_error() {
        assert_eq!(
            kind_of(DownloadMode::Playlist, "ERROR: [youtube] x: Sign in to confirm your age"),
            Some(EventKind::FailedAgeRestricted)
        );
        assert_eq!(
            kind_of(DownloadMode::Single, "ERROR: This video is age-restricted"),
            Some(EventKind::FailedAgeRestricted)
        );
    }

    #[test]
    fn test_earlier_rules_win() {
        // private beats login/cookies
        assert_eq!(
            kind_of(DownloadMode::Playlist, "ERROR: Private video. Use --cookies-from-browser"),
            Some(EventKind::FailedPrivate)
        );
        // unavailable beats rate limit
        assert_eq!(
            kind_of(DownloadMode::Playlist, "ERROR: Video unavailable (HTTP 429)"),
            Some(EventKind::FailedUnavailable)
        );
    }

    #[test]
    fn test_archive_skip_only_in_single_mode() {
        let line = "[download] abc has already been recorded in the archive";
        // starts with '[' so it is a prefix line in every mode
        assert_eq!(kind_of(DownloadMode::Single, line), None);

        let line = "abc: already recorded in archive";
        assert_eq!(kind_of(DownloadMode::Single, line), Some(EventKind::ItemSkippedAlready));
        assert_eq!(kind_of(DownloadMode::Playlist, line), None);
        assert_eq!(kind_of(DownloadMode::LargePlaylist, line), None);
    }

    #[test]
    fn test_live_stream_not_checked_in_single_mode() {
        let line = "ERROR: This live stream will begin shortly";
        assert_eq!(kind_of(DownloadMode::Playlist, line), Some(EventKind::FailedLiveStream));
        assert_eq!(kind_of(DownloadMode::LargePlaylist, line), Some(EventKind::FailedLiveStream));
        assert_eq!(kind_of(DownloadMode::Single, line), Some(EventKind::FailedUnidentified));
    }

    #[test]
    fn test_failure_taxonomy() {
        let cases = [
            ("ERROR: members-only content", EventKind::FailedMembersOnly),
            ("ERROR: Video not available in your country", EventKind::FailedGeoBlocked),
            ("ERROR: This video requires login", EventKind::FailedLoginRequired),
            ("ERROR: This video has been removed by the uploader", EventKind::FailedUnavailable),
            ("ERROR: HTTP Error 429: Too Many Requests", EventKind::SessionRateLimited),
            ("ERROR: Read timed out.", EventKind::FailedNetworkError),
            ("ERROR: Connection reset by peer", EventKind::FailedNetworkError),
            ("ERROR: No video formats found!", EventKind::InvalidUrlNoFormats),
            ("ERROR: The playlist does not exist.", EventKind::InvalidUrlNotFound),
            ("ERROR: Unable to extract initial data", EventKind::InvalidUrlExtractFailed),
            ("ERROR: something nobody expected", EventKind::FailedUnidentified),
        ];
        for (line, expected) in cases {
            assert_eq!(kind_of(DownloadMode::LargePlaylist, line), Some(expected), "{line}");
        }
    }

    #[test]
    fn test_noise_is_dropped() {
        assert!(run(DownloadMode::Playlist, &["", "   ", "Deleting original file x.webm", "WARNING: slow"]).is_empty());
    }

    #[test]
    fn test_prefix_attaches_until_replaced() {
        let events = run(
            DownloadMode::LargePlaylist,
            &["[5/7]", "ERROR: Read timed out.", "ERROR: rate limit reached", "[6/7]", "b.mp3"],
        );
        assert_eq!(events[0].prefix.as_deref(), Some("[5/7]"));
        assert_eq!(events[1].kind, EventKind::SessionRateLimited);
        assert_eq!(events[1].prefix.as_deref(), Some("[5/7]"));
        assert_eq!(events[2].to_string(), "[6/7] mp3 downloaded");
    }

    #[test]
    fn test_lines_are_trimmed() {
        let events = run(DownloadMode::Single, &["/out/song.mp3\r\n"]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].prefix, None);
        assert_eq!(events[0].to_string(), "mp3 downloaded");
    }

    #[test]
    fn test_fresh_state_gives_identical_sequences() {
        let lines = ["[1/2]", "ERROR: Private video", "[2/2]", "x.mp3", "Unsupported URL: q"];
        assert_eq!(run(DownloadMode::Playlist, &lines), run(DownloadMode::Playlist, &lines));

        let mut classifier = LineClassifier::new(policy_for(DownloadMode::Playlist));
        let first: Vec<_> = lines.iter().filter_map(|l| classifier.classify(l)).collect();
        classifier.reset();
        let second: Vec<_> = lines.iter().filter_map(|l| classifier.classify(l)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_parse_position() {
        assert_eq!(parse_position("[12/40]"), Some(PlaylistPosition { index: Some(12), count: Some(40) }));
        assert_eq!(parse_position("[NA/NA]"), Some(PlaylistPosition { index: None, count: None }));
        assert_eq!(parse_position("[download] 5%"), None);
    }
}
