// Process launcher - builds yt-dlp arguments and spawns it with merged output
//
// stdout and stderr share one OS pipe so the classifier sees lines in the
// order yt-dlp produced them (a `--print` marker followed by the error for
// that item must not be reordered). The pipe is drained by a plain thread
// and lines are handed to the async side through a bounded channel.

use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, PipeReader};
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use super::errors::LaunchError;
use super::models::DownloadRequest;
use super::policy::{ModePolicy, ARCHIVE_FILE_NAME, AUDIO_FORMAT, AUDIO_QUALITY, OUTPUT_TEMPLATE};
use super::tools::Toolchain;

const LINE_BUFFER: usize = 256;

/// Build the full yt-dlp argument vector (program excluded). The URL is always last.
pub fn build_args(request: &DownloadRequest, policy: &ModePolicy, tools: &Toolchain) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();

    if policy.no_playlist {
        args.push("--no-playlist".into());
    }

    args.push("--ffmpeg-location".into());
    args.push(tools.ffmpeg.clone().into());
    args.extend(
        ["-x", "--audio-format", AUDIO_FORMAT, "--audio-quality", AUDIO_QUALITY]
            .iter()
            .map(OsString::from),
    );

    if let Some(backoff) = &policy.backoff {
        args.push("--sleep-interval".into());
        args.push(backoff.sleep_interval_secs.to_string().into());
        args.push("--max-sleep-interval".into());
        args.push(backoff.max_sleep_interval_secs.to_string().into());
        args.push("--retries".into());
        args.push(backoff.retries.to_string().into());
        args.push("--fragment-retries".into());
        args.push(backoff.fragment_retries.to_string().into());
        if backoff.skip_unavailable_fragments {
            args.push("--skip-unavailable-fragments".into());
        }
    }

    for template in policy.print_templates {
        args.push("--print".into());
        args.push((*template).into());
    }

    if policy.use_archive {
        args.push("--download-archive".into());
        args.push(request.output_dir.join(ARCHIVE_FILE_NAME).into());
    }

    args.push("-o".into());
    args.push(request.output_dir.join(OUTPUT_TEMPLATE).into());
    args.push(request.url.clone().into());
    args
}

/// Running yt-dlp instance and its merged output
#[derive(Debug)]
pub struct ChildProcess {
    child: Child,
    lines: mpsc::Receiver<io::Result<String>>,
}

impl ChildProcess {
    #[cfg(test)]
    pub(crate) fn from_parts(child: Child, lines: mpsc::Receiver<io::Result<String>>) -> Self {
        Self { child, lines }
    }

    /// Next output line, `None` once every writer (yt-dlp and anything it spawned) is gone
    pub async fn next_line(&mut self) -> Option<io::Result<String>> {
        self.lines.recv().await
    }

    /// Send the kill signal without waiting. On unix this reaches the whole
    /// process group, so ffmpeg and other helpers holding the pipe die too.
    pub fn start_kill(&mut self) -> io::Result<()> {
        #[cfg(unix)]
        {
            if let Some(pid) = self.child.id() {
                // the group id equals the child's pid, see `isolate_group`
                let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
                if rc == 0 {
                    return Ok(());
                }
                tracing::debug!(pid, error = %io::Error::last_os_error(), "killpg failed, killing child only");
            }
        }
        self.child.start_kill()
    }

    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

/// Spawn yt-dlp for `request`. Must be called from within a Tokio runtime.
pub fn launch(request: &DownloadRequest, policy: &ModePolicy, tools: &Toolchain) -> Result<ChildProcess, LaunchError> {
    if !request.output_dir.is_dir() {
        return Err(LaunchError::MissingOutputDirectory(request.output_dir.clone()));
    }

    let program = tools.ytdlp.display().to_string();
    let spawn_error = |source: io::Error| LaunchError::Spawn {
        program: program.clone(),
        source,
    };

    let args = build_args(request, policy, tools);
    tracing::debug!(program = %program, args = ?args, "launching yt-dlp");

    let (reader, writer) = io::pipe().map_err(spawn_error)?;
    let writer_err = writer.try_clone().map_err(spawn_error)?;

    // The command holds our copies of the write end; it must be dropped right
    // after spawning or the reader never sees EOF.
    let child = {
        let mut command = Command::new(&tools.ytdlp);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(writer_err)
            .kill_on_drop(true);
        hide_console(&mut command);
        isolate_group(&mut command);
        command.spawn().map_err(spawn_error)?
    };

    let (tx, rx) = mpsc::channel(LINE_BUFFER);
    std::thread::Builder::new()
        .name("ytdlp-output".to_string())
        .spawn(move || pump_lines(reader, tx))
        .map_err(spawn_error)?;

    tracing::info!(pid = ?child.id(), mode = %policy.mode, url = %request.url, "yt-dlp started");
    Ok(ChildProcess { child, lines: rx })
}

fn pump_lines(reader: PipeReader, tx: mpsc::Sender<io::Result<String>>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']).to_string();
                if tx.blocking_send(Ok(line)).is_err() {
                    break; // session gone
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
                break;
            }
        }
    }
}

/// Do not allocate a visible console window for the child
#[cfg(windows)]
fn hide_console(command: &mut Command) {
    const CREATE_NO_WINDOW: u32 = 0x08000000;
    command.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn hide_console(_command: &mut Command) {}

/// New process group led by the child, so cancellation can signal its helpers
#[cfg(unix)]
fn isolate_group(command: &mut Command) {
    command.process_group(0);
}

#[cfg(not(unix))]
fn isolate_group(_command: &mut Command) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::DownloadMode;
    use crate::downloader::policy::policy_for;
    use std::path::{Path, PathBuf};

    fn tools() -> Toolchain {
        Toolchain {
            ytdlp: PathBuf::from("/bin/yt-dlp"),
            ffmpeg: PathBuf::from("/bin/ffmpeg"),
        }
    }

    fn args_for(mode: DownloadMode) -> Vec<String> {
        let request = DownloadRequest::new("https://youtu.be/abc", "/music", mode);
        build_args(&request, policy_for(mode), &tools())
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_single_args() {
        let args = args_for(DownloadMode::Single);
        assert_eq!(args[0], "--no-playlist");
        assert!(has_pair(&args, "--ffmpeg-location", "/bin/ffmpeg"));
        assert!(args.contains(&"-x".to_string()));
        assert!(has_pair(&args, "--audio-format", "mp3"));
        assert!(has_pair(&args, "--audio-quality", "0"));
        assert!(has_pair(&args, "--print", "after_move:filepath"));
        assert!(!args.contains(&"--download-archive".to_string()));
        assert!(!args.contains(&"--sleep-interval".to_string()));
        let template = Path::new("/music").join("%(title)s.%(ext)s");
        assert!(has_pair(&args, "-o", &template.to_string_lossy()));
        assert_eq!(args.last().unwrap(), "https://youtu.be/abc");
    }

    #[test]
    fn test_playlist_args() {
        let args = args_for(DownloadMode::Playlist);
        assert!(!args.contains(&"--no-playlist".to_string()));
        let archive = Path::new("/music").join("archive.txt");
        assert!(has_pair(&args, "--download-archive", &archive.to_string_lossy()));
        assert!(has_pair(&args, "--print", "after_move:[%(playlist_index)s/%(playlist_count)s]"));
        assert!(has_pair(&args, "--print", "after_move:%(filepath)s"));
        assert!(!args.contains(&"--skip-unavailable-fragments".to_string()));
        assert_eq!(args.last().unwrap(), "https://youtu.be/abc");
    }

    #[test]
    fn test_large_playlist_args() {
        let args = args_for(DownloadMode::LargePlaylist);
        assert!(has_pair(&args, "--sleep-interval", "5"));
        assert!(has_pair(&args, "--max-sleep-interval", "10"));
        assert!(has_pair(&args, "--retries", "5"));
        assert!(has_pair(&args, "--fragment-retries", "5"));
        assert!(args.contains(&"--skip-unavailable-fragments".to_string()));
        assert!(args.contains(&"--download-archive".to_string()));
    }

    #[test]
    fn test_args_are_deterministic() {
        assert_eq!(args_for(DownloadMode::LargePlaylist), args_for(DownloadMode::LargePlaylist));
    }

    #[tokio::test]
    async fn test_missing_output_dir_fails_before_spawn() {
        let request = DownloadRequest::new("https://youtu.be/abc", "/definitely/not/here", DownloadMode::Single);
        let err = launch(&request, policy_for(DownloadMode::Single), &tools()).unwrap_err();
        assert!(matches!(err, LaunchError::MissingOutputDirectory(_)));
    }

    #[tokio::test]
    async fn test_unstartable_binary_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = Toolchain {
            ytdlp: dir.path().join("no-such-yt-dlp"),
            ffmpeg: dir.path().join("no-such-ffmpeg"),
        };
        let request = DownloadRequest::new("https://youtu.be/abc", dir.path(), DownloadMode::Single);
        let err = launch(&request, policy_for(DownloadMode::Single), &toolchain).unwrap_err();
        assert!(matches!(err, LaunchError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_and_stderr_arrive_in_order() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-yt-dlp");
        std::fs::write(
            &script,
            "#!/bin/sh\necho '[1/2]'\necho 'ERROR: Private video' >&2\necho '[2/2]'\necho 'b.mp3'\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let toolchain = Toolchain {
            ytdlp: script,
            ffmpeg: PathBuf::from("/usr/bin/ffmpeg"),
        };
        let request = DownloadRequest::new("https://youtu.be/abc", dir.path(), DownloadMode::Playlist);
        let mut child = launch(&request, policy_for(DownloadMode::Playlist), &toolchain).unwrap();

        let mut lines = Vec::new();
        while let Some(line) = child.next_line().await {
            lines.push(line.unwrap());
        }
        assert!(child.wait().await.unwrap().success());
        assert_eq!(lines, vec!["[1/2]", "ERROR: Private video", "[2/2]", "b.mp3"]);
    }
}
