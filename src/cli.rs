//! CLI commands implementation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Settings;
use crate::downloader::{
    Canceller, DownloadEvent, DownloadMode, DownloadRequest, Downloader, EventSink, SessionError,
    SessionOutcome, SessionReport, ToolInfo,
};
use crate::relay::RelayServer;
use crate::update;
use crate::validation::{is_supported_url, validate_download_dir};

const EVENT_BUFFER: usize = 64;
const RELAY_BUFFER: usize = 16;

#[derive(Parser)]
#[command(name = "crateplug")]
#[command(about = "Download audio from YouTube videos and playlists with yt-dlp")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download one video or playlist as mp3
    Download {
        /// Video or playlist URL
        url: String,
        #[command(flatten)]
        target: TargetArgs,
        /// Save the output folder as the new default
        #[arg(long)]
        remember: bool,
    },

    /// Accept URLs from the browser extension and download them one at a time
    Serve {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Show where yt-dlp and ffmpeg were found
    Tools,

    /// Check whether a newer release is published
    CheckUpdate,
}

#[derive(Args)]
struct TargetArgs {
    /// Output folder (defaults to the saved download folder)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Treat the URL as a playlist
    #[arg(long, conflicts_with = "large_playlist")]
    playlist: bool,
    /// Playlist mode with rate-limit backoff and a download archive
    #[arg(long)]
    large_playlist: bool,
    /// Print events as JSON lines
    #[arg(long)]
    json: bool,
}

impl TargetArgs {
    fn mode(&self) -> DownloadMode {
        if self.large_playlist {
            DownloadMode::LargePlaylist
        } else if self.playlist {
            DownloadMode::Playlist
        } else {
            DownloadMode::Single
        }
    }

    fn output_dir(&self, settings: &Settings) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| settings.download_folder())
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Download {
            url,
            target,
            remember,
        } => cmd_download(url, target, remember).await,
        Commands::Serve { target } => cmd_serve(target).await,
        Commands::Tools => cmd_tools(),
        Commands::CheckUpdate => cmd_check_update().await,
    }
}

async fn cmd_download(url: String, target: TargetArgs, remember: bool) -> Result<()> {
    let mut settings = Settings::load()?;
    let output_dir = target.output_dir(&settings);

    if !is_supported_url(&url) {
        bail!("Please enter a valid YouTube URL: {}", url);
    }
    validate_download_dir(&output_dir)
        .map_err(|e| anyhow::anyhow!("{}: {}", e, output_dir.display()))?;

    let downloader = Downloader::new(settings.tool_manager());
    let (events, printer) = spawn_printer(target.json);
    let request = DownloadRequest::new(url, output_dir.clone(), target.mode());

    tracing::info!(mode = %request.mode, url = %request.url, "starting download");
    let handle = downloader.submit(request, events)?;
    cancel_on_ctrl_c(handle.canceller());

    let report = handle.wait().await?;
    // sink dropped with the session, so the printer drains and exits
    let _ = printer.await;
    print_report(&report, target.json);

    if remember {
        settings.download_folder = Some(output_dir);
        settings.save()?;
    }
    Ok(())
}

async fn cmd_serve(target: TargetArgs) -> Result<()> {
    let settings = Settings::load()?;
    let output_dir = target.output_dir(&settings);
    let mode = target.mode();
    validate_download_dir(&output_dir)
        .map_err(|e| anyhow::anyhow!("{}: {}", e, output_dir.display()))?;

    if settings.check_updates {
        let url = settings.update_url.clone();
        tokio::spawn(async move {
            if let Some(remote) = update::check_for_update(&url).await {
                eprintln!(
                    "A new version ({}) is available, you have {}",
                    remote,
                    update::local_version()
                );
            }
        });
    }

    let (url_tx, mut url_rx) = mpsc::channel::<String>(RELAY_BUFFER);
    let relay = RelayServer::new(settings.relay_port).with_bind_address(settings.relay_bind.clone());
    eprintln!(
        "Waiting for URLs on {}:{} ({} mode, saving to {})",
        settings.relay_bind,
        relay.port(),
        mode,
        output_dir.display()
    );
    let server = tokio::spawn(async move { relay.start(url_tx).await });

    let downloader = Downloader::new(settings.tool_manager());
    let (events, printer) = spawn_printer(target.json);
    let mut current: Option<(Canceller, JoinHandle<()>)> = None;

    // Ends once the relay shuts down and drops its sender
    while let Some(url) = url_rx.recv().await {
        if downloader.is_running() {
            tracing::info!(url = %url, "download in progress, ignoring URL");
            continue;
        }
        if !is_supported_url(&url) {
            eprintln!("Ignoring unsupported URL: {}", url);
            continue;
        }

        let request = DownloadRequest::new(url, output_dir.clone(), mode);
        match downloader.submit(request, events.clone()) {
            Ok(handle) => {
                let canceller = handle.canceller();
                let json = target.json;
                let waiter = tokio::spawn(async move {
                    match handle.wait().await {
                        Ok(report) => print_report(&report, json),
                        Err(e) => eprintln!("Download failed: {}", e),
                    }
                });
                current = Some((canceller, waiter));
            }
            Err(SessionError::Busy) => {
                tracing::info!("download in progress, ignoring URL");
            }
            Err(e) => eprintln!("Download failed: {}", e),
        }
    }

    if let Some((canceller, waiter)) = current {
        if downloader.is_running() {
            canceller.cancel();
        }
        let _ = waiter.await;
    }
    drop(events);
    let _ = printer.await;

    server.await.context("relay task panicked")?
}

fn cmd_tools() -> Result<()> {
    let settings = Settings::load()?;
    let tools = settings.tool_manager().get_all_tools();
    for info in &tools {
        println!("{}", describe_tool(info));
    }
    if tools.iter().any(|t| !t.is_available) {
        bail!("required tools are missing");
    }
    Ok(())
}

async fn cmd_check_update() -> Result<()> {
    let settings = Settings::load()?;
    match update::check_for_update(&settings.update_url).await {
        Some(remote) => println!(
            "A new version ({}) is available, you have {}",
            remote,
            update::local_version()
        ),
        None => println!("crateplug {} is up to date", update::local_version()),
    }
    Ok(())
}

/// Event sink for a session plus the task that prints what it receives
fn spawn_printer(json: bool) -> (Arc<dyn EventSink>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<DownloadEvent>(EVENT_BUFFER);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            println!("{}", render_event(&event, json));
        }
    });
    let sink: Arc<dyn EventSink> = Arc::new(tx);
    (sink, printer)
}

fn cancel_on_ctrl_c(canceller: Canceller) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling...");
            canceller.cancel();
        }
    });
}

fn render_event(event: &DownloadEvent, json: bool) -> String {
    if json {
        if let Ok(line) = serde_json::to_string(event) {
            return line;
        }
    }
    event.to_string()
}

fn print_report(report: &SessionReport, json: bool) {
    if json {
        if let Ok(line) = serde_json::to_string(report) {
            println!("{}", line);
        }
        return;
    }
    match report.outcome {
        SessionOutcome::Completed => eprintln!(
            "Finished: {} downloaded, {} failed",
            report.succeeded, report.failed
        ),
        SessionOutcome::Cancelled => eprintln!(
            "Cancelled after {} downloaded",
            report.succeeded
        ),
    }
}

fn describe_tool(info: &ToolInfo) -> String {
    match (&info.path, info.is_available) {
        (Some(path), true) => format!(
            "{}: {} ({})",
            info.name,
            info.version.as_deref().unwrap_or("unknown version"),
            path.display()
        ),
        _ => format!("{}: not found", info.name),
    }
}
