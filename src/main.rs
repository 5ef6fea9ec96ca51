//! crateplug - mp3 downloads for YouTube videos and playlists, driven by yt-dlp.

use clap::Parser;
use crateplug_lib::cli::{self, Cli};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Library targets start with `crateplug_lib`, which this prefix also covers
    let default_filter = if cli.verbose {
        "crateplug=info"
    } else {
        "crateplug=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    cli::run(cli).await
}
