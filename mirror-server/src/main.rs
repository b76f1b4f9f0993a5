//! Mirror server entry point.
//!
//! ```text
//! mirror-server                  Serve the receiver (foreground)
//! mirror-server --config <path>  Load a custom config TOML
//! mirror-server --gen-config     Write default config to stdout
//! mirror-server --pattern        Mirror a synthetic test pattern
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mirror_core::message::ContextId;
use mirror_server::config::ServerConfig;
use mirror_server::host::MirrorHost;
use mirror_server::pattern::PatternHost;

/// Context the synthetic page runs in.
const PATTERN_SOURCE: ContextId = ContextId(2);

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "mirror-server", about = "Page mirror host and HTTP receiver")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "mirror-server.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Attach a synthetic page and mirror it to the receiver.
    #[arg(long)]
    pattern: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&ServerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let config = ServerConfig::load(&cli.config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    if config.logging.file.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.logging.file)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init();
    }

    info!("mirror-server v{}", env!("CARGO_PKG_VERSION"));
    info!("receiver: {}:{}", config.network.bind, config.network.port);
    info!("capture: {} fps, quality {}", config.capture.frame_rate, config.capture.quality);

    let listener = TcpListener::bind((config.network.bind.as_str(), config.network.port)).await?;
    let (width, height) = (config.mirror.width, config.mirror.height);
    let host = Arc::new(MirrorHost::start(config));

    if cli.pattern {
        host.attach_source(PATTERN_SOURCE, "about:pattern", Arc::new(PatternHost::new(width, height)))?;
        let slot = host.open_mirror(PATTERN_SOURCE).await?;
        info!(%slot, "mirroring test pattern");
    }

    // Ctrl-C handler.
    let token = host.token();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        token.cancel();
    });

    if let Err(e) = host.serve(listener).await {
        warn!("receiver stopped: {e}");
    }
    host.shutdown(Duration::from_secs(5)).await;
    info!("mirror-server stopped");
    Ok(())
}
