//! scrcpy-ws — entry point.
//!
//! ```text
//! scrcpy-ws                          Connect with defaults
//! scrcpy-ws --config <path>          Use custom config TOML
//! scrcpy-ws --url ws://host:8000/... Override the bridge URL
//! scrcpy-ws --gen-config             Dump default config and exit
//! scrcpy-ws --tap 200,400            Tap once the session is ready
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use scrcpy_ws_core::pipeline::FfmpegLauncher;

use scrcpy_ws_client::config::ClientConfig;
use scrcpy_ws_client::connection;
use scrcpy_ws_client::session::{MirrorSession, ScriptedAction};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "scrcpy-ws", about = "Mirror an Android device through a scrcpy WebSocket bridge")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "scrcpy-ws.toml")]
    config: PathBuf,

    /// Bridge URL (overrides config).
    #[arg(short, long)]
    url: Option<String>,

    /// Write the default configuration to `--config` and exit.
    #[arg(long)]
    gen_config: bool,

    /// Write the last decoded frame as PPM on exit.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Dump the raw H.264 stream to a file.
    #[arg(long)]
    record: Option<PathBuf>,

    /// Tap at x,y in touch space once ready. Repeatable.
    #[arg(long, value_parser = ScriptedAction::parse_tap)]
    tap: Vec<ScriptedAction>,

    /// Swipe x1,y1,x2,y2 in touch space once ready. Repeatable.
    #[arg(long, value_parser = ScriptedAction::parse_swipe)]
    swipe: Vec<ScriptedAction>,

    /// Print the device's session info as JSON on exit.
    #[arg(long)]
    dump_session: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        ClientConfig::write_default(&cli.config)?;
        println!("Wrote default config to {}", cli.config.display());
        return Ok(());
    }

    let mut config = ClientConfig::load(&cli.config);
    if let Some(url) = cli.url {
        config.connection.url = url;
    }
    if let Some(path) = &cli.snapshot {
        config.output.snapshot_path = path.display().to_string();
    }
    if let Some(path) = &cli.record {
        config.stream.record_path = path.display().to_string();
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("scrcpy-ws v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Check the decoder ────────────────────────────────────

    let launcher = FfmpegLauncher::new(&config.decoder.ffmpeg, config.decoder.threads);
    let version = launcher.probe(PROBE_TIMEOUT).await?;
    info!("decoder: {version}");

    // ── 2. Connect ──────────────────────────────────────────────

    let (control, inbound) =
        connection::connect(&config.connection.url, config.connect_timeout()).await?;

    // ── 3. Ctrl-C clears the running flag ───────────────────────

    let running = Arc::new(AtomicBool::new(true));
    tokio::spawn({
        let running = Arc::clone(&running);
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted, shutting down");
                running.store(false, Ordering::SeqCst);
            }
        }
    });

    // ── 4. Run ──────────────────────────────────────────────────

    let actions = cli.tap.into_iter().chain(cli.swipe).collect();
    let session = MirrorSession::new(config).with_actions(actions);
    let summary = match session.run(control, inbound, launcher, running).await {
        Ok(summary) => summary,
        Err(e) => {
            error!("session failed: {e}");
            return Err(e.into());
        }
    };

    if cli.dump_session {
        match &summary.device {
            Some(info) => println!("{}", info.to_json()?),
            None => warn!("no session info was received"),
        }
    }

    Ok(())
}
