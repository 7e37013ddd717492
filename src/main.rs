use std::sync::Arc;

use clap::Parser;
use log::{error, info, LevelFilter};

use archivarius_bridge::config::Config;
use archivarius_bridge::context::BridgeContext;
use archivarius_bridge::filters::FilterRegistry;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// Drains finalized records from a live document store into a public
/// mirror and an encrypted secret archive, then removes the originals.
#[derive(Parser, Clone, Debug)]
#[command(name = "archivarius-bridge")]
struct CliArgs {
    /// Path to the YAML config file.
    #[arg(short, long, default_value = "config.yaml")]
    config: String,
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    let config = match Config::from_path(&args.config) {
        Ok(c) => c,
        Err(e) => {
            // Logging isn't initialized yet; a bad config is reported on stderr directly.
            eprintln!("failed to load config from {}: {e}", args.config);
            std::process::exit(1);
        }
    };

    init_logging(&config);
    info!("archivarius bridge starting, resources: {:?}", config.resources);
    log_configured_timezone();

    let filters = FilterRegistry::new();
    let ctx = match BridgeContext::build(config, filters).await {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("failed to initialize bridge context: {e}");
            std::process::exit(1);
        }
    };

    let controller = ctx.controller.clone();
    tokio::spawn(wait_for_shutdown_signal(controller));

    ctx.run().await;
}

fn init_logging(config: &Config) {
    let level = match &config.log {
        Some(log) if log.debug => LevelFilter::Debug,
        _ => LevelFilter::Info,
    };
    let result = match config.log.as_ref().and_then(|l| l.path.as_ref()) {
        Some(path) => simple_logging::log_to_file(path, level),
        None => simple_logging::log_to_stderr(level),
    };
    if let Err(e) = result {
        eprintln!("failed to initialize logging: {e}");
    }
}

/// §6 ambient supplement: `TZ` is a named external interface
/// (default `Europe/Kiev`) but every timestamp this bridge writes is
/// `chrono::Utc::now()`, so there's nothing for the value to actually
/// configure. Read and logged anyway so a misconfigured environment is
/// visible at startup instead of silently ignored.
fn log_configured_timezone() {
    match std::env::var("TZ") {
        Ok(tz) => info!("TZ={tz} (informational only; all timestamps are recorded in UTC)"),
        Err(_) => info!("TZ not set, defaulting to Europe/Kiev (informational only; all timestamps are recorded in UTC)"),
    }
}

/// §4.7 ambient supplement: SIGTERM/SIGINT trigger a graceful drain
/// rather than an immediate process exit.
async fn wait_for_shutdown_signal(controller: Arc<archivarius_bridge::controller::Controller>) {
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("could not install SIGTERM handler: {e}");
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT, shutting down gracefully"),
        _ = sigterm.recv() => info!("received SIGTERM, shutting down gracefully"),
    }
    controller.request_shutdown().await;
}
