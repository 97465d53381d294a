// CrossDrop signaling relay: device registry, pairing and WebRTC signal routing.

mod config;
mod server;
mod session;
mod sweeper;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("crossdrop-server {}", VERSION);
            return Ok(());
        }
    }

    let (cfg, problems) = config::load();
    init_tracing(&cfg.log_level);
    for problem in &problems {
        warn!("{problem}");
    }
    info!(version = VERSION, port = cfg.port, "starting crossdrop-server");
    if cfg.uses_default_secret() {
        warn!("token_secret is the built-in default; set CROSSDROP_TOKEN_SECRET in production");
    }

    let state = server::AppState::new(&cfg.token_secret, cfg.require_pair_token);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(server::run(&cfg, state, async {
        if let Err(e) = shutdown_signal().await {
            warn!(error = %e, "signal handler failed; shutting down");
        }
    }))?;
    Ok(())
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Wait for Ctrl+C or SIGTERM (Unix). Open sessions are dropped with the runtime.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    info!("shutdown requested");
    Ok(())
}
