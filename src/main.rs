//! vhost-config host process.
//!
//! Loads the configuration once (fatal on error), then keeps the published
//! snapshot current:
//!
//! ```text
//!   SIGHUP ──────────┐
//!                    ├──▶ ReloadController ──▶ ArcSwap<ResolvedConfig>
//!   file watcher ────┘         │
//!                              └──▶ rejected: keep current, log every violation
//!
//!   SIGINT / SIGTERM ──▶ Shutdown broadcast ──▶ exit
//! ```

use std::path::PathBuf;

use clap::Parser;

use vhost_config::lifecycle::startup::{self, StartupOptions};
use vhost_config::observability::logging::{init_logging, LogFormat};

#[derive(Parser)]
#[command(name = "vhost-config")]
#[command(about = "Resolve, validate and hot-reload virtual host configuration", long_about = None)]
struct Args {
    /// Root configuration document (JSON or TOML).
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Reload when a source file changes.
    #[arg(short, long)]
    watch: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.log_format);

    tracing::info!(config = %args.config.display(), watch = args.watch, "vhost-config starting");

    let opts = StartupOptions {
        config_path: args.config,
        watch: args.watch,
    };
    if let Err(e) = startup::run(opts).await {
        if let startup::StartupError::Config(config_error) = &e {
            for diag in config_error.diagnostics() {
                tracing::error!(path = %diag.path, "{}", diag.message);
            }
        }
        tracing::error!(error = %e, "Startup failed");
        return Err(e.into());
    }
    Ok(())
}
