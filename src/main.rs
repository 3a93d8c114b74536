//! `apm` CLI entry point.
//!
//! Logging follows the teacher's `main.rs` precedence: an explicit
//! `RUST_LOG` always wins, `--verbose` asks for debug logging absent that,
//! `--quiet` suppresses logging unless `RUST_LOG` overrides it.

use anyhow::Result;
use apm_cli::cli::Cli;
use apm_cli::core::error::{contextualize, ApmError, ErrorContext};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.build_config();

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error"))
    } else {
        match config.log_level.as_deref() {
            Some(level) => EnvFilter::new(level),
            None => EnvFilter::new("off"),
        }
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_thread_ids(false).init();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            let ctx = match e.downcast::<ApmError>() {
                Ok(apm_err) => contextualize(apm_err),
                Err(e) => ErrorContext::new(ApmError::Other { message: e.to_string() }),
            };
            ctx.display();
            std::process::exit(1);
        }
    }
}
