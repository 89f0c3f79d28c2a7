// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Courier - transactional outbox / inbox relay.
//!
//! This is the binary entry point: it loads configuration, installs
//! logging and runs one subcommand.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod forward;
mod serve;
mod sink;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use courier_config::model::CourierConfig;
use courier_core::CourierError;

/// Courier - reliable event delivery through a transactional outbox and a
/// deduplicating inbox.
#[derive(Parser, Debug)]
#[command(name = "courier", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the outbox publisher, inbox processor and retention sweeper.
    Serve,
    /// Show record counts per status.
    Status {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Run one retention sweep now.
    Purge,
    /// Validate and print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => courier_config::load_and_validate_path(path),
        None => courier_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            courier_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => {
            init_tracing(&config.log.level);
            serve::run_serve(config).await
        }
        Some(Commands::Status { json }) => status::run_status(&config, json).await,
        Some(Commands::Purge) => {
            init_tracing(&config.log.level);
            status::run_purge(&config).await
        }
        Some(Commands::Config) => print_config(&config),
        None => {
            println!("courier: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("courier: {e}");
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber; `RUST_LOG` wins over the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("courier={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

fn print_config(config: &CourierConfig) -> Result<(), CourierError> {
    print!("{}", render_config(config)?);
    Ok(())
}

/// Effective configuration as TOML, with secrets masked.
fn render_config(config: &CourierConfig) -> Result<String, CourierError> {
    let mut shown = config.clone();
    if shown.sink.auth_token.is_some() {
        shown.sink.auth_token = Some("********".to_string());
    }
    toml::to_string_pretty(&shown)
        .map_err(|e| CourierError::Config(format!("failed to render configuration: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn status_accepts_json_flag() {
        let cli = Cli::parse_from(["courier", "--config", "/tmp/c.toml", "status", "--json"]);
        assert!(matches!(cli.command, Some(Commands::Status { json: true })));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
    }

    #[test]
    fn rendered_config_masks_the_token_and_reloads() {
        let config = courier_config::load_and_validate_str(
            r#"
[sink]
kind = "webhook"
webhook_url = "https://hooks.example.com"
auth_token = "s3cret"
"#,
        )
        .unwrap();

        let rendered = render_config(&config).unwrap();
        assert!(!rendered.contains("s3cret"));
        let reloaded = courier_config::load_and_validate_str(&rendered).unwrap();
        assert_eq!(reloaded.outbox.batch_size, config.outbox.batch_size);
        assert_eq!(reloaded.sink.webhook_url, config.sink.webhook_url);
    }
}
