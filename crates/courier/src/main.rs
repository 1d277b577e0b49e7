// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Courier - queue-position notification dispatcher.
//!
//! This is the binary entry point: the long-running `serve` worker plus the
//! operator commands that act on the same database.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod commands;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Courier - queue-position notification dispatcher.
#[derive(Parser, Debug)]
#[command(name = "courier", version, about, long_about = None)]
struct Cli {
    /// Explicit config file instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the dispatch worker until SIGINT/SIGTERM.
    Serve,
    /// Print an account's progress and quota as JSON.
    Status {
        #[arg(long)]
        account: String,
    },
    /// Re-queue failed messages below the attempt cap, or one message by id.
    Retry {
        #[arg(long)]
        batch: Option<usize>,
        /// Operator retry of a single failed message, ignoring the cap.
        #[arg(long, conflicts_with = "batch")]
        message: Option<i64>,
    },
    /// Pause a scope.
    Pause {
        #[command(subcommand)]
        scope: commands::ScopeArg,
    },
    /// Resume a scope.
    Resume {
        #[command(subcommand)]
        scope: commands::ScopeArg,
    },
    /// Probe an account's channel without overlapping a send.
    Probe {
        #[arg(long)]
        account: String,
        /// Check reachability of this phone instead of channel health.
        #[arg(long, requires = "country_code")]
        phone: Option<String>,
        #[arg(long)]
        country_code: Option<String>,
    },
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
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Status { account }) => commands::run_status(&config, &account).await,
        Some(Commands::Retry { batch, message }) => {
            commands::run_retry(&config, batch, message).await
        }
        Some(Commands::Pause { scope }) => commands::run_pause(&config, scope).await,
        Some(Commands::Resume { scope }) => commands::run_resume(&config, scope).await,
        Some(Commands::Probe {
            account,
            phone,
            country_code,
        }) => commands::run_probe(&config, &account, phone, country_code).await,
        None => {
            println!("courier: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
