//! Orca CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Configuration error
//! - 5: Synthesis error

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use orca_core::CoreError;
use orca_patterns::PatternError;

mod commands;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const CONFIG_ERROR: u8 = 3;
    pub const SYNTH_ERROR: u8 = 5;
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Synth(args) => commands::synth::execute(args),
        Commands::List(args) => commands::list::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "warn,orca=info"
    };

    // RUST_LOG wins over the flags
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logging may already be initialized; keep going either way
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(err) = cause.downcast_ref::<PatternError>() {
            return match err {
                PatternError::InvalidConfig(_)
                | PatternError::MissingListener(_)
                | PatternError::MissingNamespace(_)
                | PatternError::InvalidServiceDiscovery { .. }
                | PatternError::Yaml(_)
                | PatternError::Toml(_) => ExitCodes::CONFIG_ERROR,
                PatternError::Io(_) => ExitCodes::INVALID_ARGS,
                PatternError::Core(_) | PatternError::Network(_) => ExitCodes::SYNTH_ERROR,
            };
        }
        if cause.downcast_ref::<CoreError>().is_some() {
            return ExitCodes::SYNTH_ERROR;
        }
    }

    let msg = e.to_string().to_lowercase();
    if msg.contains("missing context") {
        ExitCodes::SYNTH_ERROR
    } else if msg.contains("not found") {
        ExitCodes::INVALID_ARGS
    } else {
        ExitCodes::GENERAL_ERROR
    }
}
