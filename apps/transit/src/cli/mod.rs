//! # Transit CLI Module
//!
//! This module implements the CLI interface for Transit.
//!
//! ## Available Commands
//!
//! - `params` - List the parameter catalog
//! - `validate` - Validate parameters without composing
//! - `plan` - Compose the deployment plan (JSON or canonical)
//! - `env` - Render the environment contract of a compute role
//! - `outputs` - Show the published outputs
//! - `hash` - Compute checksum and BLAKE3 hash of the plan
//! - `verify` - Check a canonical plan file
//! - `apply` - Hand the plan to a provisioning backend

mod commands;

use crate::config::TransitConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use transit_core::TransitError;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Transit - Transfer Pipeline Composer
///
/// Composes the deployment plan of a cross-cloud object-storage transfer
/// pipeline from a declarative parameter set.
#[derive(Parser, Debug)]
#[command(name = "transit")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Parameter file (defaults to transit.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Parameter override, `name=value` (repeatable)
    #[arg(short = 'p', long = "param", global = true)]
    pub params: Vec<String>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List every declared parameter
    Params,

    /// Validate parameters without composing a plan
    Validate,

    /// Compose the deployment plan
    Plan {
        /// Output file path (stdout when omitted, JSON only)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Plan format (json, canonical)
        #[arg(short = 't', long, default_value = "json")]
        format: String,
    },

    /// Render the environment contract of a compute role
    Env {
        /// Role (discovery, worker); defaults to the selected role
        #[arg(short, long)]
        role: Option<String>,
    },

    /// Show the published outputs
    Outputs,

    /// Compute checksum and BLAKE3 hash of the composed plan
    Hash,

    /// Check a canonical plan file
    Verify {
        /// Canonical plan file
        #[arg(short, long)]
        input: PathBuf,

        /// Also compare against the plan composed from the current parameters
        #[arg(long)]
        compare: bool,
    },

    /// Provision the composed plan
    Apply {
        /// Realize nothing; report what would be created
        #[arg(long)]
        dry_run: bool,
    },
}

// =============================================================================
// COMMAND DISPATCH
// =============================================================================

/// Execute the CLI command.
pub fn execute(cli: Cli) -> Result<(), TransitError> {
    let command = cli.command.unwrap_or(Commands::Validate);

    if cli.verbose {
        tracing::info!(command = ?command, "executing");
    }

    // The catalog listing needs no parameter file.
    if let Commands::Params = command {
        return cmd_params(cli.json_mode);
    }

    let mut config = TransitConfig::resolve(cli.config.as_deref())?;
    config.apply_overrides(&cli.params)?;

    match command {
        Commands::Params => cmd_params(cli.json_mode),
        Commands::Validate => cmd_validate(&config, cli.json_mode),
        Commands::Plan { output, format } => {
            cmd_plan(&config, output.as_deref(), &format, cli.json_mode)
        }
        Commands::Env { role } => cmd_env(&config, role.as_deref(), cli.json_mode),
        Commands::Outputs => cmd_outputs(&config, cli.json_mode),
        Commands::Hash => cmd_hash(&config, cli.json_mode),
        Commands::Verify { input, compare } => {
            cmd_verify(&config, &input, compare, cli.json_mode)
        }
        Commands::Apply { dry_run } => cmd_apply(&config, dry_run, cli.json_mode),
    }
}
