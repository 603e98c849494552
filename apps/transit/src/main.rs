//! # Transit - Deployment Composer
//!
//! The main binary for the Transit transfer-pipeline composer.
//!
//! This application provides:
//! - Parameter file loading (TOML) with command-line overrides
//! - CLI interface for validating and composing deployment plans
//! - Canonical plan export and dry-run provisioning
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     apps/transit (THE BINARY)                   │
//! │                                                                 │
//! │  ┌─────────────┐    ┌──────────────────┐    ┌──────────────┐   │
//! │  │   CLI       │    │  Parameter file  │    │   Backend    │   │
//! │  │  (clap)     │    │     (toml)       │    │  (dry-run)   │   │
//! │  └──────┬──────┘    └────────┬─────────┘    └──────┬───────┘   │
//! │         │                    │                     │           │
//! │         └────────────────────┼─────────────────────┘           │
//! │                              ▼                                 │
//! │                      ┌───────────────┐                         │
//! │                      │ transit-core  │                         │
//! │                      │ (THE LOGIC)   │                         │
//! │                      └───────────────┘                         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Check a parameter file
//! transit -c transit.toml validate
//!
//! # Compose and write the plan
//! transit -c transit.toml -p run-type=fleet plan -o plan.json
//!
//! # Render the worker environment
//! transit env --role worker
//! ```

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transit::cli;

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // TRANSIT_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("TRANSIT_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "transit=info,transit_core=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Transit startup banner.
fn print_banner() {
    println!(
        r#"
  ████████╗██████╗  █████╗ ███╗   ██╗███████╗██╗████████╗
  ╚══██╔══╝██╔══██╗██╔══██╗████╗  ██║██╔════╝██║╚══██╔══╝
     ██║   ██████╔╝███████║██╔██╗ ██║███████╗██║   ██║
     ██║   ██╔══██╗██╔══██║██║╚██╗██║╚════██║██║   ██║
     ██║   ██║  ██║██║  ██║██║ ╚████║███████║██║   ██║
     ╚═╝   ╚═╝  ╚═╝╚═╝  ╚═╝╚═╝  ╚═══╝╚══════╝╚═╝   ╚═╝

  Transfer Pipeline Composer v{}

  Deterministic • Declarative • Verifiable
"#,
        env!("CARGO_PKG_VERSION")
    );
}
