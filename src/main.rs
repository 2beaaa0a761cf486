//! # Console Whisperer CLI (`whisperer`)
//!
//! Runs the backend server and exposes the pipeline for one-off use from
//! the terminal.
//!
//! ## Usage
//!
//! ```bash
//! whisperer --config ./config/whisperer.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `whisperer serve` | Start the HTTP API |
//! | `whisperer explain "<message>"` | Explain one error and print the combined response |
//! | `whisperer links "<query>"` | Print ranked help links for a query |
//! | `whisperer fingerprint "<text>"` | Print the cache fingerprint of a text (no config needed) |
//!
//! ## Examples
//!
//! ```bash
//! # Start the API on the configured bind address
//! whisperer serve --config ./config/whisperer.toml
//!
//! # Explain an error with its stack trace
//! whisperer explain "TypeError: x is undefined" --stack "at run (app.js:10:4)"
//!
//! # Compare fingerprints
//! whisperer fingerprint "TypeError: x is undefined" --algorithm sha256
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use console_whisperer::config;
use console_whisperer::error::WhisperError;
use console_whisperer::logging::init_logging;
use console_whisperer::server::run_server;
use console_whisperer::service::Whisperer;
use console_whisperer_core::fingerprint::FingerprintAlgorithm;
use console_whisperer_core::models::ErrorReport;

/// Console Whisperer: plain-English explanations and help links for
/// browser JavaScript errors.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/whisperer.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "whisperer", version, about)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true, default_value = "./config/whisperer.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server.
    Serve,

    /// Run the full pipeline for one error and print the JSON response.
    Explain {
        /// Error message as it appeared in the console.
        message: String,

        /// Raw stack trace.
        #[arg(long)]
        stack: Option<String>,

        /// Page URL where the error occurred.
        #[arg(long)]
        url: Option<String>,
    },

    /// Aggregate and rank help links for a query.
    Links {
        /// Error message or search query.
        query: String,
    },

    /// Print the cache fingerprint of a text.
    Fingerprint {
        text: String,

        #[arg(long, value_enum, default_value_t = AlgorithmArg::Java)]
        algorithm: AlgorithmArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum AlgorithmArg {
    Java,
    Sha256,
}

impl From<AlgorithmArg> for FingerprintAlgorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::Java => FingerprintAlgorithm::Java,
            AlgorithmArg::Sha256 => FingerprintAlgorithm::Sha256,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Fingerprint { text, algorithm } = &cli.command {
        println!("{}", FingerprintAlgorithm::from(*algorithm).fingerprint(text));
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    init_logging(&cfg.logging)?;

    match cli.command {
        Commands::Serve => {
            run_server(&cfg).await?;
        }
        Commands::Explain {
            message,
            stack,
            url,
        } => {
            let whisperer = Whisperer::from_config(&cfg)?;
            let report = ErrorReport {
                stack,
                url,
                timestamp: Some(chrono::Utc::now().timestamp_millis()),
                ..ErrorReport::from_message(message)
            };
            let response = whisperer.submit_error(report).await.map_err(cli_error)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Links { query } => {
            let whisperer = Whisperer::from_config(&cfg)?;
            let links = whisperer.query_links(&query).await.map_err(cli_error)?;
            if links.is_empty() {
                println!("No links found.");
            }
            for (i, link) in links.iter().enumerate() {
                println!("{}. [{}] {}", i + 1, link.source.as_str(), link.title);
                println!("   {}", link.url);
            }
        }
        // Handled before config load.
        Commands::Fingerprint { .. } => {}
    }

    Ok(())
}

fn cli_error(err: WhisperError) -> anyhow::Error {
    match err {
        WhisperError::Internal(e) => e,
        other => anyhow::anyhow!(other.to_string()),
    }
}
