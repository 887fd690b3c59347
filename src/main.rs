//! # Folio CLI (`folio`)
//!
//! ## Usage
//!
//! ```bash
//! folio --config ./config/folio.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `folio serve` | Start the HTTP API |
//! | `folio ask "<question>"` | Answer a question from the command line |
//! | `folio context "<question>"` | Show the context a question would get |
//! | `folio sections` | List portfolio sections and record counts |
//! | `folio index build` | Embed the portfolio into the dense index |
//! | `folio index status` | Show whether the dense index exists and loads |
//!
//! Logs go to stderr and are filtered by `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use folio::{ask, config, index_cmd, sections, server};

/// Folio — answers questions about a personal portfolio.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/folio.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "folio",
    about = "Folio — answers questions about a personal portfolio",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/folio.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Answer a question using the configured generator.
    Ask {
        question: String,

        /// Section hint, e.g. `projects` (case-insensitive).
        #[arg(long)]
        section: Option<String>,
    },

    /// Print the context selected for a question, without generating.
    Context {
        question: String,

        #[arg(long)]
        section: Option<String>,
    },

    /// List the sections present in the portfolio document.
    Sections,

    /// Dense index management.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Chunk and embed the portfolio, then write the index and metadata files.
    Build {
        /// Override `[embedding].batch_size`.
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Report whether the index artifacts exist and match the configured model.
    Status,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => server::run_server(&cfg).await?,
        Commands::Ask { question, section } => {
            ask::run_ask(&cfg, &question, section.as_deref()).await?
        }
        Commands::Context { question, section } => {
            ask::run_context(&cfg, &question, section.as_deref()).await?
        }
        Commands::Sections => sections::run_sections(&cfg)?,
        Commands::Index { action } => match action {
            IndexAction::Build { batch_size } => index_cmd::run_index_build(&cfg, batch_size).await?,
            IndexAction::Status => index_cmd::run_index_status(&cfg).await?,
        },
    }

    Ok(())
}
