//! reget CLI - resumable downloads from the terminal
//!
//! Downloads run in the foreground with progress bars. Interrupted downloads
//! are recorded in a small SQLite store and can be resumed later.

mod commands;
mod output;
mod progress;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// reget - resumable HTTP downloads
#[derive(Parser)]
#[command(name = "reget")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Data directory for the task store and settings
    #[arg(long, env = "REGET_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "human", global = true)]
    output: OutputFormat,

    /// Override the configured number of simultaneous downloads (0 = unlimited)
    #[arg(long, global = true)]
    max_concurrent: Option<usize>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum OutputFormat {
    Human,
    Json,
    Table,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a URL in the foreground (Ctrl-C pauses)
    Get {
        /// URL to download
        url: String,

        /// Output file or directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Priority among queued downloads (higher first)
        #[arg(short, long)]
        priority: Option<i32>,

        /// Read/write chunk size in bytes
        #[arg(long)]
        buffer_size: Option<usize>,
    },

    /// Resume recorded downloads
    Resume {
        /// Task ID (or unique prefix)
        #[arg(required_unless_present = "all")]
        id: Option<String>,

        /// Resume every unfinished download
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },

    /// List recorded downloads
    List {
        /// Filter by status
        #[arg(short, long)]
        status: Option<String>,

        /// Show all details
        #[arg(short, long)]
        all: bool,
    },

    /// Cancel a download and delete its partial data
    Cancel {
        /// Task ID (or unique prefix)
        id: String,
    },

    /// Discard partial data and download again from the start
    Restart {
        /// Task ID (or unique prefix)
        id: String,
    },

    /// Remove a download from the task store
    Forget {
        /// Task ID (or unique prefix)
        id: String,

        /// Also delete the partial file
        #[arg(long)]
        with_file: bool,
    },

    /// Show/update settings
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key
        key: String,
    },

    /// Set a config value
    Set {
        /// Config key
        key: String,

        /// Config value
        value: String,
    },

    /// Show all config
    Show,

    /// Reset to defaults
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "reget_core=debug,reget=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let data_dir = cli.data_dir.unwrap_or_else(|| {
        dirs::data_dir()
            .map(|d| d.join("reget"))
            .unwrap_or_else(|| PathBuf::from(".reget"))
    });

    let app = commands::App::open(data_dir, cli.max_concurrent).await?;

    match cli.command {
        Commands::Get {
            url,
            output,
            priority,
            buffer_size,
        } => commands::get(&app, &url, output, priority, buffer_size, cli.output).await?,

        Commands::Resume { id, all } => {
            commands::resume(&app, id.as_deref(), all, cli.output).await?
        }

        Commands::List { status, all } => commands::list(&app, status, all, cli.output).await?,

        Commands::Cancel { id } => commands::cancel(&app, &id, cli.output).await?,

        Commands::Restart { id } => commands::restart(&app, &id, cli.output).await?,

        Commands::Forget { id, with_file } => {
            commands::forget(&app, &id, with_file, cli.output).await?
        }

        Commands::Config { action } => commands::config_action(&app, action, cli.output).await?,

        Commands::Completions { shell } => {
            use clap::CommandFactory;
            clap_complete::generate(shell, &mut Cli::command(), "reget", &mut std::io::stdout());
        }
    }

    Ok(())
}
