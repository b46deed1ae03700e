use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{add, add_all, commit, diff, init, log, serve, status, Context};

#[derive(Parser)]
#[command(name = "gitlite")]
#[command(version, about = "Lightweight snapshot-based version control", long_about = None)]
struct Cli {
    /// Repository root
    #[arg(long, global = true, default_value = ".")]
    repo: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Relational store path (defaults to <repo>/data/gitlite.db)
    #[arg(long, global = true, conflicts_with = "no_db")]
    db: Option<PathBuf>,

    /// Run filesystem-only, without the relational store
    #[arg(long, global = true)]
    no_db: bool,

    /// Author recorded on new commits
    #[arg(long, global = true)]
    author: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a repository (or re-register an existing one)
    Init {
        /// Directory to initialize (defaults to --repo)
        path: Option<PathBuf>,
    },

    /// Stage files for the next commit
    Add {
        /// Files to stage
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Stage every new file under a directory
    AddAll {
        /// Directory to scan (defaults to the repository root)
        root: Option<PathBuf>,

        /// Exclude pattern; replaces the configured list when given
        #[arg(short, long)]
        exclude: Vec<String>,
    },

    /// Commit the staged files
    Commit {
        /// Commit message
        #[arg(short, long)]
        message: Option<String>,

        /// Summary to record instead of the generated one
        #[arg(long)]
        summary: Option<String>,
    },

    /// Show staged files and repository state
    Status,

    /// Show commit history
    Log {
        /// Number of commits to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Compare two commits
    Diff {
        from: String,
        to: String,

        /// Include line changes of common files
        #[arg(short, long)]
        detailed: bool,

        /// Render unified patches instead of the line-set comparison
        #[arg(short, long, conflicts_with = "detailed")]
        unified: bool,
    },

    /// Serve the local HTTP API
    Serve {
        /// Port for the API server
        #[arg(short, long, default_value = "3030")]
        port: u16,
    },
}

fn init_logging(verbose: bool, default_level: &str) -> Result<()> {
    let level = if verbose { "debug" } else { default_level };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .try_init()?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Serve { .. } => "info",
        _ => "warn",
    };
    init_logging(cli.verbose, default_level)?;

    let ctx = Context {
        repo: cli.repo,
        db: cli.db,
        no_db: cli.no_db,
        author: cli.author,
    };

    match cli.command {
        Commands::Init { path } => {
            init::run(&ctx, path).await?;
        }
        Commands::Add { paths } => {
            add::run(&ctx, paths).await?;
        }
        Commands::AddAll { root, exclude } => {
            add_all::run(&ctx, root, exclude).await?;
        }
        Commands::Commit { message, summary } => {
            commit::run(&ctx, message, summary).await?;
        }
        Commands::Status => {
            status::run(&ctx).await?;
        }
        Commands::Log { limit } => {
            log::run(&ctx, limit).await?;
        }
        Commands::Diff {
            from,
            to,
            detailed,
            unified,
        } => {
            diff::run(&ctx, from, to, detailed, unified).await?;
        }
        Commands::Serve { port } => {
            serve::run(&ctx, port).await?;
        }
    }

    Ok(())
}
