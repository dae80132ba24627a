//! Matrix - command-line frontend for the package launcher.
//!
//! Lists the package catalog, installs packages into the library, and
//! checks, updates and launches installed packages.

mod commands;
mod progress;

use anyhow::Result;
use clap::{Parser, Subcommand};
use matrix_core::{AppConfig, LibraryPaths};
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "matrix")]
#[command(about = "Install and run Stable Diffusion packages")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Library directory (packages, models, settings)
    #[arg(long, global = true, env = "MATRIX_LIBRARY_DIR")]
    library_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List installable packages
    List {
        #[arg(long)]
        json: bool,
    },
    /// List releases, or branches with --branches
    Versions {
        package: String,
        #[arg(long)]
        branches: bool,
    },
    /// List recent commits on a branch
    Commits {
        package: String,
        branch: String,
        #[arg(long, default_value = "1")]
        page: u32,
    },
    /// Install a package into the library
    Install {
        package: String,
        /// Directory name under Packages/ (defaults to the package name)
        #[arg(long)]
        name: Option<String>,
        /// Release tag (defaults to the newest release)
        #[arg(long, conflicts_with = "branch")]
        version: Option<String>,
        /// Install from a branch instead of a release
        #[arg(long)]
        branch: Option<String>,
        /// Commit on --branch (defaults to its head)
        #[arg(long, requires = "branch")]
        commit: Option<String>,
    },
    /// List installed packages
    Installed {
        #[arg(long)]
        json: bool,
    },
    /// Check installed packages for updates
    CheckUpdates {
        /// Only check this package
        id: Option<Uuid>,
    },
    /// Update an installed package to its newest version
    Update {
        id: Uuid,
        #[arg(long)]
        prerelease: bool,
    },
    /// Run an installed package until it exits or Ctrl+C
    Launch { id: Uuid },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let paths = LibraryPaths::resolve(args.library_dir)?;
    debug!(
        "Library root: {} ({})",
        paths.root().display(),
        matrix_core::platform::current_platform()
    );

    let token = std::env::var(AppConfig::GITHUB_TOKEN_ENV)
        .ok()
        .filter(|t| !t.is_empty());
    let app = commands::App::new(paths, token)?;

    match args.command {
        Command::List { json } => app.list(json),
        Command::Versions { package, branches } => app.versions(&package, branches).await,
        Command::Commits { package, branch, page } => app.commits(&package, &branch, page).await,
        Command::Install {
            package,
            name,
            version,
            branch,
            commit,
        } => app.install(&package, name, version, branch, commit).await,
        Command::Installed { json } => app.installed(json),
        Command::CheckUpdates { id } => app.check_updates(id).await,
        Command::Update { id, prerelease } => app.update(id, prerelease).await,
        Command::Launch { id } => app.launch(id).await,
    }
}
