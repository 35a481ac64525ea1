//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `library_core` linkage (`ping`, `version`).
//! - Read users from a configured database for quick local inspection.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use library_core::db::open_with_config;
use library_core::{
    init_from_config, CoreConfig, RepoError, SqliteUserRepository, User, UserRepository,
};

#[derive(Parser, Debug)]
#[command(name = "library", version, about = "Library user store tooling")]
struct Cli {
    /// TOML config file; defaults to an in-memory database.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print `pong` when the core crate is linked.
    Ping,
    /// Print the core crate version.
    Version,
    /// List every stored user.
    List,
    /// List users whose name contains QUERY.
    Search { query: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Ping => println!("library_core ping={}", library_core::ping()),
        Command::Version => println!("library_core version={}", library_core::core_version()),
        Command::List => with_repository(cli.config, |repo| repo.list())?,
        Command::Search { query } => with_repository(cli.config, |repo| repo.search(&query))?,
    }

    Ok(())
}

fn with_repository<F>(config_path: Option<PathBuf>, query: F) -> Result<()>
where
    F: FnOnce(&SqliteUserRepository<'_>) -> Result<Vec<User>, RepoError>,
{
    let config = match config_path {
        Some(path) => CoreConfig::load(&path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => CoreConfig::default(),
    };
    init_from_config(&config.logging).context("failed to initialize logging")?;

    let mut conn = open_with_config(&config.database).context("failed to open database")?;
    let repo = SqliteUserRepository::try_new(&mut conn).context("database is not ready")?;

    match query(&repo) {
        Ok(users) => {
            for user in users {
                println!(
                    "{} {} {} books={}",
                    user.id,
                    user.first_name,
                    user.last_name,
                    user.books.len()
                );
            }
            Ok(())
        }
        Err(RepoError::NoMatches) => {
            println!("no users found");
            Ok(())
        }
        Err(err) => Err(err).context("query failed"),
    }
}
