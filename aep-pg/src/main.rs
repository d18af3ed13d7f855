//! Point d'entrée CLI pour aep-pg

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, Level};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use aep_pg::cli::{self, Cli};

// Charger .env au démarrage
fn load_env() {
    // Chercher .env dans le répertoire courant ou parent
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Charger .env avant tout
    load_env();

    let cli = Cli::parse();

    // Journalisation: console + fichier par job
    init_logging(cli.verbose, cli.quiet, cli.command.job_name())?;

    if let Err(e) = cli::run(cli).await {
        error!(error = %e, "Échec de la migration");
        return Err(e);
    }

    Ok(())
}

/// Configure tracing vers la console et le fichier `migration_<job>.log`
fn init_logging(verbose: u8, quiet: bool, job: &str) -> Result<()> {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let log_path = format!("migration_{}.log", job);
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Impossible d'ouvrir le fichier de log {}", log_path))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_file(false)
                .with_line_number(false),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Arc::new(log_file)),
        )
        .init();

    Ok(())
}
