pub mod cli;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod logging;
pub mod validation;

use std::process::ExitCode;

use clap::Parser;

pub use config::AppConfig;
pub use db::DbPool;
pub use error::AppError;

/// CLI entry point: load config, start logging, open the store and run one
/// subcommand. Output is pretty JSON on stdout; failures are printed as
/// `{ error, kind }` on stderr with a non-zero exit code.
pub fn run() -> ExitCode {
    let cli = cli::Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let mut config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => return report(&e),
    };
    if let Some(db) = cli.db.clone() {
        config.database.path = db;
    }

    let _log_guard = logging::init(&config.logging);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        db = %config.database.path.display(),
        "Starting vendorspend"
    );

    let result = db::init_db(&config.database.path, config.database.max_connections)
        .and_then(|pool| cli::dispatch(cli.cmd, &pool, &config))
        .and_then(|value| Ok(serde_json::to_string_pretty(&value)?));

    match result {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(kind = e.kind(), error = %e, "Command failed");
            report(&e)
        }
    }
}

fn report(e: &AppError) -> ExitCode {
    match serde_json::to_string(e) {
        Ok(json) => eprintln!("{json}"),
        Err(_) => eprintln!("{e}"),
    }
    ExitCode::FAILURE
}
