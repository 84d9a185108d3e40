use chrono::Local;
use clap::Parser;
use factorq::commands::{self, Cli};
use factorq::{Config, PlatformError};
use std::path::Path;
use std::process::ExitCode;

fn init_logging(log_dir: Option<&Path>) -> std::io::Result<()> {
    let mut builder = env_logger::Builder::from_default_env();
    builder
        .filter_level(log::LevelFilter::Warn)
        .filter_module("factorq", log::LevelFilter::Info)
        .filter_module("sqlx", log::LevelFilter::Error)
        .filter_module("sea_orm", log::LevelFilter::Error);

    // stdout carries command output, so logs go to stderr or a file
    if let Some(dir) = log_dir {
        std::fs::create_dir_all(dir)?;
        let ts = Local::now().format("%Y%m%d-%H%M%S").to_string();
        let log_file = std::fs::File::create(dir.join(format!("factorq-{}.log", ts)))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    } else {
        builder.target(env_logger::Target::Stderr);
    }
    builder.init();
    Ok(())
}

fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<PlatformError>() {
        Some(PlatformError::InvalidInput(_)) | Some(PlatformError::NotFound(_)) => 2,
        Some(PlatformError::InvalidTransition { .. }) => 3,
        _ => 1,
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(db) = cli.db {
        config.database_url = db;
    }
    if let Err(e) = init_logging(config.log_dir.as_deref()) {
        eprintln!("⚠ could not open log file: {}", e);
    }

    match commands::run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("error: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}
