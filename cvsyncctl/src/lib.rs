use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing::info;

use cvsync_core::auth::AuthError;
use cvsync_core::{
    load_runner_config, parse_export, scan_artifacts, ArchivalUploader, DriveClient,
    ExportPipeline, IngestError, RunnerConfig, ServiceAccountKey, ServiceAccountTokens,
    SheetError, SheetsClient, StaticToken, SyncPublisher, SyncTarget, TokenProvider,
    SPREADSHEET_SCOPE, STORAGE_SCOPE,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] cvsync_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),
    #[error("sheet sync error: {0}")]
    Sheet(#[from] SheetError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("run finished in state {0}")]
    RunIncomplete(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Dashboard export and sheet sync runner", long_about = None)]
pub struct Cli {
    /// Path to cvsync.toml
    #[arg(long, default_value = "configs/cvsync.toml")]
    pub config: PathBuf,
    /// Bearer token override; skips the service-account exchange
    #[arg(long)]
    pub access_token: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the full export-and-sync pipeline
    Run,
    /// Ingest an existing export file and publish it to the sheet
    Sync { file: PathBuf },
    /// Upload whatever the download directory currently holds
    Archive,
    /// Validate the configuration and print the effective values
    Check,
}

pub fn run(cli: Cli) -> Result<()> {
    init_tracing();
    let mut config = load_runner_config(&cli.config)?;
    config.apply_env_overrides();

    match cli.command {
        Command::Check => check(&config),
        command => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(dispatch(command, &config, cli.access_token))
        }
    }
}

async fn dispatch(command: Command, config: &RunnerConfig, token: Option<String>) -> Result<()> {
    match command {
        Command::Run => run_pipeline(config, token).await,
        Command::Sync { file } => sync_file(config, token, &file).await,
        Command::Archive => archive_directory(config, token).await,
        Command::Check => unreachable!("check never reaches the runtime"),
    }
}

async fn run_pipeline(config: &RunnerConfig, token: Option<String>) -> Result<()> {
    let http = reqwest::Client::new();
    let tokens = token_provider(config, token)?;
    let publisher = sheet_publisher(config, &http, tokens.clone());
    let uploader = drive_uploader(config, &http, tokens);

    let pipeline = ExportPipeline::new(config, &publisher, &uploader);
    let report = pipeline.run().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.succeeded() {
        Ok(())
    } else {
        Err(AppError::RunIncomplete(format!("{:?}", report.terminal)))
    }
}

async fn sync_file(config: &RunnerConfig, token: Option<String>, file: &Path) -> Result<()> {
    let http = reqwest::Client::new();
    let tokens = token_provider(config, token)?;
    let publisher = sheet_publisher(config, &http, tokens);

    let parsed = parse_export(file)?;
    info!(rows = parsed.rows.len(), encoding = %parsed.encoding, "export parsed");
    let outcome = publisher.publish(&parsed.rows).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn archive_directory(config: &RunnerConfig, token: Option<String>) -> Result<()> {
    let http = reqwest::Client::new();
    let tokens = token_provider(config, token)?;
    let uploader = drive_uploader(config, &http, tokens);

    let dir = config.resolve_path(&config.downloads.dir);
    let artifacts = scan_artifacts(&dir)?;
    info!(count = artifacts.len(), dir = %dir.display(), "archiving artifacts");
    let report = uploader.archive_all(&artifacts).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn check(config: &RunnerConfig) -> Result<()> {
    let summary = serde_json::json!({
        "dashboard_url": config.dashboard.url,
        "partner": config.dashboard.partner,
        "download_dir": config.resolve_path(&config.downloads.dir),
        "chromium": config.chromium.executable_path,
        "headless": config.chromium.headless,
        "spreadsheet_id": config.sheets.spreadsheet_id,
        "range": config.sheets.range,
        "drive_folder_id": config.drive.folder_id,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn sheet_publisher(
    config: &RunnerConfig,
    http: &reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
) -> SyncPublisher {
    let client = SheetsClient::new(http.clone(), config.sheets.endpoint.clone(), tokens);
    SyncPublisher::new(
        Arc::new(client),
        SyncTarget::new(
            config.sheets.spreadsheet_id.clone(),
            config.sheets.range.clone(),
        ),
    )
}

fn drive_uploader(
    config: &RunnerConfig,
    http: &reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
) -> ArchivalUploader {
    let client = DriveClient::new(http.clone(), config.drive.endpoint.clone(), tokens);
    ArchivalUploader::new(Arc::new(client), config.drive.folder_id.clone())
}

fn token_provider(
    config: &RunnerConfig,
    token: Option<String>,
) -> Result<Arc<dyn TokenProvider>> {
    if let Some(token) = token {
        return Ok(Arc::new(StaticToken(token)));
    }
    let key = match &config.credentials.service_account_json {
        Some(json) => ServiceAccountKey::from_json(json)?,
        None => {
            let path = config.resolve_path(&config.credentials.service_account_key);
            ServiceAccountKey::from_file(&path)?
        }
    };
    Ok(Arc::new(ServiceAccountTokens::new(
        reqwest::Client::new(),
        key,
        &[SPREADSHEET_SCOPE, STORAGE_SCOPE],
    )))
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn sync_subcommand_takes_a_file() {
        let cli = Cli::try_parse_from(["cvsyncctl", "sync", "export.csv"]).unwrap();
        match cli.command {
            Command::Sync { file } => assert_eq!(file, PathBuf::from("export.csv")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn access_token_flag_selects_the_static_provider() {
        let cli = Cli::try_parse_from([
            "cvsyncctl",
            "--access-token",
            "token-abc",
            "archive",
        ])
        .unwrap();
        assert_eq!(cli.access_token.as_deref(), Some("token-abc"));
    }
}
