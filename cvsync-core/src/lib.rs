pub mod artifact;
pub mod auth;
pub mod browser;
pub mod config;
pub mod drive;
pub mod error;
pub mod ingest;
pub mod run;
pub mod sheet;

pub use artifact::{scan_artifacts, Artifact, ArtifactKind};
pub use auth::{
    ServiceAccountKey, ServiceAccountTokens, StaticToken, TokenProvider, SPREADSHEET_SCOPE,
    STORAGE_SCOPE,
};
pub use browser::{
    authenticated_url, dashboard_steps, BrowserError, BrowserResult, BrowserSession,
    CollectOutcome, ExecutionOutcome, ExecutionTerminal, FailurePolicy, FileCollector, Locator,
    PageSurface, Step, StepExecutor, StepResult, StepStatus, StepSurface, WaitCondition,
    WaitPolicy,
};
pub use config::{load_runner_config, RunnerConfig};
pub use drive::{ArchivalUploader, ArchiveReport, DriveClient, ObjectStore, UploadError};
pub use error::{ConfigError, Result};
pub use ingest::{parse_export, IngestError, ParsedExport, RowMatrix, SourceEncoding};
pub use run::{ExportPipeline, RunReport, RunTerminal, SessionHandle};
pub use sheet::{PublishOutcome, SheetError, SheetsClient, SpreadsheetService, SyncPublisher, SyncTarget};
