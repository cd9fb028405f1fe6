//! The run pipeline: one browser session driven through the interaction
//! sequence, the exported file collected, parsed and synced, and every
//! artifact archived no matter which way the run ended.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::artifact::scan_artifacts;
use crate::browser::{
    authenticated_url, dashboard_steps, BrowserResult, BrowserSession, ExecutionTerminal,
    FileCollector, PageSurface, StepExecutor, StepResult, StepSurface, WaitPolicy,
};
use crate::config::RunnerConfig;
use crate::drive::{ArchivalUploader, ArchiveReport};
use crate::ingest::{parse_export, SourceEncoding};
use crate::sheet::{PublishOutcome, SyncPublisher};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTerminal {
    /// The export was triggered; collection and sync ran to their own ends.
    Completed,
    /// An abortive step failed; salvage still ran.
    Aborted { step: String },
    /// Unexpected failure outside the per-step policy.
    Failed { error: String },
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub terminal: RunTerminal,
    pub steps: Vec<StepResult>,
    pub export_file: Option<PathBuf>,
    pub encoding: Option<SourceEncoding>,
    pub publish: Option<PublishOutcome>,
    pub ingest_error: Option<String>,
    pub archive: ArchiveReport,
}

impl RunReport {
    fn started(run_id: String) -> Self {
        Self {
            run_id,
            terminal: RunTerminal::Completed,
            steps: Vec::new(),
            export_file: None,
            encoding: None,
            publish: None,
            ingest_error: None,
            archive: ArchiveReport::default(),
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.terminal, RunTerminal::Completed)
    }
}

/// Teardown seam. Consuming `self` makes a second close unrepresentable;
/// the pipeline owns the only call site.
#[async_trait(?Send)]
pub trait SessionHandle {
    async fn close(self: Box<Self>) -> BrowserResult<()>;
}

#[async_trait(?Send)]
impl SessionHandle for BrowserSession {
    async fn close(self: Box<Self>) -> BrowserResult<()> {
        (*self).shutdown().await
    }
}

pub struct ExportPipeline<'a> {
    config: &'a RunnerConfig,
    publisher: &'a SyncPublisher,
    uploader: &'a ArchivalUploader,
}

impl<'a> ExportPipeline<'a> {
    pub fn new(
        config: &'a RunnerConfig,
        publisher: &'a SyncPublisher,
        uploader: &'a ArchivalUploader,
    ) -> Self {
        Self {
            config,
            publisher,
            uploader,
        }
    }

    /// Full production run against a fresh Chromium session.
    pub async fn run(&self) -> RunReport {
        let run_id = Uuid::new_v4().to_string();
        let download_dir = self.config.resolve_path(&self.config.downloads.dir);
        let session = match BrowserSession::open(&self.config.chromium, &download_dir).await {
            Ok(session) => session,
            Err(err) => {
                error!(error = %err, "failed to open browser session");
                let mut report = RunReport::started(run_id);
                report.terminal = RunTerminal::Failed {
                    error: format!("session open: {err}"),
                };
                return self.salvage(report, &download_dir).await;
            }
        };
        let page = match session.new_page().await {
            Ok(page) => page,
            Err(err) => {
                error!(error = %err, "failed to open page");
                let mut report = RunReport::started(run_id);
                report.terminal = RunTerminal::Failed {
                    error: format!("page open: {err}"),
                };
                let report = self.salvage(report, &download_dir).await;
                if let Err(err) = Box::new(session).close().await {
                    warn!(error = %err, "session teardown reported an error");
                }
                return report;
            }
        };
        let mut surface = PageSurface::new(page);
        self.run_with(run_id, Box::new(session), &mut surface, &download_dir)
            .await
    }

    /// Drive a run over any session/surface pair. Artifact salvage and the
    /// single session teardown happen on every path out of here.
    pub async fn run_with(
        &self,
        run_id: String,
        session: Box<dyn SessionHandle>,
        surface: &mut dyn StepSurface,
        download_dir: &Path,
    ) -> RunReport {
        let report = self.drive(run_id, surface, download_dir).await;
        let report = self.salvage(report, download_dir).await;
        if let Err(err) = session.close().await {
            warn!(error = %err, "session teardown reported an error");
        }
        info!(run_id = %report.run_id, terminal = ?report.terminal, "run finished");
        report
    }

    async fn drive(
        &self,
        run_id: String,
        surface: &mut dyn StepSurface,
        download_dir: &Path,
    ) -> RunReport {
        info!(%run_id, "starting export run");
        let mut report = RunReport::started(run_id);

        if let Err(err) = self.login(surface).await {
            error!(error = %err, "dashboard login failed");
            report.terminal = RunTerminal::Failed {
                error: format!("login: {err}"),
            };
            return report;
        }

        let steps = dashboard_steps(self.config);
        let mut executor = StepExecutor::new(
            WaitPolicy::from_section(&self.config.waits),
            download_dir.to_path_buf(),
        );
        let outcome = executor.execute(surface, &steps).await;
        report.steps = outcome.results;
        if let ExecutionTerminal::Aborted { step } = outcome.terminal {
            warn!(%step, "run aborted before the export was triggered");
            report.terminal = RunTerminal::Aborted { step };
            return report;
        }

        let collector = FileCollector::new(download_dir.to_path_buf(), &self.config.downloads);
        let collected = match collector.await_file().await {
            Ok(collected) => collected,
            Err(err) => {
                error!(error = %err, "download directory poll failed");
                report.terminal = RunTerminal::Failed {
                    error: format!("collect: {err}"),
                };
                return report;
            }
        };
        let Some(path) = collected.path else {
            warn!(
                attempts = collected.attempts,
                "no export file appeared before the deadline"
            );
            return report;
        };
        report.export_file = Some(path.clone());

        let parsed = match parse_export(&path) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(error = %err, "export could not be ingested, skipping sheet sync");
                report.ingest_error = Some(err.to_string());
                return report;
            }
        };
        report.encoding = Some(parsed.encoding);

        match self.publisher.publish(&parsed.rows).await {
            Ok(outcome) => report.publish = Some(outcome),
            Err(err) => {
                error!(error = %err, "sheet sync failed");
                report.terminal = RunTerminal::Failed {
                    error: format!("sync: {err}"),
                };
            }
        }
        report
    }

    /// Archive whatever artifacts exist, independent of how the run ended.
    async fn salvage(&self, mut report: RunReport, download_dir: &Path) -> RunReport {
        let artifacts = match scan_artifacts(download_dir) {
            Ok(artifacts) => artifacts,
            Err(err) => {
                warn!(error = %err, "could not scan artifacts for archival");
                return report;
            }
        };
        info!(count = artifacts.len(), "archiving run artifacts");
        report.archive = self.uploader.archive_all(&artifacts).await;
        report
    }

    /// Basic-auth login: credentials ride in the URL's userinfo; the second
    /// navigation lands on the dashboard once the auth is primed.
    async fn login(&self, surface: &mut dyn StepSurface) -> BrowserResult<()> {
        let credentials = &self.config.credentials;
        let url = authenticated_url(
            &self.config.dashboard.url,
            &credentials.user_id,
            &credentials.password,
        )?;
        info!(url = %self.config.dashboard.url, "authenticating against dashboard");
        let [first_settle, second_settle] = self.config.waits.login_settle_seconds;
        surface.navigate(&url).await?;
        sleep(Duration::from_secs(first_settle)).await;
        surface.navigate(&url).await?;
        sleep(Duration::from_secs(second_settle)).await;
        Ok(())
    }
}
