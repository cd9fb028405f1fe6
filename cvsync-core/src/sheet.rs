//! Spreadsheet synchronisation. Replace-whole-range semantics: the
//! destination always mirrors the latest successful run, never a merge.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::auth::{AuthError, TokenProvider};
use crate::ingest::RowMatrix;

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("spreadsheet auth error: {0}")]
    Auth(#[from] AuthError),
    #[error("spreadsheet http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("spreadsheet rejected {operation}: {status}")]
    Rejected { operation: &'static str, status: u16 },
}

/// Destination location. Addressed, never owned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncTarget {
    pub spreadsheet_id: String,
    pub range: String,
}

impl SyncTarget {
    pub fn new<S: Into<String>, R: Into<String>>(spreadsheet_id: S, range: R) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            range: range.into(),
        }
    }

    /// Writes anchor at the top-left cell of the range.
    pub fn write_anchor(&self) -> String {
        format!("{}!A1", self.range)
    }
}

#[async_trait]
pub trait SpreadsheetService: Send + Sync {
    async fn clear_range(&self, target: &SyncTarget) -> Result<(), SheetError>;
    async fn update_range(&self, target: &SyncTarget, rows: &RowMatrix)
        -> Result<u64, SheetError>;
}

pub struct SheetsClient {
    http: reqwest::Client,
    endpoint: String,
    tokens: Arc<dyn TokenProvider>,
}

impl SheetsClient {
    pub fn new(http: reqwest::Client, endpoint: String, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            http,
            endpoint,
            tokens,
        }
    }
}

#[derive(Debug, Serialize)]
struct UpdateBody<'a> {
    values: &'a RowMatrix,
}

#[derive(Debug, Deserialize)]
struct UpdateResponse {
    #[serde(rename = "updatedCells")]
    #[serde(default)]
    updated_cells: Option<u64>,
}

#[async_trait]
impl SpreadsheetService for SheetsClient {
    async fn clear_range(&self, target: &SyncTarget) -> Result<(), SheetError> {
        let token = self.tokens.bearer_token().await?;
        let url = format!(
            "{}/v4/spreadsheets/{}/values/{}:clear",
            self.endpoint, target.spreadsheet_id, target.range
        );
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SheetError::Rejected {
                operation: "clear",
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }

    async fn update_range(
        &self,
        target: &SyncTarget,
        rows: &RowMatrix,
    ) -> Result<u64, SheetError> {
        let token = self.tokens.bearer_token().await?;
        let url = format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.endpoint,
            target.spreadsheet_id,
            target.write_anchor()
        );
        let response = self
            .http
            .put(url)
            .bearer_auth(token)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&UpdateBody { values: rows })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SheetError::Rejected {
                operation: "update",
                status: response.status().as_u16(),
            });
        }
        let parsed: UpdateResponse = response.json().await?;
        Ok(parsed
            .updated_cells
            .unwrap_or_else(|| rows.iter().map(|row| row.len() as u64).sum()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishOutcome {
    /// Empty matrix: no clear, no write, no remote call at all.
    Skipped,
    Written { cells: u64 },
}

pub struct SyncPublisher {
    service: Arc<dyn SpreadsheetService>,
    target: SyncTarget,
}

impl SyncPublisher {
    pub fn new(service: Arc<dyn SpreadsheetService>, target: SyncTarget) -> Self {
        Self { service, target }
    }

    pub fn target(&self) -> &SyncTarget {
        &self.target
    }

    /// Clear the whole range, then write the matrix from its top-left cell.
    /// The two calls are independent; a write failure after a successful
    /// clear leaves the range empty until the next run repopulates it.
    pub async fn publish(&self, matrix: &RowMatrix) -> Result<PublishOutcome, SheetError> {
        if matrix.is_empty() {
            info!(range = %self.target.range, "export is empty, skipping sheet sync");
            return Ok(PublishOutcome::Skipped);
        }
        self.service.clear_range(&self.target).await?;
        let cells = match self.service.update_range(&self.target, matrix).await {
            Ok(cells) => cells,
            Err(err) => {
                warn!(range = %self.target.range, error = %err, "range cleared but write failed");
                return Err(err);
            }
        };
        info!(range = %self.target.range, rows = matrix.len(), cells, "sheet sync complete");
        Ok(PublishOutcome::Written { cells })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingService {
        calls: Mutex<Vec<String>>,
        fail_update: bool,
    }

    #[async_trait]
    impl SpreadsheetService for RecordingService {
        async fn clear_range(&self, target: &SyncTarget) -> Result<(), SheetError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("clear:{}", target.range));
            Ok(())
        }

        async fn update_range(
            &self,
            target: &SyncTarget,
            rows: &RowMatrix,
        ) -> Result<u64, SheetError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("update:{}:{}", target.write_anchor(), rows.len()));
            if self.fail_update {
                return Err(SheetError::Rejected {
                    operation: "update",
                    status: 500,
                });
            }
            Ok(rows.iter().map(|row| row.len() as u64).sum())
        }
    }

    fn target() -> SyncTarget {
        SyncTarget::new("sheet-1", "monthly_raw")
    }

    #[tokio::test]
    async fn empty_matrix_makes_no_remote_calls() {
        let service = Arc::new(RecordingService::default());
        let publisher = SyncPublisher::new(service.clone(), target());
        let outcome = publisher.publish(&Vec::new()).await.unwrap();
        assert_eq!(outcome, PublishOutcome::Skipped);
        assert!(service.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn single_empty_row_still_clears_and_writes() {
        let service = Arc::new(RecordingService::default());
        let publisher = SyncPublisher::new(service.clone(), target());
        let matrix = vec![vec![String::new()]];
        let outcome = publisher.publish(&matrix).await.unwrap();
        assert_eq!(outcome, PublishOutcome::Written { cells: 1 });
        let calls = service.calls.lock().unwrap();
        assert_eq!(
            calls.as_slice(),
            ["clear:monthly_raw", "update:monthly_raw!A1:1"]
        );
    }

    #[tokio::test]
    async fn clear_always_precedes_write() {
        let service = Arc::new(RecordingService::default());
        let publisher = SyncPublisher::new(service.clone(), target());
        let matrix = vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["1".to_string(), "2".to_string()],
        ];
        let outcome = publisher.publish(&matrix).await.unwrap();
        assert_eq!(outcome, PublishOutcome::Written { cells: 4 });
        let calls = service.calls.lock().unwrap();
        assert_eq!(calls[0], "clear:monthly_raw");
        assert_eq!(calls[1], "update:monthly_raw!A1:2");
    }

    #[tokio::test]
    async fn write_failure_after_clear_surfaces_the_error() {
        let service = Arc::new(RecordingService {
            fail_update: true,
            ..Default::default()
        });
        let publisher = SyncPublisher::new(service.clone(), target());
        let matrix = vec![vec!["a".to_string()]];
        let err = publisher.publish(&matrix).await.unwrap_err();
        assert!(matches!(
            err,
            SheetError::Rejected {
                operation: "update",
                ..
            }
        ));
        // The clear is not rolled back.
        assert_eq!(service.calls.lock().unwrap().len(), 2);
    }
}
