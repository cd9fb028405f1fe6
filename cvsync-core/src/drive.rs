//! Best-effort archival of run artifacts to Drive-style object storage.
//! Every artifact is attempted regardless of how the run ended; one failed
//! upload never blocks the rest.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::artifact::Artifact;
use crate::auth::{AuthError, TokenProvider};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("storage auth error: {0}")]
    Auth(#[from] AuthError),
    #[error("storage http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to read artifact {0}")]
    Read(String),
    #[error("storage rejected upload: {0}")]
    Rejected(u16),
}

/// Content type by extension; everything unrecognized ships as raw bytes.
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("csv") => "text/csv",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create a file under the given parent folder; returns the remote id.
    async fn create_file(
        &self,
        name: &str,
        content_type: &str,
        folder_id: &str,
        bytes: Vec<u8>,
    ) -> Result<String, UploadError>;
}

pub struct DriveClient {
    http: reqwest::Client,
    endpoint: String,
    tokens: Arc<dyn TokenProvider>,
}

impl DriveClient {
    pub fn new(http: reqwest::Client, endpoint: String, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            http,
            endpoint,
            tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

#[async_trait]
impl ObjectStore for DriveClient {
    async fn create_file(
        &self,
        name: &str,
        content_type: &str,
        folder_id: &str,
        bytes: Vec<u8>,
    ) -> Result<String, UploadError> {
        let token = self.tokens.bearer_token().await?;
        let metadata = serde_json::json!({
            "name": name,
            "parents": [folder_id],
        });
        let form = reqwest::multipart::Form::new()
            .part(
                "metadata",
                reqwest::multipart::Part::text(metadata.to_string())
                    .mime_str("application/json")?,
            )
            .part(
                "media",
                reqwest::multipart::Part::bytes(bytes).mime_str(content_type)?,
            );
        let url = format!("{}/upload/drive/v3/files", self.endpoint);
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .query(&[
                ("uploadType", "multipart"),
                ("fields", "id"),
                ("supportsAllDrives", "true"),
            ])
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(UploadError::Rejected(response.status().as_u16()));
        }
        let created: CreatedFile = response.json().await?;
        Ok(created.id)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ArchiveReport {
    pub uploaded: Vec<UploadedArtifact>,
    pub failed: Vec<FailedArtifact>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadedArtifact {
    pub name: String,
    pub remote_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedArtifact {
    pub name: String,
    pub error: String,
}

pub struct ArchivalUploader {
    store: Arc<dyn ObjectStore>,
    folder_id: String,
}

impl ArchivalUploader {
    pub fn new(store: Arc<dyn ObjectStore>, folder_id: String) -> Self {
        Self { store, folder_id }
    }

    pub async fn upload(&self, artifact: &Artifact) -> Result<String, UploadError> {
        let bytes = std::fs::read(&artifact.path)
            .map_err(|err| UploadError::Read(format!("{}: {err}", artifact.path.display())))?;
        let name = artifact.file_name();
        let content_type = content_type_for(&artifact.path);
        let remote_id = self
            .store
            .create_file(&name, content_type, &self.folder_id, bytes)
            .await?;
        info!(name, remote_id, "artifact archived");
        Ok(remote_id)
    }

    /// Archive everything the run produced, independent of run outcome.
    pub async fn archive_all(&self, artifacts: &[Artifact]) -> ArchiveReport {
        let mut report = ArchiveReport::default();
        for artifact in artifacts {
            match self.upload(artifact).await {
                Ok(remote_id) => report.uploaded.push(UploadedArtifact {
                    name: artifact.file_name(),
                    remote_id,
                }),
                Err(err) => {
                    warn!(name = %artifact.file_name(), error = %err, "artifact upload failed");
                    report.failed.push(FailedArtifact {
                        name: artifact.file_name(),
                        error: err.to_string(),
                    });
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[test]
    fn content_types_follow_the_fixed_mapping() {
        assert_eq!(content_type_for(Path::new("a.csv")), "text/csv");
        assert_eq!(content_type_for(Path::new("a.PNG")), "image/png");
        assert_eq!(
            content_type_for(Path::new("a.webm")),
            "application/octet-stream"
        );
        assert_eq!(
            content_type_for(Path::new("no_extension")),
            "application/octet-stream"
        );
    }

    #[derive(Default)]
    struct RecordingStore {
        uploads: Mutex<Vec<(String, String)>>,
        fail_names: Vec<String>,
    }

    #[async_trait]
    impl ObjectStore for RecordingStore {
        async fn create_file(
            &self,
            name: &str,
            content_type: &str,
            _folder_id: &str,
            _bytes: Vec<u8>,
        ) -> Result<String, UploadError> {
            if self.fail_names.iter().any(|failing| failing == name) {
                return Err(UploadError::Rejected(503));
            }
            self.uploads
                .lock()
                .unwrap()
                .push((name.to_string(), content_type.to_string()));
            Ok(format!("remote-{name}"))
        }
    }

    #[tokio::test]
    async fn one_failed_upload_never_stops_the_rest() {
        let dir = tempdir().unwrap();
        for name in ["01_a.png", "02_b.png", "export.csv"] {
            std::fs::write(dir.path().join(name), b"data").unwrap();
        }
        let artifacts = crate::artifact::scan_artifacts(dir.path()).unwrap();

        let store = Arc::new(RecordingStore {
            fail_names: vec!["01_a.png".into()],
            ..Default::default()
        });
        let uploader = ArchivalUploader::new(store.clone(), "folder-1".into());
        let report = uploader.archive_all(&artifacts).await;

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].name, "01_a.png");
        assert_eq!(report.uploaded.len(), 2);
        let uploads = store.uploads.lock().unwrap();
        assert!(uploads.contains(&("export.csv".into(), "text/csv".into())));
        assert!(uploads.contains(&("02_b.png".into(), "image/png".into())));
    }

    #[tokio::test]
    async fn missing_artifact_reports_a_read_failure() {
        let store = Arc::new(RecordingStore::default());
        let uploader = ArchivalUploader::new(store, "folder-1".into());
        let artifact = Artifact::from_path("/nonexistent/gone.csv");
        let err = uploader.upload(&artifact).await.unwrap_err();
        assert!(matches!(err, UploadError::Read(_)));
    }
}
