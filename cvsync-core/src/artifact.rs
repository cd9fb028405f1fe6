use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Screenshot,
    Export,
    Other,
}

impl ArtifactKind {
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("png") => ArtifactKind::Screenshot,
            Some("csv") => ArtifactKind::Export,
            _ => ArtifactKind::Other,
        }
    }
}

/// A file produced during the run. Written once, never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    pub produced_at: DateTime<Utc>,
}

impl Artifact {
    pub fn from_path<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        Self {
            kind: ArtifactKind::from_path(&path),
            produced_at: Utc::now(),
            path,
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Everything the run left in the output directory, in name order. Files
/// only; nested directories are not part of the run's artifact set.
pub fn scan_artifacts(dir: &Path) -> std::io::Result<Vec<Artifact>> {
    let mut artifacts: Vec<Artifact> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_file())
        .map(|entry| Artifact::from_path(entry.path()))
        .collect();
    artifacts.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn kind_follows_extension() {
        assert_eq!(
            ArtifactKind::from_path(Path::new("01_shot.PNG")),
            ArtifactKind::Screenshot
        );
        assert_eq!(
            ArtifactKind::from_path(Path::new("report.csv")),
            ArtifactKind::Export
        );
        assert_eq!(
            ArtifactKind::from_path(Path::new("notes.txt")),
            ArtifactKind::Other
        );
    }

    #[test]
    fn scan_lists_files_in_name_order_and_skips_directories() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("02_b.png"), b"x").unwrap();
        std::fs::write(dir.path().join("01_a.png"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/ignored.csv"), b"x").unwrap();

        let artifacts = scan_artifacts(dir.path()).unwrap();
        let names: Vec<String> = artifacts.iter().map(Artifact::file_name).collect();
        assert_eq!(names, vec!["01_a.png", "02_b.png"]);
    }
}
