//! Bounded polling for the server-side export landing in the download
//! directory. The browser gives no download-complete signal, so the
//! collector watches the filesystem instead.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::DownloadSection;

use super::error::BrowserResult;

#[derive(Debug, Clone)]
pub struct CollectOutcome {
    /// First matching file whose size held steady across two polls, if any.
    pub path: Option<PathBuf>,
    pub attempts: usize,
}

#[derive(Debug, Clone)]
pub struct FileCollector {
    dir: PathBuf,
    extension: String,
    initial_settle: Duration,
    poll_interval: Duration,
    max_polls: usize,
}

impl FileCollector {
    pub fn new(dir: PathBuf, downloads: &DownloadSection) -> Self {
        Self {
            dir,
            extension: downloads.export_extension.clone(),
            initial_settle: Duration::from_secs(downloads.initial_settle_seconds),
            poll_interval: Duration::from_secs(downloads.poll_interval_seconds),
            max_polls: downloads.max_polls,
        }
    }

    /// Poll until a matching file appears with a stable size, or the attempt
    /// budget runs out. A deadline elapsing is a `None` path, not an error.
    pub async fn await_file(&self) -> BrowserResult<CollectOutcome> {
        sleep(self.initial_settle).await;
        let mut attempts = 0usize;
        let mut last_seen: Option<(PathBuf, u64)> = None;
        while attempts < self.max_polls {
            attempts += 1;
            match self.scan()? {
                Some(path) => {
                    let size = std::fs::metadata(&path)?.len();
                    match &last_seen {
                        Some((seen, stable)) if *seen == path && *stable == size => {
                            info!(path = %path.display(), size, attempts, "export file collected");
                            return Ok(CollectOutcome {
                                path: Some(path),
                                attempts,
                            });
                        }
                        _ => {
                            debug!(path = %path.display(), size, "export file still settling");
                            last_seen = Some((path, size));
                        }
                    }
                }
                None => last_seen = None,
            }
            sleep(self.poll_interval).await;
        }
        Ok(CollectOutcome {
            path: None,
            attempts,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn scan(&self) -> BrowserResult<Option<PathBuf>> {
        let mut matches: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.extension()
                    .map(|ext| ext.eq_ignore_ascii_case(self.extension.as_str()))
                    .unwrap_or(false)
            })
            .collect();
        matches.sort();
        Ok(matches.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn collector(dir: &Path, max_polls: usize) -> FileCollector {
        FileCollector {
            dir: dir.to_path_buf(),
            extension: "csv".into(),
            initial_settle: Duration::from_millis(10),
            poll_interval: Duration::from_millis(10),
            max_polls,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn empty_directory_exhausts_exactly_the_attempt_budget() {
        let dir = tempdir().unwrap();
        let outcome = collector(dir.path(), 7).await_file().await.unwrap();
        assert!(outcome.path.is_none());
        assert_eq!(outcome.attempts, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn stable_file_is_returned_on_the_second_sighting() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("export.csv"), b"a,b\n").unwrap();
        let outcome = collector(dir.path(), 30).await_file().await.unwrap();
        assert_eq!(
            outcome.path.as_deref(),
            Some(dir.path().join("export.csv").as_path())
        );
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn growing_file_is_held_back_until_its_size_repeats() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("export.csv");
        std::fs::write(&path, b"a,b\n").unwrap();

        let grower = path.clone();
        tokio::spawn(async move {
            // Lands between the first and second poll.
            sleep(Duration::from_millis(15)).await;
            std::fs::write(&grower, b"a,b\n1,2\n").unwrap();
        });

        let outcome = collector(dir.path(), 30).await_file().await.unwrap();
        assert_eq!(outcome.path, Some(path));
        // Poll 1 saw the small file, poll 2 saw it grown, poll 3 confirmed.
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_matching_extensions_are_ignored() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("shot.png"), b"img").unwrap();
        let outcome = collector(dir.path(), 3).await_file().await.unwrap();
        assert!(outcome.path.is_none());
        assert_eq!(outcome.attempts, 3);
    }
}
