use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunnerConfig {
    pub dashboard: DashboardSection,
    pub credentials: CredentialSection,
    pub chromium: ChromiumSection,
    pub downloads: DownloadSection,
    pub waits: WaitSection,
    pub selectors: SelectorSection,
    pub sheets: SheetSection,
    pub drive: DriveSection,
}

impl RunnerConfig {
    pub fn resolve_path<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(path)
        }
    }

    /// Fold `CVSYNC_*` environment values into the loaded file. Called once
    /// at startup; components never read the environment themselves.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("CVSYNC_TARGET_URL") {
            self.dashboard.url = value;
        }
        if let Ok(value) = std::env::var("CVSYNC_PARTNER") {
            self.dashboard.partner = value;
        }
        if let Ok(value) = std::env::var("CVSYNC_USER_ID") {
            self.credentials.user_id = value;
        }
        if let Ok(value) = std::env::var("CVSYNC_USER_PASS") {
            self.credentials.password = value;
        }
        if let Ok(value) = std::env::var("CVSYNC_SERVICE_ACCOUNT_JSON") {
            self.credentials.service_account_json = Some(value);
        }
        if let Ok(value) = std::env::var("CVSYNC_SPREADSHEET_ID") {
            self.sheets.spreadsheet_id = value;
        }
        if let Ok(value) = std::env::var("CVSYNC_SHEET_RANGE") {
            self.sheets.range = value;
        }
        if let Ok(value) = std::env::var("CVSYNC_DRIVE_FOLDER_ID") {
            self.drive.folder_id = value;
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardSection {
    pub url: String,
    pub partner: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialSection {
    pub user_id: String,
    pub password: String,
    /// Path to the service-account key file.
    pub service_account_key: String,
    /// Inline key material; takes precedence over the file when set.
    #[serde(default)]
    pub service_account_json: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChromiumSection {
    pub executable_path: String,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub window: [u32; 2],
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadSection {
    pub dir: String,
    pub export_extension: String,
    pub initial_settle_seconds: u64,
    pub poll_interval_seconds: u64,
    pub max_polls: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaitSection {
    pub element_timeout_seconds: u64,
    pub poll_interval_ms: u64,
    pub scroll_settle_ms: u64,
    /// Settle after the first and second login navigation.
    pub login_settle_seconds: [u64; 2],
    pub filter_settle_ms: u64,
    pub preset_settle_ms: u64,
    pub focus_settle_ms: u64,
    /// The suggestion list has no readiness signal; this is the tunable
    /// delay before the commit keystroke.
    pub typeahead_settle_ms: u64,
    pub commit_settle_ms: u64,
    pub results_settle_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectorSection {
    pub filter_open: Vec<String>,
    pub date_preset: Vec<String>,
    pub partner_label: String,
    pub partner_placeholder: String,
    pub submit_labels: Vec<String>,
    pub export_labels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SheetSection {
    pub endpoint: String,
    pub spreadsheet_id: String,
    pub range: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriveSection {
    pub endpoint: String,
    pub folder_id: String,
}

pub fn load_runner_config<P: AsRef<Path>>(path: P) -> Result<RunnerConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> RunnerConfig {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/cvsync.toml");
        load_runner_config(path).expect("config should parse")
    }

    #[test]
    fn load_fixture_config() {
        let config = fixture();
        assert_eq!(config.selectors.filter_open, vec!["#searchFormOpen"]);
        assert_eq!(config.waits.element_timeout_seconds, 20);
        assert_eq!(config.downloads.max_polls, 30);
        assert_eq!(config.sheets.range, "test今月_raw");
    }

    #[test]
    fn env_overrides_take_precedence() {
        let mut config = fixture();
        std::env::set_var("CVSYNC_SPREADSHEET_ID", "override-sheet");
        std::env::set_var("CVSYNC_PARTNER", "override-partner");
        config.apply_env_overrides();
        std::env::remove_var("CVSYNC_SPREADSHEET_ID");
        std::env::remove_var("CVSYNC_PARTNER");
        assert_eq!(config.sheets.spreadsheet_id, "override-sheet");
        assert_eq!(config.dashboard.partner, "override-partner");
        assert_eq!(config.sheets.range, "test今月_raw");
    }
}
