mod collector;
mod error;
mod locator;
mod session;
mod steps;

pub use collector::{CollectOutcome, FileCollector};
pub use error::{BrowserError, BrowserResult};
pub use locator::{marker_selector, probe_script, Locator, WaitCondition, MARKER_ATTRIBUTE};
pub use session::{authenticated_url, navigate, purge_download_dir, BrowserSession};
pub use steps::{
    dashboard_steps, ExecutionOutcome, ExecutionTerminal, FailurePolicy, Fallback, PageSurface,
    ResolvedTarget, Step, StepAction, StepExecutor, StepResult, StepStatus, StepSurface,
    WaitPolicy,
};
