//! The interaction sequence driving the dashboard UI.
//!
//! Steps are immutable descriptions; the executor owns all run state
//! (current index, result log, screenshot ordinal). Nothing flows backward
//! between steps except the page itself.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::page::{Page, ScreenshotParams};
use serde::Serialize;
use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{RunnerConfig, WaitSection};

use super::error::{BrowserError, BrowserResult};
use super::locator::{marker_selector, probe_script, Locator, WaitCondition};
use super::session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Failure is logged and the run proceeds to the next step.
    Tolerable,
    /// Failure ends the run; salvage still happens downstream.
    Abortive,
}

#[derive(Debug, Clone)]
pub enum StepAction {
    Click,
    /// Type a value into a search-style input and commit the auto-highlighted
    /// suggestion with Enter. The suggestion list exposes no readiness
    /// signal; `suggestion_settle` is the tunable gap before the commit.
    TypeAhead {
        value: String,
        focus_settle: Duration,
        suggestion_settle: Duration,
        commit_capture: Option<&'static str>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Send Enter to the focused element instead of failing the step.
    PressEnter,
}

#[derive(Debug, Clone)]
pub struct Step {
    pub name: &'static str,
    pub locators: Vec<Locator>,
    pub wait: WaitCondition,
    pub action: StepAction,
    pub on_failure: FailurePolicy,
    pub fallback: Option<Fallback>,
    pub capture_before: Option<&'static str>,
    pub capture_after: Option<&'static str>,
    pub pre_settle: Duration,
    pub post_settle: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub name: &'static str,
    pub status: StepStatus,
    /// Index of the locator that resolved, when one did.
    pub locator: Option<usize>,
    pub artifacts: Vec<PathBuf>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionTerminal {
    Completed,
    Aborted { step: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub terminal: ExecutionTerminal,
    pub results: Vec<StepResult>,
}

/// An element resolved by a probe, re-findable via its marker selector.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub selector: String,
    pub locator_index: usize,
}

/// The surface a step acts on. Production code drives a Chromium page;
/// tests substitute a scripted mock.
#[async_trait(?Send)]
pub trait StepSurface {
    async fn navigate(&mut self, url: &str) -> BrowserResult<()>;
    async fn probe(
        &mut self,
        step: &str,
        locators: &[Locator],
        wait: WaitCondition,
    ) -> BrowserResult<Option<ResolvedTarget>>;
    async fn scroll_into_view(&mut self, target: &ResolvedTarget) -> BrowserResult<()>;
    async fn highlight(&mut self, target: &ResolvedTarget) -> BrowserResult<()>;
    async fn click(&mut self, target: &ResolvedTarget) -> BrowserResult<()>;
    async fn type_text(&mut self, target: &ResolvedTarget, text: &str) -> BrowserResult<()>;
    async fn press_enter(&mut self) -> BrowserResult<()>;
    async fn capture_screenshot(&mut self, path: &Path) -> BrowserResult<()>;
}

pub struct PageSurface {
    page: Page,
}

impl PageSurface {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    async fn evaluate_on(&self, script: String) -> BrowserResult<()> {
        self.page.evaluate(script).await?;
        Ok(())
    }
}

#[async_trait(?Send)]
impl StepSurface for PageSurface {
    async fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        session::navigate(&self.page, url).await
    }

    async fn probe(
        &mut self,
        step: &str,
        locators: &[Locator],
        wait: WaitCondition,
    ) -> BrowserResult<Option<ResolvedTarget>> {
        let script = probe_script(step, locators, wait);
        let index: i64 = self
            .page
            .evaluate(script)
            .await?
            .into_value()
            .map_err(|err| BrowserError::Unexpected(format!("failed to decode probe result: {err}")))?;
        if index < 0 {
            Ok(None)
        } else {
            Ok(Some(ResolvedTarget {
                selector: marker_selector(step),
                locator_index: index as usize,
            }))
        }
    }

    async fn scroll_into_view(&mut self, target: &ResolvedTarget) -> BrowserResult<()> {
        self.evaluate_on(format!(
            "document.querySelector({sel})?.scrollIntoView({{block: 'center'}});",
            sel = json!(target.selector)
        ))
        .await
    }

    async fn highlight(&mut self, target: &ResolvedTarget) -> BrowserResult<()> {
        self.evaluate_on(format!(
            "document.querySelector({sel})?.setAttribute('style', \
             'border: 5px solid red; background-color: rgba(255, 0, 0, 0.5);');",
            sel = json!(target.selector)
        ))
        .await
    }

    async fn click(&mut self, target: &ResolvedTarget) -> BrowserResult<()> {
        let element = self.page.find_element(target.selector.clone()).await?;
        if let Err(err) = element.click().await {
            // Overlapping elements swallow native clicks; a script click
            // still reaches the handler.
            debug!(selector = %target.selector, error = %err, "native click failed, using script click");
            self.evaluate_on(format!(
                "document.querySelector({sel})?.click();",
                sel = json!(target.selector)
            ))
            .await?;
        }
        Ok(())
    }

    async fn type_text(&mut self, target: &ResolvedTarget, text: &str) -> BrowserResult<()> {
        let element = self.page.find_element(target.selector.clone()).await?;
        element.click().await?;
        element.type_str(text).await?;
        Ok(())
    }

    async fn press_enter(&mut self) -> BrowserResult<()> {
        // Commit keystrokes go to whatever currently holds focus.
        self.evaluate_on(format!(
            "document.querySelectorAll('[{marker}=\"__active\"]')
                .forEach(node => node.removeAttribute('{marker}'));
             document.activeElement?.setAttribute('{marker}', '__active');",
            marker = super::locator::MARKER_ATTRIBUTE
        ))
        .await?;
        let element = self
            .page
            .find_element(marker_selector("__active"))
            .await?;
        element.press_key("Enter").await?;
        Ok(())
    }

    async fn capture_screenshot(&mut self, path: &Path) -> BrowserResult<()> {
        let params = ScreenshotParams::builder().build();
        let bytes = self.page.screenshot(params).await?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct WaitPolicy {
    pub element_timeout: Duration,
    pub poll_interval: Duration,
}

impl WaitPolicy {
    pub fn from_section(waits: &WaitSection) -> Self {
        Self {
            element_timeout: Duration::from_secs(waits.element_timeout_seconds),
            poll_interval: Duration::from_millis(waits.poll_interval_ms),
        }
    }
}

pub struct StepExecutor {
    wait: WaitPolicy,
    artifact_dir: PathBuf,
    shot_seq: usize,
}

impl StepExecutor {
    pub fn new(wait: WaitPolicy, artifact_dir: PathBuf) -> Self {
        Self {
            wait,
            artifact_dir,
            shot_seq: 0,
        }
    }

    pub async fn execute<S: StepSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        steps: &[Step],
    ) -> ExecutionOutcome {
        let mut results = Vec::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            match self.run_step(surface, step).await {
                Ok(result) => {
                    info!(step = step.name, locator = ?result.locator, "step ok");
                    results.push(result);
                }
                Err(err) => {
                    warn!(step = step.name, error = %err, "step failed");
                    results.push(StepResult {
                        name: step.name,
                        status: StepStatus::Failed,
                        locator: None,
                        artifacts: Vec::new(),
                        error: Some(err.to_string()),
                    });
                    if step.on_failure == FailurePolicy::Abortive {
                        for skipped in &steps[index + 1..] {
                            results.push(StepResult {
                                name: skipped.name,
                                status: StepStatus::Skipped,
                                locator: None,
                                artifacts: Vec::new(),
                                error: None,
                            });
                        }
                        return ExecutionOutcome {
                            terminal: ExecutionTerminal::Aborted {
                                step: step.name.to_string(),
                            },
                            results,
                        };
                    }
                }
            }
        }
        ExecutionOutcome {
            terminal: ExecutionTerminal::Completed,
            results,
        }
    }

    async fn run_step<S: StepSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        step: &Step,
    ) -> BrowserResult<StepResult> {
        debug!(step = step.name, "locating target");
        let target = self.await_target(surface, step).await?;
        let mut artifacts = Vec::new();
        let locator_index = target.as_ref().map(|t| t.locator_index);

        match &target {
            Some(target) => {
                surface.scroll_into_view(target).await?;
                sleep(step.pre_settle).await;
                if let Some(label) = step.capture_before {
                    if let Err(err) = surface.highlight(target).await {
                        warn!(step = step.name, error = %err, "highlight failed");
                    }
                    if let Some(path) = self.capture(surface, label).await {
                        artifacts.push(path);
                    }
                }
                match &step.action {
                    StepAction::Click => surface.click(target).await?,
                    StepAction::TypeAhead {
                        value,
                        focus_settle,
                        suggestion_settle,
                        commit_capture,
                    } => {
                        surface.click(target).await?;
                        sleep(*focus_settle).await;
                        surface.type_text(target, value).await?;
                        sleep(*suggestion_settle).await;
                        if let Some(label) = commit_capture {
                            if let Some(path) = self.capture(surface, label).await {
                                artifacts.push(path);
                            }
                        }
                        surface.press_enter().await?;
                    }
                }
            }
            None => match step.fallback {
                Some(Fallback::PressEnter) => {
                    debug!(step = step.name, "no visible target, committing with Enter");
                    surface.press_enter().await?;
                }
                None => {
                    return Err(BrowserError::Timeout(format!("{} target", step.name)));
                }
            },
        }

        sleep(step.post_settle).await;
        if let Some(label) = step.capture_after {
            if let Some(path) = self.capture(surface, label).await {
                artifacts.push(path);
            }
        }
        Ok(StepResult {
            name: step.name,
            status: StepStatus::Ok,
            locator: locator_index,
            artifacts,
            error: None,
        })
    }

    /// Condition-poll for the first locator resolving to a usable element.
    /// Returns `None` once the bounded wait elapses without a match.
    async fn await_target<S: StepSurface + ?Sized>(
        &self,
        surface: &mut S,
        step: &Step,
    ) -> BrowserResult<Option<ResolvedTarget>> {
        let mut waited = Duration::ZERO;
        loop {
            if let Some(target) = surface.probe(step.name, &step.locators, step.wait).await? {
                return Ok(Some(target));
            }
            if waited >= self.wait.element_timeout {
                return Ok(None);
            }
            sleep(self.wait.poll_interval).await;
            waited += self.wait.poll_interval;
        }
    }

    /// Screenshots are audit trail, never control flow.
    async fn capture<S: StepSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        label: &str,
    ) -> Option<PathBuf> {
        self.shot_seq += 1;
        let path = self
            .artifact_dir
            .join(format!("{:02}_{}.png", self.shot_seq, label));
        match surface.capture_screenshot(&path).await {
            Ok(()) => Some(path),
            Err(err) => {
                warn!(label, error = %err, "failed to capture screenshot");
                None
            }
        }
    }
}

/// The fixed interaction sequence: open the filter panel, pick the relative
/// date preset, pick the partner through the type-ahead, submit, export.
pub fn dashboard_steps(config: &RunnerConfig) -> Vec<Step> {
    let waits = &config.waits;
    let selectors = &config.selectors;
    let scroll = Duration::from_millis(waits.scroll_settle_ms);
    vec![
        Step {
            name: "open_filter_panel",
            locators: selectors
                .filter_open
                .iter()
                .cloned()
                .map(Locator::Css)
                .collect(),
            wait: WaitCondition::Clickable,
            action: StepAction::Click,
            on_failure: FailurePolicy::Tolerable,
            fallback: None,
            capture_before: Some("before_filter_click"),
            capture_after: None,
            pre_settle: scroll,
            post_settle: Duration::from_millis(waits.filter_settle_ms),
        },
        Step {
            name: "choose_month_preset",
            locators: selectors
                .date_preset
                .iter()
                .cloned()
                .map(Locator::Css)
                .collect(),
            wait: WaitCondition::Clickable,
            action: StepAction::Click,
            on_failure: FailurePolicy::Tolerable,
            fallback: None,
            capture_before: Some("before_month_click"),
            capture_after: None,
            pre_settle: scroll,
            post_settle: Duration::from_millis(waits.preset_settle_ms),
        },
        Step {
            name: "choose_partner",
            locators: vec![Locator::LabelledInput {
                label: selectors.partner_label.clone(),
                placeholder: selectors.partner_placeholder.clone(),
            }],
            wait: WaitCondition::Clickable,
            action: StepAction::TypeAhead {
                value: config.dashboard.partner.clone(),
                focus_settle: Duration::from_millis(waits.focus_settle_ms),
                suggestion_settle: Duration::from_millis(waits.typeahead_settle_ms),
                commit_capture: Some("before_partner_commit"),
            },
            on_failure: FailurePolicy::Tolerable,
            fallback: None,
            capture_before: Some("before_partner_input"),
            capture_after: None,
            pre_settle: scroll,
            post_settle: Duration::from_millis(waits.commit_settle_ms),
        },
        Step {
            name: "submit_search",
            locators: selectors
                .submit_labels
                .iter()
                .map(|label| Locator::ActionControl {
                    label: label.clone(),
                })
                .collect(),
            wait: WaitCondition::Clickable,
            action: StepAction::Click,
            on_failure: FailurePolicy::Tolerable,
            fallback: Some(Fallback::PressEnter),
            capture_before: Some("before_search_submit"),
            capture_after: Some("search_results"),
            pre_settle: scroll,
            post_settle: Duration::from_secs(waits.results_settle_seconds),
        },
        Step {
            name: "trigger_export",
            locators: selectors
                .export_labels
                .iter()
                .map(|label| Locator::ActionControl {
                    label: label.clone(),
                })
                .collect(),
            wait: WaitCondition::Clickable,
            action: StepAction::Click,
            on_failure: FailurePolicy::Abortive,
            fallback: None,
            capture_before: Some("before_export_click"),
            capture_after: None,
            pre_settle: scroll,
            post_settle: Duration::ZERO,
        },
    ]
}
