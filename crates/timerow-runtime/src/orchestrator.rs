//! Publish orchestrator.
//!
//! Runs one ingestion at a time through
//! `Idle → Parsing → Merging → Persisting → Diffing → Committing → Pushing → Reporting`,
//! dropping into `Failed` from any stage. Every run ends in a
//! [`PublishOutcome`]; errors never escape [`PublishOrchestrator::run`].
//!
//! The canonical dataset is durably persisted before any version-control
//! call, so a failed publish never loses ingested data. The raw export is
//! removed only after a successful persist.

use std::path::{Path, PathBuf};
use std::time::Duration;

use timerow_core::error::{ErrorKind, Result, TimerowError};
use timerow_core::models::{PublishOutcome, RunState};
use timerow_core::secrets::redact;
use timerow_data::history::{self, HistoryStore};
use timerow_data::parser;
use timerow_data::views::PresentationViews;
use tracing::{info, warn};

use crate::intake::find_raw_export;
use crate::vcs::{authenticated_url, VersionControl};

/// Commit message used for every dataset update.
pub const COMMIT_MESSAGE: &str = "Update dataset via bot";

// ── Configuration ─────────────────────────────────────────────────────────────

/// Publish credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Immutable settings for a [`PublishOrchestrator`].
#[derive(Debug, Clone)]
pub struct PublishConfig {
    /// Directory scanned when a run is not given an explicit file.
    pub intake_dir: PathBuf,
    /// Canonical dataset file.
    pub dataset_path: PathBuf,
    /// Where the presentation views are exported, if anywhere.
    pub views_path: Option<PathBuf>,
    pub bucket_size: Duration,
    pub remote: String,
    pub branch: String,
    pub commit_message: String,
    /// When `false` a run stops after persisting.
    pub publish: bool,
    /// Embedded into plain `https://` remotes for the duration of a push.
    pub credential: Option<Credential>,
}

impl PublishConfig {
    /// Defaults for a project checkout laid out as `input/` and `output/`.
    pub fn for_project(project_dir: &Path) -> Self {
        let output = project_dir.join("output");
        Self {
            intake_dir: project_dir.join("input"),
            dataset_path: output.join(timerow_core::settings::DATASET_FILE_NAME),
            views_path: Some(output.join(timerow_core::settings::VIEWS_FILE_NAME)),
            bucket_size: Duration::from_secs(15 * 60),
            remote: "origin".to_string(),
            branch: "master".to_string(),
            commit_message: COMMIT_MESSAGE.to_string(),
            publish: true,
            credential: None,
        }
    }
}

// ── PublishOrchestrator ───────────────────────────────────────────────────────

/// What a completed run did, before it is turned into an outcome.
#[derive(Debug, Default)]
struct RunReport {
    total: usize,
    added: usize,
    changed: bool,
    commit_ref: Option<String>,
}

/// Drives one raw export through parse, merge, persist and publish.
pub struct PublishOrchestrator {
    config: PublishConfig,
    vcs: Box<dyn VersionControl>,
    store: HistoryStore,
    state: RunState,
    transitions: Vec<RunState>,
}

impl PublishOrchestrator {
    pub fn new(config: PublishConfig, vcs: Box<dyn VersionControl>) -> Self {
        let store = HistoryStore::new(config.dataset_path.clone());
        Self {
            config,
            vcs,
            store,
            state: RunState::Idle,
            transitions: vec![RunState::Idle],
        }
    }

    pub fn config(&self) -> &PublishConfig {
        &self.config
    }

    /// States visited by the most recent run, starting with `Idle`.
    pub fn transitions(&self) -> &[RunState] {
        &self.transitions
    }

    /// Process `raw`, or the first export in the intake directory when `None`.
    pub fn run(&mut self, raw: Option<&Path>) -> PublishOutcome {
        self.state = RunState::Idle;
        self.transitions = vec![RunState::Idle];

        let result = self.execute(raw);
        match result {
            Ok(report) => {
                self.transition(RunState::Reporting);
                let outcome = PublishOutcome {
                    changed: report.changed,
                    message: self.success_message(&report),
                    commit_ref: report.commit_ref,
                    error: None,
                    state: RunState::Reporting,
                };
                info!(changed = outcome.changed, "{}", outcome.message);
                outcome
            }
            Err(err) if err.kind() == ErrorKind::NoInput => {
                // Nothing to do is a clean end, not a failure.
                self.transition(RunState::Reporting);
                let message = self.redacted(&err);
                info!("{}", message);
                PublishOutcome {
                    changed: false,
                    commit_ref: None,
                    error: Some(ErrorKind::NoInput),
                    state: RunState::Reporting,
                    message,
                }
            }
            Err(err) => {
                let failed_in = self.state;
                self.transition(RunState::Failed);
                let kind = err.kind();
                let mut message = format!("Error: {}", self.redacted(&err));
                if matches!(
                    failed_in,
                    RunState::Parsing | RunState::Merging | RunState::Persisting
                ) {
                    message.push_str(". The raw export was kept for resubmission");
                }
                warn!(error = %kind, stage = %failed_in, "{}", message);
                PublishOutcome {
                    changed: false,
                    commit_ref: None,
                    error: Some(kind),
                    state: RunState::Failed,
                    message,
                }
            }
        }
    }

    // ── Stages ────────────────────────────────────────────────────────────

    fn execute(&mut self, raw: Option<&Path>) -> Result<RunReport> {
        let raw_path = match raw {
            Some(path) => path.to_path_buf(),
            None => find_raw_export(&self.config.intake_dir)
                .ok_or_else(|| TimerowError::NoInput(self.config.intake_dir.clone()))?,
        };

        self.transition(RunState::Parsing);
        let incoming = parser::parse_file(&raw_path)?;
        info!(
            "Parsed {} readings from {}",
            incoming.len(),
            raw_path.display()
        );

        self.transition(RunState::Merging);
        let existing = self.store.load()?;
        let merged = history::merge(existing.clone(), incoming);
        let mut report = RunReport {
            total: merged.len(),
            added: merged.len().saturating_sub(existing.len()),
            changed: merged != existing,
            commit_ref: None,
        };

        self.transition(RunState::Persisting);
        self.store.persist(&merged)?;
        if let Err(e) = std::fs::remove_file(&raw_path) {
            warn!("Could not remove raw export {}: {}", raw_path.display(), e);
        } else {
            info!("Raw export {} removed", raw_path.display());
        }
        if let Some(views_path) = &self.config.views_path {
            let written = PresentationViews::build(&merged, self.config.bucket_size)
                .and_then(|views| views.write_to(views_path));
            if let Err(e) = written {
                warn!("Could not export views to {}: {}", views_path.display(), e);
            }
        }

        if !self.config.publish {
            return Ok(report);
        }

        self.transition(RunState::Diffing);
        report.changed = self.vcs.status(&self.config.dataset_path)?;
        if !report.changed {
            return Ok(report);
        }

        self.transition(RunState::Committing);
        self.vcs.add(&self.config.dataset_path)?;
        self.vcs.commit(&self.config.commit_message)?;
        report.commit_ref = match self.vcs.head_ref() {
            Ok(commit) => commit,
            Err(e) => {
                warn!("Could not read commit reference: {}", self.redacted(&e));
                None
            }
        };

        self.transition(RunState::Pushing);
        self.push()?;

        Ok(report)
    }

    /// Push, embedding the credential into the remote URL only for the
    /// duration of the call.
    fn push(&self) -> Result<()> {
        let remote = &self.config.remote;
        let branch = &self.config.branch;

        let Some(credential) = &self.config.credential else {
            return self.vcs.push(remote, branch);
        };
        let original = self.vcs.remote_url(remote)?;
        let Some(with_token) = authenticated_url(&original, credential.expose()) else {
            return self.vcs.push(remote, branch);
        };

        self.vcs.set_remote_url(remote, &with_token)?;
        let pushed = self.vcs.push(remote, branch);
        let restored = self.vcs.set_remote_url(remote, &original);
        pushed?;
        restored
    }

    // ── Helpers ───────────────────────────────────────────────────────────

    fn transition(&mut self, next: RunState) {
        debug_assert!(
            !self.state.is_terminal(),
            "no transition out of terminal state {}",
            self.state
        );
        info!(from = %self.state, to = %next, "run state");
        self.state = next;
        self.transitions.push(next);
    }

    fn redacted(&self, err: &TimerowError) -> String {
        redact(
            &err.to_string(),
            self.config.credential.as_ref().map(Credential::expose),
        )
    }

    fn success_message(&self, report: &RunReport) -> String {
        let base = format!(
            "Dataset holds {} readings ({} new)",
            report.total, report.added
        );
        match (&report.commit_ref, report.changed, self.config.publish) {
            (_, _, false) => format!("{}. Publishing skipped", base),
            (_, false, true) => format!("{}. Data processed, no changes to publish", base),
            (Some(commit), true, true) => format!(
                "{}. Changes published in commit {}",
                base,
                &commit[..commit.len().min(7)]
            ),
            (None, true, true) => format!("{}. Changes published", base),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
