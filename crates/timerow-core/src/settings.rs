use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::SourceKind;

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Normalize glucose-sensor exports and publish the canonical dataset
#[derive(Parser, Debug, Clone)]
#[command(
    name = "timerow",
    about = "Normalize glucose-sensor exports and publish the canonical dataset",
    version
)]
pub struct Settings {
    /// Repository checkout that holds the dataset
    #[arg(long, global = true, default_value = ".", env = "TIMEROW_PROJECT_DIR")]
    pub project_dir: PathBuf,

    /// Directory scanned for raw exports [default: <project-dir>/input]
    #[arg(long, global = true)]
    pub intake_dir: Option<PathBuf>,

    /// Directory holding the canonical dataset [default: <project-dir>/output]
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Credentials file [default: <project-dir>/secrets.json]
    #[arg(long, global = true)]
    pub secrets: Option<PathBuf>,

    /// Remote to push the dataset to
    #[arg(long, global = true, default_value = "origin")]
    pub remote: String,

    /// Branch to push the dataset to
    #[arg(long, global = true, default_value = "master")]
    pub branch: String,

    /// Width of the time-of-day buckets in minutes (1-1440)
    #[arg(long, global = true, default_value = "15", value_parser = clap::value_parser!(u32).range(1..=1440))]
    pub bucket_minutes: u32,

    /// Logging level
    #[arg(long, global = true, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,

    /// Log file path
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub action: Option<Action>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Process the raw export waiting in the intake directory and publish it
    Run {
        /// Stop after persisting; skip the version-control stage
        #[arg(long)]
        no_publish: bool,
        /// Print the structured outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Deliver a raw export to the intake directory and process it
    Submit {
        /// Raw export to deliver
        file: PathBuf,
        /// Print the structured outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Poll the intake directory and process exports as they arrive
    Watch {
        /// Seconds between intake scans
        #[arg(long, default_value = "10")]
        interval_secs: u64,
        /// Seconds between liveness messages
        #[arg(long, default_value = "300")]
        heartbeat_secs: u64,
    },
    /// Print a summary of the canonical dataset
    Summary,
    /// Print the typical-day profile
    Profile {
        /// Record type contributing to the statistic
        #[arg(long, value_enum, default_value_t = SourceKind::Scan)]
        kind: SourceKind,
        /// Print the profile as JSON
        #[arg(long)]
        json: bool,
    },
}

/// File name of the canonical dataset inside the output directory.
pub const DATASET_FILE_NAME: &str = "prepared_dataset.csv";

/// File name of the presentation views inside the output directory.
pub const VIEWS_FILE_NAME: &str = "views.json";

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse the process arguments and resolve derived values.
    pub fn load() -> Self {
        Self::load_from_args(std::env::args_os())
    }

    /// Same as [`Settings::load`] but accepts an explicit argument list.
    pub fn load_from_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::parse_from(args).resolve()
    }

    fn resolve(mut self) -> Self {
        self.project_dir = expand_home(&self.project_dir);
        self.intake_dir = self.intake_dir.as_deref().map(expand_home);
        self.output_dir = self.output_dir.as_deref().map(expand_home);
        self.secrets = self.secrets.as_deref().map(expand_home);
        self.log_file = self.log_file.as_deref().map(expand_home);

        // --debug overrides log level.
        if self.debug {
            self.log_level = "DEBUG".to_string();
        }
        self
    }

    /// Subcommand to execute; a bare invocation means `run`.
    pub fn action(&self) -> Action {
        self.action.clone().unwrap_or(Action::Run {
            no_publish: false,
            json: false,
        })
    }

    pub fn intake_dir(&self) -> PathBuf {
        self.intake_dir
            .clone()
            .unwrap_or_else(|| self.project_dir.join("input"))
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| self.project_dir.join("output"))
    }

    pub fn dataset_path(&self) -> PathBuf {
        self.output_dir().join(DATASET_FILE_NAME)
    }

    pub fn views_path(&self) -> PathBuf {
        self.output_dir().join(VIEWS_FILE_NAME)
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.secrets
            .clone()
            .unwrap_or_else(|| self.project_dir.join("secrets.json"))
    }

    pub fn bucket_size(&self) -> Duration {
        Duration::from_secs(u64::from(self.bucket_minutes) * 60)
    }
}

// ── Helper: home expansion ─────────────────────────────────────────────────────

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
