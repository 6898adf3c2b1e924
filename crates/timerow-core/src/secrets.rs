//! Publish credentials loaded from a local `secrets.json`.
//!
//! A missing file is replaced by a placeholder for the operator to fill in and
//! the load fails; credentials are never silently defaulted.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TimerowError};

pub const PLACEHOLDER_TELEGRAM_TOKEN: &str = "YOUR_TELEGRAM_TOKEN";
pub const PLACEHOLDER_GITHUB_TOKEN: &str = "YOUR_GITHUB_TOKEN";

/// Channel token and publish credential.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secrets {
    /// Token of the messaging bot that delivers raw exports.
    pub telegram_token: String,
    /// Credential embedded into the remote URL for the duration of a push.
    pub github_token: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("telegram_token", &"***")
            .field("github_token", &"***")
            .finish()
    }
}

impl Secrets {
    pub fn placeholder() -> Self {
        Self {
            telegram_token: PLACEHOLDER_TELEGRAM_TOKEN.to_string(),
            github_token: PLACEHOLDER_GITHUB_TOKEN.to_string(),
        }
    }

    /// Load secrets from `path`.
    ///
    /// When the file does not exist a placeholder is written in its place and
    /// a [`TimerowError::Config`] is returned.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if !path.exists() {
            Self::placeholder().save_to(path)?;
            tracing::warn!("Secrets file not found; placeholder written to {}", path.display());
            return Err(TimerowError::Config(format!(
                "created {}; fill in telegram_token and github_token",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            TimerowError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let secrets: Secrets = serde_json::from_str(&content).map_err(|e| {
            TimerowError::Config(format!("cannot parse {}: {}", path.display(), e))
        })?;
        secrets.validate()?;
        Ok(secrets)
    }

    fn validate(&self) -> Result<()> {
        for (name, value, placeholder) in [
            (
                "telegram_token",
                &self.telegram_token,
                PLACEHOLDER_TELEGRAM_TOKEN,
            ),
            ("github_token", &self.github_token, PLACEHOLDER_GITHUB_TOKEN),
        ] {
            if value.trim().is_empty() || value == placeholder {
                return Err(TimerowError::Config(format!("{} is not set", name)));
            }
        }
        Ok(())
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

fn url_credentials() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(https?://)[^/@\s]+@").expect("regex is valid"))
}

/// Strip credentials from text before it is logged or shown to an operator.
///
/// Removes the userinfo part of any http(s) URL and every literal occurrence
/// of `secret`.
pub fn redact(text: &str, secret: Option<&str>) -> String {
    let mut out = url_credentials().replace_all(text, "${1}***@").into_owned();
    if let Some(secret) = secret.filter(|s| !s.is_empty()) {
        out = out.replace(secret, "***");
    }
    out
}
