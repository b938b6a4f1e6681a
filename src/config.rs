use std::fmt::{Debug, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::debug;
use regex::Regex;
use serde::Deserialize;

use crate::error::{PruneError, Result};
use crate::versions::age_cutoff;

pub const DEFAULT_GCLOUD: &str = if cfg!(windows) { "gcloud.cmd" } else { "gcloud" };

/// Optional YAML defaults. Flags and environment variables win over these.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub project_id: Option<String>,
    pub service_name: Option<String>,
    pub limit: Option<i64>,
    pub apply_limit_after_days: Option<i64>,
    pub gcloud_path: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PruneError::config(format!("unable to read {}: {}", path.display(), e))
        })?;
        let file: FileConfig = serde_yaml::from_str(&content)?;
        debug!("loaded config file {}: {:?}", path.display(), file);
        Ok(file)
    }
}

/// Inputs exactly as received from flags or the environment.
#[derive(Clone, Default)]
pub struct RawInputs {
    pub project_id: Option<String>,
    pub service_name: Option<String>,
    pub limit: Option<String>,
    pub apply_limit_after_days: Option<String>,
    pub credentials: Option<String>,
    pub credentials_file: Option<PathBuf>,
    pub gcloud_path: Option<String>,
    pub github_output: Option<PathBuf>,
}

/// Which versions a run looks at and how many of them survive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub project_id: Option<String>,
    pub service_name: Option<String>,
    pub limit: i64,
    pub apply_limit_after_days: i64,
}

#[derive(Clone)]
pub struct Config {
    pub target: Target,
    pub credentials: Option<String>,
    pub credentials_file: Option<PathBuf>,
    pub gcloud_path: String,
    pub github_output: Option<PathBuf>,
}

impl Debug for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("target", &self.target)
            .field("credentials", &self.credentials.as_ref().map(|_| "<redacted>"))
            .field("credentials_file", &self.credentials_file)
            .field("gcloud_path", &self.gcloud_path)
            .field("github_output", &self.github_output)
            .finish()
    }
}

/// Actions runners pass unset inputs as empty strings.
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_number(name: &str, value: &str) -> Result<i64> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| PruneError::config(format!("{} must be an integer, got {:?}", name, value)))
}

/// 6 to 30 characters, with an optional `domain:` prefix for domain-scoped projects.
const PROJECT_ID_PATTERN: &str = r"^(?:[a-z][a-z0-9.-]*[a-z0-9]:)?[a-z][a-z0-9-]{4,28}[a-z0-9]$";

pub fn validate_project_id(project_id: &str) -> Result<()> {
    let re = Regex::new(PROJECT_ID_PATTERN)?;
    if !re.is_match(project_id) {
        return Err(PruneError::config(format!(
            "{:?} is not a valid project id",
            project_id
        )));
    }
    Ok(())
}

impl Config {
    pub fn resolve(raw: RawInputs, file: FileConfig) -> Result<Self> {
        let project_id = non_empty(raw.project_id).or_else(|| non_empty(file.project_id));
        if let Some(project_id) = &project_id {
            validate_project_id(project_id)?;
        }

        let limit = match non_empty(raw.limit) {
            Some(limit) => parse_number("limit", &limit)?,
            None => file
                .limit
                .ok_or_else(|| PruneError::config("limit is required"))?,
        };

        let apply_limit_after_days = match non_empty(raw.apply_limit_after_days) {
            Some(days) => parse_number("apply_limit_after_days", &days)?,
            None => file.apply_limit_after_days.unwrap_or(0),
        };
        age_cutoff(Utc::now().date_naive(), apply_limit_after_days)?;

        let gcloud_path = non_empty(raw.gcloud_path)
            .or_else(|| non_empty(file.gcloud_path))
            .unwrap_or_else(|| DEFAULT_GCLOUD.to_string());

        Ok(Config {
            target: Target {
                project_id,
                service_name: non_empty(raw.service_name).or_else(|| non_empty(file.service_name)),
                limit,
                apply_limit_after_days,
            },
            credentials: non_empty(raw.credentials),
            credentials_file: raw.credentials_file.filter(|p| !p.as_os_str().is_empty()),
            gcloud_path,
            github_output: raw.github_output.filter(|p| !p.as_os_str().is_empty()),
        })
    }
}
