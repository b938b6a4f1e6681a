use chrono::{Days, NaiveDate};

use crate::config::Target;
use crate::error::{PruneError, Result};

/// Only versions that receive no traffic are candidates.
pub const NON_SERVING_FILTER: &str = "traffic_split=0";

/// Cutoff date for the age filter, or `None` when the filter is disabled.
///
/// A cutoff before the earliest representable date is an error; the filter
/// is never dropped for a positive `days`.
pub fn age_cutoff(today: NaiveDate, days: i64) -> Result<Option<NaiveDate>> {
    if days <= 0 {
        return Ok(None);
    }
    let cutoff = u64::try_from(days)
        .ok()
        .and_then(|days| today.checked_sub_days(Days::new(days)))
        .ok_or_else(|| {
            PruneError::config(format!(
                "apply_limit_after_days {} is out of range",
                days
            ))
        })?;
    Ok(Some(cutoff))
}

pub fn list_filter(today: NaiveDate, apply_limit_after_days: i64) -> Result<String> {
    let filter = match age_cutoff(today, apply_limit_after_days)? {
        None => NON_SERVING_FILTER.to_string(),
        Some(cutoff) => format!(
            "{} AND version.createTime.date('%Y-%m-%d', Z)<'{}'",
            NON_SERVING_FILTER,
            cutoff.format("%Y-%m-%d")
        ),
    };
    Ok(filter)
}

fn push_scope(args: &mut Vec<String>, target: &Target) {
    if let Some(project) = &target.project_id {
        args.push("--project".to_string());
        args.push(project.clone());
    }
    if let Some(service) = &target.service_name {
        args.push("--service".to_string());
        args.push(service.clone());
    }
}

/// Arguments for listing non-serving versions, oldest first.
pub fn list_args(target: &Target, today: NaiveDate) -> Result<Vec<String>> {
    let mut args = vec![
        "app".to_string(),
        "versions".to_string(),
        "list".to_string(),
        "--filter".to_string(),
        list_filter(today, target.apply_limit_after_days)?,
        "--format".to_string(),
        "value(id)".to_string(),
        "--sort-by".to_string(),
        "last_deployed_time".to_string(),
    ];
    push_scope(&mut args, target);
    Ok(args)
}

pub fn delete_args(target: &Target, versions: &[String]) -> Vec<String> {
    let mut args = vec!["app".to_string(), "versions".to_string(), "delete".to_string()];
    args.extend(versions.iter().cloned());
    args.push("--quiet".to_string());
    push_scope(&mut args, target);
    args
}

/// One version id per non-empty line. CR, LF and CRLF all end a line.
pub fn parse_versions(stdout: &str) -> Vec<String> {
    stdout
        .split(['\r', '\n'])
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
