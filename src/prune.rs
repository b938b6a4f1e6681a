use std::thread;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use log::{debug, info};

use crate::config::Target;
use crate::error::Result;
use crate::intent::Plan;
use crate::runner::CommandRunner;
use crate::versions::{delete_args, list_args, parse_versions};

/// Pause between listing and deleting. App Engine can still report a
/// just-listed version as transitioning and reject an immediate delete.
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneReport {
    pub dry_run: bool,
    /// Deleted versions, or the ones that would be deleted on a dry run.
    pub deleted: Vec<String>,
    pub kept: usize,
}

pub struct Pruner<'a, R: CommandRunner> {
    runner: &'a R,
    tool: String,
    settle_delay: Duration,
    today: NaiveDate,
}

impl<'a, R: CommandRunner> Pruner<'a, R> {
    pub fn new(runner: &'a R, tool: impl Into<String>) -> Self {
        Self {
            runner,
            tool: tool.into(),
            settle_delay: SETTLE_DELAY,
            today: Utc::now().date_naive(),
        }
    }

    #[cfg(test)]
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    #[cfg(test)]
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Non-serving versions of the target, oldest first.
    pub fn list_versions(&self, target: &Target) -> Result<Vec<String>> {
        let args = list_args(target, self.today)?;
        let output = self.runner.run_checked(&self.tool, &args)?;
        if !output.stderr.trim().is_empty() {
            debug!("{}", output.stderr.trim_end());
        }

        let versions = parse_versions(&output.stdout);
        info!("found {} non-serving versions", versions.len());
        Ok(versions)
    }

    pub fn plan(&self, target: &Target) -> Result<Plan> {
        let versions = self.list_versions(target)?;
        Ok(Plan::new(versions, target.limit))
    }

    pub fn prune(&self, target: &Target, dry_run: bool) -> Result<PruneReport> {
        let plan = self.plan(target)?;
        plan.print_tabled();

        let to_delete = plan.to_delete();
        let report = PruneReport {
            dry_run,
            deleted: to_delete,
            kept: plan.kept(),
        };

        if report.deleted.is_empty() {
            info!("No versions to delete, keeping {}.", report.kept);
            return Ok(report);
        }

        if dry_run {
            info!(
                "dry run, would delete {} versions: {}",
                report.deleted.len(),
                report.deleted.join(" ")
            );
            return Ok(report);
        }

        thread::sleep(self.settle_delay);

        info!(
            "Deleting {} versions, keeping {}: {}",
            report.deleted.len(),
            report.kept,
            report.deleted.join(" ")
        );
        let output = self
            .runner
            .run_checked(&self.tool, &delete_args(target, &report.deleted))?;
        if !output.stderr.trim().is_empty() {
            debug!("{}", output.stderr.trim_end());
        }

        Ok(report)
    }
}
