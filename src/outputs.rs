use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use log::info;
use serde::Serialize;

use crate::error::Result;
use crate::prune::PruneReport;

/// The two step outputs a workflow can read back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Outputs {
    pub versions_deleted: String,
    pub total_deleted: usize,
}

impl Outputs {
    pub fn from_report(report: &PruneReport) -> Self {
        if report.dry_run {
            return Outputs::default();
        }
        Outputs {
            versions_deleted: report.deleted.join(" "),
            total_deleted: report.deleted.len(),
        }
    }

    /// Appends `name=value` lines to a `GITHUB_OUTPUT` style file.
    pub fn write_github_output(&self, path: &Path) -> Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "versions_deleted={}", self.versions_deleted)?;
        writeln!(file, "total_deleted={}", self.total_deleted)?;
        Ok(())
    }

    pub fn log(&self) {
        info!("versions_deleted={:?}", self.versions_deleted);
        info!("total_deleted={}", self.total_deleted);
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// `::error::` workflow command, escaped so the message stays on one line.
pub fn workflow_error(message: &str) -> String {
    let escaped = message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A");
    format!("::error::{}", escaped)
}
