//! `gitward sync` command - one reconciliation pass.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, bail};

use crate::output;
use crate::services::{Workspace, reconcile_all};

/// Run the sync command.
pub fn run(config: &Path, repository: Option<&str>) -> Result<()> {
    let ws = Workspace::load(config)?;

    if let Some(name) = repository {
        ws.config.repository(name)?;
    }
    if ws.config.repositories.is_empty() {
        output::info("No repositories configured");
        return Ok(());
    }

    let rt = tokio::runtime::Runtime::new()?;
    let results = rt.block_on(reconcile_all(Arc::new(ws), repository));

    let mut errors = 0;
    let mut failed_keys = 0;
    for (name, result) in results {
        match result {
            Ok(report) => {
                failed_keys += report.failed();
                output::success(&name);
                output::detail(&output::sync_line("branches", report.branches.as_ref()));
                output::detail(&output::sync_line(
                    "pull requests",
                    report.pull_requests.as_ref(),
                ));
                output::detail(&output::sync_line(
                    "deployments",
                    report.deployments.as_ref(),
                ));
            }
            Err(e) => {
                errors += 1;
                output::error(&format!("{name}: {e}"));
            }
        }
    }

    if errors > 0 {
        bail!("{errors} repository(ies) failed to sync");
    }
    if failed_keys > 0 {
        output::warn(&format!("{failed_keys} branch(es) failed, retried next pass"));
    }
    Ok(())
}
