//! Periodic reconciliation of configured repositories.

use std::sync::Arc;

use gitward_core::{Connector, Error, RepositoryConfig, Result, SyncReport};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::Workspace;

/// Results of one pass over one repository.
///
/// A class is `None` when the repository's backend does not support it.
#[derive(Debug, Clone, Default)]
pub struct RepositoryReport {
    pub name: String,
    pub branches: Option<SyncReport>,
    pub pull_requests: Option<SyncReport>,
    pub deployments: Option<SyncReport>,
}

impl RepositoryReport {
    /// Keys that failed in any class.
    #[must_use]
    pub fn failed(&self) -> usize {
        [&self.branches, &self.pull_requests, &self.deployments]
            .into_iter()
            .flatten()
            .map(|r| r.failed.len())
            .sum()
    }
}

/// Turn `NotImplemented` into "not supported" so the other classes still run.
fn skip_unsupported(class: &str, result: Result<SyncReport>) -> Result<Option<SyncReport>> {
    match result {
        Ok(report) => Ok(Some(report)),
        Err(e @ Error::NotImplemented { .. }) => {
            debug!(class, "skipping: {e}");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Reconcile branches, pull requests and deployments of one repository.
///
/// # Errors
/// Returns the first error that stops a class. Per-branch failures are
/// reported in [`SyncReport::failed`] instead.
pub async fn reconcile_repository(
    ws: &Workspace,
    repo: &RepositoryConfig,
) -> Result<RepositoryReport> {
    let connector = ws.repository_connector(repo)?;
    let scope = connector.scope(&repo.name, &repo.namespace);

    let branches = skip_unsupported(
        "branches",
        connector.reconcile_branches(&ws.store, &scope).await,
    )?;
    let pull_requests = skip_unsupported(
        "pull requests",
        connector.reconcile_pull_requests(&ws.store, &scope).await,
    )?;
    let deployments = if repo.deployments {
        skip_unsupported(
            "deployments",
            connector.reconcile_deployments(&ws.store, &scope).await,
        )?
    } else {
        None
    };

    let report = RepositoryReport {
        name: repo.name.clone(),
        branches,
        pull_requests,
        deployments,
    };
    info!(
        repository = %repo.name,
        backend = connector.backend(),
        failed = report.failed(),
        "reconciled"
    );
    Ok(report)
}

/// Reconcile every configured repository concurrently, one task each.
///
/// Results come back in configuration order. A failing repository does not
/// affect the others.
pub async fn reconcile_all(
    ws: Arc<Workspace>,
    only: Option<&str>,
) -> Vec<(String, Result<RepositoryReport>)> {
    let mut tasks = JoinSet::new();
    for (index, repo) in ws.config.repositories.iter().enumerate() {
        if only.is_some_and(|name| name != repo.name) {
            continue;
        }
        let ws = Arc::clone(&ws);
        let repo = repo.clone();
        tasks.spawn(async move {
            let result = reconcile_repository(&ws, &repo).await;
            if let Err(e) = &result {
                warn!(repository = %repo.name, "reconcile failed: {e}");
            }
            (index, repo.name, result)
        });
    }

    let mut results = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => warn!("reconcile task panicked: {e}"),
        }
    }
    results.sort_by_key(|(index, _, _)| *index);
    results
        .into_iter()
        .map(|(_, name, result)| (name, result))
        .collect()
}
