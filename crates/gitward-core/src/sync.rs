//! Entity synchronizer.
//!
//! Each pass lists remote entities and local mirrors of one class, pairs them
//! by identity key and applies one rule per key:
//!
//! 1. remote only: create the mirror from the remote entity.
//! 2. local only: push the mirror's intent to the remote.
//! 3. both, observable fields differ: branches and pull requests take the
//!    remote state; deployments are re-created from the mirror, new one first.
//! 4. both, equal: nothing.
//!
//! Mirrors are never deleted. Branch passes keep going after a failed key;
//! pull request and deployment passes stop at the first failure.

use std::collections::{BTreeMap, BTreeSet};

use gitward_hosting::CreateDeployment;
use tracing::{debug, info, instrument, warn};

use crate::connector::{Connector, PullRequestTemplate};
use crate::error::{Error, Result};
use crate::mirror::{
    DeploymentStatus, MirrorBranch, MirrorDeployment, MirrorPullRequest, RepoScope,
    pull_request_ref,
};
use crate::store::MirrorStore;

/// Task name used when a deployment mirror leaves it empty.
const DEFAULT_DEPLOYMENT_TASK: &str = "deploy";

/// Environment used when a deployment mirror leaves it empty.
const DEFAULT_ENVIRONMENT: &str = "production";

/// Outcome counts of one pass over one entity class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Mirrors created from remote entities.
    pub created: usize,
    /// Local intents pushed to the remote.
    pub pushed: usize,
    /// Pairs brought back in line.
    pub updated: usize,
    /// Pairs already in line.
    pub unchanged: usize,
    /// Keys that failed (branch passes only; other passes stop instead).
    pub failed: Vec<String>,
}

impl SyncReport {
    /// Number of writes the pass performed, locally or remotely.
    #[must_use]
    pub const fn writes(&self) -> usize {
        self.created + self.pushed + self.updated
    }
}

// === Pairing ===

/// Where a key was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pair<'a, M> {
    RemoteOnly(&'a M),
    LocalOnly(&'a M),
    Both { remote: &'a M, local: &'a M },
}

/// Result of [`pair_by_key`].
#[derive(Debug)]
pub struct Pairing<'a, K, M> {
    /// One entry per key in the union of both sides, in key order.
    pub keyed: Vec<(K, Pair<'a, M>)>,
    /// Local items without a key yet.
    pub unkeyed: Vec<&'a M>,
}

/// Pair remote and local items by key.
///
/// The first item wins when a side holds a key twice. Local items whose key
/// is `None` are returned separately.
///
/// # Panics
/// Panics if a key drawn from the union of both sides is found on neither,
/// which cannot happen.
pub fn pair_by_key<'a, K, M>(
    remote: &'a [M],
    local: &'a [M],
    key: impl Fn(&M) -> Option<K>,
) -> Pairing<'a, K, M>
where
    K: Ord + Clone,
{
    let mut remote_by_key = BTreeMap::new();
    for item in remote {
        if let Some(k) = key(item) {
            remote_by_key.entry(k).or_insert(item);
        }
    }

    let mut local_by_key = BTreeMap::new();
    let mut unkeyed = Vec::new();
    for item in local {
        match key(item) {
            Some(k) => {
                local_by_key.entry(k).or_insert(item);
            }
            None => unkeyed.push(item),
        }
    }

    let keys: BTreeSet<K> = remote_by_key
        .keys()
        .chain(local_by_key.keys())
        .cloned()
        .collect();

    let keyed = keys
        .into_iter()
        .map(|k| {
            let pair = match (remote_by_key.get(&k), local_by_key.get(&k)) {
                (Some(&remote), Some(&local)) => Pair::Both { remote, local },
                (Some(&remote), None) => Pair::RemoteOnly(remote),
                (None, Some(&local)) => Pair::LocalOnly(local),
                (None, None) => unreachable!("key drawn from the union of both sides"),
            };
            (k, pair)
        })
        .collect();

    Pairing { keyed, unkeyed }
}

/// Copy remote spec and status onto the local mirror, keeping its metadata.
fn adopt_remote<S: Clone, T: Clone>(
    local: &crate::mirror::Mirror<S, T>,
    remote: &crate::mirror::Mirror<S, T>,
) -> crate::mirror::Mirror<S, T> {
    let mut next = local.clone();
    next.spec = remote.spec.clone();
    next.status = remote.status.clone();
    next
}

// === Branches ===

/// Reconcile branch mirrors. Continues past failed keys.
///
/// # Errors
/// Returns error only if a list call fails; per-key failures are collected
/// in [`SyncReport::failed`].
#[instrument(skip_all, fields(repository = %scope.name, backend = connector.backend()))]
pub async fn reconcile_branches<C, S>(
    connector: &C,
    store: &S,
    scope: &RepoScope,
) -> Result<SyncReport>
where
    C: Connector + ?Sized,
    S: MirrorStore,
{
    let remote: Vec<MirrorBranch> = connector
        .list_branches()
        .await?
        .iter()
        .map(|b| MirrorBranch::from_remote(scope, b))
        .collect();
    let local: Vec<MirrorBranch> = store.list(&scope.namespace, &scope.name)?;

    let pairing = pair_by_key(&remote, &local, |m| Some(m.spec.branch_name.clone()));
    let mut report = SyncReport::default();

    for (branch, pair) in pairing.keyed {
        let outcome = match pair {
            Pair::RemoteOnly(remote) => store.create(remote).map(|()| {
                info!(%branch, "branch mirrored");
                report.created += 1;
            }),
            Pair::LocalOnly(local) => {
                if local.status.head.is_empty() {
                    Err(Error::MissingHead(local.metadata.name.clone()))
                } else {
                    connector
                        .create_branch(&branch, &local.status.head)
                        .await
                        .map(|()| {
                            info!(%branch, head = %local.status.head, "branch created remotely");
                            report.pushed += 1;
                        })
                }
            }
            Pair::Both { remote, local } if remote.status.head != local.status.head => {
                store.update(&adopt_remote(local, remote)).map(|()| {
                    info!(%branch, head = %remote.status.head, "branch updated");
                    report.updated += 1;
                })
            }
            Pair::Both { .. } => {
                debug!(%branch, "branch did not change");
                report.unchanged += 1;
                Ok(())
            }
        };

        if let Err(e) = outcome {
            warn!(%branch, error = %e, "failed to reconcile branch");
            report.failed.push(branch);
        }
    }

    Ok(report)
}

// === Pull requests ===

/// Fields compared between a mirror and its pull request.
fn pull_request_differs(remote: &MirrorPullRequest, local: &MirrorPullRequest) -> bool {
    remote.spec != local.spec || remote.status != local.status
}

/// Reconcile pull request mirrors. Stops at the first failed key.
///
/// Mirrors without an id are opened remotely after all keyed pairs. A mirror
/// whose pull request is no longer open is left alone.
///
/// # Errors
/// Returns the first error encountered.
#[instrument(skip_all, fields(repository = %scope.name, backend = connector.backend()))]
pub async fn reconcile_pull_requests<C, S>(
    connector: &C,
    store: &S,
    scope: &RepoScope,
) -> Result<SyncReport>
where
    C: Connector + ?Sized,
    S: MirrorStore,
{
    let remote: Vec<MirrorPullRequest> = connector
        .list_pull_requests()
        .await?
        .iter()
        .map(|r| MirrorPullRequest::from_remote(scope, &r.pull_request, &r.reviews))
        .collect();
    let local: Vec<MirrorPullRequest> = store.list(&scope.namespace, &scope.name)?;

    let pairing = pair_by_key(&remote, &local, |m| m.status.id);
    let mut report = SyncReport::default();

    for (id, pair) in pairing.keyed {
        match pair {
            Pair::RemoteOnly(remote) => {
                store.create(remote)?;
                info!(id, "pull request mirrored");
                report.created += 1;
            }
            Pair::LocalOnly(local) => {
                debug!(id, mirror = %local.metadata.name, "pull request no longer open");
                report.unchanged += 1;
            }
            Pair::Both { remote, local } if pull_request_differs(remote, local) => {
                store.update(&adopt_remote(local, remote))?;
                info!(id, "pull request updated");
                report.updated += 1;
            }
            Pair::Both { .. } => {
                debug!(id, "pull request did not change");
                report.unchanged += 1;
            }
        }
    }

    for local in pairing.unkeyed {
        let template = PullRequestTemplate {
            title: local.spec.title.clone(),
            body: local.spec.body.clone(),
            reviewers: local.spec.reviewers.clone(),
            assignees: Vec::new(),
        };
        let id = connector
            .open_pull_request(&local.spec.base, &local.spec.head, &template)
            .await?;

        let mut next = local.clone();
        next.status.id = Some(id);
        next.status.ref_name = pull_request_ref(id);
        next.status.url = connector.pull_request_url(id);
        store.update(&next)?;

        info!(id, mirror = %local.metadata.name, "pull request opened remotely");
        report.pushed += 1;
    }

    Ok(report)
}

// === Deployments ===

fn deployment_request(mirror: &MirrorDeployment) -> CreateDeployment {
    let or_default = |value: &str, default: &str| {
        if value.is_empty() {
            default.to_string()
        } else {
            value.to_string()
        }
    };

    // A pinned SHA is deployed as the ref; the symbolic ref rides in the
    // payload so the mirror key survives the round trip.
    let pinned = !mirror.spec.sha.is_empty();
    let ref_name = if pinned {
        &mirror.spec.sha
    } else {
        &mirror.spec.ref_name
    };

    CreateDeployment {
        ref_name: ref_name.clone(),
        task: or_default(&mirror.spec.name, DEFAULT_DEPLOYMENT_TASK),
        environment: or_default(&mirror.spec.environment, DEFAULT_ENVIRONMENT),
        description: (!mirror.spec.description.is_empty()).then(|| mirror.spec.description.clone()),
        auto_merge: mirror.spec.auto_merge && !pinned,
        required_contexts: Vec::new(),
        payload: pinned.then(|| serde_json::json!({ "ref": mirror.spec.ref_name })),
    }
}

/// Fields of the mirror's intent that a deployment cannot be updated to.
fn deployment_differs(remote: &MirrorDeployment, local: &MirrorDeployment) -> bool {
    remote.spec.sha != local.spec.sha
        || remote.spec.environment != local.spec.environment
        || remote.spec.description != local.spec.description
}

/// Create a deployment from the mirror's spec and write the result back.
async fn deploy<C, S>(connector: &C, store: &S, local: &MirrorDeployment) -> Result<u64>
where
    C: Connector + ?Sized,
    S: MirrorStore,
{
    let created = connector
        .create_deployment(&deployment_request(local))
        .await?;

    let mut next = local.clone();
    next.spec.id = Some(created.id);
    if next.spec.sha.is_empty() {
        next.spec.sha.clone_from(&created.sha);
    }
    next.status = DeploymentStatus::from_remote(&created);
    store.update(&next)?;

    Ok(created.id)
}

/// Reconcile deployment mirrors. Stops at the first failed key.
///
/// Deployments cannot be updated in place, so a changed mirror gets a new
/// deployment and the old one is deleted afterwards.
///
/// # Errors
/// Returns the first error encountered.
#[instrument(skip_all, fields(repository = %scope.name, backend = connector.backend()))]
pub async fn reconcile_deployments<C, S>(
    connector: &C,
    store: &S,
    scope: &RepoScope,
) -> Result<SyncReport>
where
    C: Connector + ?Sized,
    S: MirrorStore,
{
    let remote: Vec<MirrorDeployment> = connector
        .list_deployments()
        .await?
        .iter()
        .map(|d| MirrorDeployment::from_remote(scope, d))
        .collect();
    let local: Vec<MirrorDeployment> = store.list(&scope.namespace, &scope.name)?;

    let pairing = pair_by_key(&remote, &local, |m| Some(m.key()));
    let mut report = SyncReport::default();

    for ((name, git_ref), pair) in pairing.keyed {
        match pair {
            Pair::RemoteOnly(remote) => {
                store.create(remote)?;
                info!(%name, %git_ref, "deployment mirrored");
                report.created += 1;
            }
            Pair::LocalOnly(local) => {
                let id = deploy(connector, store, local).await?;
                info!(%name, %git_ref, id, "deployment created remotely");
                report.pushed += 1;
            }
            Pair::Both { remote, local } if deployment_differs(remote, local) => {
                let id = deploy(connector, store, local).await?;
                if let Some(old) = remote.spec.id {
                    connector.delete_deployment(old).await?;
                }
                info!(%name, %git_ref, id, old = ?remote.spec.id, "deployment replaced");
                report.updated += 1;
            }
            Pair::Both { .. } => {
                debug!(%name, %git_ref, "deployment did not change");
                report.unchanged += 1;
            }
        }
    }

    Ok(report)
}
