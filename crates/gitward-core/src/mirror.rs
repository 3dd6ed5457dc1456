//! Mirror resources: local records of remote branches, pull requests and
//! deployments.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use gitward_hosting::{Branch, Deployment, PullRequest, Review};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::identity::{
    BRANCH_LABEL, DEPLOYMENT_LABEL, REPOSITORY_LABEL, branch_mirror_name,
    deployment_mirror_name, pull_request_mirror_name,
};

/// Repository a set of mirrors belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoScope {
    /// Local repository name, used in mirror names and the repository label.
    pub name: String,
    /// Namespace the mirrors live in.
    pub namespace: String,
    /// Remote full name (`owner/repo` or `project/repo`).
    pub full_name: String,
}

impl RepoScope {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        full_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            full_name: full_name.into(),
        }
    }

    fn metadata(&self, name: String, extra: &[(&str, &str)]) -> ObjectMeta {
        let mut labels = BTreeMap::new();
        labels.insert(REPOSITORY_LABEL.to_string(), self.name.clone());
        for (k, v) in extra {
            labels.insert((*k).to_string(), (*v).to_string());
        }

        ObjectMeta {
            name,
            namespace: self.namespace.clone(),
            labels,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Spec types name the directory their mirrors are stored under.
pub trait MirrorSpec {
    const KIND: &'static str;
}

/// A mirror resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mirror<S, T> {
    pub metadata: ObjectMeta,
    pub spec: S,
    #[serde(default)]
    pub status: T,
}

/// Anything a [`MirrorStore`](crate::store::MirrorStore) can persist.
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync {
    const KIND: &'static str;

    fn metadata(&self) -> &ObjectMeta;
}

impl<S, T> Resource for Mirror<S, T>
where
    S: MirrorSpec + Serialize + DeserializeOwned + Clone + Send + Sync,
    T: Serialize + DeserializeOwned + Clone + Default + Send + Sync,
{
    const KIND: &'static str = S::KIND;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

// === Branch ===

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchSpec {
    pub repository: String,
    pub branch_name: String,
}

impl MirrorSpec for BranchSpec {
    const KIND: &'static str = "GitBranch";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchStatus {
    #[serde(default)]
    pub head: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

pub type MirrorBranch = Mirror<BranchSpec, BranchStatus>;

impl MirrorBranch {
    #[must_use]
    pub fn from_remote(scope: &RepoScope, branch: &Branch) -> Self {
        Self {
            metadata: scope.metadata(
                branch_mirror_name(&scope.name, &branch.name),
                &[(BRANCH_LABEL, &branch.name)],
            ),
            spec: BranchSpec {
                repository: scope.full_name.clone(),
                branch_name: branch.name.clone(),
            },
            status: BranchStatus {
                head: branch.sha.clone(),
                last_updated: Some(Utc::now()),
            },
        }
    }
}

// === Pull request ===

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestSpec {
    pub repository: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    /// Source branch; `owner:branch` when the PR comes from a fork.
    pub head: String,
    pub base: String,
    #[serde(default)]
    pub sha: String,
    #[serde(default)]
    pub fork: String,
    #[serde(default)]
    pub reviewers: Vec<String>,
}

impl MirrorSpec for PullRequestSpec {
    const KIND: &'static str = "GitPullRequest";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestStatus {
    /// Remote id; `None` until the pull request exists remotely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, rename = "ref")]
    pub ref_name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub approvers: BTreeMap<String, bool>,
}

pub type MirrorPullRequest = Mirror<PullRequestSpec, PullRequestStatus>;

/// Ref under which a hosted pull request's head is published.
#[must_use]
pub fn pull_request_ref(id: u64) -> String {
    format!("refs/pull/{id}/head")
}

impl MirrorPullRequest {
    /// Build a mirror from an open pull request and the reviews left on it.
    ///
    /// Reviewers are the requested reviewers followed by review authors.
    /// An author's last review decides their approval.
    #[must_use]
    pub fn from_remote(scope: &RepoScope, pr: &PullRequest, reviews: &[Review]) -> Self {
        let mut reviewers = pr.requested_reviewers.clone();
        let mut approvers = BTreeMap::new();
        for review in reviews {
            if !reviewers.contains(&review.author) {
                reviewers.push(review.author.clone());
            }
            approvers.insert(review.author.clone(), review.state.is_approval());
        }

        let fork = pr.head_repo.clone().unwrap_or_default();
        let head = match fork.split_once('/') {
            Some((owner, _)) if fork != scope.full_name => format!("{owner}:{}", pr.head_branch),
            _ => pr.head_branch.clone(),
        };

        Self {
            metadata: scope.metadata(pull_request_mirror_name(&scope.name, pr.number), &[]),
            spec: PullRequestSpec {
                repository: scope.full_name.clone(),
                title: pr.title.clone(),
                body: pr.body.clone().unwrap_or_default(),
                head,
                base: pr.base_branch.clone(),
                sha: pr.head_sha.clone(),
                fork,
                reviewers,
            },
            status: PullRequestStatus {
                id: Some(pr.number),
                ref_name: pull_request_ref(pr.number),
                url: pr.diff_url.clone(),
                author: pr.author.clone(),
                approvers,
            },
        }
    }
}

// === Deployment ===

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    #[serde(rename = "ref")]
    pub ref_name: String,
    #[serde(default)]
    pub sha: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub auto_merge: bool,
}

impl MirrorSpec for DeploymentSpec {
    const KIND: &'static str = "GitDeployment";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatus {
    #[serde(default, rename = "ref")]
    pub ref_name: String,
    #[serde(default)]
    pub sha: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub deployment_link: String,
    #[serde(default)]
    pub status_link: String,
}

impl DeploymentStatus {
    #[must_use]
    pub fn from_remote(deployment: &Deployment) -> Self {
        Self {
            ref_name: deployment.ref_name.clone(),
            sha: deployment.sha.clone(),
            id: Some(deployment.id),
            name: deployment.task.clone(),
            environment: deployment.environment.clone(),
            deployment_link: deployment.url.clone(),
            status_link: deployment.statuses_url.clone(),
        }
    }
}

pub type MirrorDeployment = Mirror<DeploymentSpec, DeploymentStatus>;

impl MirrorDeployment {
    #[must_use]
    pub fn from_remote(scope: &RepoScope, deployment: &Deployment) -> Self {
        let git_ref = deployment
            .symbolic_ref()
            .unwrap_or(&deployment.ref_name)
            .to_string();
        Self {
            metadata: scope.metadata(
                deployment_mirror_name(&scope.name, &deployment.task, &git_ref),
                &[(DEPLOYMENT_LABEL, &deployment.task)],
            ),
            spec: DeploymentSpec {
                ref_name: git_ref,
                sha: deployment.sha.clone(),
                name: deployment.task.clone(),
                id: Some(deployment.id),
                environment: deployment.environment.clone(),
                description: deployment.description.clone().unwrap_or_default(),
                auto_merge: false,
            },
            status: DeploymentStatus::from_remote(deployment),
        }
    }

    /// Identity of a deployment within its repository.
    #[must_use]
    pub fn key(&self) -> (String, String) {
        (self.spec.name.clone(), self.spec.ref_name.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use gitward_hosting::{PullRequestState, ReviewState};

    fn scope() -> RepoScope {
        RepoScope::new("infra", "default", "acme/infra")
    }

    fn pr(head_repo: Option<&str>) -> PullRequest {
        PullRequest {
            number: 7,
            title: "Bump".into(),
            body: None,
            state: PullRequestState::Open,
            draft: false,
            head_branch: "bump".into(),
            head_sha: "abc123".into(),
            head_repo: head_repo.map(String::from),
            base_branch: "main".into(),
            html_url: "https://github.com/acme/infra/pull/7".into(),
            diff_url: "https://github.com/acme/infra/pull/7.diff".into(),
            author: "octocat".into(),
            requested_reviewers: vec!["alice".into()],
        }
    }

    #[test]
    fn test_branch_mirror_from_remote() {
        let mirror = MirrorBranch::from_remote(
            &scope(),
            &Branch {
                name: "feature-x".into(),
                sha: "abc123".into(),
            },
        );

        assert_eq!(mirror.metadata.name, "infra-feature-x");
        assert_eq!(mirror.metadata.labels[REPOSITORY_LABEL], "infra");
        assert_eq!(mirror.metadata.labels[BRANCH_LABEL], "feature-x");
        assert_eq!(mirror.spec.branch_name, "feature-x");
        assert_eq!(mirror.status.head, "abc123");
    }

    #[test]
    fn test_pull_request_reviewers_and_approvers() {
        let reviews = [
            Review {
                author: "bob".into(),
                state: ReviewState::ChangesRequested,
            },
            Review {
                author: "alice".into(),
                state: ReviewState::Approved,
            },
            Review {
                author: "bob".into(),
                state: ReviewState::Approved,
            },
        ];

        let mirror = MirrorPullRequest::from_remote(&scope(), &pr(Some("acme/infra")), &reviews);

        assert_eq!(mirror.metadata.name, "infra-7");
        assert_eq!(mirror.spec.reviewers, ["alice", "bob"]);
        assert!(mirror.status.approvers["alice"]);
        assert!(mirror.status.approvers["bob"]);
        assert_eq!(mirror.status.id, Some(7));
        assert_eq!(mirror.status.ref_name, "refs/pull/7/head");
        assert_eq!(mirror.spec.head, "bump");
    }

    #[test]
    fn test_fork_head_is_prefixed_with_owner() {
        let mirror = MirrorPullRequest::from_remote(&scope(), &pr(Some("someone/infra")), &[]);
        assert_eq!(mirror.spec.head, "someone:bump");
        assert_eq!(mirror.spec.fork, "someone/infra");
    }

    #[test]
    fn test_deployment_mirror_from_remote() {
        let deployment = Deployment {
            id: 3,
            task: "deploy".into(),
            ref_name: "main".into(),
            sha: "abc123".into(),
            environment: "production".into(),
            description: None,
            url: "https://api.github.com/repos/acme/infra/deployments/3".into(),
            statuses_url: "https://api.github.com/repos/acme/infra/deployments/3/statuses".into(),
            payload: serde_json::Value::Null,
        };

        let mirror = MirrorDeployment::from_remote(&scope(), &deployment);

        assert_eq!(mirror.metadata.name, "infra-deploy-main");
        assert_eq!(mirror.metadata.labels[DEPLOYMENT_LABEL], "deploy");
        assert_eq!(mirror.spec.id, Some(3));
        assert_eq!(mirror.status.status_link, deployment.statuses_url);
        assert_eq!(mirror.key(), ("deploy".to_string(), "main".to_string()));
    }

    #[test]
    fn test_pinned_deployment_keeps_symbolic_key() {
        let deployment = Deployment {
            id: 4,
            task: "deploy".into(),
            ref_name: "def456".into(),
            sha: "def456".into(),
            environment: "production".into(),
            description: None,
            url: "https://api.github.com/repos/acme/infra/deployments/4".into(),
            statuses_url: "https://api.github.com/repos/acme/infra/deployments/4/statuses".into(),
            payload: serde_json::json!({ "ref": "main" }),
        };

        let mirror = MirrorDeployment::from_remote(&scope(), &deployment);

        assert_eq!(mirror.metadata.name, "infra-deploy-main");
        assert_eq!(mirror.key(), ("deploy".to_string(), "main".to_string()));
        assert_eq!(mirror.spec.sha, "def456");
        assert_eq!(mirror.status.ref_name, "def456");
    }

    #[test]
    fn test_serialized_field_names() {
        let mirror = MirrorBranch::from_remote(
            &scope(),
            &Branch {
                name: "main".into(),
                sha: "abc".into(),
            },
        );
        let json = serde_json::to_value(&mirror).unwrap();
        assert_eq!(json["spec"]["branchName"], "main");
        assert!(json["status"]["lastUpdated"].is_string());
    }
}
