//! Deterministic names and labels for mirror resources.
//!
//! A mirror is named `<repository>-<discriminator>`, so the same remote
//! entity always maps to the same mirror and repeated syncs stay idempotent.

/// Label carried by every mirror, holding the local repository name.
pub const REPOSITORY_LABEL: &str = "git.flanksource.com/repository";

/// Label holding the branch name of a branch mirror.
pub const BRANCH_LABEL: &str = "git.flanksource.com/branch";

/// Label holding the deployment name of a deployment mirror.
pub const DEPLOYMENT_LABEL: &str = "git.flanksource.com/deployment";

/// Mirror name for a branch.
#[must_use]
pub fn branch_mirror_name(repository: &str, branch: &str) -> String {
    format!("{repository}-{branch}")
}

/// Mirror name for a pull request.
#[must_use]
pub fn pull_request_mirror_name(repository: &str, id: u64) -> String {
    format!("{repository}-{id}")
}

/// Mirror name for a deployment of `git_ref` named `name`.
#[must_use]
pub fn deployment_mirror_name(repository: &str, name: &str, git_ref: &str) -> String {
    format!("{repository}-{name}-{git_ref}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_deterministic() {
        assert_eq!(branch_mirror_name("infra", "feature-x"), "infra-feature-x");
        assert_eq!(
            branch_mirror_name("infra", "feature-x"),
            branch_mirror_name("infra", "feature-x")
        );
        assert_eq!(pull_request_mirror_name("infra", 42), "infra-42");
        assert_eq!(
            deployment_mirror_name("infra", "deploy", "main"),
            "infra-deploy-main"
        );
    }

    #[test]
    fn test_repository_scopes_names() {
        assert_ne!(
            branch_mirror_name("infra", "main"),
            branch_mirror_name("apps", "main")
        );
    }
}
