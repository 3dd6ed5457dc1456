//! # gitward-core
//!
//! Core library for gitward.
//!
//! Two engines live here:
//!
//! - the entity synchronizer ([`sync`]), which mirrors a hosted repository's
//!   branches, pull requests and deployments into local resources and pushes
//!   local intent back;
//! - the patch orchestrator ([`patch`]), which merges or deletes objects in a
//!   kustomize tree and publishes the result as one commit, optionally behind
//!   a pull request.
//!
//! Both talk to repositories only through [`Connector`].

pub mod config;
pub mod connector;
pub mod error;
pub mod identity;
pub mod kustomize;
pub mod locator;
pub mod merge;
pub mod mirror;
pub mod object;
pub mod patch;
pub mod secrets;
pub mod store;
pub mod sync;
pub mod template;

#[cfg(test)]
mod test_mocks;

pub use config::{ApiConfig, Config, RepositoryConfig};
pub use connector::{AnyConnector, Connector, ConnectorOptions, PullRequestTemplate, WorkingTree};
pub use error::{Error, ErrorKind, Result};
pub use mirror::{MirrorBranch, MirrorDeployment, MirrorPullRequest, RepoScope};
pub use object::{BodyFormat, ObjectKey, RepoObject, parse_objects};
pub use patch::{GitOpsRequest, Operation, Orchestrator, PatchOutcome};
pub use secrets::{Secret, SecretStore};
pub use store::{FileMirrorStore, MirrorStore};
pub use sync::SyncReport;
