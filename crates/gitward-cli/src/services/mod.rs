//! Services shared by the commands and the HTTP API.

pub mod reconcile;
pub mod workspace;

pub use reconcile::{RepositoryReport, reconcile_all, reconcile_repository};
pub use workspace::Workspace;
