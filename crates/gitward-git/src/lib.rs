//! # gitward-git
//!
//! Git working-tree layer for gitward, built on git2-rs.
//! Clones a remote at a ref, prepares a working branch, stages and commits
//! changes, and pushes them back with an explicit refspec.

mod credentials;
mod error;
mod repository;

pub use credentials::Credentials;
pub use error::{Error, Result};
pub use git2::Oid;
pub use repository::{Author, ORIGIN, RemoteHead, Repository};
