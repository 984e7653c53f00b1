//! On-disk cache of cloned git repositories.
//!
//! The cache root holds one directory per repository URL, named by a
//! deterministic [`keys::cache_key`]. [`RepositoryCache`] is the sole writer
//! under the root: it creates and removes entries, clones and fetches through
//! a [`tf_core::git::GitRunner`], validates the resulting working copies and
//! sweeps entries that have not been touched for a while.

pub mod clone;
pub mod engine;
pub mod fs_stats;
pub mod keys;
pub mod lock;
pub mod template;
pub mod types;
pub mod validate;

pub use engine::RepositoryCache;
pub use types::*;
