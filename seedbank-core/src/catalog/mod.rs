//! Relational catalog of data packages.
//!
//! Persists the aggregate root plus its child record sets and answers the
//! point lookups, paged listings and the alternative-identifier uniqueness
//! check the lifecycle operations depend on.

pub mod package_store;

pub use package_store::{ListFilter, PackageStore};
