//! Seedbank Core - Core library for a metadata and file repository for
//! scientific data packages
//!
//! A package couples descriptive metadata with a set of content files
//! and an optional registered DOI, using:
//! - SHA-256 checksums per file and combined per package
//! - SQLite for the package catalog
//! - A filesystem blob store with one directory per package
//! - An HMAC-signed HTTP client for the external DOI service

pub mod catalog;
pub mod checksum;
pub mod config;
pub mod doi;
pub mod error;
pub mod identifier;
pub mod model;
pub mod operations;
pub mod repository;
pub mod storage;

pub use catalog::{ListFilter, PackageStore};
pub use checksum::{combine, digest, digest_file};
pub use config::{CatalogConfig, RepositoryConfig, StorageConfig};
pub use doi::{render_citation, render_metadata, DoiService, DoiStatus, HttpDoiService, HttpDoiServiceConfig};
pub use error::{Result, SeedbankError};
pub use identifier::{validator_for, IdentifierValidator};
pub use model::{
    Creator, DataPackage, DataPackageFile, Doi, IdentifierScheme, IdentifierType, License,
    PackageDraft, RelatedIdentifier, RelationType, Tag, UpdateMode,
};
pub use operations::{
    CreatePackageOperation, CreatePackageRequest, DeletePackageOperation, DeletePackageRequest,
    ReadPackageOperation, UpdatePackageOperation, UpdatePackageRequest,
};
pub use repository::PackageRepository;
pub use storage::{FileInput, FileSource, FileStore, StoredFile, METADATA_FILE_NAME};
