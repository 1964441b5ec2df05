//! Blob storage for Seedbank.
//!
//! One directory per package key, one file per stored blob plus the
//! reserved metadata document.

pub mod file_store;

pub use file_store::{
    FileInput, FileSource, FileStore, StoredFile, METADATA_FILE_NAME,
};
