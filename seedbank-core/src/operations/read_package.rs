use crate::catalog::{ListFilter, PackageStore};
use crate::error::{Result, SeedbankError};
use crate::model::{DataPackage, DataPackageFile, Doi};
use crate::storage::FileStore;
use std::sync::Arc;

/// Pure reads. Absence is a normal empty result on every path here; a
/// package whose catalog and blob state have diverged degrades to "file
/// not found" rather than erroring.
#[derive(Clone)]
pub struct ReadPackageOperation {
    file_store: Arc<FileStore>,
    catalog: Arc<PackageStore>,
}

impl ReadPackageOperation {
    pub fn new(file_store: Arc<FileStore>, catalog: Arc<PackageStore>) -> Self {
        Self {
            file_store,
            catalog,
        }
    }

    pub fn get(&self, key: &str) -> Result<Option<DataPackage>> {
        self.catalog.get(key)
    }

    pub fn get_by_doi(&self, doi: &Doi) -> Result<Option<DataPackage>> {
        self.catalog.get_by_doi(doi)
    }

    pub fn get_by_alternative_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<DataPackage>> {
        self.catalog.get_by_alternative_identifier(identifier)
    }

    pub fn list(&self, filter: &ListFilter) -> Result<(Vec<DataPackage>, u64)> {
        self.catalog.list(filter)
    }

    /// The catalog record of one file, if both the package and the record
    /// exist.
    pub fn get_file(&self, key: &str, file_name: &str) -> Result<Option<DataPackageFile>> {
        let Some(pkg) = self.catalog.get(key)? else {
            return Ok(None);
        };
        Ok(pkg.files.into_iter().find(|f| f.file_name == file_name))
    }

    /// Open the blob behind a file record for streaming.
    pub async fn open_file(
        &self,
        key: &str,
        file_name: &str,
    ) -> Result<Option<tokio::fs::File>> {
        let Some(file) = self.get_file(key, file_name)? else {
            return Ok(None);
        };

        match self.file_store.open(key, &file.file_name).await {
            Ok(stream) => Ok(Some(stream)),
            Err(SeedbankError::NotFound(_)) => {
                tracing::warn!(
                    "Catalog lists file {} for package {} but the blob is missing",
                    file_name,
                    key
                );
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }
}
