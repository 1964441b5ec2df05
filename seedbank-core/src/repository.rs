use crate::catalog::{ListFilter, PackageStore};
use crate::config::RepositoryConfig;
use crate::doi::{DoiService, HttpDoiService};
use crate::error::{Result, SeedbankError};
use crate::model::{DataPackage, DataPackageFile, Doi, PackageDraft, UpdateMode};
use crate::operations::{
    CreatePackageOperation, CreatePackageRequest, DeletePackageOperation, DeletePackageRequest,
    ReadPackageOperation, UpdatePackageOperation, UpdatePackageRequest,
};
use crate::storage::{FileInput, FileStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Per-key mutex table so writes against the same package serialize while
/// writes against different packages proceed concurrently. Entries are
/// created on demand and never reaped; the table is bounded by the number
/// of distinct keys written in the process lifetime.
struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock(&self, key: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.locks.lock().await;
            table
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Facade over the whole package lifecycle. Holds the stores and the DOI
/// service once and wires them into the individual operations.
pub struct PackageRepository {
    file_store: Arc<FileStore>,
    catalog: Arc<PackageStore>,
    create_op: CreatePackageOperation,
    update_op: UpdatePackageOperation,
    delete_op: DeletePackageOperation,
    read_op: ReadPackageOperation,
    key_locks: KeyLocks,
}

impl PackageRepository {
    pub fn new(
        file_store: Arc<FileStore>,
        catalog: Arc<PackageStore>,
        doi_service: Arc<dyn DoiService>,
    ) -> Self {
        let create_op = CreatePackageOperation::new(
            file_store.clone(),
            catalog.clone(),
            doi_service.clone(),
        );
        let update_op = UpdatePackageOperation::new(
            file_store.clone(),
            catalog.clone(),
            doi_service.clone(),
        );
        let delete_op =
            DeletePackageOperation::new(file_store.clone(), catalog.clone(), doi_service);
        let read_op = ReadPackageOperation::new(file_store.clone(), catalog.clone());

        Self {
            file_store,
            catalog,
            create_op,
            update_op,
            delete_op,
            read_op,
            key_locks: KeyLocks::new(),
        }
    }

    pub fn from_config(config: &RepositoryConfig) -> Result<Self> {
        let doi = config
            .doi
            .clone()
            .ok_or_else(|| SeedbankError::Config("missing doi section".to_string()))?;
        let file_store = Arc::new(FileStore::new(config.storage.data_dir.clone())?);
        let catalog = Arc::new(PackageStore::new(config.catalog.db_path.clone())?);
        let doi_service: Arc<dyn DoiService> = Arc::new(HttpDoiService::new(doi)?);
        Ok(Self::new(file_store, catalog, doi_service))
    }

    pub fn file_store(&self) -> &Arc<FileStore> {
        &self.file_store
    }

    pub async fn create_package(
        &self,
        draft: PackageDraft,
        files: Vec<FileInput>,
        generate_doi: bool,
    ) -> Result<DataPackage> {
        self.create_op
            .run(CreatePackageRequest {
                draft,
                files,
                generate_doi,
            })
            .await
    }

    pub async fn update_package(
        &self,
        key: &str,
        draft: PackageDraft,
        files: Vec<FileInput>,
        mode: UpdateMode,
    ) -> Result<DataPackage> {
        let _guard = self.key_locks.lock(key).await;
        self.update_op
            .run(UpdatePackageRequest {
                key: key.to_string(),
                draft,
                files,
                mode,
            })
            .await
    }

    pub async fn delete_package(&self, key: &str) -> Result<()> {
        let _guard = self.key_locks.lock(key).await;
        self.delete_op
            .run(DeletePackageRequest {
                key: key.to_string(),
            })
            .await
    }

    /// Soft delete. The package stays resolvable by key and DOI but drops
    /// out of default listings; blobs and catalog rows are untouched.
    pub async fn archive_package(&self, key: &str) -> Result<()> {
        let _guard = self.key_locks.lock(key).await;
        self.catalog.archive(key)
    }

    pub fn get_package(&self, key: &str) -> Result<Option<DataPackage>> {
        self.read_op.get(key)
    }

    pub fn get_package_by_doi(&self, doi: &Doi) -> Result<Option<DataPackage>> {
        self.read_op.get_by_doi(doi)
    }

    pub fn get_package_by_alternative_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<DataPackage>> {
        self.read_op.get_by_alternative_identifier(identifier)
    }

    pub fn list_packages(&self, filter: &ListFilter) -> Result<(Vec<DataPackage>, u64)> {
        self.read_op.list(filter)
    }

    pub fn get_package_file(
        &self,
        key: &str,
        file_name: &str,
    ) -> Result<Option<DataPackageFile>> {
        self.read_op.get_file(key, file_name)
    }

    pub async fn open_package_file(
        &self,
        key: &str,
        file_name: &str,
    ) -> Result<Option<tokio::fs::File>> {
        self.read_op.open_file(key, file_name).await
    }
}
