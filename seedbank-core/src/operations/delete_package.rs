use crate::catalog::PackageStore;
use crate::doi::DoiService;
use crate::error::Result;
use crate::storage::FileStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct DeletePackageOperation {
    file_store: Arc<FileStore>,
    catalog: Arc<PackageStore>,
    doi_service: Arc<dyn DoiService>,
}

#[derive(Debug, Clone)]
pub struct DeletePackageRequest {
    pub key: String,
}

impl DeletePackageOperation {
    pub fn new(
        file_store: Arc<FileStore>,
        catalog: Arc<PackageStore>,
        doi_service: Arc<dyn DoiService>,
    ) -> Self {
        Self {
            file_store,
            catalog,
            doi_service,
        }
    }

    /// Hard delete. Catalog rows go first so a concurrent reader never
    /// sees a row pointing at a missing blob directory; DOI deregistration
    /// and blob removal are best-effort so local cleanup always completes.
    /// Safe to call on an already-deleted key.
    pub async fn run(&self, request: DeletePackageRequest) -> Result<()> {
        let DeletePackageRequest { key } = request;

        match self.catalog.get(&key)? {
            Some(pkg) => {
                self.catalog.delete(&key)?;

                if let Some(doi) = &pkg.doi {
                    if let Err(error) = self.doi_service.delete(doi).await {
                        tracing::warn!("Failed to deregister DOI {}: {}", doi, error);
                    }
                }
            }
            None => {
                tracing::debug!("Package {} not in catalog, removing blobs only", key);
            }
        }

        if let Err(error) = self.file_store.delete(&key).await {
            tracing::warn!("Failed to remove blob directory for {}: {}", key, error);
        }

        tracing::info!("Deleted package {}", key);
        Ok(())
    }
}
