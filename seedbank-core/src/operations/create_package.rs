use super::{normalize_creators, to_package_file, validate_draft, validate_file_inputs};
use crate::catalog::PackageStore;
use crate::checksum;
use crate::doi::{render_citation, render_metadata, DoiService};
use crate::error::{Result, SeedbankError};
use crate::model::{DataPackage, PackageDraft};
use crate::storage::{FileInput, FileSource, FileStore, METADATA_FILE_NAME};
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use ulid::Ulid;

#[derive(Clone)]
pub struct CreatePackageOperation {
    file_store: Arc<FileStore>,
    catalog: Arc<PackageStore>,
    doi_service: Arc<dyn DoiService>,
}

#[derive(Debug, Clone)]
pub struct CreatePackageRequest {
    pub draft: PackageDraft,
    pub files: Vec<FileInput>,
    /// When false the package is created without an external DOI.
    pub generate_doi: bool,
}

impl CreatePackageOperation {
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

    pub async fn run(&self, request: CreatePackageRequest) -> Result<DataPackage> {
        validate_draft(&request.draft)?;
        validate_file_inputs(&request.files)?;

        // Uniqueness is checked before anything is written, so a conflict
        // needs no rollback.
        for alternative in request.draft.alternative_identifiers() {
            if self
                .catalog
                .is_alternative_identifier_in_use(&alternative.identifier, None)?
            {
                return Err(SeedbankError::Conflict(format!(
                    "alternative identifier {} is already in use",
                    alternative.identifier
                )));
            }
        }

        let key = Ulid::new().to_string();

        match self.execute(&key, request).await {
            Ok(pkg) => {
                tracing::info!("Created package {} (doi: {:?})", key, pkg.doi);
                Ok(pkg)
            }
            Err(error) => {
                tracing::warn!("Create of package {} failed, rolling back: {}", key, error);
                if let Err(cleanup) = self.file_store.delete(&key).await {
                    tracing::warn!("Rollback of package {} blobs failed: {}", key, cleanup);
                }
                if let Err(cleanup) = self.catalog.delete(&key) {
                    tracing::warn!("Rollback of package {} catalog rows failed: {}", key, cleanup);
                }
                Err(error)
            }
        }
    }

    async fn execute(&self, key: &str, request: CreatePackageRequest) -> Result<DataPackage> {
        let CreatePackageRequest {
            draft,
            files,
            generate_doi,
        } = request;

        let now = Utc::now();

        let mut stored = Vec::with_capacity(files.len());
        for input in &files {
            stored.push(
                self.file_store
                    .store(key, &input.file_name, &input.source)
                    .await?,
            );
        }
        stored.sort_by(|a, b| a.file_name.cmp(&b.file_name));

        let size = stored.iter().map(|f| f.size).sum();
        let checksums: Vec<&str> = stored.iter().map(|f| f.checksum.as_str()).collect();
        let checksum = checksum::combine(&checksums);

        let creators = normalize_creators(draft.creators)?;

        let mut pkg = DataPackage {
            key: key.to_string(),
            doi: None,
            title: draft.title,
            description: draft.description,
            license: draft.license,
            created_by: draft.created_by,
            created: now,
            modified: now,
            deleted: None,
            size,
            checksum,
            citation: None,
            files: stored.iter().map(to_package_file).collect(),
            creators,
            tags: draft.tags,
            related_identifiers: draft.related_identifiers,
        };

        if generate_doi {
            let metadata = render_metadata(&pkg)?;
            let doi = self
                .doi_service
                .register(&metadata, &pkg.created_by, None)
                .await?;
            pkg.doi = Some(doi);
        }

        // The stored document echoes the freshly minted DOI.
        let metadata = render_metadata(&pkg)?;
        self.file_store
            .store(key, METADATA_FILE_NAME, &FileSource::Bytes(Bytes::from(metadata)))
            .await?;

        pkg.citation = Some(render_citation(&pkg));
        self.catalog.create(&pkg)?;

        self.catalog
            .get(key)?
            .ok_or_else(|| SeedbankError::Fatal(format!("package {} vanished after create", key)))
    }
}
