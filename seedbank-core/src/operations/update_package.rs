use super::{normalize_creators, to_package_file, validate_draft, validate_file_inputs};
use crate::catalog::PackageStore;
use crate::checksum;
use crate::doi::{render_citation, render_metadata, DoiService};
use crate::error::{Result, SeedbankError};
use crate::model::{DataPackage, PackageDraft, UpdateMode};
use crate::storage::{FileInput, FileSource, FileStore, StoredFile, METADATA_FILE_NAME};
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;

#[derive(Clone)]
pub struct UpdatePackageOperation {
    file_store: Arc<FileStore>,
    catalog: Arc<PackageStore>,
    doi_service: Arc<dyn DoiService>,
}

#[derive(Debug, Clone)]
pub struct UpdatePackageRequest {
    pub key: String,
    pub draft: PackageDraft,
    pub files: Vec<FileInput>,
    pub mode: UpdateMode,
}

impl UpdatePackageOperation {
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

    pub async fn run(&self, request: UpdatePackageRequest) -> Result<DataPackage> {
        let UpdatePackageRequest {
            key,
            draft,
            files,
            mode,
        } = request;

        validate_draft(&draft)?;
        validate_file_inputs(&files)?;

        let existing = self
            .catalog
            .get(&key)?
            .ok_or_else(|| SeedbankError::NotFound(format!("package {}", key)))?;

        for alternative in draft.alternative_identifiers() {
            if self
                .catalog
                .is_alternative_identifier_in_use(&alternative.identifier, Some(&key))?
            {
                return Err(SeedbankError::Conflict(format!(
                    "alternative identifier {} is already in use",
                    alternative.identifier
                )));
            }
        }

        // Normalization happens before any blob is touched so a bad
        // creator identifier leaves the package untouched.
        let creators = normalize_creators(draft.creators)?;

        let stored = match mode {
            UpdateMode::Append => {
                let mut stored = Vec::with_capacity(files.len());
                for input in &files {
                    stored.push(
                        self.file_store
                            .store(&key, &input.file_name, &input.source)
                            .await?,
                    );
                }
                stored
            }
            UpdateMode::Overwrite => self.store_overwrite_set(&key, &files).await?,
        };

        // The resulting file set: retained plus new for APPEND (new wins
        // name collisions), new only for OVERWRITE.
        let mut resulting: Vec<_> = match mode {
            UpdateMode::Overwrite => stored.iter().map(to_package_file).collect(),
            UpdateMode::Append => {
                let mut resulting: Vec<_> = existing
                    .files
                    .iter()
                    .filter(|f| !stored.iter().any(|s| s.file_name == f.file_name))
                    .cloned()
                    .collect();
                resulting.extend(stored.iter().map(to_package_file));
                resulting
            }
        };
        resulting.sort_by(|a, b| a.file_name.cmp(&b.file_name));

        let size = resulting.iter().map(|f| f.size).sum();
        let checksums: Vec<&str> = resulting.iter().map(|f| f.checksum.as_str()).collect();
        let checksum = checksum::combine(&checksums);

        let now = Utc::now();
        let mut pkg = DataPackage {
            key: key.clone(),
            // A registered DOI is stable across updates.
            doi: existing.doi.clone(),
            title: draft.title,
            description: draft.description,
            license: draft.license,
            created_by: existing.created_by.clone(),
            created: existing.created,
            modified: now,
            deleted: existing.deleted,
            size,
            checksum,
            citation: None,
            files: resulting,
            creators,
            tags: draft.tags,
            related_identifiers: draft.related_identifiers,
        };
        pkg.citation = Some(render_citation(&pkg));

        // The catalog replacement rules work from the new files only.
        let mut record = pkg.clone();
        record.files = stored.iter().map(to_package_file).collect();
        self.catalog.update(&record, mode)?;

        let metadata = render_metadata(&pkg)?;
        if let Some(doi) = &pkg.doi {
            self.doi_service
                .update(&metadata, &pkg.created_by, doi)
                .await?;
        }
        self.file_store
            .store(&key, METADATA_FILE_NAME, &FileSource::Bytes(Bytes::from(metadata)))
            .await?;

        tracing::info!("Updated package {} ({:?})", key, mode);

        self.catalog
            .get(&key)?
            .ok_or_else(|| SeedbankError::Fatal(format!("package {} vanished after update", key)))
    }

    /// Overwrite updates stage the complete new file set and swap it in
    /// only once every store succeeded, so a mid-update storage failure
    /// leaves the previous file set intact.
    async fn store_overwrite_set(
        &self,
        key: &str,
        files: &[FileInput],
    ) -> Result<Vec<StoredFile>> {
        self.file_store.begin_staging(key).await?;

        let mut stored = Vec::with_capacity(files.len());
        for input in files {
            match self
                .file_store
                .store_staged(key, &input.file_name, &input.source)
                .await
            {
                Ok(file) => stored.push(file),
                Err(error) => {
                    if let Err(cleanup) = self.file_store.abort_staging(key).await {
                        tracing::warn!(
                            "Failed to drop staging directory for {}: {}",
                            key,
                            cleanup
                        );
                    }
                    return Err(error);
                }
            }
        }

        self.file_store.commit_staging(key).await?;
        Ok(stored)
    }
}
