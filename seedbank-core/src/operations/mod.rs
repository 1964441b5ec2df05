//! Data-package lifecycle operations.
//!
//! Each operation owns shared handles to the blob store, the catalog and
//! the DOI service, takes a request struct and runs to a complete package
//! or a typed failure. No partial package is ever returned.

pub mod create_package;
pub mod delete_package;
pub mod read_package;
pub mod update_package;

pub use create_package::{CreatePackageOperation, CreatePackageRequest};
pub use delete_package::{DeletePackageOperation, DeletePackageRequest};
pub use read_package::ReadPackageOperation;
pub use update_package::{UpdatePackageOperation, UpdatePackageRequest};

use crate::error::{Result, SeedbankError};
use crate::identifier::validator_for;
use crate::model::{Creator, DataPackageFile, PackageDraft};
use crate::storage::{FileInput, StoredFile, METADATA_FILE_NAME};

pub(crate) fn validate_draft(draft: &PackageDraft) -> Result<()> {
    if draft.title.trim().is_empty() {
        return Err(SeedbankError::InvalidArgument(
            "package title cannot be empty".to_string(),
        ));
    }
    if draft.description.trim().is_empty() {
        return Err(SeedbankError::InvalidArgument(
            "package description cannot be empty".to_string(),
        ));
    }
    for creator in &draft.creators {
        if creator.identifier.is_some() != creator.identifier_scheme.is_some() {
            return Err(SeedbankError::InvalidArgument(format!(
                "creator {}: identifier and scheme must be supplied together",
                creator.name
            )));
        }
    }
    Ok(())
}

pub(crate) fn validate_file_inputs(files: &[FileInput]) -> Result<()> {
    for (i, file) in files.iter().enumerate() {
        if file.file_name == METADATA_FILE_NAME {
            return Err(SeedbankError::InvalidArgument(format!(
                "{} is a reserved file name",
                METADATA_FILE_NAME
            )));
        }
        if files[..i].iter().any(|f| f.file_name == file.file_name) {
            return Err(SeedbankError::InvalidArgument(format!(
                "duplicate file name: {}",
                file.file_name
            )));
        }
    }
    Ok(())
}

/// Normalize scheme-qualified creator identifiers and attach the derived
/// scheme URI. Invalid identifiers abort the whole operation.
pub(crate) fn normalize_creators(creators: Vec<Creator>) -> Result<Vec<Creator>> {
    creators
        .into_iter()
        .map(|mut creator| {
            if let (Some(identifier), Some(scheme)) =
                (creator.identifier.clone(), creator.identifier_scheme)
            {
                let validator = validator_for(scheme);
                if !validator.is_valid(&identifier) {
                    return Err(SeedbankError::InvalidArgument(format!(
                        "invalid {} identifier for creator {}: {}",
                        scheme.as_str(),
                        creator.name,
                        identifier
                    )));
                }
                creator.identifier = Some(validator.normalize(&identifier)?);
                creator.scheme_uri = scheme.scheme_uri().map(str::to_string);
            }
            Ok(creator)
        })
        .collect()
}

pub(crate) fn to_package_file(stored: &StoredFile) -> DataPackageFile {
    DataPackageFile {
        file_name: stored.file_name.clone(),
        checksum: stored.checksum.clone(),
        size: stored.size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IdentifierScheme, License};
    use crate::storage::FileSource;
    use bytes::Bytes;

    fn draft() -> PackageDraft {
        PackageDraft {
            title: "t".to_string(),
            description: "d".to_string(),
            license: License::Cc01_0,
            created_by: "alice".to_string(),
            creators: Vec::new(),
            tags: Vec::new(),
            related_identifiers: Vec::new(),
        }
    }

    #[test]
    fn test_validate_draft_requires_description() {
        let mut bad = draft();
        bad.description = "  ".to_string();
        assert!(matches!(
            validate_draft(&bad).unwrap_err(),
            SeedbankError::InvalidArgument(_)
        ));
    }

    #[test]
    fn test_validate_draft_rejects_dangling_scheme() {
        let mut bad = draft();
        bad.creators.push(Creator {
            name: "Alice".to_string(),
            affiliations: Vec::new(),
            identifier: None,
            identifier_scheme: Some(IdentifierScheme::Orcid),
            scheme_uri: None,
        });
        assert!(validate_draft(&bad).is_err());
    }

    #[test]
    fn test_validate_file_inputs_rejects_reserved_and_duplicates() {
        let reserved = vec![FileInput::new(
            METADATA_FILE_NAME,
            FileSource::Bytes(Bytes::from("x")),
        )];
        assert!(validate_file_inputs(&reserved).is_err());

        let duplicated = vec![
            FileInput::new("a.csv", FileSource::Bytes(Bytes::from("1"))),
            FileInput::new("a.csv", FileSource::Bytes(Bytes::from("2"))),
        ];
        assert!(validate_file_inputs(&duplicated).is_err());
    }

    #[test]
    fn test_normalize_creators_normalizes_and_sets_uri() {
        let creators = vec![Creator {
            name: "Alice".to_string(),
            affiliations: Vec::new(),
            identifier: Some("0000-0001-5473-3208".to_string()),
            identifier_scheme: Some(IdentifierScheme::Orcid),
            scheme_uri: None,
        }];
        let normalized = normalize_creators(creators).unwrap();
        assert_eq!(
            normalized[0].identifier.as_deref(),
            Some("https://orcid.org/0000-0001-5473-3208")
        );
        assert_eq!(normalized[0].scheme_uri.as_deref(), Some("https://orcid.org/"));
    }

    #[test]
    fn test_normalize_creators_rejects_bad_check_digit() {
        let creators = vec![Creator {
            name: "Alice".to_string(),
            affiliations: Vec::new(),
            identifier: Some("0000-0001-5473-3206".to_string()),
            identifier_scheme: Some(IdentifierScheme::Orcid),
            scheme_uri: None,
        }];
        assert!(matches!(
            normalize_creators(creators).unwrap_err(),
            SeedbankError::InvalidArgument(_)
        ));
    }
}
