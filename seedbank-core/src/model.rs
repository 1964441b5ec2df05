use crate::error::{Result, SeedbankError};
use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use std::fmt;

/// License under which a data package is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum License {
    Cc01_0,
    CcBy4_0,
    CcByNc4_0,
    Odbl1_0,
    OdcBy1_0,
    Unspecified,
}

impl License {
    pub fn as_str(&self) -> &'static str {
        match self {
            License::Cc01_0 => "CC0_1_0",
            License::CcBy4_0 => "CC_BY_4_0",
            License::CcByNc4_0 => "CC_BY_NC_4_0",
            License::Odbl1_0 => "ODBL_1_0",
            License::OdcBy1_0 => "ODC_BY_1_0",
            License::Unspecified => "UNSPECIFIED",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "CC0_1_0" => Ok(License::Cc01_0),
            "CC_BY_4_0" => Ok(License::CcBy4_0),
            "CC_BY_NC_4_0" => Ok(License::CcByNc4_0),
            "ODBL_1_0" => Ok(License::Odbl1_0),
            "ODC_BY_1_0" => Ok(License::OdcBy1_0),
            "UNSPECIFIED" => Ok(License::Unspecified),
            other => Err(SeedbankError::InvalidArgument(format!(
                "unknown license: {}",
                other
            ))),
        }
    }
}

/// Scheme of a creator name identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentifierScheme {
    Orcid,
    Isni,
    FundRef,
    Other,
}

impl IdentifierScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierScheme::Orcid => "ORCID",
            IdentifierScheme::Isni => "ISNI",
            IdentifierScheme::FundRef => "FUND_REF",
            IdentifierScheme::Other => "OTHER",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "ORCID" => Ok(IdentifierScheme::Orcid),
            "ISNI" => Ok(IdentifierScheme::Isni),
            "FUND_REF" => Ok(IdentifierScheme::FundRef),
            "OTHER" => Ok(IdentifierScheme::Other),
            other => Err(SeedbankError::UnsupportedScheme(format!(
                "unknown identifier scheme: {}",
                other
            ))),
        }
    }

    /// Canonical scheme URI attached to normalized creator identifiers.
    pub fn scheme_uri(&self) -> Option<&'static str> {
        match self {
            IdentifierScheme::Orcid => Some("https://orcid.org/"),
            IdentifierScheme::Isni => Some("http://www.isni.org/"),
            IdentifierScheme::FundRef => Some("https://www.crossref.org/fundingdata/"),
            IdentifierScheme::Other => None,
        }
    }
}

/// Syntax family of a related identifier value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentifierType {
    Url,
    Lsid,
    Doi,
    Uuid,
    Uri,
    Unknown,
}

impl IdentifierType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierType::Url => "URL",
            IdentifierType::Lsid => "LSID",
            IdentifierType::Doi => "DOI",
            IdentifierType::Uuid => "UUID",
            IdentifierType::Uri => "URI",
            IdentifierType::Unknown => "UNKNOWN",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "URL" => Ok(IdentifierType::Url),
            "LSID" => Ok(IdentifierType::Lsid),
            "DOI" => Ok(IdentifierType::Doi),
            "UUID" => Ok(IdentifierType::Uuid),
            "URI" => Ok(IdentifierType::Uri),
            "UNKNOWN" => Ok(IdentifierType::Unknown),
            other => Err(SeedbankError::InvalidArgument(format!(
                "unknown identifier type: {}",
                other
            ))),
        }
    }
}

/// How a related identifier relates to the owning package.
///
/// `IsAlternativeOf` designates the same resource under another scheme and
/// participates in the global uniqueness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    IsAlternativeOf,
    References,
    IsReferencedBy,
    IsNewVersionOf,
    IsPreviousVersionOf,
    IsDerivedFrom,
    IsSourceOf,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::IsAlternativeOf => "IS_ALTERNATIVE_OF",
            RelationType::References => "REFERENCES",
            RelationType::IsReferencedBy => "IS_REFERENCED_BY",
            RelationType::IsNewVersionOf => "IS_NEW_VERSION_OF",
            RelationType::IsPreviousVersionOf => "IS_PREVIOUS_VERSION_OF",
            RelationType::IsDerivedFrom => "IS_DERIVED_FROM",
            RelationType::IsSourceOf => "IS_SOURCE_OF",
        }
    }

    /// Camel-case name used in the rendered metadata document.
    pub fn metadata_name(&self) -> &'static str {
        match self {
            RelationType::IsAlternativeOf => "IsAlternativeOf",
            RelationType::References => "References",
            RelationType::IsReferencedBy => "IsReferencedBy",
            RelationType::IsNewVersionOf => "IsNewVersionOf",
            RelationType::IsPreviousVersionOf => "IsPreviousVersionOf",
            RelationType::IsDerivedFrom => "IsDerivedFrom",
            RelationType::IsSourceOf => "IsSourceOf",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "IS_ALTERNATIVE_OF" => Ok(RelationType::IsAlternativeOf),
            "REFERENCES" => Ok(RelationType::References),
            "IS_REFERENCED_BY" => Ok(RelationType::IsReferencedBy),
            "IS_NEW_VERSION_OF" => Ok(RelationType::IsNewVersionOf),
            "IS_PREVIOUS_VERSION_OF" => Ok(RelationType::IsPreviousVersionOf),
            "IS_DERIVED_FROM" => Ok(RelationType::IsDerivedFrom),
            "IS_SOURCE_OF" => Ok(RelationType::IsSourceOf),
            other => Err(SeedbankError::InvalidArgument(format!(
                "unknown relation type: {}",
                other
            ))),
        }
    }
}

/// Update semantics for an existing package's file set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateMode {
    /// New files are added; existing files are kept unless a new file
    /// carries the same name.
    Append,
    /// The existing file set is replaced wholesale.
    Overwrite,
}

/// An external persistent identifier minted by the registration service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Doi {
    pub prefix: String,
    pub suffix: String,
}

impl Doi {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        let suffix = suffix.into();
        if !prefix.starts_with("10.") || prefix.len() < 4 {
            return Err(SeedbankError::InvalidArgument(format!(
                "invalid DOI prefix: {}",
                prefix
            )));
        }
        if suffix.is_empty() {
            return Err(SeedbankError::InvalidArgument(
                "DOI suffix cannot be empty".to_string(),
            ));
        }
        Ok(Self { prefix, suffix })
    }

    /// Accepts `10.x/y`, `doi:10.x/y` and `http(s)://doi.org/10.x/y` forms.
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        let body = trimmed
            .strip_prefix("https://doi.org/")
            .or_else(|| trimmed.strip_prefix("http://doi.org/"))
            .or_else(|| trimmed.strip_prefix("doi:"))
            .unwrap_or(trimmed);

        let (prefix, suffix) = body.split_once('/').ok_or_else(|| {
            SeedbankError::InvalidArgument(format!("invalid DOI: {}", value))
        })?;

        Self::new(prefix, suffix)
    }

    /// Mints a DOI with a random lowercase alphanumeric suffix under the
    /// given prefix.
    pub fn random(prefix: &str) -> Result<Self> {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(|c| (c as char).to_ascii_lowercase())
            .collect();
        Self::new(prefix, suffix)
    }

    pub fn url(&self) -> String {
        format!("https://doi.org/{}/{}", self.prefix, self.suffix)
    }
}

impl fmt::Display for Doi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.prefix, self.suffix)
    }
}

/// A content file owned by a package. Immutable once stored; updates
/// replace, never mutate in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPackageFile {
    pub file_name: String,
    pub checksum: String,
    pub size: u64,
}

/// One creator of a package, with an optional scheme-qualified name
/// identifier. `identifier` and `identifier_scheme` are both present or
/// both absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub name: String,
    #[serde(default)]
    pub affiliations: Vec<String>,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub identifier_scheme: Option<IdentifierScheme>,
    #[serde(default)]
    pub scheme_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedIdentifier {
    pub identifier: String,
    pub identifier_type: IdentifierType,
    pub relation_type: RelationType,
}

/// The aggregate root: descriptive metadata plus the owned child record
/// sets. `size`, `checksum` and `citation` are derived, never supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPackage {
    pub key: String,
    pub doi: Option<Doi>,
    pub title: String,
    pub description: String,
    pub license: License,
    pub created_by: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub deleted: Option<DateTime<Utc>>,
    pub size: u64,
    pub checksum: String,
    pub citation: Option<String>,
    pub files: Vec<DataPackageFile>,
    pub creators: Vec<Creator>,
    pub tags: Vec<Tag>,
    pub related_identifiers: Vec<RelatedIdentifier>,
}

impl DataPackage {
    /// The related identifiers subject to the global uniqueness check.
    pub fn alternative_identifiers(&self) -> impl Iterator<Item = &RelatedIdentifier> {
        self.related_identifiers
            .iter()
            .filter(|id| id.relation_type == RelationType::IsAlternativeOf)
    }

    pub fn is_archived(&self) -> bool {
        self.deleted.is_some()
    }
}

/// Caller-supplied descriptive metadata for a create or update. Derived
/// fields and the immutable key/creation attributes are filled by the
/// lifecycle operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDraft {
    pub title: String,
    pub description: String,
    pub license: License,
    pub created_by: String,
    #[serde(default)]
    pub creators: Vec<Creator>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub related_identifiers: Vec<RelatedIdentifier>,
}

impl PackageDraft {
    pub fn alternative_identifiers(&self) -> impl Iterator<Item = &RelatedIdentifier> {
        self.related_identifiers
            .iter()
            .filter(|id| id.relation_type == RelationType::IsAlternativeOf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doi_parse_forms() {
        let plain = Doi::parse("10.5072/abc123").unwrap();
        assert_eq!(plain.prefix, "10.5072");
        assert_eq!(plain.suffix, "abc123");

        let prefixed = Doi::parse("doi:10.5072/abc123").unwrap();
        assert_eq!(prefixed, plain);

        let resolver = Doi::parse("https://doi.org/10.5072/abc123").unwrap();
        assert_eq!(resolver, plain);

        assert!(Doi::parse("11.5072/abc123").is_err());
        assert!(Doi::parse("10.5072").is_err());
    }

    #[test]
    fn test_doi_random_suffix() {
        let doi = Doi::random("10.5072").unwrap();
        assert_eq!(doi.prefix, "10.5072");
        assert_eq!(doi.suffix.len(), 8);
        assert!(doi.suffix.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(doi.suffix, doi.suffix.to_ascii_lowercase());
    }

    #[test]
    fn test_enum_round_trips() {
        assert_eq!(License::parse("CC_BY_4_0").unwrap(), License::CcBy4_0);
        assert_eq!(
            IdentifierScheme::parse("ORCID").unwrap(),
            IdentifierScheme::Orcid
        );
        assert!(IdentifierScheme::parse("RINGGOLD").is_err());
        assert_eq!(
            RelationType::parse("IS_ALTERNATIVE_OF").unwrap(),
            RelationType::IsAlternativeOf
        );
        assert_eq!(
            RelationType::IsAlternativeOf.metadata_name(),
            "IsAlternativeOf"
        );
    }
}
