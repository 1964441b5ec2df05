use crate::doi::HttpDoiServiceConfig;
use crate::error::{Result, SeedbankError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub storage: StorageConfig,
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub doi: Option<HttpDoiServiceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub db_path: PathBuf,
}

impl RepositoryConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path))
            .add_source(::config::Environment::with_prefix("SEEDBANK").separator("__"))
            .build()
            .map_err(|e| SeedbankError::Config(e.to_string()))?;

        let config: RepositoryConfig = settings
            .try_deserialize()
            .map_err(|e| SeedbankError::Config(e.to_string()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_file_loads_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seedbank.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            concat!(
                "storage:\n",
                "  data_dir: /var/lib/seedbank/blobs\n",
                "catalog:\n",
                "  db_path: /var/lib/seedbank/catalog.db\n",
                "doi:\n",
                "  api_url: https://doi.example.org/api\n",
                "  app_key: seedbank\n",
                "  secret: hunter2\n",
                "  prefix: \"10.5072\"\n",
            )
        )
        .unwrap();

        let config = RepositoryConfig::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(
            config.storage.data_dir,
            PathBuf::from("/var/lib/seedbank/blobs")
        );
        assert_eq!(
            config.catalog.db_path,
            PathBuf::from("/var/lib/seedbank/catalog.db")
        );
        let doi = config.doi.unwrap();
        assert_eq!(doi.prefix, "10.5072");
        assert_eq!(doi.timeout_secs, 30);
    }

    #[test]
    fn test_doi_section_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seedbank.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            "storage:\n  data_dir: /tmp/blobs\ncatalog:\n  db_path: /tmp/catalog.db"
        )
        .unwrap();

        let config = RepositoryConfig::from_file(path.to_str().unwrap()).unwrap();
        assert!(config.doi.is_none());
    }
}
