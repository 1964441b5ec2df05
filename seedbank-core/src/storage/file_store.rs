use crate::checksum;
use crate::error::{Result, SeedbankError};
use bytes::Bytes;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use ulid::Ulid;

/// Reserved blob name for the rendered metadata document inside a package
/// directory. Never part of the package's content file set.
pub const METADATA_FILE_NAME: &str = "metadata.xml";

/// Fibonacci backoff between store attempts.
const RETRY_DELAYS_SECS: [u64; 2] = [3, 5];
const MAX_STORE_ATTEMPTS: usize = 3;

/// Where the bytes of a file come from.
#[derive(Debug, Clone)]
pub enum FileSource {
    Bytes(Bytes),
    Path(PathBuf),
    /// A remote location; `http`, `https`, `ftp` and `file` schemes are
    /// dereferenced, anything else is an unsupported scheme.
    Remote(String),
}

/// A named input file for create/update.
#[derive(Debug, Clone)]
pub struct FileInput {
    pub file_name: String,
    pub source: FileSource,
}

impl FileInput {
    pub fn new(file_name: impl Into<String>, source: FileSource) -> Self {
        Self {
            file_name: file_name.into(),
            source,
        }
    }
}

/// Result of materializing one file into a package directory.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub file_name: String,
    pub checksum: String,
    pub size: u64,
}

/// Per-package-key blob directories under one base path: one file per
/// stored blob plus the reserved metadata document, nothing else.
pub struct FileStore {
    base_path: PathBuf,
    client: reqwest::Client,
}

impl FileStore {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&base_path)?;
        Ok(Self {
            base_path,
            client: reqwest::Client::new(),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn package_dir(&self, package_key: &str) -> PathBuf {
        self.base_path.join(package_key)
    }

    pub fn file_path(&self, package_key: &str, file_name: &str) -> PathBuf {
        self.package_dir(package_key).join(file_name)
    }

    fn staging_dir(&self, package_key: &str) -> PathBuf {
        self.base_path.join(format!("{}.staging", package_key))
    }

    /// Store a file into the package's directory, creating it if absent.
    /// Transient failures are retried with Fibonacci backoff before
    /// escalating to a fatal storage error.
    pub async fn store(
        &self,
        package_key: &str,
        file_name: &str,
        source: &FileSource,
    ) -> Result<StoredFile> {
        self.store_into(&self.package_dir(package_key), file_name, source)
            .await
    }

    /// Open a stored blob for reading.
    pub async fn open(&self, package_key: &str, file_name: &str) -> Result<fs::File> {
        validate_file_name(file_name)?;
        let path = self.file_path(package_key, file_name);
        match fs::File::open(&path).await {
            Ok(file) => Ok(file),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(SeedbankError::NotFound(format!(
                    "file {} in package {}",
                    file_name, package_key
                )))
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Read a stored blob fully into memory.
    pub async fn read(&self, package_key: &str, file_name: &str) -> Result<Bytes> {
        validate_file_name(file_name)?;
        let path = self.file_path(package_key, file_name);
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(SeedbankError::NotFound(format!(
                    "file {} in package {}",
                    file_name, package_key
                )))
            }
            Err(error) => Err(error.into()),
        }
    }

    pub async fn checksum(&self, path: &Path) -> Result<String> {
        checksum::digest_file(path).await
    }

    pub async fn size(&self, path: &Path) -> Result<u64> {
        Ok(fs::metadata(path).await?.len())
    }

    /// Delete all files under the package directory, then recreate it
    /// empty. Used by full-overwrite updates.
    pub async fn clear(&self, package_key: &str) -> Result<()> {
        let dir = self.package_dir(package_key);
        if dir.exists() {
            fs::remove_dir_all(&dir).await?;
        }
        fs::create_dir_all(&dir).await?;
        Ok(())
    }

    /// Delete the package directory and everything in it. An absent
    /// directory is not an error.
    pub async fn delete(&self, package_key: &str) -> Result<()> {
        let dir = self.package_dir(package_key);
        if dir.exists() {
            fs::remove_dir_all(&dir).await?;
            tracing::debug!("Deleted package directory {:?}", dir);
        }
        Ok(())
    }

    /// Prepare an empty staging directory for an overwrite update.
    pub async fn begin_staging(&self, package_key: &str) -> Result<()> {
        let dir = self.staging_dir(package_key);
        if dir.exists() {
            fs::remove_dir_all(&dir).await?;
        }
        fs::create_dir_all(&dir).await?;
        Ok(())
    }

    /// Store a file into the staging directory instead of the live one.
    pub async fn store_staged(
        &self,
        package_key: &str,
        file_name: &str,
        source: &FileSource,
    ) -> Result<StoredFile> {
        self.store_into(&self.staging_dir(package_key), file_name, source)
            .await
    }

    /// Swap the staged directory in as the live package directory. The old
    /// directory is moved aside first so the swap is a pair of renames.
    pub async fn commit_staging(&self, package_key: &str) -> Result<()> {
        let live = self.package_dir(package_key);
        let staging = self.staging_dir(package_key);
        let old = self.base_path.join(format!("{}.old", package_key));

        if old.exists() {
            fs::remove_dir_all(&old).await?;
        }
        if live.exists() {
            fs::rename(&live, &old).await?;
        }
        fs::rename(&staging, &live).await?;

        if old.exists() {
            if let Err(error) = fs::remove_dir_all(&old).await {
                tracing::warn!(
                    "Failed to remove replaced package directory {:?}: {}",
                    old,
                    error
                );
            }
        }

        Ok(())
    }

    /// Drop the staging directory after a failed overwrite update.
    pub async fn abort_staging(&self, package_key: &str) -> Result<()> {
        let staging = self.staging_dir(package_key);
        if staging.exists() {
            fs::remove_dir_all(&staging).await?;
        }
        Ok(())
    }

    /// Probe whether a remote location exists: HEAD for http(s), a
    /// directory listing for ftp, a metadata check for file URIs.
    pub async fn exists_remote(&self, uri: &str) -> Result<bool> {
        match split_scheme(uri)? {
            RemoteScheme::Http => {
                let response = self
                    .client
                    .head(uri)
                    .send()
                    .await
                    .map_err(|error| SeedbankError::TransientIo(error.to_string()))?;
                Ok(response.status().is_success())
            }
            RemoteScheme::Ftp(location) => {
                let (parent, name) = location.parent_and_name();
                let listing = tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
                    let mut ftp = connect_ftp(&location)?;
                    let entries = ftp
                        .nlst(Some(&parent))
                        .map_err(|error| SeedbankError::TransientIo(error.to_string()))?;
                    let _ = ftp.quit();
                    Ok(entries)
                })
                .await
                .map_err(|error| SeedbankError::Fatal(error.to_string()))??;

                let suffix = format!("/{}", name);
                Ok(listing
                    .iter()
                    .any(|entry| entry == &name || entry.ends_with(&suffix)))
            }
            RemoteScheme::File(path) => Ok(fs::try_exists(&path).await?),
        }
    }

    async fn store_into(
        &self,
        dir: &Path,
        file_name: &str,
        source: &FileSource,
    ) -> Result<StoredFile> {
        validate_file_name(file_name)?;
        fs::create_dir_all(dir).await?;

        let target = dir.join(file_name);
        // The temp name carries a fresh ULID so it can never shadow a
        // sibling blob, whatever the incoming file is called.
        let temp_path = dir.join(format!("{}.{}.tmp", file_name, Ulid::new()));

        let mut attempt = 1;
        loop {
            match self.copy_source(source, &temp_path).await {
                Ok(()) => break,
                Err(error) => {
                    let _ = fs::remove_file(&temp_path).await;
                    if attempt < MAX_STORE_ATTEMPTS && is_retryable(&error) {
                        let delay = RETRY_DELAYS_SECS[attempt - 1];
                        tracing::warn!(
                            "Store attempt {} for {} failed ({}), retrying in {}s",
                            attempt,
                            file_name,
                            error,
                            delay
                        );
                        tokio::time::sleep(Duration::from_secs(delay)).await;
                        attempt += 1;
                    } else if is_retryable(&error) {
                        return Err(SeedbankError::Fatal(format!(
                            "storing {} failed after {} attempts: {}",
                            file_name, attempt, error
                        )));
                    } else {
                        return Err(error);
                    }
                }
            }
        }

        let checksum = checksum::digest_file(&temp_path).await?;
        let size = fs::metadata(&temp_path).await?.len();
        fs::rename(&temp_path, &target).await?;

        tracing::debug!(
            "Stored file {} ({} bytes, checksum {})",
            file_name,
            size,
            checksum
        );

        Ok(StoredFile {
            file_name: file_name.to_string(),
            checksum,
            size,
        })
    }

    async fn copy_source(&self, source: &FileSource, temp_path: &Path) -> Result<()> {
        match source {
            FileSource::Bytes(data) => {
                let mut file = fs::File::create(temp_path).await?;
                file.write_all(data).await?;
                file.sync_all().await?;
                Ok(())
            }
            FileSource::Path(path) => {
                fs::copy(path, temp_path).await?;
                Ok(())
            }
            FileSource::Remote(uri) => match split_scheme(uri)? {
                RemoteScheme::File(path) => {
                    fs::copy(&path, temp_path).await?;
                    Ok(())
                }
                RemoteScheme::Http => self.download_http(uri, temp_path).await,
                RemoteScheme::Ftp(location) => download_ftp(location, temp_path).await,
            },
        }
    }

    async fn download_http(&self, uri: &str, temp_path: &Path) -> Result<()> {
        let response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|error| SeedbankError::TransientIo(error.to_string()))?;

        if !response.status().is_success() {
            return Err(SeedbankError::Http(format!(
                "fetching {} failed with status {}",
                uri,
                response.status()
            )));
        }

        let mut file = fs::File::create(temp_path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|error| SeedbankError::TransientIo(error.to_string()))?;
            file.write_all(&chunk).await?;
        }
        file.sync_all().await?;
        Ok(())
    }
}

enum RemoteScheme {
    Http,
    Ftp(FtpLocation),
    File(PathBuf),
}

/// A parsed `ftp://[user[:password]@]host[:port]/path` location. Without
/// credentials the anonymous account is used.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FtpLocation {
    addr: String,
    user: String,
    password: String,
    path: String,
}

impl FtpLocation {
    fn parse(rest: &str) -> Result<Self> {
        let (userinfo, host_path) = match rest.split_once('@') {
            Some((userinfo, host_path)) => (Some(userinfo), host_path),
            None => (None, rest),
        };
        let (host, path) = host_path.split_once('/').ok_or_else(|| {
            SeedbankError::InvalidArgument(format!("ftp location has no file path: {}", rest))
        })?;
        if host.is_empty() || path.is_empty() {
            return Err(SeedbankError::InvalidArgument(format!(
                "invalid ftp location: {}",
                rest
            )));
        }

        let addr = if host.contains(':') {
            host.to_string()
        } else {
            format!("{}:21", host)
        };
        let (user, password) = match userinfo {
            Some(userinfo) => match userinfo.split_once(':') {
                Some((user, password)) => (user.to_string(), password.to_string()),
                None => (userinfo.to_string(), String::new()),
            },
            None => ("anonymous".to_string(), "anonymous".to_string()),
        };

        Ok(Self {
            addr,
            user,
            password,
            path: format!("/{}", path),
        })
    }

    /// The containing directory and the final path segment, for the
    /// listing-based existence probe.
    fn parent_and_name(&self) -> (String, String) {
        match self.path.rsplit_once('/') {
            Some(("", name)) => ("/".to_string(), name.to_string()),
            Some((parent, name)) => (parent.to_string(), name.to_string()),
            None => ("/".to_string(), self.path.clone()),
        }
    }
}

fn connect_ftp(location: &FtpLocation) -> Result<suppaftp::FtpStream> {
    let mut ftp = suppaftp::FtpStream::connect(location.addr.as_str())
        .map_err(|error| SeedbankError::TransientIo(error.to_string()))?;
    ftp.login(&location.user, &location.password)
        .map_err(|error| SeedbankError::TransientIo(error.to_string()))?;
    Ok(ftp)
}

/// The FTP client is blocking, so the transfer runs on the blocking pool
/// and the collected bytes are written out asynchronously afterwards.
async fn download_ftp(location: FtpLocation, temp_path: &Path) -> Result<()> {
    let bytes = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
        let mut ftp = connect_ftp(&location)?;
        ftp.transfer_type(suppaftp::types::FileType::Binary)
            .map_err(|error| SeedbankError::TransientIo(error.to_string()))?;
        let buffer = ftp
            .retr_as_buffer(&location.path)
            .map_err(|error| SeedbankError::TransientIo(error.to_string()))?;
        let _ = ftp.quit();
        Ok(buffer.into_inner())
    })
    .await
    .map_err(|error| SeedbankError::Fatal(error.to_string()))??;

    let mut file = fs::File::create(temp_path).await?;
    file.write_all(&bytes).await?;
    file.sync_all().await?;
    Ok(())
}

fn split_scheme(uri: &str) -> Result<RemoteScheme> {
    let (scheme, rest) = uri.split_once("://").ok_or_else(|| {
        SeedbankError::UnsupportedScheme(format!("not a remote location: {}", uri))
    })?;

    match scheme {
        "http" | "https" => Ok(RemoteScheme::Http),
        "ftp" => Ok(RemoteScheme::Ftp(FtpLocation::parse(rest)?)),
        "file" => Ok(RemoteScheme::File(PathBuf::from(rest))),
        other => Err(SeedbankError::UnsupportedScheme(format!(
            "remote scheme {} is not supported",
            other
        ))),
    }
}

fn is_retryable(error: &SeedbankError) -> bool {
    matches!(
        error,
        SeedbankError::TransientIo(_) | SeedbankError::Io(_)
    )
}

fn validate_file_name(file_name: &str) -> Result<()> {
    if file_name.is_empty()
        || file_name == "."
        || file_name == ".."
        || file_name.contains('/')
        || file_name.contains('\\')
    {
        return Err(SeedbankError::InvalidArgument(format!(
            "invalid file name: {}",
            file_name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> FileStore {
        FileStore::new(dir.path().to_path_buf()).unwrap()
    }

    #[tokio::test]
    async fn test_store_and_read_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let stored = store
            .store("pkg1", "occurrences.csv", &FileSource::Bytes(Bytes::from("a,b\n1,2\n")))
            .await
            .unwrap();

        assert_eq!(stored.file_name, "occurrences.csv");
        assert_eq!(stored.size, 8);
        assert_eq!(stored.checksum, crate::checksum::digest(b"a,b\n1,2\n"));

        let read = store.read("pkg1", "occurrences.csv").await.unwrap();
        assert_eq!(read, Bytes::from("a,b\n1,2\n"));
    }

    #[tokio::test]
    async fn test_store_leaves_tmp_named_siblings_alone() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store
            .store("pkg1", "data.tmp", &FileSource::Bytes(Bytes::from("precious")))
            .await
            .unwrap();
        store
            .store("pkg1", "data.txt", &FileSource::Bytes(Bytes::from("new bytes")))
            .await
            .unwrap();

        assert_eq!(store.read("pkg1", "data.tmp").await.unwrap(), Bytes::from("precious"));
        assert_eq!(store.read("pkg1", "data.txt").await.unwrap(), Bytes::from("new bytes"));
    }

    #[tokio::test]
    async fn test_store_from_local_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let source_path = dir.path().join("source.txt");
        tokio::fs::write(&source_path, b"local bytes").await.unwrap();

        let stored = store
            .store("pkg1", "copy.txt", &FileSource::Path(source_path))
            .await
            .unwrap();
        assert_eq!(stored.size, 11);
    }

    #[tokio::test]
    async fn test_store_from_file_uri() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let source_path = dir.path().join("remote.txt");
        tokio::fs::write(&source_path, b"via uri").await.unwrap();
        let uri = format!("file://{}", source_path.display());

        let stored = store
            .store("pkg1", "remote.txt", &FileSource::Remote(uri))
            .await
            .unwrap();
        assert_eq!(stored.size, 7);
    }

    #[tokio::test]
    async fn test_open_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let error = store.open("pkg1", "absent.bin").await.unwrap_err();
        assert!(matches!(error, SeedbankError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_clear_recreates_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store
            .store("pkg1", "a.txt", &FileSource::Bytes(Bytes::from("a")))
            .await
            .unwrap();
        store.clear("pkg1").await.unwrap();

        assert!(store.package_dir("pkg1").exists());
        assert!(store.read("pkg1", "a.txt").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_tolerates_absent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.delete("never-created").await.unwrap();

        store
            .store("pkg1", "a.txt", &FileSource::Bytes(Bytes::from("a")))
            .await
            .unwrap();
        store.delete("pkg1").await.unwrap();
        assert!(!store.package_dir("pkg1").exists());
        store.delete("pkg1").await.unwrap();
    }

    #[tokio::test]
    async fn test_staging_swap_replaces_file_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store
            .store("pkg1", "old.txt", &FileSource::Bytes(Bytes::from("old")))
            .await
            .unwrap();

        store.begin_staging("pkg1").await.unwrap();
        store
            .store_staged("pkg1", "new.txt", &FileSource::Bytes(Bytes::from("new")))
            .await
            .unwrap();
        store.commit_staging("pkg1").await.unwrap();

        assert!(store.read("pkg1", "old.txt").await.is_err());
        assert_eq!(store.read("pkg1", "new.txt").await.unwrap(), Bytes::from("new"));
    }

    #[tokio::test]
    async fn test_abort_staging_leaves_live_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store
            .store("pkg1", "keep.txt", &FileSource::Bytes(Bytes::from("keep")))
            .await
            .unwrap();

        store.begin_staging("pkg1").await.unwrap();
        store
            .store_staged("pkg1", "dropped.txt", &FileSource::Bytes(Bytes::from("x")))
            .await
            .unwrap();
        store.abort_staging("pkg1").await.unwrap();

        assert_eq!(store.read("pkg1", "keep.txt").await.unwrap(), Bytes::from("keep"));
        assert!(!store.package_dir("pkg1").join("dropped.txt").exists());
    }

    #[tokio::test]
    async fn test_exists_remote_file_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let present = dir.path().join("here.txt");
        tokio::fs::write(&present, b"x").await.unwrap();

        assert!(store
            .exists_remote(&format!("file://{}", present.display()))
            .await
            .unwrap());
        assert!(!store
            .exists_remote(&format!("file://{}/absent", dir.path().display()))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_unsupported_remote_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let error = store.exists_remote("gopher://example.org/x").await.unwrap_err();
        assert!(matches!(error, SeedbankError::UnsupportedScheme(_)));

        let error = store
            .store("pkg1", "x", &FileSource::Remote("sftp://example.org/x".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(error, SeedbankError::UnsupportedScheme(_)));
    }

    #[test]
    fn test_ftp_location_defaults_to_anonymous_port_21() {
        let location = FtpLocation::parse("ftp.example.org/pub/data/occurrences.csv").unwrap();
        assert_eq!(location.addr, "ftp.example.org:21");
        assert_eq!(location.user, "anonymous");
        assert_eq!(location.password, "anonymous");
        assert_eq!(location.path, "/pub/data/occurrences.csv");

        let (parent, name) = location.parent_and_name();
        assert_eq!(parent, "/pub/data");
        assert_eq!(name, "occurrences.csv");
    }

    #[test]
    fn test_ftp_location_with_credentials_and_port() {
        let location = FtpLocation::parse("alice:s3cret@ftp.example.org:2121/data.csv").unwrap();
        assert_eq!(location.addr, "ftp.example.org:2121");
        assert_eq!(location.user, "alice");
        assert_eq!(location.password, "s3cret");
        assert_eq!(location.path, "/data.csv");

        let (parent, name) = location.parent_and_name();
        assert_eq!(parent, "/");
        assert_eq!(name, "data.csv");
    }

    #[test]
    fn test_ftp_location_requires_a_path() {
        let error = FtpLocation::parse("ftp.example.org").unwrap_err();
        assert!(matches!(error, SeedbankError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_ftp_exists_check_of_unreachable_host_is_transient() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        // Port 1 on loopback refuses the connection immediately.
        let error = store
            .exists_remote("ftp://127.0.0.1:1/pub/data.csv")
            .await
            .unwrap_err();
        assert!(matches!(error, SeedbankError::TransientIo(_)));
    }

    #[tokio::test]
    async fn test_rejects_path_traversal_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        for name in ["", ".", "..", "a/b", "a\\b"] {
            let error = store
                .store("pkg1", name, &FileSource::Bytes(Bytes::from("x")))
                .await
                .unwrap_err();
            assert!(matches!(error, SeedbankError::InvalidArgument(_)), "{}", name);
        }
    }
}
