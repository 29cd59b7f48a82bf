//! Local filesystem object storage with signed download URLs.
//!
//! Objects live under `{base_path}/{key}`. Download URLs have the form
//! `{public_url}/{key}?expires={unix}&signature={hex}` where the signature is
//! a BLAKE3 keyed hash of the key and expiry, so the serving layer can check
//! them without a database round trip.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use dam_core::{Error, ObjectStorage, Result};

const SIGNING_CONTEXT: &str = "retail-dam 2026-03 presigned download url";

/// Configuration for [`LocalObjectStorage`].
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub base_path: PathBuf,
    pub public_url: String,
    pub signing_secret: String,
}

impl StorageConfig {
    /// Read `DAM_STORAGE_PATH`, `DAM_STORAGE_PUBLIC_URL` and
    /// `DAM_STORAGE_SIGNING_KEY`. The signing key is required.
    pub fn from_env() -> Result<Self> {
        let signing_secret = std::env::var("DAM_STORAGE_SIGNING_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Config("DAM_STORAGE_SIGNING_KEY must be set".into()))?;
        Ok(Self {
            base_path: std::env::var("DAM_STORAGE_PATH")
                .unwrap_or_else(|_| "./data/objects".to_string())
                .into(),
            public_url: std::env::var("DAM_STORAGE_PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:8000/media".to_string()),
            signing_secret,
        })
    }
}

/// Filesystem-backed [`ObjectStorage`].
pub struct LocalObjectStorage {
    base_path: PathBuf,
    public_url: String,
    signing_key: [u8; 32],
}

impl LocalObjectStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            base_path: config.base_path,
            public_url: config.public_url.trim_end_matches('/').to_string(),
            signing_key: blake3::derive_key(SIGNING_CONTEXT, config.signing_secret.as_bytes()),
        }
    }

    /// Resolve a key below the base path, rejecting anything that escapes it.
    fn full_path(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key);
        let safe = !key.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(Error::InvalidInput(format!("invalid storage key: {key}")));
        }
        Ok(self.base_path.join(rel))
    }

    fn sign(&self, key: &str, expires: i64) -> blake3::Hash {
        blake3::keyed_hash(&self.signing_key, format!("{key}\n{expires}").as_bytes())
    }

    /// Check a presigned URL's parameters against the current time.
    pub fn verify(&self, key: &str, expires: i64, signature: &str) -> Result<()> {
        self.verify_at(key, expires, signature, Utc::now().timestamp())
    }

    /// Check a presigned URL's parameters against `now` (unix seconds).
    pub fn verify_at(&self, key: &str, expires: i64, signature: &str, now: i64) -> Result<()> {
        let provided = blake3::Hash::from_hex(signature)
            .map_err(|_| Error::Storage("malformed signature".into()))?;
        // blake3::Hash equality is constant time.
        if provided != self.sign(key, expires) {
            return Err(Error::Storage("signature mismatch".into()));
        }
        if now > expires {
            return Err(Error::Storage("download link expired".into()));
        }
        Ok(())
    }

    fn url_for(&self, key: &str, expires: i64) -> String {
        format!(
            "{}/{}?expires={}&signature={}",
            self.public_url,
            key,
            expires,
            self.sign(key, expires).to_hex()
        )
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.full_path(key)?;
        fs::read(&path).await.map_err(|e| {
            debug!(storage_key = %key, error = %e, "object read failed");
            Error::Storage(format!("read {key}: {e}"))
        })
    }

    async fn put_object(&self, key: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(key)?;
        debug!(storage_key = %key, size = data.len(), "storage: put");

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // temp file + rename keeps readers from seeing partial objects
        let mut temp_name = full_path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(from = %temp_path.display(), to = %full_path.display(), error = %e, "storage: rename failed");
            e
        })?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let path = self.full_path(key)?;
        if fs::try_exists(&path).await? {
            fs::remove_file(path).await?;
        }
        Ok(())
    }

    fn presigned_download_url(&self, key: &str, ttl_secs: u64) -> Result<String> {
        self.full_path(key)?;
        let ttl = i64::try_from(ttl_secs)
            .map_err(|_| Error::InvalidInput(format!("ttl out of range: {ttl_secs}")))?;
        Ok(self.url_for(key, Utc::now().timestamp() + ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(dir: &Path) -> LocalObjectStorage {
        LocalObjectStorage::new(StorageConfig {
            base_path: dir.to_path_buf(),
            public_url: "https://media.example.com/dl/".into(),
            signing_secret: "test-secret".into(),
        })
    }

    fn query_param<'a>(url: &'a str, name: &str) -> &'a str {
        let query = url.split_once('?').map(|(_, q)| q).unwrap_or("");
        query
            .split('&')
            .find_map(|kv| kv.strip_prefix(&format!("{name}=")))
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = storage(dir.path());
        let key = "documents/owner/abc.txt";

        store.put_object(key, b"hello world").await.unwrap();
        assert_eq!(store.get_object(key).await.unwrap(), b"hello world");

        store.delete_object(key).await.unwrap();
        assert!(matches!(
            store.get_object(key).await,
            Err(Error::Storage(_))
        ));
        // deleting twice is fine
        store.delete_object(key).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = storage(dir.path());
        for key in ["../etc/passwd", "/abs/path", "", "a/../../b"] {
            assert!(
                matches!(store.get_object(key).await, Err(Error::InvalidInput(_))),
                "{key} should be rejected"
            );
        }
    }

    #[test]
    fn test_presigned_url_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let store = storage(dir.path());
        let key = "documents/owner/scan.pdf";

        let url = store.presigned_download_url(key, 60).unwrap();
        assert!(url.starts_with("https://media.example.com/dl/documents/owner/scan.pdf?"));

        let expires: i64 = query_param(&url, "expires").parse().unwrap();
        let signature = query_param(&url, "signature");
        store.verify_at(key, expires, signature, expires - 1).unwrap();
    }

    #[test]
    fn test_presigned_url_rejects_tampering_and_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let store = storage(dir.path());
        let key = "documents/owner/scan.pdf";
        let url = store.url_for(key, 1_000);
        let signature = query_param(&url, "signature");

        assert!(store.verify_at(key, 1_000, signature, 1_001).is_err());
        assert!(store.verify_at(key, 2_000, signature, 1_500).is_err());
        assert!(store
            .verify_at("documents/other/scan.pdf", 1_000, signature, 500)
            .is_err());
        assert!(store.verify_at(key, 1_000, "zz", 500).is_err());

        let other = LocalObjectStorage::new(StorageConfig {
            base_path: dir.path().to_path_buf(),
            public_url: "x".into(),
            signing_secret: "different".into(),
        });
        assert!(other.verify_at(key, 1_000, signature, 500).is_err());
    }
}
