//! Object storage access
//!
//! Resolves input/output [`Location`]s to `object_store` backends and
//! provides the few operations the job needs:
//! - Listing the objects selected by a literal path or glob pattern
//! - Reading objects concurrently
//! - Putting objects and clearing a destination prefix
//!
//! S3-compatible clients are built from explicit [`Credentials`]; the process
//! environment is never consulted.

mod location;

pub use location::{Location, Scheme};

use crate::credentials::Credentials;
use crate::error::{Error, Result};
use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Number of objects fetched concurrently by [`StorageClient::read_all`]
const READ_CONCURRENCY: usize = 16;

/// Connection options for S3-compatible backends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageOptions {
    /// Bucket region
    pub region: Option<String>,
    /// Custom endpoint (required for R2)
    pub endpoint: Option<String>,
}

/// Object selected by a listing
#[derive(Debug, Clone)]
pub struct StorageObject {
    /// Object path within its store
    pub path: ObjectPath,
    /// Size in bytes
    pub size: usize,
}

impl From<ObjectMeta> for StorageObject {
    fn from(meta: ObjectMeta) -> Self {
        Self {
            path: meta.location,
            size: meta.size,
        }
    }
}

/// Factory and cache of object stores keyed by backend + bucket
pub struct StorageClient {
    credentials: Option<Credentials>,
    options: StorageOptions,
    stores: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl std::fmt::Debug for StorageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageClient")
            .field("credentials", &self.credentials)
            .field("options", &self.options)
            .finish()
    }
}

impl StorageClient {
    /// Create a client
    pub fn new(credentials: Option<Credentials>, options: StorageOptions) -> Self {
        Self {
            credentials,
            options,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Client that can only reach the local filesystem
    pub fn local() -> Self {
        Self::new(None, StorageOptions::default())
    }

    /// Object store serving a location
    pub fn store_for(&self, location: &Location) -> Result<Arc<dyn ObjectStore>> {
        let cache_key = format!(
            "{:?}/{}",
            location.scheme(),
            location.bucket().unwrap_or_default()
        );

        let mut stores = self
            .stores
            .lock()
            .map_err(|_| Error::Other("storage cache poisoned".to_string()))?;
        if let Some(store) = stores.get(&cache_key) {
            return Ok(Arc::clone(store));
        }

        let store = self.build_store(location)?;
        stores.insert(cache_key, Arc::clone(&store));
        Ok(store)
    }

    fn build_store(&self, location: &Location) -> Result<Arc<dyn ObjectStore>> {
        match location.scheme() {
            Scheme::Local => Ok(Arc::new(LocalFileSystem::new())),
            scheme @ (Scheme::S3 | Scheme::R2) => {
                let credentials = self.credentials.as_ref().ok_or_else(|| {
                    Error::credentials(format!(
                        "location '{location}' needs credentials but none were loaded"
                    ))
                })?;
                let bucket = location
                    .bucket()
                    .ok_or_else(|| Error::invalid_location(location.as_str(), "missing bucket"))?;

                let mut builder = AmazonS3Builder::new()
                    .with_bucket_name(bucket)
                    .with_access_key_id(credentials.access_key_id())
                    .with_secret_access_key(credentials.secret_access_key());

                if let Some(token) = credentials.session_token() {
                    builder = builder.with_token(token);
                }
                if let Some(region) = &self.options.region {
                    builder = builder.with_region(region);
                }
                match (&self.options.endpoint, scheme) {
                    (Some(endpoint), _) => builder = builder.with_endpoint(endpoint),
                    (None, Scheme::R2) => {
                        return Err(Error::missing_field("storage.endpoint"));
                    }
                    _ => {}
                }

                let store = builder.build().map_err(|e| {
                    Error::config(format!("Failed to create S3 client for '{location}': {e}"))
                })?;
                Ok(Arc::new(store))
            }
        }
    }

    /// List the objects selected by a location, sorted by path
    ///
    /// A literal location naming a single object selects that object; any
    /// other literal location is a directory prefix. Objects with a path
    /// segment starting with `_` or `.` below the literal prefix are skipped.
    pub async fn list(&self, location: &Location) -> Result<Vec<StorageObject>> {
        let store = self.store_for(location)?;

        if !location.has_glob() && !location.key().is_empty() {
            if let Ok(meta) = store.head(&location.object_path()).await {
                debug!(location = %location, "Location names a single object");
                return Ok(vec![meta.into()]);
            }
        }

        let prefix = location.literal_prefix();
        let matcher = location.glob_regex()?;
        let prefix_path = (!prefix.is_empty()).then(|| ObjectPath::from(prefix.as_str()));

        let metas: Vec<ObjectMeta> = store
            .list(prefix_path.as_ref())
            .try_collect()
            .await
            .map_err(|e| Error::source_read(location.as_str(), e.to_string()))?;

        let mut objects: Vec<StorageObject> = metas
            .into_iter()
            .filter(|meta| {
                let key = meta.location.as_ref();
                let relative = key
                    .strip_prefix(prefix.as_str())
                    .unwrap_or(key)
                    .trim_start_matches('/');
                if relative.split('/').any(is_hidden_segment) {
                    return false;
                }
                matcher.as_ref().map_or(true, |re| re.is_match(key))
            })
            .map(StorageObject::from)
            .collect();

        objects.sort_by(|a, b| a.path.as_ref().cmp(b.path.as_ref()));
        debug!(location = %location, prefix = %prefix, matched = objects.len(), "Listed objects");
        Ok(objects)
    }

    /// Read every object selected by a location
    ///
    /// Returns `(path, bytes)` pairs in listing order. An empty selection is
    /// an error.
    pub async fn read_all(&self, location: &Location) -> Result<Vec<(String, Bytes)>> {
        let objects = self.list(location).await?;
        if objects.is_empty() {
            return Err(Error::source_read(location.as_str(), "no objects matched"));
        }

        let store = self.store_for(location)?;
        stream::iter(objects)
            .map(|object| {
                let store = Arc::clone(&store);
                async move {
                    let bytes = store
                        .get(&object.path)
                        .await
                        .map_err(|e| Error::source_read(object.path.as_ref(), e.to_string()))?
                        .bytes()
                        .await
                        .map_err(|e| Error::source_read(object.path.as_ref(), e.to_string()))?;
                    Ok::<_, Error>((object.path.to_string(), bytes))
                }
            })
            .buffered(READ_CONCURRENCY)
            .try_collect()
            .await
    }

    /// Whether anything exists under a location
    pub async fn exists_any(&self, location: &Location) -> Result<bool> {
        let store = self.store_for(location)?;
        let prefix = location.object_path();
        let mut listing = store.list(Some(&prefix));
        match listing.next().await {
            Some(Ok(_)) => Ok(true),
            Some(Err(e)) => Err(e.into()),
            None => Ok(false),
        }
    }

    /// Remove every object under a location
    pub async fn delete_prefix(&self, location: &Location) -> Result<()> {
        if location.scheme() == Scheme::Local {
            let dir = std::path::PathBuf::from(format!("/{}", location.key()));
            return match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(Error::write(location.as_str(), e.to_string())),
            };
        }

        let store = self.store_for(location)?;
        let prefix = location.object_path();
        let paths = store
            .list(Some(&prefix))
            .map_ok(|meta| meta.location)
            .boxed();
        let deleted: Vec<ObjectPath> = store
            .delete_stream(paths)
            .try_collect()
            .await
            .map_err(|e| Error::write(location.as_str(), e.to_string()))?;
        debug!(location = %location, deleted = deleted.len(), "Cleared destination");
        Ok(())
    }

    /// Put an object at an already-escaped path below a location
    pub async fn put(&self, location: &Location, relative: &str, data: Bytes) -> Result<String> {
        let store = self.store_for(location)?;
        let path = location.child_path(relative)?;
        store
            .put(&path, data.into())
            .await
            .map_err(|e| Error::write(path.as_ref(), e.to_string()))?;
        Ok(location.join(relative).to_string())
    }
}

fn is_hidden_segment(segment: &str) -> bool {
    segment.starts_with('_') || segment.starts_with('.')
}

#[cfg(test)]
mod tests;
