use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use rand::RngCore;

use dossier_types::ObjectKey;

use crate::error::{StoreError, StoreResult};
use crate::traits::{ObjectInfo, ObjectMetadata, ObjectStore};

const URL_SCHEME: &str = "memory://";

/// Failure mode injected into every subsequent call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Behave as if the endpoint cannot be reached.
    Unreachable,
    /// Reject credentials.
    BadCredentials,
    /// Deny access to the bucket.
    AccessDenied,
}

#[derive(Clone, Debug)]
struct StoredBlob {
    data: Bytes,
    content_type: String,
    metadata: HashMap<String, String>,
}

#[derive(Default)]
struct State {
    bucket_exists: bool,
    objects: BTreeMap<String, StoredBlob>,
}

/// In-memory, map-based object store.
///
/// Intended for tests and local demos. Supports fault injection, artificial
/// latency, and call counting, and issues `memory://` URLs that carry a
/// keyed signature and an expiry, resolvable with [`fetch_url`].
///
/// [`fetch_url`]: InMemoryObjectStore::fetch_url
pub struct InMemoryObjectStore {
    bucket: String,
    signing_key: [u8; 32],
    state: RwLock<State>,
    fault: RwLock<Option<Fault>>,
    latency: RwLock<Duration>,
    calls: AtomicUsize,
}

impl InMemoryObjectStore {
    /// A store whose bucket does not exist yet.
    pub fn new(bucket: impl Into<String>) -> Self {
        let mut signing_key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut signing_key);
        Self {
            bucket: bucket.into(),
            signing_key,
            state: RwLock::new(State::default()),
            fault: RwLock::new(None),
            latency: RwLock::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
        }
    }

    /// A store whose bucket already exists.
    pub fn with_bucket(bucket: impl Into<String>) -> Self {
        let store = Self::new(bucket);
        store.state.write().expect("lock poisoned").bucket_exists = true;
        store
    }

    pub fn set_fault(&self, fault: Option<Fault>) {
        *self.fault.write().expect("lock poisoned") = fault;
    }

    /// Delay applied before every call completes.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write().expect("lock poisoned") = latency;
    }

    /// Number of trait calls made so far, including failed ones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn bucket_exists(&self) -> bool {
        self.state.read().expect("lock poisoned").bucket_exists
    }

    pub fn len(&self) -> usize {
        self.state.read().expect("lock poisoned").objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.state
            .read()
            .expect("lock poisoned")
            .objects
            .contains_key(key.as_str())
    }

    /// Resolve a URL issued by [`ObjectStore::presign_get`], the way an HTTP
    /// client would: expired or tampered URLs are refused.
    pub fn fetch_url(&self, url: &str) -> StoreResult<Bytes> {
        let rest = url
            .strip_prefix(URL_SCHEME)
            .ok_or_else(|| StoreError::Unknown(format!("not a memory url: {url}")))?;
        let (path, query) = rest
            .split_once('?')
            .ok_or_else(|| StoreError::Unknown("url has no signature".into()))?;
        let (bucket, key) = path
            .split_once('/')
            .ok_or_else(|| StoreError::Unknown("url has no key".into()))?;
        if bucket != self.bucket {
            return Err(StoreError::Bucket(format!("unknown bucket {bucket}")));
        }

        let params: HashMap<&str, &str> = query
            .split('&')
            .filter_map(|kv| kv.split_once('='))
            .collect();
        let expires: i64 = params
            .get("expires")
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| StoreError::Unknown("url has no expiry".into()))?;
        let sig = params.get("sig").copied().unwrap_or_default();
        if sig != self.sign(key, expires) {
            return Err(StoreError::Auth("signature mismatch".into()));
        }
        if Utc::now().timestamp() > expires {
            return Err(StoreError::Auth("url expired".into()));
        }

        let key = ObjectKey::from_raw(key);
        self.state
            .read()
            .expect("lock poisoned")
            .objects
            .get(key.as_str())
            .map(|blob| blob.data.clone())
            .ok_or(StoreError::NotFound(key))
    }

    fn sign(&self, key: &str, expires: i64) -> String {
        let mut hasher = blake3::Hasher::new_keyed(&self.signing_key);
        hasher.update(key.as_bytes());
        hasher.update(&expires.to_le_bytes());
        hex::encode(hasher.finalize().as_bytes())
    }

    /// Count the call, apply latency, then surface any injected fault.
    async fn enter(&self) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.read().expect("lock poisoned");
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match *self.fault.read().expect("lock poisoned") {
            None => Ok(()),
            Some(Fault::Unreachable) => Err(StoreError::Connection("connection refused".into())),
            Some(Fault::BadCredentials) => Err(StoreError::Auth("InvalidAccessKeyId".into())),
            Some(Fault::AccessDenied) => Err(StoreError::Bucket("AccessDenied".into())),
        }
    }

    fn require_bucket(&self, state: &State) -> StoreResult<()> {
        if state.bucket_exists {
            Ok(())
        } else {
            Err(StoreError::Bucket(format!("NoSuchBucket: {}", self.bucket)))
        }
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn ensure_bucket(&self) -> StoreResult<()> {
        self.enter().await?;
        self.state.write().expect("lock poisoned").bucket_exists = true;
        Ok(())
    }

    async fn put_file(
        &self,
        key: &ObjectKey,
        path: &Path,
        content_type: &str,
        metadata: &ObjectMetadata,
    ) -> StoreResult<()> {
        self.enter().await?;
        let data = Bytes::from(tokio::fs::read(path).await?);
        let mut state = self.state.write().expect("lock poisoned");
        self.require_bucket(&state)?;
        state.objects.insert(
            key.as_str().to_string(),
            StoredBlob {
                data,
                content_type: content_type.to_string(),
                metadata: metadata.to_map(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &ObjectKey) -> StoreResult<Bytes> {
        self.enter().await?;
        let state = self.state.read().expect("lock poisoned");
        self.require_bucket(&state)?;
        state
            .objects
            .get(key.as_str())
            .map(|blob| blob.data.clone())
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    async fn head(&self, key: &ObjectKey) -> StoreResult<Option<ObjectInfo>> {
        self.enter().await?;
        let state = self.state.read().expect("lock poisoned");
        self.require_bucket(&state)?;
        Ok(state.objects.get(key.as_str()).map(|blob| ObjectInfo {
            key: key.clone(),
            size: blob.data.len() as u64,
            content_type: Some(blob.content_type.clone()),
            metadata: blob.metadata.clone(),
        }))
    }

    async fn delete(&self, key: &ObjectKey) -> StoreResult<()> {
        self.enter().await?;
        let mut state = self.state.write().expect("lock poisoned");
        self.require_bucket(&state)?;
        state.objects.remove(key.as_str());
        Ok(())
    }

    async fn presign_get(
        &self,
        key: &ObjectKey,
        expires_in: Duration,
        _download_name: Option<&str>,
    ) -> StoreResult<String> {
        self.enter().await?;
        let expires = Utc::now().timestamp() + expires_in.as_secs() as i64;
        Ok(format!(
            "{URL_SCHEME}{}/{}?expires={expires}&sig={}",
            self.bucket,
            key,
            self.sign(key.as_str(), expires)
        ))
    }

    async fn list_keys(&self, prefix: &str) -> StoreResult<Vec<ObjectKey>> {
        self.enter().await?;
        let state = self.state.read().expect("lock poisoned");
        self.require_bucket(&state)?;
        Ok(state
            .objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .map(ObjectKey::from_raw)
            .collect())
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("bucket", &self.bucket)
            .field("object_count", &self.len())
            .finish()
    }
}
