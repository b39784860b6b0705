//! In-memory object store for tests and dry runs.
//!
//! A [`MemoryBackend`] holds buckets, objects and call statistics. Stores
//! handed out by [`MemoryConnector`] share one backend, so a worker and a
//! test harness observe the same objects.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, StorageError};
use crate::store::{ObjectStore, StorageConnector};
use crate::types::{
    CredentialSource, Credentials, ObjectAcl, ObjectPage, ObjectSummary, RestoreTier,
    StorageClass,
};

/// Owner id stamped on objects the backend creates.
pub const MEMORY_OWNER_ID: &str = "memory-owner";

/// Default number of objects per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// One stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryObject {
    /// Size in bytes.
    pub size: i64,
    /// Storage class.
    pub storage_class: StorageClass,
    /// Current ACL.
    pub acl: ObjectAcl,
}

/// A recorded restore request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreRecord {
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Requested restore lifetime.
    pub days: i32,
    /// Requested tier.
    pub tier: RestoreTier,
}

/// Call counters of a [`MemoryBackend`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStoreStats {
    /// Listing pages served.
    pub list_calls: u64,
    /// Storage class lookups.
    pub heads: u64,
    /// Successful copies.
    pub copies: u64,
    /// ACL reads.
    pub acl_reads: u64,
    /// ACL writes.
    pub acl_writes: u64,
    /// Accepted restore requests.
    pub restores: u64,
}

#[derive(Debug, Default)]
struct MemoryBucket {
    region: String,
    objects: BTreeMap<String, MemoryObject>,
}

#[derive(Debug, Default)]
struct MemoryState {
    buckets: HashMap<String, MemoryBucket>,
    failing: HashSet<(String, String)>,
    restores: Vec<RestoreRecord>,
    stats: MemoryStoreStats,
}

impl MemoryState {
    fn bucket(&self, bucket: &str, region: &str) -> Result<&MemoryBucket> {
        let b = self
            .buckets
            .get(bucket)
            .ok_or_else(|| StorageError::BucketNotFound {
                bucket: bucket.to_string(),
            })?;
        if b.region != region {
            return Err(StorageError::backend(
                "PermanentRedirect",
                format!(
                    "bucket {bucket} is in {}, client is in {region}",
                    b.region
                ),
            ));
        }
        Ok(b)
    }

    fn check_failing(&self, bucket: &str, key: &str) -> Result<()> {
        if self.failing.contains(&(bucket.to_string(), key.to_string())) {
            return Err(StorageError::AccessDenied {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn object(&self, bucket: &str, key: &str, region: &str) -> Result<&MemoryObject> {
        self.check_failing(bucket, key)?;
        self.bucket(bucket, region)?
            .objects
            .get(key)
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    fn object_mut(&mut self, bucket: &str, key: &str, region: &str) -> Result<&mut MemoryObject> {
        self.object(bucket, key, region)?;
        self.buckets
            .get_mut(bucket)
            .and_then(|b| b.objects.get_mut(key))
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }
}

/// Shared state behind every [`MemoryStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or re-homes) a bucket in `region`.
    pub fn create_bucket(&self, bucket: &str, region: &str) {
        let mut state = self.state.lock();
        state
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .region = region.to_string();
    }

    /// Stores an object with a private ACL. The bucket must exist.
    pub fn put_object(&self, bucket: &str, key: &str, size: i64, storage_class: StorageClass) {
        let mut state = self.state.lock();
        if let Some(b) = state.buckets.get_mut(bucket) {
            b.objects.insert(
                key.to_string(),
                MemoryObject {
                    size,
                    storage_class,
                    acl: ObjectAcl::private(MEMORY_OWNER_ID),
                },
            );
        }
    }

    /// Overwrites the ACL of an existing object.
    pub fn set_acl(&self, bucket: &str, key: &str, acl: ObjectAcl) {
        let mut state = self.state.lock();
        if let Some(obj) = state
            .buckets
            .get_mut(bucket)
            .and_then(|b| b.objects.get_mut(key))
        {
            obj.acl = acl;
        }
    }

    /// Makes every operation on `bucket/key` fail with `AccessDenied`.
    pub fn fail_key(&self, bucket: &str, key: &str) {
        self.state
            .lock()
            .failing
            .insert((bucket.to_string(), key.to_string()));
    }

    /// Snapshot of one object.
    pub fn object(&self, bucket: &str, key: &str) -> Option<MemoryObject> {
        self.state
            .lock()
            .buckets
            .get(bucket)
            .and_then(|b| b.objects.get(key))
            .cloned()
    }

    /// Number of objects in `bucket`.
    pub fn object_count(&self, bucket: &str) -> usize {
        self.state
            .lock()
            .buckets
            .get(bucket)
            .map(|b| b.objects.len())
            .unwrap_or(0)
    }

    /// Restore requests accepted so far, in arrival order.
    pub fn restores(&self) -> Vec<RestoreRecord> {
        self.state.lock().restores.clone()
    }

    /// Current call counters.
    pub fn stats(&self) -> MemoryStoreStats {
        self.state.lock().stats.clone()
    }

    /// Opens a store in `region` signing with `credentials`.
    pub fn store(&self, region: &str, credentials: Credentials) -> MemoryStore {
        MemoryStore {
            backend: self.clone(),
            region: region.to_string(),
            credentials,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// An [`ObjectStore`] bound to one region of a [`MemoryBackend`].
#[derive(Debug, Clone)]
pub struct MemoryStore {
    backend: MemoryBackend,
    region: String,
    credentials: Credentials,
    page_size: usize,
}

impl MemoryStore {
    /// Overrides the listing page size (minimum 1).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Region this store is connected to.
    pub fn region(&self) -> &str {
        &self.region
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<&str>,
    ) -> Result<ObjectPage> {
        let mut state = self.backend.state.lock();
        let b = state.bucket(bucket, &self.region)?;
        let mut objects = Vec::with_capacity(self.page_size);
        let mut more = false;
        for (key, obj) in b.objects.iter() {
            if !key.starts_with(prefix) {
                continue;
            }
            if let Some(after) = token {
                if key.as_str() <= after {
                    continue;
                }
            }
            if objects.len() == self.page_size {
                more = true;
                break;
            }
            objects.push(ObjectSummary {
                key: key.clone(),
                size: obj.size,
                storage_class: obj.storage_class.clone(),
            });
        }
        let next_token = if more {
            objects.last().map(|o| o.key.clone())
        } else {
            None
        };
        state.stats.list_calls += 1;
        debug!(bucket, prefix, count = objects.len(), more, "memory list_page");
        Ok(ObjectPage {
            objects,
            next_token,
        })
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<()> {
        let mut state = self.backend.state.lock();
        let source = state.object(src_bucket, src_key, &self.region)?;
        if src_bucket == dst_bucket
            && src_key == dst_key
            && source.storage_class == StorageClass::Standard
        {
            return Err(StorageError::backend(
                "CopyObject",
                format!("{src_bucket}/{src_key} copied onto itself without changing storage class"),
            ));
        }
        let size = source.size;
        state.check_failing(dst_bucket, dst_key)?;
        state.bucket(dst_bucket, &self.region)?;
        if let Some(b) = state.buckets.get_mut(dst_bucket) {
            b.objects.insert(
                dst_key.to_string(),
                MemoryObject {
                    size,
                    storage_class: StorageClass::Standard,
                    acl: ObjectAcl::private(MEMORY_OWNER_ID),
                },
            );
        }
        state.stats.copies += 1;
        Ok(())
    }

    async fn storage_class(&self, bucket: &str, key: &str) -> Result<StorageClass> {
        let mut state = self.backend.state.lock();
        let class = state.object(bucket, key, &self.region)?.storage_class.clone();
        state.stats.heads += 1;
        Ok(class)
    }

    async fn get_acl(&self, bucket: &str, key: &str) -> Result<ObjectAcl> {
        let mut state = self.backend.state.lock();
        let acl = state.object(bucket, key, &self.region)?.acl.clone();
        state.stats.acl_reads += 1;
        Ok(acl)
    }

    async fn put_acl(&self, bucket: &str, key: &str, acl: &ObjectAcl) -> Result<()> {
        let mut state = self.backend.state.lock();
        state.object_mut(bucket, key, &self.region)?.acl = acl.clone();
        state.stats.acl_writes += 1;
        Ok(())
    }

    async fn restore_object(
        &self,
        bucket: &str,
        key: &str,
        days: i32,
        tier: RestoreTier,
    ) -> Result<()> {
        let mut state = self.backend.state.lock();
        let obj = state.object(bucket, key, &self.region)?;
        if !obj.storage_class.is_archived() {
            return Err(StorageError::InvalidObjectState {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: format!("storage class {} is not archived", obj.storage_class),
            });
        }
        state.restores.push(RestoreRecord {
            bucket: bucket.to_string(),
            key: key.to_string(),
            days,
            tier,
        });
        state.stats.restores += 1;
        Ok(())
    }

    async fn bucket_region(&self, bucket: &str) -> Result<String> {
        let state = self.backend.state.lock();
        state
            .buckets
            .get(bucket)
            .map(|b| b.region.clone())
            .ok_or_else(|| StorageError::BucketNotFound {
                bucket: bucket.to_string(),
            })
    }

    async fn resolve_credentials(&self) -> Result<Credentials> {
        Ok(self.credentials.clone())
    }
}

/// A [`StorageConnector`] producing [`MemoryStore`]s over one backend.
#[derive(Debug)]
pub struct MemoryConnector {
    backend: MemoryBackend,
    page_size: usize,
    profiles: HashMap<String, Credentials>,
    connects: Mutex<Vec<String>>,
}

impl MemoryConnector {
    /// Creates a connector over `backend`.
    pub fn new(backend: MemoryBackend) -> Self {
        Self {
            backend,
            page_size: DEFAULT_PAGE_SIZE,
            profiles: HashMap::new(),
            connects: Mutex::new(Vec::new()),
        }
    }

    /// Registers the credential a named profile resolves to.
    pub fn with_profile(mut self, name: &str, credentials: Credentials) -> Self {
        self.profiles.insert(name.to_string(), credentials);
        self
    }

    /// Listing page size for stores opened by this connector.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Regions connected to so far, in call order.
    pub fn connected_regions(&self) -> Vec<String> {
        self.connects.lock().clone()
    }
}

#[async_trait]
impl StorageConnector for MemoryConnector {
    async fn connect(
        &self,
        region: &str,
        credentials: &CredentialSource,
    ) -> Result<Arc<dyn ObjectStore>> {
        let resolved = match credentials {
            CredentialSource::Static(c) => c.clone(),
            CredentialSource::Profile(name) => self
                .profiles
                .get(name)
                .cloned()
                .ok_or_else(|| StorageError::Credentials(format!("unknown profile {name}")))?,
        };
        self.connects.lock().push(region.to_string());
        let store = self
            .backend
            .store(region, resolved)
            .with_page_size(self.page_size);
        Ok(Arc::new(store))
    }
}
