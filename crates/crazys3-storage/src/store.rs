//! Object store traits implemented by every backend.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    CredentialSource, Credentials, ObjectAcl, ObjectPage, RestoreTier, StorageClass,
};

/// Operations the coordinator and workers need from an object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Lists one page of objects under `prefix`, continuing from `token`.
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<&str>,
    ) -> Result<ObjectPage>;

    /// Current storage class of one object.
    async fn storage_class(&self, bucket: &str, key: &str) -> Result<StorageClass>;

    /// Server-side copy into `STANDARD` storage class.
    ///
    /// Copying an object onto itself is rejected when it is already
    /// `STANDARD`, since nothing would change.
    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<()>;

    /// Reads the ACL of an object.
    async fn get_acl(&self, bucket: &str, key: &str) -> Result<ObjectAcl>;

    /// Replaces the ACL of an object.
    async fn put_acl(&self, bucket: &str, key: &str, acl: &ObjectAcl) -> Result<()>;

    /// Requests a temporary restore of an archived object.
    async fn restore_object(
        &self,
        bucket: &str,
        key: &str,
        days: i32,
        tier: RestoreTier,
    ) -> Result<()>;

    /// Region the bucket lives in.
    async fn bucket_region(&self, bucket: &str) -> Result<String>;

    /// The key pair this store is signing requests with.
    async fn resolve_credentials(&self) -> Result<Credentials>;
}

/// Opens [`ObjectStore`] clients for a region.
#[async_trait]
pub trait StorageConnector: Send + Sync {
    /// Connects to `region` using `credentials`.
    async fn connect(
        &self,
        region: &str,
        credentials: &CredentialSource,
    ) -> Result<Arc<dyn ObjectStore>>;
}
