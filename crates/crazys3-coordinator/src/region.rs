//! Region reconciliation before a job starts.

use std::sync::Arc;

use crazys3_storage::{CredentialSource, ObjectStore, StorageConnector};
use tracing::info;

use crate::error::{CoordinatorError, Result};
use crate::job::{JobParams, JobSpec};

/// The region a job runs in and a store connected there.
pub struct RegionPlan {
    /// Region of the job's bucket(s).
    pub region: String,
    /// Store connected in `region`.
    pub store: Arc<dyn ObjectStore>,
}

/// Resolves the job region, reconnecting away from `default_region` when
/// the bucket lives elsewhere.
///
/// For migrations both buckets must share a region; otherwise the job is
/// refused before any worker is contacted.
pub async fn reconcile(
    connector: &dyn StorageConnector,
    credentials: &CredentialSource,
    default_region: &str,
    spec: &JobSpec,
) -> Result<RegionPlan> {
    let store = connector.connect(default_region, credentials).await?;
    let source_region = store.bucket_region(&spec.source_bucket).await?;

    if let JobParams::Migration { dest_bucket } = &spec.params {
        let dest_region = store.bucket_region(dest_bucket).await?;
        if dest_region != source_region {
            return Err(CoordinatorError::RegionMismatch {
                source_bucket: spec.source_bucket.clone(),
                source_region,
                dest_bucket: dest_bucket.clone(),
                dest_region,
            });
        }
    }

    if source_region == default_region {
        return Ok(RegionPlan {
            region: source_region,
            store,
        });
    }
    info!(
        bucket = %spec.source_bucket,
        region = %source_region,
        "bucket is outside the default region, reconnecting"
    );
    let store = connector.connect(&source_region, credentials).await?;
    Ok(RegionPlan {
        region: source_region,
        store,
    })
}
