//! Backend operations run by executors, one per [`ExecutionRequest`].

use crazys3_storage::{ObjectStore, Result, StorageClass, StorageError};
use tracing::debug;

use crate::rpc::{ExecutionRequest, MigrationTask, RecoveryTask, RestorationTask};

/// Runs the storage calls for one request.
pub async fn execute(store: &dyn ObjectStore, request: &ExecutionRequest) -> Result<()> {
    match request {
        ExecutionRequest::Migration(task) => migrate(store, task).await,
        ExecutionRequest::Restoration(task) => restore(store, task).await,
        ExecutionRequest::Recovery(task) => recover(store, task).await,
        ExecutionRequest::Sentinel => Ok(()),
    }
}

/// Copies the object and carries its ACL over. A failing ACL write after a
/// successful copy leaves the copy in place.
async fn migrate(store: &dyn ObjectStore, task: &MigrationTask) -> Result<()> {
    let item = &task.item;
    let acl = store.get_acl(&item.bucket, &item.key).await?;
    store
        .copy_object(&item.bucket, &item.key, &task.dest_bucket, &task.dest_key)
        .await?;
    store
        .put_acl(&task.dest_bucket, &task.dest_key, &acl)
        .await
        .map_err(|e| acl_error("migration", &task.dest_bucket, &task.dest_key, e))?;
    debug!(src = %item.key, dest_bucket = %task.dest_bucket, "migrated");
    Ok(())
}

async fn restore(store: &dyn ObjectStore, task: &RestorationTask) -> Result<()> {
    let item = &task.item;
    store
        .restore_object(&item.bucket, &item.key, task.days, task.tier)
        .await?;
    debug!(key = %item.key, days = task.days, tier = %task.tier, "restore requested");
    Ok(())
}

/// Re-writes the object onto itself as STANDARD and restores its ACL.
/// Objects that are already STANDARD are left alone.
async fn recover(store: &dyn ObjectStore, task: &RecoveryTask) -> Result<()> {
    let item = &task.item;
    if store.storage_class(&item.bucket, &item.key).await? == StorageClass::Standard {
        debug!(key = %item.key, "already STANDARD");
        return Ok(());
    }
    let acl = store.get_acl(&item.bucket, &item.key).await?;
    store
        .copy_object(&item.bucket, &item.key, &item.bucket, &item.key)
        .await?;
    store
        .put_acl(&item.bucket, &item.key, &acl)
        .await
        .map_err(|e| acl_error("recovery", &item.bucket, &item.key, e))?;
    debug!(key = %item.key, "recovered");
    Ok(())
}

fn acl_error(op: &str, bucket: &str, key: &str, err: StorageError) -> StorageError {
    StorageError::backend(
        "PutObjectAcl",
        format!("{op} copied {bucket}/{key} but the ACL write failed: {err}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::WorkItem;
    use crazys3_storage::{
        Credentials, Grant, Grantee, MemoryBackend, ObjectAcl, Permission, RestoreTier,
    };

    fn backend() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.create_bucket("cold", "us-west-2");
        backend.create_bucket("warm", "us-west-2");
        backend.put_object("cold", "a", 100, StorageClass::Glacier);
        backend
    }

    fn shared_acl() -> ObjectAcl {
        let mut acl = ObjectAcl::private("memory-owner");
        acl.grants.push(Grant {
            grantee: Grantee::Email {
                address: "ops@example.com".to_string(),
            },
            permission: Permission::Read,
        });
        acl
    }

    fn item(key: &str) -> WorkItem {
        WorkItem {
            sequence_id: 1,
            bucket: "cold".to_string(),
            key: key.to_string(),
            size: 100,
            storage_class: StorageClass::Glacier,
        }
    }

    #[tokio::test]
    async fn test_migration_copies_object_and_acl() {
        let backend = backend();
        backend.set_acl("cold", "a", shared_acl());
        let store = backend.store("us-west-2", Credentials::new("AKIA", "s"));

        let request = ExecutionRequest::Migration(MigrationTask {
            item: item("a"),
            dest_bucket: "warm".to_string(),
            dest_key: "a".to_string(),
        });
        execute(&store, &request).await.unwrap();

        let copied = backend.object("warm", "a").unwrap();
        assert_eq!(copied.acl, shared_acl());
        assert_eq!(copied.storage_class, StorageClass::Standard);
    }

    #[tokio::test]
    async fn test_recovery_is_idempotent() {
        let backend = backend();
        backend.set_acl("cold", "a", shared_acl());
        let store = backend.store("us-west-2", Credentials::new("AKIA", "s"));
        let request = ExecutionRequest::Recovery(RecoveryTask { item: item("a") });

        execute(&store, &request).await.unwrap();
        let first = backend.object("cold", "a").unwrap();
        execute(&store, &request).await.unwrap();
        let second = backend.object("cold", "a").unwrap();

        assert_eq!(first.storage_class, StorageClass::Standard);
        assert_eq!(first, second);
        assert_eq!(second.acl, shared_acl());
        assert_eq!(backend.stats().copies, 1);
    }

    #[tokio::test]
    async fn test_recovery_of_standard_object_makes_no_copy() {
        let backend = backend();
        backend.put_object("cold", "hot", 10, StorageClass::Standard);
        let store = backend.store("us-west-2", Credentials::new("AKIA", "s"));
        let request = ExecutionRequest::Recovery(RecoveryTask { item: item("hot") });

        execute(&store, &request).await.unwrap();
        assert_eq!(backend.stats().copies, 0);
        assert_eq!(backend.stats().heads, 1);
    }

    #[tokio::test]
    async fn test_restoration_records_request() {
        let backend = backend();
        let store = backend.store("us-west-2", Credentials::new("AKIA", "s"));
        let request = ExecutionRequest::Restoration(RestorationTask {
            item: item("a"),
            days: 5,
            tier: RestoreTier::Expedited,
        });

        execute(&store, &request).await.unwrap();
        let restores = backend.restores();
        assert_eq!(restores.len(), 1);
        assert_eq!(restores[0].tier, RestoreTier::Expedited);
    }

    #[tokio::test]
    async fn test_missing_object_fails_without_copy() {
        let backend = backend();
        let store = backend.store("us-west-2", Credentials::new("AKIA", "s"));
        let request = ExecutionRequest::Migration(MigrationTask {
            item: item("missing"),
            dest_bucket: "warm".to_string(),
            dest_key: "missing".to_string(),
        });

        assert!(matches!(
            execute(&store, &request).await,
            Err(StorageError::ObjectNotFound { .. })
        ));
        assert_eq!(backend.stats().copies, 0);
    }
}
