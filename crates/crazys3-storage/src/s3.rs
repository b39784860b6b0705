//! S3 backend on top of `aws-sdk-s3`.

use std::sync::Arc;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::types as s3t;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{Result, StorageError};
use crate::store::{ObjectStore, StorageConnector};
use crate::types::{
    CredentialSource, Credentials, Grant, Grantee, ObjectAcl, ObjectPage, ObjectSummary, Owner,
    Permission, RestoreTier, StorageClass,
};

const PROVIDER_NAME: &str = "crazys3";

/// Opens [`S3Store`] clients through the standard AWS configuration chain.
#[derive(Debug, Clone, Default)]
pub struct S3Connector;

impl S3Connector {
    /// Creates a connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StorageConnector for S3Connector {
    async fn connect(
        &self,
        region: &str,
        credentials: &CredentialSource,
    ) -> Result<Arc<dyn ObjectStore>> {
        let loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()));
        let loader = match credentials {
            CredentialSource::Profile(name) => loader.profile_name(name),
            CredentialSource::Static(c) => {
                loader.credentials_provider(aws_credential_types::Credentials::new(
                    c.access_key.clone(),
                    c.secret_key.expose().to_string(),
                    c.session_token.as_ref().map(|t| t.expose().to_string()),
                    None,
                    PROVIDER_NAME,
                ))
            }
        };
        let config = loader.load().await;
        info!(region, "connected S3 client");
        Ok(Arc::new(S3Store::new(config)))
    }
}

/// An [`ObjectStore`] backed by one regional S3 client.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    config: SdkConfig,
}

impl S3Store {
    /// Wraps a loaded SDK configuration.
    pub fn new(config: SdkConfig) -> Self {
        Self {
            client: Client::new(&config),
            config,
        }
    }
}

fn sdk_error<E>(operation: &'static str, err: E) -> StorageError
where
    E: std::error::Error,
{
    StorageError::backend(operation, DisplayErrorContext(&err).to_string())
}

fn permission_to_sdk(p: &Permission) -> s3t::Permission {
    s3t::Permission::from(p.as_str())
}

fn grantee_from_sdk(g: &s3t::Grantee) -> Option<Grantee> {
    match g.r#type() {
        s3t::Type::CanonicalUser => Some(Grantee::CanonicalUser {
            id: g.id()?.to_string(),
            display_name: g.display_name().map(String::from),
        }),
        s3t::Type::Group => Some(Grantee::Group {
            uri: g.uri()?.to_string(),
        }),
        s3t::Type::AmazonCustomerByEmail => Some(Grantee::Email {
            address: g.email_address()?.to_string(),
        }),
        _ => None,
    }
}

fn grantee_to_sdk(g: &Grantee) -> Result<s3t::Grantee> {
    let builder = match g {
        Grantee::CanonicalUser { id, display_name } => s3t::Grantee::builder()
            .r#type(s3t::Type::CanonicalUser)
            .id(id)
            .set_display_name(display_name.clone()),
        Grantee::Group { uri } => s3t::Grantee::builder().r#type(s3t::Type::Group).uri(uri),
        Grantee::Email { address } => s3t::Grantee::builder()
            .r#type(s3t::Type::AmazonCustomerByEmail)
            .email_address(address),
    };
    builder
        .build()
        .map_err(|e| StorageError::backend("PutObjectAcl", e.to_string()))
}

fn tier_to_sdk(tier: RestoreTier) -> s3t::Tier {
    match tier {
        RestoreTier::Expedited => s3t::Tier::Expedited,
        RestoreTier::Standard => s3t::Tier::Standard,
        RestoreTier::Bulk => s3t::Tier::Bulk,
    }
}

/// Maps a GetBucketLocation constraint to a region name.
fn region_from_constraint(constraint: Option<&str>) -> String {
    match constraint {
        None | Some("") => "us-east-1".to_string(),
        Some("EU") => "eu-west-1".to_string(),
        Some(other) => other.to_string(),
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<&str>,
    ) -> Result<ObjectPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_continuation_token(token.map(String::from))
            .send()
            .await
            .map_err(|e| sdk_error("ListObjectsV2", e))?;

        let objects = output
            .contents()
            .iter()
            .map(|o| ObjectSummary {
                key: o.key().unwrap_or_default().to_string(),
                size: o.size().unwrap_or_default(),
                storage_class: StorageClass::from_wire(
                    o.storage_class().map(|c| c.as_str()).unwrap_or_default(),
                ),
            })
            .collect::<Vec<_>>();
        let next_token = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(String::from)
        } else {
            None
        };
        debug!(bucket, prefix, count = objects.len(), "listed page");
        Ok(ObjectPage {
            objects,
            next_token,
        })
    }

    async fn storage_class(&self, bucket: &str, key: &str) -> Result<StorageClass> {
        let output = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_error("HeadObject", e))?;
        // HeadObject omits the header for STANDARD objects.
        Ok(StorageClass::from_wire(
            output.storage_class().map(|c| c.as_str()).unwrap_or_default(),
        ))
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<()> {
        self.client
            .copy_object()
            .copy_source(format!("{}/{}", src_bucket, urlencoding::encode(src_key)))
            .bucket(dst_bucket)
            .key(dst_key)
            .storage_class(s3t::StorageClass::Standard)
            .send()
            .await
            .map_err(|e| sdk_error("CopyObject", e))?;
        Ok(())
    }

    async fn get_acl(&self, bucket: &str, key: &str) -> Result<ObjectAcl> {
        let output = self
            .client
            .get_object_acl()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_error("GetObjectAcl", e))?;

        let owner = output.owner().and_then(|o| {
            o.id().map(|id| Owner {
                id: id.to_string(),
                display_name: o.display_name().map(String::from),
            })
        });
        let grants = output
            .grants()
            .iter()
            .filter_map(|g| {
                let grantee = grantee_from_sdk(g.grantee()?)?;
                let permission = Permission::from_wire(g.permission()?.as_str())?;
                Some(Grant {
                    grantee,
                    permission,
                })
            })
            .collect();
        Ok(ObjectAcl { owner, grants })
    }

    async fn put_acl(&self, bucket: &str, key: &str, acl: &ObjectAcl) -> Result<()> {
        let mut grants = Vec::with_capacity(acl.grants.len());
        for g in &acl.grants {
            grants.push(
                s3t::Grant::builder()
                    .grantee(grantee_to_sdk(&g.grantee)?)
                    .permission(permission_to_sdk(&g.permission))
                    .build(),
            );
        }
        let owner = acl.owner.as_ref().map(|o| {
            s3t::Owner::builder()
                .id(&o.id)
                .set_display_name(o.display_name.clone())
                .build()
        });
        let policy = s3t::AccessControlPolicy::builder()
            .set_owner(owner)
            .set_grants(Some(grants))
            .build();

        self.client
            .put_object_acl()
            .bucket(bucket)
            .key(key)
            .access_control_policy(policy)
            .send()
            .await
            .map_err(|e| sdk_error("PutObjectAcl", e))?;
        Ok(())
    }

    async fn restore_object(
        &self,
        bucket: &str,
        key: &str,
        days: i32,
        tier: RestoreTier,
    ) -> Result<()> {
        let job = s3t::GlacierJobParameters::builder()
            .tier(tier_to_sdk(tier))
            .build()
            .map_err(|e| StorageError::backend("RestoreObject", e.to_string()))?;
        let request = s3t::RestoreRequest::builder()
            .days(days)
            .glacier_job_parameters(job)
            .build();

        self.client
            .restore_object()
            .bucket(bucket)
            .key(key)
            .restore_request(request)
            .send()
            .await
            .map_err(|e| sdk_error("RestoreObject", e))?;
        Ok(())
    }

    async fn bucket_region(&self, bucket: &str) -> Result<String> {
        let output = self
            .client
            .get_bucket_location()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| sdk_error("GetBucketLocation", e))?;
        Ok(region_from_constraint(
            output.location_constraint().map(|c| c.as_str()),
        ))
    }

    async fn resolve_credentials(&self) -> Result<Credentials> {
        let provider = self
            .config
            .credentials_provider()
            .ok_or_else(|| StorageError::Credentials("no credentials provider".to_string()))?;
        let creds = provider
            .provide_credentials()
            .await
            .map_err(|e| StorageError::Credentials(DisplayErrorContext(&e).to_string()))?;
        let resolved = Credentials::new(creds.access_key_id(), creds.secret_access_key());
        Ok(match creds.session_token() {
            Some(token) => resolved.with_session_token(token),
            None => resolved,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_from_constraint() {
        assert_eq!(region_from_constraint(None), "us-east-1");
        assert_eq!(region_from_constraint(Some("")), "us-east-1");
        assert_eq!(region_from_constraint(Some("EU")), "eu-west-1");
        assert_eq!(region_from_constraint(Some("ap-south-1")), "ap-south-1");
    }

    #[test]
    fn test_grantee_conversion_roundtrip() {
        let grantee = Grantee::Group {
            uri: "http://acs.amazonaws.com/groups/global/AllUsers".to_string(),
        };
        let sdk = grantee_to_sdk(&grantee).unwrap();
        assert_eq!(grantee_from_sdk(&sdk), Some(grantee));
    }

    #[test]
    fn test_tier_mapping() {
        assert_eq!(tier_to_sdk(RestoreTier::Bulk), s3t::Tier::Bulk);
        assert_eq!(
            permission_to_sdk(&Permission::ReadAcp),
            s3t::Permission::ReadAcp
        );
    }
}
