//! Domain types shared by every storage backend.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Storage class of an object, as reported by listing calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageClass {
    /// `STANDARD`
    Standard,
    /// `REDUCED_REDUNDANCY`
    ReducedRedundancy,
    /// `STANDARD_IA`
    StandardIa,
    /// `ONEZONE_IA`
    OnezoneIa,
    /// `INTELLIGENT_TIERING`
    IntelligentTiering,
    /// `GLACIER`
    Glacier,
    /// `GLACIER_IR`
    GlacierIr,
    /// `DEEP_ARCHIVE`
    DeepArchive,
    /// Any class this build does not know by name.
    Other(String),
}

impl StorageClass {
    /// Wire name used by the storage service.
    pub fn as_str(&self) -> &str {
        match self {
            StorageClass::Standard => "STANDARD",
            StorageClass::ReducedRedundancy => "REDUCED_REDUNDANCY",
            StorageClass::StandardIa => "STANDARD_IA",
            StorageClass::OnezoneIa => "ONEZONE_IA",
            StorageClass::IntelligentTiering => "INTELLIGENT_TIERING",
            StorageClass::Glacier => "GLACIER",
            StorageClass::GlacierIr => "GLACIER_IR",
            StorageClass::DeepArchive => "DEEP_ARCHIVE",
            StorageClass::Other(name) => name,
        }
    }

    /// Parses a wire name. Unknown names map to [`StorageClass::Other`];
    /// an empty name means `STANDARD`, which is what listings omit.
    pub fn from_wire(name: &str) -> Self {
        match name {
            "" | "STANDARD" => StorageClass::Standard,
            "REDUCED_REDUNDANCY" => StorageClass::ReducedRedundancy,
            "STANDARD_IA" => StorageClass::StandardIa,
            "ONEZONE_IA" => StorageClass::OnezoneIa,
            "INTELLIGENT_TIERING" => StorageClass::IntelligentTiering,
            "GLACIER" => StorageClass::Glacier,
            "GLACIER_IR" => StorageClass::GlacierIr,
            "DEEP_ARCHIVE" => StorageClass::DeepArchive,
            other => StorageClass::Other(other.to_string()),
        }
    }

    /// True for classes whose objects must be restored before they can be read.
    pub fn is_archived(&self) -> bool {
        matches!(self, StorageClass::Glacier | StorageClass::DeepArchive)
    }
}

impl Default for StorageClass {
    fn default() -> Self {
        StorageClass::Standard
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Glacier retrieval tier for restore requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RestoreTier {
    /// Minutes; most expensive.
    Expedited,
    /// Hours.
    Standard,
    /// Cheapest, slowest.
    Bulk,
}

impl RestoreTier {
    /// Wire name used by the storage service.
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreTier::Expedited => "Expedited",
            RestoreTier::Standard => "Standard",
            RestoreTier::Bulk => "Bulk",
        }
    }
}

impl Default for RestoreTier {
    fn default() -> Self {
        RestoreTier::Standard
    }
}

impl fmt::Display for RestoreTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RestoreTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "expedited" => Ok(RestoreTier::Expedited),
            "standard" => Ok(RestoreTier::Standard),
            "bulk" => Ok(RestoreTier::Bulk),
            other => Err(format!(
                "unknown restore tier '{other}' (expected expedited, standard or bulk)"
            )),
        }
    }
}

/// One entry of a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    /// Object key.
    pub key: String,
    /// Size in bytes.
    pub size: i64,
    /// Current storage class.
    pub storage_class: StorageClass,
}

/// One page of a listing, plus the token for the next page if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    /// Objects on this page, in key order.
    pub objects: Vec<ObjectSummary>,
    /// Continuation token; `None` on the last page.
    pub next_token: Option<String>,
}

/// ACL permission.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Permission {
    /// `FULL_CONTROL`
    FullControl,
    /// `READ`
    Read,
    /// `WRITE`
    Write,
    /// `READ_ACP`
    ReadAcp,
    /// `WRITE_ACP`
    WriteAcp,
}

impl Permission {
    /// Wire name used by the storage service.
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::FullControl => "FULL_CONTROL",
            Permission::Read => "READ",
            Permission::Write => "WRITE",
            Permission::ReadAcp => "READ_ACP",
            Permission::WriteAcp => "WRITE_ACP",
        }
    }

    /// Parses a wire name.
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "FULL_CONTROL" => Some(Permission::FullControl),
            "READ" => Some(Permission::Read),
            "WRITE" => Some(Permission::Write),
            "READ_ACP" => Some(Permission::ReadAcp),
            "WRITE_ACP" => Some(Permission::WriteAcp),
            _ => None,
        }
    }
}

/// The principal a grant applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Grantee {
    /// A canonical user id.
    CanonicalUser {
        /// Canonical id.
        id: String,
        /// Display name, when the backend reports one.
        display_name: Option<String>,
    },
    /// A predefined group such as AllUsers.
    Group {
        /// Group URI.
        uri: String,
    },
    /// An account identified by email.
    Email {
        /// Email address.
        address: String,
    },
}

/// A single ACL grant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Grant {
    /// Who receives the permission.
    pub grantee: Grantee,
    /// The permission granted.
    pub permission: Permission,
}

/// Object owner.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Owner {
    /// Canonical id.
    pub id: String,
    /// Display name, when known.
    pub display_name: Option<String>,
}

/// Access control list of one object.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectAcl {
    /// Owner, when reported.
    pub owner: Option<Owner>,
    /// Grants in backend order.
    pub grants: Vec<Grant>,
}

impl ObjectAcl {
    /// ACL with a single full-control grant for `owner_id`.
    pub fn private(owner_id: impl Into<String>) -> Self {
        let id = owner_id.into();
        Self {
            owner: Some(Owner {
                id: id.clone(),
                display_name: None,
            }),
            grants: vec![Grant {
                grantee: Grantee::CanonicalUser {
                    id,
                    display_name: None,
                },
                permission: Permission::FullControl,
            }],
        }
    }
}

/// A secret that is wiped from memory on drop and never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    /// Wraps `value`.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrows the secret value.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

/// A resolved access key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Access key id.
    pub access_key: String,
    /// Secret access key.
    pub secret_key: SecretString,
    /// Session token; set for temporary credentials only.
    pub session_token: Option<SecretString>,
}

impl Credentials {
    /// Builds a long-lived credential pair.
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: SecretString::new(secret_key),
            session_token: None,
        }
    }

    /// Attaches the session token of temporary credentials.
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(SecretString::new(token));
        self
    }
}

/// Where a connector should take its credential from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// A named profile from the shared credentials files.
    Profile(String),
    /// An explicit key pair.
    Static(Credentials),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_storage_class_wire_names() {
        assert_eq!(StorageClass::from_wire("GLACIER"), StorageClass::Glacier);
        assert_eq!(StorageClass::from_wire(""), StorageClass::Standard);
        assert_eq!(StorageClass::DeepArchive.as_str(), "DEEP_ARCHIVE");
        assert_eq!(
            StorageClass::from_wire("EXPRESS_ONEZONE"),
            StorageClass::Other("EXPRESS_ONEZONE".to_string())
        );
        assert!(StorageClass::Glacier.is_archived());
        assert!(!StorageClass::GlacierIr.is_archived());
    }

    #[test]
    fn test_restore_tier_parse() {
        assert_eq!("bulk".parse::<RestoreTier>().unwrap(), RestoreTier::Bulk);
        assert_eq!("Expedited".parse::<RestoreTier>().unwrap(), RestoreTier::Expedited);
        assert!("fast".parse::<RestoreTier>().is_err());
    }

    #[test]
    fn test_secret_is_redacted() {
        let creds = Credentials::new("AKIAEXAMPLE", "wJalrXUtnFEMI");
        let printed = format!("{:?}", creds);
        assert!(printed.contains("AKIAEXAMPLE"));
        assert!(!printed.contains("wJalrXUtnFEMI"));
        assert_eq!(creds.secret_key.expose(), "wJalrXUtnFEMI");

        let temporary = creds.with_session_token("FwoGZXIvYXdzEXAMPLE");
        assert!(!format!("{:?}", temporary).contains("FwoGZXIvYXdzEXAMPLE"));
    }

    #[test]
    fn test_private_acl() {
        let acl = ObjectAcl::private("owner-1");
        assert_eq!(acl.grants.len(), 1);
        assert_eq!(acl.grants[0].permission, Permission::FullControl);
    }

    proptest! {
        #[test]
        fn prop_storage_class_name_survives_parse(name in "[A-Z_]{1,20}") {
            let class = StorageClass::from_wire(&name);
            prop_assert_eq!(class.as_str(), name.as_str());
        }
    }
}
