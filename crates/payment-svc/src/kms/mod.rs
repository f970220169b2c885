//! Clients for the key management service that holds the key-encryption key.
//!
//! The service never sees the KEK itself. It asks the KMS for two things only:
//! a freshly generated data key (plaintext + wrapped form), and the plaintext
//! of a previously wrapped data key.
//!
//! # Key URIs
//!
//! ```text
//! aws-kms://arn:aws:kms:<region>:<account>:key/<key-id>
//! aws-kms://arn:aws:kms:<region>:<account>:alias/<alias>
//! local-kms://<base64url-no-pad(32-byte KEK)>
//! ```
//!
//! `local-kms` keeps the KEK in process memory and exists for development and
//! tests. It offers none of the guarantees of a real KMS.

pub mod aws;
pub mod local;

pub use aws::AwsKms;
pub use local::LocalKms;

use std::{fmt, str::FromStr, sync::Arc};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use thiserror::Error;

use crate::crypto::KEY_LEN;

const AWS_SCHEME: &str = "aws-kms://";
const LOCAL_SCHEME: &str = "local-kms://";

/// Errors returned by a [`KmsClient`].
#[derive(Debug, Error)]
pub enum KmsError {
    /// The KMS could not be reached or rejected the request.
    #[error("kms request failed: {0}")]
    Request(String),

    /// The KMS answered without the expected key material.
    #[error("kms response missing {0}")]
    EmptyResponse(&'static str),

    /// The wrapped key is malformed or was not produced by this KEK.
    #[error("wrapped key rejected")]
    InvalidWrappedKey,
}

/// The key URI is not one of the supported forms.
#[derive(Debug, Error)]
#[error("invalid key URI: {0}")]
pub struct InvalidKeyUri(pub String);

/// A data key freshly generated by the KMS.
pub struct GeneratedKey {
    /// Plaintext key bytes. Must never leave process memory.
    pub plaintext: Vec<u8>,
    /// The same key wrapped under the KEK; safe to persist.
    pub wrapped: Vec<u8>,
}

impl fmt::Debug for GeneratedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedKey")
            .field("plaintext", &"[REDACTED]")
            .field("wrapped_len", &self.wrapped.len())
            .finish()
    }
}

/// Operations the service needs from a key management service.
///
/// Implementations are bound to a single KEK at construction time.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KmsClient: Send + Sync {
    /// Generate a new 256-bit data key and return it with its wrapped form.
    async fn generate_data_key(&self) -> Result<GeneratedKey, KmsError>;

    /// Return the plaintext of a data key previously wrapped by this KEK.
    async fn unwrap_key(&self, wrapped: &[u8]) -> Result<Vec<u8>, KmsError>;
}

/// A parsed key-encryption-key URI.
#[derive(Clone, PartialEq, Eq)]
pub enum KeyUri {
    /// A KEK held by AWS KMS.
    Aws {
        /// Full key or alias ARN.
        key_arn: String,
        /// Region parsed out of the ARN.
        region: String,
    },
    /// A KEK held in process memory.
    Local { kek: [u8; KEY_LEN] },
}

impl fmt::Debug for KeyUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyUri::Aws { key_arn, region } => f
                .debug_struct("Aws")
                .field("key_arn", key_arn)
                .field("region", region)
                .finish(),
            KeyUri::Local { .. } => f.write_str("Local([REDACTED])"),
        }
    }
}

impl FromStr for KeyUri {
    type Err = InvalidKeyUri;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(arn) = s.strip_prefix(AWS_SCHEME) {
            let region = parse_kms_arn(arn)
                .ok_or_else(|| InvalidKeyUri(format!("malformed KMS key ARN: {arn}")))?;
            return Ok(KeyUri::Aws {
                key_arn: arn.to_owned(),
                region,
            });
        }
        if let Some(encoded) = s.strip_prefix(LOCAL_SCHEME) {
            let bytes = URL_SAFE_NO_PAD
                .decode(encoded)
                .map_err(|_| InvalidKeyUri("local-kms key is not base64url".into()))?;
            if bytes.len() != KEY_LEN {
                return Err(InvalidKeyUri(format!(
                    "local-kms key must be {KEY_LEN} bytes, got {}",
                    bytes.len()
                )));
            }
            let mut kek = [0u8; KEY_LEN];
            kek.copy_from_slice(&bytes);
            return Ok(KeyUri::Local { kek });
        }
        // Never echo the full URI back; it may embed key material.
        Err(InvalidKeyUri(
            "expected an aws-kms:// or local-kms:// URI".into(),
        ))
    }
}

#[cfg(test)]
impl KeyUri {
    /// Build a `local-kms://` URI string for the given KEK.
    pub fn local(kek: &[u8; KEY_LEN]) -> String {
        format!("{LOCAL_SCHEME}{}", URL_SAFE_NO_PAD.encode(kek))
    }
}

/// Returns the region of a KMS key or alias ARN, or `None` if malformed.
fn parse_kms_arn(arn: &str) -> Option<String> {
    let parts: Vec<&str> = arn.splitn(6, ':').collect();
    if parts.len() != 6 || parts[0] != "arn" || parts[2] != "kms" {
        return None;
    }
    if !parts[1].starts_with("aws") || parts[3].is_empty() || parts[4].is_empty() {
        return None;
    }
    let resource = parts[5];
    let valid_resource = resource
        .strip_prefix("key/")
        .or_else(|| resource.strip_prefix("alias/"))
        .is_some_and(|id| !id.is_empty());
    valid_resource.then(|| parts[3].to_owned())
}

/// Build the [`KmsClient`] matching `uri`.
///
/// `endpoint_url` overrides the AWS KMS endpoint (VPC endpoints, LocalStack);
/// it is ignored for `local-kms`.
pub async fn connect(uri: &KeyUri, endpoint_url: Option<&str>) -> Arc<dyn KmsClient> {
    match uri {
        KeyUri::Aws { key_arn, region } => {
            Arc::new(AwsKms::connect(key_arn, region, endpoint_url).await)
        }
        KeyUri::Local { kek } => Arc::new(LocalKms::new(*kek)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARN: &str = "arn:aws:kms:eu-west-1:123456789012:key/1234abcd-12ab-34cd-56ef-1234567890ab";

    #[test]
    fn parses_aws_key_arn() {
        let uri: KeyUri = format!("aws-kms://{ARN}").parse().unwrap();
        assert_eq!(
            uri,
            KeyUri::Aws {
                key_arn: ARN.into(),
                region: "eu-west-1".into()
            }
        );
    }

    #[test]
    fn parses_aws_alias_arn() {
        let uri: KeyUri = "aws-kms://arn:aws:kms:us-east-1:123456789012:alias/db-credit-card"
            .parse()
            .unwrap();
        assert!(matches!(uri, KeyUri::Aws { ref region, .. } if region == "us-east-1"));
    }

    #[test]
    fn rejects_arn_without_region() {
        assert!("aws-kms://arn:aws:kms::123456789012:key/abc"
            .parse::<KeyUri>()
            .is_err());
    }

    #[test]
    fn rejects_non_kms_arn() {
        assert!("aws-kms://arn:aws:s3:us-east-1:123456789012:key/abc"
            .parse::<KeyUri>()
            .is_err());
    }

    #[test]
    fn rejects_empty_key_id() {
        assert!("aws-kms://arn:aws:kms:us-east-1:123456789012:key/"
            .parse::<KeyUri>()
            .is_err());
    }

    #[test]
    fn rejects_unknown_scheme() {
        let err = "gcp-kms://projects/p/locations/global/keyRings/r/cryptoKeys/k"
            .parse::<KeyUri>()
            .unwrap_err();
        assert!(err.to_string().contains("aws-kms://"));
    }

    #[test]
    fn local_uri_round_trip() {
        let kek = [0x24u8; KEY_LEN];
        let uri: KeyUri = KeyUri::local(&kek).parse().unwrap();
        assert_eq!(uri, KeyUri::Local { kek });
    }

    #[test]
    fn rejects_short_local_kek() {
        let uri = format!("local-kms://{}", URL_SAFE_NO_PAD.encode([1u8; 16]));
        assert!(uri.parse::<KeyUri>().is_err());
    }

    #[test]
    fn local_uri_debug_is_redacted() {
        let uri = KeyUri::Local { kek: [0xAB; KEY_LEN] };
        assert_eq!(format!("{uri:?}"), "Local([REDACTED])");
    }
}
