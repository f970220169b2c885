//! AWS KMS-backed [`KmsClient`].

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_kms::{config::Region, error::DisplayErrorContext, primitives::Blob, types::DataKeySpec};
use tracing::debug;

use super::{GeneratedKey, KmsClient, KmsError};

/// A KMS client bound to one customer master key.
#[derive(Clone, Debug)]
pub struct AwsKms {
    client: aws_sdk_kms::Client,
    key_id: String,
}

impl AwsKms {
    /// Build a client for `key_arn` in `region`.
    ///
    /// Credentials are resolved through the standard AWS provider chain. No
    /// request is sent here; connectivity is proven by the first
    /// `generate_data_key` call at startup.
    pub async fn connect(key_arn: &str, region: &str, endpoint_url: Option<&str>) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_owned()))
            .load()
            .await;

        let mut builder = aws_sdk_kms::config::Builder::from(&config);
        if let Some(url) = endpoint_url {
            debug!(endpoint = url, "overriding KMS endpoint");
            builder = builder.endpoint_url(url);
        }

        Self {
            client: aws_sdk_kms::Client::from_conf(builder.build()),
            key_id: key_arn.to_owned(),
        }
    }
}

#[async_trait]
impl KmsClient for AwsKms {
    async fn generate_data_key(&self) -> Result<GeneratedKey, KmsError> {
        let resp = self
            .client
            .generate_data_key()
            .key_id(&self.key_id)
            .key_spec(DataKeySpec::Aes256)
            .send()
            .await
            .map_err(|e| KmsError::Request(DisplayErrorContext(&e).to_string()))?;

        let plaintext = resp
            .plaintext()
            .ok_or(KmsError::EmptyResponse("plaintext"))?
            .as_ref()
            .to_vec();
        let wrapped = resp
            .ciphertext_blob()
            .ok_or(KmsError::EmptyResponse("ciphertext blob"))?
            .as_ref()
            .to_vec();

        Ok(GeneratedKey { plaintext, wrapped })
    }

    async fn unwrap_key(&self, wrapped: &[u8]) -> Result<Vec<u8>, KmsError> {
        let resp = self
            .client
            .decrypt()
            .key_id(&self.key_id)
            .ciphertext_blob(Blob::new(wrapped.to_vec()))
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .is_some_and(|se| se.is_invalid_ciphertext_exception())
                {
                    KmsError::InvalidWrappedKey
                } else {
                    KmsError::Request(DisplayErrorContext(&e).to_string())
                }
            })?;

        resp.plaintext()
            .map(|p| p.as_ref().to_vec())
            .ok_or(KmsError::EmptyResponse("plaintext"))
    }
}
