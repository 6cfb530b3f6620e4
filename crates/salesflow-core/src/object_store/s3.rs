use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::Client;

use super::{ObjectStore, ObjectStoreError};
use crate::config::ObjectStoreSettings;

const ACCESS_KEY_VAR: &str = "SALESFLOW_S3_ACCESS_KEY_ID";
const SECRET_KEY_VAR: &str = "SALESFLOW_S3_SECRET_ACCESS_KEY";

/// S3-compatible object store. Buckets are chosen per source, so one client
/// serves every file source.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub async fn new(settings: &ObjectStoreSettings) -> Result<Self, ObjectStoreError> {
        if settings.region.trim().is_empty() {
            return Err(ObjectStoreError::Unavailable(
                "object store region cannot be empty".into(),
            ));
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()));

        if let (Ok(access_key), Ok(secret_key)) =
            (std::env::var(ACCESS_KEY_VAR), std::env::var(SECRET_KEY_VAR))
        {
            let credentials = Credentials::new(access_key, secret_key, None, None, "static");
            loader = loader.credentials_provider(SharedCredentialsProvider::new(credentials));
        }

        let shared_config = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);

        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        if settings.force_path_style {
            builder = builder.force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
        })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn fetch(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), ObjectStoreError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| match err {
                SdkError::ServiceError(service_err) => {
                    let err = service_err.err();
                    if err.is_no_such_key() {
                        ObjectStoreError::NotFound {
                            bucket: bucket.to_string(),
                            key: key.to_string(),
                        }
                    } else if err.code() == Some("AccessDenied") {
                        ObjectStoreError::AccessDenied {
                            bucket: bucket.to_string(),
                            key: key.to_string(),
                        }
                    } else {
                        ObjectStoreError::Unavailable(err.to_string())
                    }
                }
                other => ObjectStoreError::Unavailable(other.to_string()),
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|err| ObjectStoreError::Unavailable(err.to_string()))?;
        std::fs::write(dest, data.into_bytes())?;
        Ok(())
    }
}
