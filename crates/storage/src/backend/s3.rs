//! S3-compatible storage backend.
//!
//! This module provides a hub implementation for S3-compatible services
//! including AWS S3, Backblaze B2, Aliyun OSS, MinIO and others.
//!
//! # Credentials
//!
//! Credentials are provided explicitly, usually parsed out of a
//! [`Locator`](crate::Locator). Each hub carries its own key pair.

use crate::{
    FileInfo, Filehub, Object,
    backend::FileInfoStream,
    content::DEFAULT_CONTENT_TYPE,
    error::{ErrorKind, Result},
    path::is_within,
    validate_path,
};
use async_stream::stream;
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, http::HttpResponse, retry::RetryConfig},
    error::{DisplayErrorContext, SdkError},
    primitives::{ByteStream, DateTime},
};
use exn::{OptionExt, ResultExt};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Generous default for concurrent S3 requests.
const DEFAULT_CONCURRENT_REQUESTS: usize = 100;

/// S3-compatible storage backend.
///
/// Stores files in an S3 bucket, optionally under a key prefix. All paths are
/// relative to the configured prefix (if any).
///
/// # Examples
///
/// ```no_run
/// use filehub_storage::backend::S3Backend;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = S3Backend::new(
///     "my-storage",
///     "my-bucket",
///     Some("library/".to_string()),
///     "us-west-004",
///     Some("https://s3.us-west-004.backblazeb2.com".to_string()),
///     "access_key_id",
///     "secret_access_key",
/// ).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct S3Backend {
    name: String,
    client: Client,
    bucket: String,
    prefix: Option<String>,
    /// Public base URL, see [`Filehub::prefix`].
    base_url: String,
    /// Rate limiter for concurrent S3 requests.
    rate_limiter: Arc<Semaphore>,
}

impl S3Backend {
    /// Create a new S3 storage backend.
    ///
    /// # Arguments
    /// * `name` - A name for this backend (used in display/logging)
    /// * `bucket` - S3 bucket name
    /// * `prefix` - Optional key prefix (acts as virtual directory)
    /// * `region` - AWS region or provider-specific region (e.g., "us-west-004" for Backblaze)
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    /// * `key_id` - AWS/provider access key ID
    /// * `key_secret` - AWS/provider secret access key
    pub async fn new(
        name: impl Into<String>,
        bucket: impl Into<String>,
        prefix: Option<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Result<Self> {
        let prefix = prefix.filter(|p| !p.trim_matches('/').is_empty()).map(validate_path).transpose()?;
        let name = name.into();
        let bucket = bucket.into();
        let region = region.into();
        let endpoint = endpoint.map(Into::into);
        let base_url = Self::base_url(&bucket, &region, endpoint.as_deref(), prefix.as_deref());
        let credentials = Credentials::new(key_id, key_secret, None, None, "filehub-locator");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region))
            // Configure retry policy with exponential backoff (1 initial + 3 retries)
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            // Use path-style addressing for better compatibility with
            // S3-compatible services (Backblaze, MinIO, etc.)
            .force_path_style(true);
        // Set custom endpoint for non-AWS services
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        let client = Client::from_conf(config_builder.build());
        let rate_limiter = Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS));
        Ok(Self {
            name,
            client,
            bucket,
            prefix,
            base_url,
            rate_limiter,
        })
    }

    fn base_url(bucket: &str, region: &str, endpoint: Option<&str>, prefix: Option<&str>) -> String {
        let host = match endpoint {
            Some(endpoint) => format!("{}/{bucket}", endpoint.trim_end_matches('/')),
            None => format!("https://{bucket}.s3.{region}.amazonaws.com"),
        };
        match prefix {
            Some(prefix) => format!("{host}/{prefix}/"),
            None => format!("{host}/"),
        }
    }

    /// Construct the full S3 key from a relative path.
    fn full_key(&self, path: &str) -> Result<String> {
        let validated = validate_path(path)?;
        Ok(join_key(self.prefix.as_deref(), &validated))
    }

    /// Strip the configured prefix from an S3 key to get relative path.
    fn relative_path(&self, key: &str) -> Result<String> {
        validate_path(strip_key(self.prefix.as_deref(), key))
    }

    /// Acquire a rate limiter permit before making an S3 API call.
    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        self.rate_limiter
            .clone()
            .acquire_owned()
            .await
            .or_raise(|| ErrorKind::BackendError("S3 rate limiter closed".to_string()))
    }

    /// Convert AWS DateTime to OffsetDateTime.
    fn parse_datetime(dt: &DateTime) -> Result<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp_nanos(dt.as_nanos())
            .or_raise(|| ErrorKind::BackendError("S3 datetime out of range".to_string()))
    }

    fn map_sdk_error<E>(err: SdkError<E, HttpResponse>, path: &str) -> ErrorKind
    where
        E: std::error::Error + 'static,
    {
        match &err {
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
                ErrorKind::Network(DisplayErrorContext(&err).to_string())
            },
            SdkError::ServiceError(service) if service.raw().status().as_u16() == 404 => {
                ErrorKind::NotFound(path.to_string())
            },
            SdkError::ServiceError(service) if service.raw().status().as_u16() == 403 => {
                ErrorKind::PermissionDenied(path.to_string())
            },
            _ => ErrorKind::BackendError(DisplayErrorContext(&err).to_string()),
        }
    }
}

/// Join a hub path onto an optional key prefix.
fn join_key(prefix: Option<&str>, path: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), path),
        None => path.to_string(),
    }
}

/// Strip an optional key prefix from a listed key.
fn strip_key<'k>(prefix: Option<&str>, key: &'k str) -> &'k str {
    match prefix {
        Some(prefix) => {
            let prefix_normalized = prefix.trim_end_matches('/');
            key.strip_prefix(prefix_normalized).and_then(|s| s.strip_prefix('/')).unwrap_or(key)
        },
        None => key,
    }
}

#[async_trait]
impl Filehub for S3Backend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a str>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };
        let key_prefix = match (&validated_prefix, &self.prefix) {
            (Some(pfx), root) => Some(join_key(root.as_deref(), pfx)),
            (None, Some(root)) => Some(format!("{root}/")),
            (None, None) => None,
        };

        Box::pin(stream! {
            let _permit = match self.acquire_permit().await {
                Ok(permit) => permit,
                Err(e) => {
                    yield Err(e);
                    return;
                },
            };
            let mut pages = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_prefix(key_prefix)
                .into_paginator()
                .send();
            while let Some(page) = pages.next().await {
                let page = match page {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(exn::Exn::from(Self::map_sdk_error(e, prefix.unwrap_or(""))));
                        return;
                    },
                };
                for object in page.contents() {
                    let Some(key) = object.key() else { continue };
                    // Zero-byte "directory marker" objects aren't files.
                    if key.ends_with('/') {
                        continue;
                    }
                    let path = match self.relative_path(key) {
                        Ok(path) => path,
                        Err(e) => {
                            yield Err(e);
                            continue;
                        },
                    };
                    // Object store prefixes are plain string matches; keep
                    // component semantics consistent with the local backend.
                    if let Some(pfx) = &validated_prefix
                        && !is_within(&path, pfx)
                    {
                        continue;
                    }
                    let modified = match object.last_modified().ok_or_raise(|| {
                        ErrorKind::BackendError(format!("S3 object `{key}` has no last-modified time"))
                    }) {
                        Ok(dt) => Self::parse_datetime(dt),
                        Err(e) => Err(e),
                    };
                    match modified {
                        Ok(modified) => {
                            let size = object.size().and_then(|s| u64::try_from(s).ok()).unwrap_or(0);
                            yield Ok(FileInfo::new(path, size, modified, self.name.as_str()));
                        },
                        Err(e) => yield Err(e),
                    }
                }
            }
        })
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let key = self.full_key(path)?;
        let _permit = self.acquire_permit().await?;
        match self.client.head_object().bucket(&self.bucket).key(&key).send().await {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|err| err.is_not_found()) => Ok(false),
            Err(e) => Err(exn::Exn::from(Self::map_sdk_error(e, path))),
        }
    }

    async fn get(&self, path: &str) -> Result<Object> {
        let key = self.full_key(path)?;
        let _permit = self.acquire_permit().await?;
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, path))?;
        let content_type = output.content_type().unwrap_or(DEFAULT_CONTENT_TYPE).to_string();
        let data = output
            .body
            .collect()
            .await
            .or_raise(|| ErrorKind::Network(format!("failed reading body of `{key}`")))?
            .into_bytes()
            .to_vec();
        Ok(Object { data, content_type })
    }

    async fn put(&self, path: &str, data: &[u8], content_type: &str) -> Result<String> {
        let key = self.full_key(path)?;
        let _permit = self.acquire_permit().await?;
        let content_type = match content_type {
            "" => DEFAULT_CONTENT_TYPE,
            other => other,
        };
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, path))?;
        Ok(key)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let key = self.full_key(path)?;
        let _permit = self.acquire_permit().await?;
        // S3 happily "deletes" missing keys, so check first to report
        // NotFound like every other backend does.
        match self.client.head_object().bucket(&self.bucket).key(&key).send().await {
            Ok(_) => {},
            Err(e) if e.as_service_error().is_some_and(|err| err.is_not_found()) => {
                exn::bail!(ErrorKind::NotFound(path.to_string()))
            },
            Err(e) => exn::bail!(Self::map_sdk_error(e, path)),
        }
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, path))?;
        Ok(())
    }

    async fn prefix(&self) -> Result<String> {
        Ok(self.base_url.clone())
    }
}
