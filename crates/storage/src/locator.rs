//! Hub locators.
//!
//! A locator is a connection string naming a hub: a bare filesystem path (or
//! `file://` URL) for a local directory, or an `s3://` URL carrying the
//! credentials, bucket, endpoint and key prefix of an object store:
//!
//! ```text
//! /srv/files
//! file:///srv/files
//! s3://KEY:SECRET@BUCKET.s3.REGION.amazonaws.com/PREFIX
//! s3://KEY:SECRET@BUCKET.ENDPOINT/PREFIX?region=REGION
//! ```
//!
//! Parsing only validates the shape; [`Locator::connect`] builds the hub.

use crate::HubHandle;
use crate::backend::LocalBackend;
use crate::error::{Error, ErrorKind, Result};
use exn::ResultExt;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

/// Region used when neither the host nor the query string names one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// A parsed hub connection string.
#[derive(Clone, PartialEq, Eq)]
pub enum Locator {
    /// Directory on the local filesystem.
    Local { root: PathBuf },
    /// Bucket (and optional key prefix) on an S3-compatible object store.
    S3 {
        bucket: String,
        region: String,
        /// `None` for AWS itself, otherwise the `https://` endpoint.
        endpoint: Option<String>,
        prefix: Option<String>,
        key_id: String,
        key_secret: String,
    },
}

// Keep secrets out of logs.
impl Debug for Locator {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Local { root } => f.debug_struct("Local").field("root", root).finish(),
            Self::S3 {
                bucket,
                region,
                endpoint,
                prefix,
                key_id,
                ..
            } => f
                .debug_struct("S3")
                .field("bucket", bucket)
                .field("region", region)
                .field("endpoint", endpoint)
                .field("prefix", prefix)
                .field("key_id", key_id)
                .finish_non_exhaustive(),
        }
    }
}

impl FromStr for Locator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            exn::bail!(ErrorKind::Configuration("empty locator".to_string()));
        }
        if !s.contains("://") {
            return Ok(Self::Local { root: PathBuf::from(s) });
        }
        let url = Url::parse(s).or_raise(|| ErrorKind::Configuration(format!("malformed locator `{s}`")))?;
        match url.scheme() {
            "file" => {
                let root = url
                    .to_file_path()
                    .map_err(|()| ErrorKind::Configuration(format!("malformed file locator `{s}`")))?;
                Ok(Self::Local { root })
            },
            "s3" => Self::parse_s3(&url),
            other => exn::bail!(ErrorKind::Configuration(format!("unsupported scheme `{other}`"))),
        }
    }
}

impl Locator {
    fn parse_s3(url: &Url) -> Result<Self> {
        let key_id = decode(url.username())?;
        let key_secret = decode(url.password().unwrap_or_default())?;
        if key_id.is_empty() || key_secret.is_empty() {
            exn::bail!(ErrorKind::Configuration("s3: missing credentials".to_string()));
        }
        let host = url.host_str().unwrap_or_default();
        let Some((bucket, endpoint)) = host.split_once('.').filter(|(b, e)| !b.is_empty() && !e.is_empty()) else {
            exn::bail!(ErrorKind::Configuration(format!("s3: malformed host `{host}`")));
        };
        let query_region = url.query_pairs().find(|(k, _)| k == "region").map(|(_, v)| v.into_owned());
        let aws_region = endpoint
            .strip_prefix("s3.")
            .and_then(|rest| rest.strip_suffix(".amazonaws.com"))
            .filter(|region| !region.is_empty());
        let (region, endpoint) = match aws_region {
            Some(region) => (query_region.unwrap_or_else(|| region.to_string()), None),
            None => {
                let endpoint = match url.port() {
                    Some(port) => format!("https://{endpoint}:{port}"),
                    None => format!("https://{endpoint}"),
                };
                (query_region.unwrap_or_else(|| DEFAULT_REGION.to_string()), Some(endpoint))
            },
        };
        let prefix = Some(url.path().trim_matches('/')).filter(|p| !p.is_empty()).map(decode).transpose()?;
        Ok(Self::S3 {
            bucket: bucket.to_string(),
            region,
            endpoint,
            prefix,
            key_id,
            key_secret,
        })
    }

    /// Build the hub this locator names.
    ///
    /// Returns [`Disabled`](ErrorKind::Disabled) for object store locators
    /// when the crate was built without the `s3` feature.
    pub async fn connect(&self, name: impl Into<String>) -> Result<HubHandle> {
        let name = name.into();
        match self {
            Self::Local { root } => {
                tracing::debug!(hub = %name, root = %root.display(), "Connecting local hub");
                let hub = LocalBackend::new(name, root)?;
                Ok(Arc::new(hub))
            },
            #[cfg(feature = "s3")]
            Self::S3 {
                bucket,
                region,
                endpoint,
                prefix,
                key_id,
                key_secret,
            } => {
                tracing::debug!(hub = %name, %bucket, %region, "Connecting S3 hub");
                let hub = crate::backend::S3Backend::new(
                    name,
                    bucket,
                    prefix.clone(),
                    region,
                    endpoint.clone(),
                    key_id,
                    key_secret,
                )
                .await?;
                Ok(Arc::new(hub))
            },
            #[cfg(not(feature = "s3"))]
            Self::S3 { .. } => {
                tracing::warn!(hub = %name, "S3 locator used without the `s3` feature");
                exn::bail!(ErrorKind::Disabled("s3".to_string()))
            },
        }
    }
}

fn decode(raw: &str) -> Result<String> {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .or_raise(|| ErrorKind::Configuration(format!("invalid percent-encoding in `{raw}`")))
}
