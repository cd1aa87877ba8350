//! Layered configuration for a filehub sync job.
//!
//! Values are merged from, lowest priority first:
//! 1. Built-in defaults ([`Config::default`]).
//! 2. A configuration file. TOML unless the extension says YAML or JSON.
//!    When no path is given, `filehub.toml` in the platform config directory
//!    is used if it exists.
//! 3. Environment variables prefixed `FILEHUB_`, with `__` separating nested
//!    keys (`FILEHUB_POLICY__DELETE=true`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use filehub_storage::backend::ReadOnlyBackend;
use filehub_storage::{HubHandle, Locator};
use filehub_sync::{CopyPolicy, DEFAULT_CONCURRENCY, Summary, SyncOptions};
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::Duration;

pub const CONFIG_FILE_NAME: &str = "filehub.toml";
pub const ENV_PREFIX: &str = "FILEHUB_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Locator of the hub to read from.
    pub source: String,
    /// Locator of the hub to bring in line with `source`.
    pub destination: String,
    /// Only paths under this root are compared.
    pub root: Option<String>,
    pub policy: CopyPolicy,
    pub concurrency: NonZeroUsize,
    /// Milliseconds a source file must be newer by before it replaces the
    /// destination copy.
    pub tolerance_ms: u64,
    /// Plan and report, but never write to the destination.
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: String::new(),
            destination: String::new(),
            root: None,
            policy: CopyPolicy::NONE,
            concurrency: DEFAULT_CONCURRENCY,
            tolerance_ms: 0,
            dry_run: false,
        }
    }
}

impl Config {
    /// Merge every configuration source and validate the result.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path
            && !path.is_file()
        {
            exn::bail!(ErrorKind::Load(format!("no such file `{}`", path.display())));
        }
        let config: Self = Self::figment(path)
            .extract()
            .or_raise(|| ErrorKind::Load("could not merge configuration sources".to_string()))?;
        config.validate()?;
        tracing::debug!(
            source = %config.source,
            destination = %config.destination,
            policy = %config.policy,
            dry_run = config.dry_run,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// The provider chain [`load`](Self::load) extracts from.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = path.map(Path::to_path_buf).or_else(default_path) {
            figment = match file.extension().and_then(OsStr::to_str) {
                Some("yaml" | "yml") => figment.merge(Yaml::file(file)),
                Some("json") => figment.merge(Json::file(file)),
                _ => figment.merge(Toml::file(file)),
            };
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn validate(&self) -> Result<()> {
        if self.source.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("`source` is required".to_string()));
        }
        if self.destination.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("`destination` is required".to_string()));
        }
        if self.source.trim() == self.destination.trim() {
            exn::bail!(ErrorKind::Invalid("`source` and `destination` are the same hub".to_string()));
        }
        if self.policy.is_none() {
            tracing::warn!("Copy policy is empty, sync will do nothing");
        }
        Ok(())
    }

    pub fn sync_options(&self) -> SyncOptions {
        let tolerance = i64::try_from(self.tolerance_ms).map_or(Duration::MAX, Duration::milliseconds);
        SyncOptions::default()
            .with_concurrency(self.concurrency)
            .with_tolerance(tolerance)
    }

    /// Connect the `(destination, source)` hubs. With `dry_run` set, the
    /// destination is wrapped so writes are logged and skipped.
    pub async fn connect(&self) -> Result<(HubHandle, HubHandle)> {
        let source = connect(&self.source, "source").await?;
        let destination = connect(&self.destination, "destination").await?;
        let destination: HubHandle = if self.dry_run {
            tracing::info!(hub = destination.name(), "Dry run, destination is read-only");
            Arc::new(ReadOnlyBackend::new(destination))
        } else {
            destination
        };
        Ok((destination, source))
    }

    /// Connect both hubs and run the configured copy to completion.
    pub async fn run(&self) -> Result<Summary> {
        let (destination, source) = self.connect().await?;
        filehub_sync::copy(&destination, &source, self.root.as_deref(), self.policy, self.sync_options())
            .await
            .or_raise(|| ErrorKind::Sync)
    }
}

async fn connect(locator: &str, role: &'static str) -> Result<HubHandle> {
    let locator = locator.parse::<Locator>().or_raise(|| ErrorKind::Connect(role))?;
    locator.connect(role).await.or_raise(|| ErrorKind::Connect(role))
}

/// `filehub.toml` in the platform configuration directory.
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "filehub").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}
