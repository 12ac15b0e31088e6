//! Adapter Factory
//!
//! Resolves which `DatabaseAdapter` a process uses and memoizes one shared
//! instance.
//!
//! # Mode Resolution
//!
//! First match wins:
//!
//! 1. Programmatic override (`set_mode`, `set_adapter`)
//! 2. `DEPLOYMENT_MODE` environment variable
//! 3. Presence of `DATABASE_URL` (selects the relational store)
//! 4. Document store
//!
//! Changing the mode, injecting an adapter, or calling `reset` always discards
//! the memoized instance.
//!
//! # Examples
//!
//! ```rust,no_run
//! use recordspace_core::db::{AdapterFactory, DeploymentMode, FactoryConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let factory = AdapterFactory::new(FactoryConfig::from_env());
//!     let adapter = factory.adapter().await?;
//!     println!("running against {}", adapter.mode());
//!
//!     // Tests pin the mode explicitly
//!     factory.set_mode(Some(DeploymentMode::DocumentStore)).await;
//!     Ok(())
//! }
//! ```

use crate::db::adapter::DatabaseAdapter;
use crate::db::document_store::DocumentStore;
use crate::db::error::{AdapterError, AdapterResult};
use crate::db::relational_store::RelationalStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, OnceLock, PoisonError, RwLock as StdRwLock};
use tokio::sync::RwLock;

/// Environment variable selecting the deployment mode
pub const DEPLOYMENT_MODE_ENV: &str = "DEPLOYMENT_MODE";

/// Environment variable holding the relational connection string
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Which back-end the process persists to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentMode {
    /// Schemaless document store (the hosted deployment)
    DocumentStore,
    /// Relational store
    SelfHosted,
}

impl DeploymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentMode::DocumentStore => "document-store",
            DeploymentMode::SelfHosted => "self-hosted",
        }
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentMode {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firebase" | "document" | "document-store" | "cloud" => {
                Ok(DeploymentMode::DocumentStore)
            }
            "self-hosted" | "selfhosted" | "relational" | "postgres" | "sqlite" => {
                Ok(DeploymentMode::SelfHosted)
            }
            other => Err(AdapterError::configuration(format!(
                "unknown deployment mode '{}'",
                other
            ))),
        }
    }
}

/// Which rule selected the mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeSource {
    Override,
    Environment,
    DatabaseUrl,
    Default,
}

/// External inputs of the factory
#[derive(Debug, Clone, Default)]
pub struct FactoryConfig {
    /// Mode requested by configuration (already parsed)
    pub deployment_mode: Option<DeploymentMode>,

    /// Relational connection string
    pub database_url: Option<String>,

    /// On-disk location for the document store; `None` uses the in-memory engine
    pub document_path: Option<PathBuf>,
}

impl FactoryConfig {
    /// Read `DEPLOYMENT_MODE` and `DATABASE_URL`
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var(DEPLOYMENT_MODE_ENV).ok(),
            std::env::var(DATABASE_URL_ENV).ok(),
        )
    }

    /// Build from raw variable values; blank values count as unset
    ///
    /// An unrecognized mode is logged and ignored so resolution falls
    /// through to the next rule.
    pub fn from_vars(deployment_mode: Option<String>, database_url: Option<String>) -> Self {
        let deployment_mode = deployment_mode
            .filter(|raw| !raw.trim().is_empty())
            .and_then(|raw| match raw.parse::<DeploymentMode>() {
                Ok(mode) => Some(mode),
                Err(_) => {
                    tracing::warn!(
                        value = %raw,
                        "Ignoring unrecognized {}",
                        DEPLOYMENT_MODE_ENV
                    );
                    None
                }
            });

        Self {
            deployment_mode,
            database_url: database_url.filter(|url| !url.trim().is_empty()),
            document_path: None,
        }
    }

    pub fn with_document_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.document_path = Some(path.into());
        self
    }
}

/// Resolve a relational connection string to a local database file
///
/// Accepts `file:<path>`, `sqlite:<path>` (with or without `//`) and bare
/// paths. Remote URLs and `:memory:` are rejected: every transaction opens
/// its own connection, so the database must be shareable through a file.
pub fn parse_database_url(url: &str) -> AdapterResult<PathBuf> {
    let trimmed = url.trim();
    let path = ["sqlite:", "file:"]
        .iter()
        .find_map(|scheme| trimmed.strip_prefix(scheme))
        .map(|rest| rest.strip_prefix("//").unwrap_or(rest))
        .unwrap_or(trimmed);

    if path.is_empty() {
        return Err(AdapterError::configuration(format!(
            "{} '{}' does not name a database file",
            DATABASE_URL_ENV, url
        )));
    }
    if path.contains("://") {
        return Err(AdapterError::configuration(format!(
            "remote {} '{}' is not supported; use a local database file",
            DATABASE_URL_ENV, url
        )));
    }
    if path == ":memory:" {
        return Err(AdapterError::configuration(format!(
            "{} ':memory:' is not supported; use a local database file",
            DATABASE_URL_ENV
        )));
    }
    Ok(PathBuf::from(path))
}

/// Lazily builds and memoizes the process adapter
pub struct AdapterFactory {
    config: FactoryConfig,
    mode_override: StdRwLock<Option<DeploymentMode>>,
    adapter: RwLock<Option<Arc<dyn DatabaseAdapter>>>,
}

impl fmt::Debug for AdapterFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterFactory")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

static GLOBAL_FACTORY: OnceLock<AdapterFactory> = OnceLock::new();

impl AdapterFactory {
    pub fn new(config: FactoryConfig) -> Self {
        Self {
            config,
            mode_override: StdRwLock::new(None),
            adapter: RwLock::new(None),
        }
    }

    /// Process-wide factory configured from the environment on first use
    ///
    /// Prefer passing an adapter (or a factory) explicitly; this exists for
    /// entry points such as binaries.
    pub fn global() -> &'static AdapterFactory {
        GLOBAL_FACTORY.get_or_init(|| AdapterFactory::new(FactoryConfig::from_env()))
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    /// Mode the next constructed adapter will use, and why
    pub fn resolve_mode(&self) -> (DeploymentMode, ModeSource) {
        let overridden = *self
            .mode_override
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(mode) = overridden {
            (mode, ModeSource::Override)
        } else if let Some(mode) = self.config.deployment_mode {
            (mode, ModeSource::Environment)
        } else if self.config.database_url.is_some() {
            (DeploymentMode::SelfHosted, ModeSource::DatabaseUrl)
        } else {
            (DeploymentMode::DocumentStore, ModeSource::Default)
        }
    }

    pub fn mode(&self) -> DeploymentMode {
        self.resolve_mode().0
    }

    /// Shared adapter, constructed and connected on first call
    ///
    /// # Errors
    ///
    /// Returns `AdapterError::Configuration` when the self-hosted mode is
    /// selected without a usable `DATABASE_URL`, or the adapter's own error
    /// if construction or `connect()` fails. Nothing is memoized on failure.
    pub async fn adapter(&self) -> AdapterResult<Arc<dyn DatabaseAdapter>> {
        // Fast path: already initialized
        if let Some(adapter) = self.adapter.read().await.as_ref() {
            return Ok(Arc::clone(adapter));
        }

        let mut slot = self.adapter.write().await;
        // Another caller may have initialized while we waited for the write lock
        if let Some(adapter) = slot.as_ref() {
            return Ok(Arc::clone(adapter));
        }

        let adapter = self.build().await?;
        adapter.connect().await?;
        *slot = Some(Arc::clone(&adapter));
        Ok(adapter)
    }

    /// Whether an adapter instance is currently memoized
    pub async fn is_initialized(&self) -> bool {
        self.adapter.read().await.is_some()
    }

    /// Pin (or with `None`, unpin) the mode; discards the memoized adapter
    pub async fn set_mode(&self, mode: Option<DeploymentMode>) {
        let mut slot = self.adapter.write().await;
        *self
            .mode_override
            .write()
            .unwrap_or_else(PoisonError::into_inner) = mode;
        if slot.take().is_some() {
            tracing::info!(?mode, "Deployment mode changed; discarded cached adapter");
        }
    }

    /// Install a pre-built adapter and pin the mode to match it
    pub async fn set_adapter(&self, adapter: Arc<dyn DatabaseAdapter>) {
        let mut slot = self.adapter.write().await;
        *self
            .mode_override
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(adapter.mode());
        *slot = Some(adapter);
    }

    /// Clear the override and the memoized adapter
    pub async fn reset(&self) {
        let mut slot = self.adapter.write().await;
        *self
            .mode_override
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
        *slot = None;
    }

    async fn build(&self) -> AdapterResult<Arc<dyn DatabaseAdapter>> {
        let (mode, source) = self.resolve_mode();

        let adapter: Arc<dyn DatabaseAdapter> = match mode {
            DeploymentMode::DocumentStore => match &self.config.document_path {
                Some(path) => Arc::new(DocumentStore::new(path.clone()).await?),
                None => Arc::new(DocumentStore::new_in_memory().await?),
            },
            DeploymentMode::SelfHosted => {
                let url = self.config.database_url.as_deref().ok_or_else(|| {
                    AdapterError::configuration(format!(
                        "self-hosted mode requires {}",
                        DATABASE_URL_ENV
                    ))
                })?;
                Arc::new(RelationalStore::new(parse_database_url(url)?))
            }
        };

        tracing::info!(%mode, ?source, "Selected database adapter");
        Ok(adapter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!(
            "firebase".parse::<DeploymentMode>().unwrap(),
            DeploymentMode::DocumentStore
        );
        assert_eq!(
            " Self-Hosted ".parse::<DeploymentMode>().unwrap(),
            DeploymentMode::SelfHosted
        );
        assert!(matches!(
            "mainframe".parse::<DeploymentMode>(),
            Err(AdapterError::Configuration(_))
        ));
    }

    #[test]
    fn test_unrecognized_env_mode_is_skipped() {
        let config = FactoryConfig::from_vars(Some("mainframe".into()), None);
        assert_eq!(config.deployment_mode, None);

        let config = FactoryConfig::from_vars(Some("".into()), Some("  ".into()));
        assert_eq!(config.deployment_mode, None);
        assert_eq!(config.database_url, None);
    }

    #[test]
    fn test_database_url_forms() {
        assert_eq!(
            parse_database_url("file:/var/lib/records.db").unwrap(),
            PathBuf::from("/var/lib/records.db")
        );
        assert_eq!(
            parse_database_url("sqlite:///tmp/r.db").unwrap(),
            PathBuf::from("/tmp/r.db")
        );
        assert_eq!(
            parse_database_url("data/records.db").unwrap(),
            PathBuf::from("data/records.db")
        );
    }

    #[test]
    fn test_unsupported_database_urls() {
        for url in ["postgres://db:5432/app", "libsql://x.turso.io", ":memory:", "file:"] {
            assert!(
                matches!(parse_database_url(url), Err(AdapterError::Configuration(_))),
                "{} should be rejected",
                url
            );
        }
    }

    #[test]
    fn test_resolution_precedence() {
        let factory = AdapterFactory::new(FactoryConfig::from_vars(
            Some("document".into()),
            Some("file:records.db".into()),
        ));
        assert_eq!(
            factory.resolve_mode(),
            (DeploymentMode::DocumentStore, ModeSource::Environment)
        );

        let factory =
            AdapterFactory::new(FactoryConfig::from_vars(None, Some("file:records.db".into())));
        assert_eq!(
            factory.resolve_mode(),
            (DeploymentMode::SelfHosted, ModeSource::DatabaseUrl)
        );

        let factory = AdapterFactory::new(FactoryConfig::default());
        assert_eq!(
            factory.resolve_mode(),
            (DeploymentMode::DocumentStore, ModeSource::Default)
        );
    }
}
