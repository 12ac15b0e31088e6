//! Adapter factory tests
//!
//! Covers:
//! - Memoization of the process adapter, including concurrent first use
//! - Mode overrides discarding the cached instance
//! - Injection of pre-built adapters
//! - Configuration errors for the self-hosted mode

use anyhow::Result;
use recordspace_core::db::{
    AdapterFactory, DocumentStore, FactoryConfig, ModeSource, RelationalStore,
};
use recordspace_core::{AdapterError, DatabaseAdapter, DeploymentMode};
use std::sync::Arc;
use tempfile::TempDir;

fn relational_config(temp_dir: &TempDir) -> FactoryConfig {
    let url = format!("file:{}", temp_dir.path().join("records.db").display());
    FactoryConfig::from_vars(None, Some(url))
}

// ============================================================================
// Memoization
// ============================================================================

#[tokio::test]
async fn test_adapter_is_memoized() -> Result<()> {
    let factory = AdapterFactory::new(FactoryConfig::default());
    assert!(!factory.is_initialized().await);

    let first = factory.adapter().await?;
    let second = factory.adapter().await?;

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.mode(), DeploymentMode::DocumentStore);
    assert!(first.is_connected());
    assert!(factory.is_initialized().await);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_first_use_builds_one_adapter() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let factory = Arc::new(AdapterFactory::new(relational_config(&temp_dir)));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let factory = Arc::clone(&factory);
            tokio::spawn(async move { factory.adapter().await })
        })
        .collect();

    let mut adapters = Vec::new();
    for handle in handles {
        adapters.push(handle.await??);
    }
    let first = &adapters[0];
    assert!(adapters.iter().all(|a| Arc::ptr_eq(a, first)));
    assert_eq!(first.mode(), DeploymentMode::SelfHosted);
    Ok(())
}

// ============================================================================
// Mode selection
// ============================================================================

#[tokio::test]
async fn test_database_url_selects_relational_store() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let factory = AdapterFactory::new(relational_config(&temp_dir));

    assert_eq!(
        factory.resolve_mode(),
        (DeploymentMode::SelfHosted, ModeSource::DatabaseUrl)
    );

    let adapter = factory.adapter().await?;
    assert_eq!(adapter.mode(), DeploymentMode::SelfHosted);
    assert!(adapter.is_connected());
    assert!(temp_dir.path().join("records.db").exists());
    Ok(())
}

#[tokio::test]
async fn test_self_hosted_without_url_fails() -> Result<()> {
    let factory = AdapterFactory::new(FactoryConfig::from_vars(Some("self-hosted".into()), None));

    let err = factory.adapter().await.err();
    assert!(matches!(err, Some(AdapterError::Configuration(_))), "{:?}", err.map(|e| e.to_string()));
    assert!(!factory.is_initialized().await);
    Ok(())
}

#[tokio::test]
async fn test_set_mode_discards_cached_adapter() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let factory = AdapterFactory::new(relational_config(&temp_dir));

    let relational = factory.adapter().await?;
    assert_eq!(relational.mode(), DeploymentMode::SelfHosted);

    factory.set_mode(Some(DeploymentMode::DocumentStore)).await;
    assert!(!factory.is_initialized().await);
    assert_eq!(
        factory.resolve_mode(),
        (DeploymentMode::DocumentStore, ModeSource::Override)
    );

    let document = factory.adapter().await?;
    assert_eq!(document.mode(), DeploymentMode::DocumentStore);
    assert!(!Arc::ptr_eq(&relational, &document));

    factory.set_mode(None).await;
    assert_eq!(factory.mode(), DeploymentMode::SelfHosted);
    Ok(())
}

#[tokio::test]
async fn test_reset_clears_override_and_instance() -> Result<()> {
    let factory = AdapterFactory::new(FactoryConfig::default());
    factory.set_mode(Some(DeploymentMode::DocumentStore)).await;
    let before = factory.adapter().await?;

    factory.reset().await;
    assert!(!factory.is_initialized().await);
    assert_eq!(
        factory.resolve_mode(),
        (DeploymentMode::DocumentStore, ModeSource::Default)
    );

    let after = factory.adapter().await?;
    assert!(!Arc::ptr_eq(&before, &after));
    Ok(())
}

// ============================================================================
// Injection
// ============================================================================

#[tokio::test]
async fn test_set_adapter_injects_instance_and_pins_mode() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = RelationalStore::new(temp_dir.path().join("injected.db"));
    store.connect().await?;
    let injected: Arc<dyn DatabaseAdapter> = Arc::new(store);

    let factory = AdapterFactory::new(FactoryConfig::default());
    factory.set_adapter(Arc::clone(&injected)).await;

    assert!(factory.is_initialized().await);
    assert_eq!(
        factory.resolve_mode(),
        (DeploymentMode::SelfHosted, ModeSource::Override)
    );
    assert!(Arc::ptr_eq(&factory.adapter().await?, &injected));
    Ok(())
}

#[tokio::test]
async fn test_document_path_is_used_for_document_mode() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("documents");
    let factory =
        AdapterFactory::new(FactoryConfig::default().with_document_path(path.clone()));

    let adapter = factory.adapter().await?;
    assert_eq!(adapter.mode(), DeploymentMode::DocumentStore);
    assert!(path.exists());

    // An explicitly constructed store behaves the same way
    let direct = DocumentStore::new(temp_dir.path().join("direct")).await?;
    assert_eq!(direct.mode(), DeploymentMode::DocumentStore);
    Ok(())
}
