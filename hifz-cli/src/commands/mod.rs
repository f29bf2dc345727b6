pub mod config;
pub mod ledger;
pub mod recompute;
pub mod rules;

use std::sync::Arc;

use anyhow::{Context, Result};
use hifz_core::Hifz;
use hifz_core::storage::TursoStore;
use tracing::debug;

use crate::config::{CliConfig, ConfigLoader, StorageConfig};

/// Open the configured database and assemble the services.
pub async fn open(config: &CliConfig) -> Result<Hifz> {
    let store = open_store(&config.storage).await?;
    Ok(Hifz::new(Arc::new(store), &config.hifz())?)
}

async fn open_store(storage: &StorageConfig) -> Result<TursoStore> {
    if let Some(url) = &storage.url {
        let token = storage
            .token
            .as_deref()
            .context("storage.token is required with storage.url")?;
        debug!(url = %url, "Connecting to remote database");
        return Ok(TursoStore::new_remote(url, token).await?);
    }

    let path = match &storage.path {
        Some(path) => path.clone(),
        None => ConfigLoader::default_database_path()
            .context("Could not determine data directory; set storage.path")?,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    debug!(path = %path.display(), "Opening local database");
    Ok(TursoStore::new_local(&path).await?)
}
