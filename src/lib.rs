pub mod broadcast;
pub mod config;
pub mod database;
pub mod error;
pub mod execution;
pub mod gateway;
pub mod interview;
pub mod session;

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::config::{Backend, Settings};
use crate::database::{Catalog, CatalogSeed, MemoryStore, PostgresStore, SessionStore};
use crate::execution::Judge0Client;
use crate::gateway::Gateway;
use crate::interview::{EngineOptions, InterviewEngine};

async fn open_storage(settings: &Settings) -> Result<(Arc<dyn SessionStore>, Arc<dyn Catalog>)> {
    match settings.database.backend {
        Backend::Memory => {
            let store = match &settings.database.seed_file {
                Some(path) => {
                    let seed = CatalogSeed::from_file(path).with_context(|| format!("loading seed file {}", path))?;
                    MemoryStore::seeded(seed)
                }
                None => {
                    warn!("In-memory backend without a seed file: the catalog is empty");
                    MemoryStore::new()
                }
            };
            let store = Arc::new(store);
            let sessions: Arc<dyn SessionStore> = store.clone();
            let catalog: Arc<dyn Catalog> = store;
            Ok((sessions, catalog))
        }
        Backend::Postgres => {
            let url = settings
                .database
                .url
                .as_deref()
                .context("database.url is required for the postgres backend")?;
            let store = PostgresStore::connect(url).await?;
            store.migrate().await?;
            let store = Arc::new(store);
            let sessions: Arc<dyn SessionStore> = store.clone();
            let catalog: Arc<dyn Catalog> = store;
            Ok((sessions, catalog))
        }
    }
}

/// Builds the engine from settings and serves the gateway until ctrl-c.
pub async fn run(settings: Settings) -> Result<()> {
    info!("🚀 Starting livecode interview engine...");

    let (store, catalog) = open_storage(&settings).await?;
    let executor = Arc::new(Judge0Client::new(settings.judge0.clone())?);
    let engine = Arc::new(InterviewEngine::new(
        store,
        catalog,
        executor,
        EngineOptions::from(&settings.engine),
    ));

    let gateway = Gateway::bind(&settings.server.bind_address, engine)
        .await
        .with_context(|| format!("binding {}", settings.server.bind_address))?;

    tokio::select! {
        served = gateway.serve() => served.context("gateway stopped")?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for ctrl-c")?;
            info!("🛑 Shutdown requested");
        }
    }
    Ok(())
}
