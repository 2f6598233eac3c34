pub mod runtime;

use crate::analysis::{AnalysisService, KeyValueStore, SqliteKeyValueStore};
use crate::api::{ApiServer, ApiState};
use crate::config::Config;
use crate::db::Db;
use crate::llm::build_provider;
use crate::store::Store;
use anyhow::{Context, Result};
use runtime::SessionRuntime;
use std::sync::Arc;
use tracing::{error, info};

/// Everything the service and the one-shot CLI commands share.
pub struct Services {
    pub config: Config,
    pub store: Store,
    pub analysis: Arc<AnalysisService>,
}

impl Services {
    pub fn open(config: Config) -> Result<Self> {
        let db_path = config.db_path()?;
        let db = Db::open(&db_path)
            .with_context(|| format!("Failed to open database at {:?}", db_path))?;
        info!("Using database {:?}", db_path);

        let store = Store::new(db.clone());
        let kv: Arc<dyn KeyValueStore> = Arc::new(SqliteKeyValueStore::new(db));
        let llm = build_provider(&config.llm)?;
        info!("LLM provider: {}", llm.name());

        let analysis = Arc::new(AnalysisService::from_config(
            &config,
            store.clone(),
            kv,
            llm,
        )?);

        Ok(Self {
            config,
            store,
            analysis,
        })
    }
}

pub async fn run_service() -> Result<()> {
    info!("Starting Huddle service");

    let services = Services::open(Config::load()?)?;
    let runtime = SessionRuntime::new(
        services.store.clone(),
        Arc::clone(&services.analysis),
        &services.config,
    );

    let resumed = runtime.resume_active().await?;
    if resumed > 0 {
        info!("Resumed {} active sessions", resumed);
    }

    let api_server = ApiServer::new(
        &services.config.server,
        ApiState::new(services.store.clone(), runtime.clone()),
    );
    let server = tokio::spawn(async move {
        if let Err(e) = api_server.start().await {
            error!("API server failed: {}", e);
        }
    });

    info!("Huddle is ready!");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
        _ = server => error!("API server stopped unexpectedly"),
    }
    runtime.shutdown();

    Ok(())
}
