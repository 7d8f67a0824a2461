use anyhow::Result;
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use std::{io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod controllers;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use config::{AppConfig, RecordStoreKind};
use services::{
    credentials::{CredentialIssuer, S3Presigner},
    document_store::DocumentRecordStore,
    events::{EventHub, MetricsTelemetry, log_events},
    gateway::PersistenceGateway,
    record_store::{RecordStore, SettingsStore},
    search::{DocumentSearch, RelationalSearch, SearchStrategy},
    sqlite_store::SqliteRecordStore,
    upload_service::UploadService,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting media-upload with config: {:?}", cfg);

    // --- Record store, chosen once for the process ---
    let (store, search, settings): (
        Arc<dyn RecordStore>,
        Arc<dyn SearchStrategy>,
        Arc<dyn SettingsStore>,
    ) = match cfg.record_store {
        RecordStoreKind::Relational => {
            let db = connect_sqlite(&cfg.database_url).await?;
            let sqlite = Arc::new(SqliteRecordStore::new(db));
            sqlite.run_migrations().await?;
            tracing::info!("Database migration complete.");
            if migrate {
                return Ok(()); // exit after migration
            }
            (
                sqlite.clone() as Arc<dyn RecordStore>,
                Arc::new(RelationalSearch) as Arc<dyn SearchStrategy>,
                sqlite as Arc<dyn SettingsStore>,
            )
        }
        RecordStoreKind::Document => {
            if migrate {
                tracing::warn!("--migrate has no effect on the document store");
                return Ok(());
            }
            let docs = Arc::new(DocumentRecordStore::new());
            (
                docs.clone() as Arc<dyn RecordStore>,
                Arc::new(DocumentSearch) as Arc<dyn SearchStrategy>,
                docs as Arc<dyn SettingsStore>,
            )
        }
    };
    tracing::info!(dialect = store.dialect(), "record store ready");

    // --- Notification ports ---
    let events = EventHub::default();
    tokio::spawn(log_events(events.subscribe()));

    // --- Initialize core services ---
    let upload_config = Arc::new(cfg.upload.clone());
    let gateway = PersistenceGateway::new(
        store.clone(),
        search,
        settings,
        events,
        Arc::new(MetricsTelemetry),
    );
    let service = UploadService::new(upload_config.clone(), gateway);
    let presigner = Arc::new(S3Presigner::new(&upload_config).await);

    let state = state::AppState {
        controllers: controllers::Controllers::new(service),
        credentials: CredentialIssuer::new(upload_config, presigner),
        store,
    };

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Open the SQLite pool, creating the database file and its directory on
/// first run.
async fn connect_sqlite(db_url: &str) -> Result<Arc<sqlx::SqlitePool>> {
    tracing::debug!("Connecting using raw URL => {}", db_url);

    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");

    if !db_path.starts_with(":memory:") {
        let db_path_obj = Path::new(db_path);
        if let Some(parent) = db_path_obj.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }

        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(db_path)
        {
            Ok(_) => tracing::debug!("Database file can be created/opened."),
            Err(e) => tracing::warn!("Failed to open database file manually: {}", e),
        }
    }

    let db = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;
    Ok(Arc::new(db))
}
