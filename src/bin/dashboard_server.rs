use std::sync::{Arc, RwLock};

use gridboard::{
    dashboard_config_from_env, dashboard_router, init_logging, log_app_bind, log_app_start,
    log_dataset_loaded, log_storage_selected, logging_config_from_env, spawn_live_feed,
    DashboardAppState, DashboardSession, LiveRowSource, SessionSettings, SharedLiveState,
    StdRandom, StorageBackend,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;

    let config = dashboard_config_from_env();
    log_app_start(&logging_cfg, &config);

    let storage = config.storage.open(&config.client_id)?;
    let storage_path = match &config.storage {
        StorageBackend::Sqlite(path) => Some(path.display().to_string()),
        StorageBackend::Memory => None,
    };
    log_storage_selected(
        config.storage.label(),
        &config.client_id,
        storage_path.as_deref(),
    );

    let rows = Arc::new(config.dataset()?);
    let dataset_source = if config.mock_csv.is_some() { "csv" } else { "mock" };
    log_dataset_loaded(rows.len(), dataset_source);

    let session = Arc::new(RwLock::new(DashboardSession::new(
        Arc::clone(&rows),
        storage,
        &SessionSettings::from(&config),
    )));

    // The handle must outlive the server; dropping it stops the feed.
    let live_feed = config.live.then(|| {
        let source: Arc<dyn LiveRowSource> = Arc::clone(&session) as Arc<dyn LiveRowSource>;
        spawn_live_feed(source, Box::new(StdRandom::from_entropy()))
    });
    let live_state = live_feed
        .as_ref()
        .map(|handle| Arc::clone(handle.state()))
        .unwrap_or_else(SharedLiveState::default);

    let app = dashboard_router(DashboardAppState::with_shared_session(
        session,
        live_state,
        config.load_delay,
    ));
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    let bound_addr = listener.local_addr()?;

    log_app_bind(bound_addr);
    axum::serve(listener, app).await?;

    drop(live_feed);
    Ok(())
}
