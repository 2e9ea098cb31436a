use std::sync::Arc;

use ambulance_dispatch::{
    handlers,
    services::sweeper::spawn_scheduled_sweeper,
    state::{AppConfig, AppState},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = AppConfig::from_env()?;
    let bind_addr = config.bind_addr.clone();
    let sweep_interval = config.sweep_interval();

    let app_state = Arc::new(AppState::new(config));

    let _sweeper = match sweep_interval {
        Some(period) => {
            tracing::info!("Scheduled sweep every {:?}", period);
            Some(spawn_scheduled_sweeper(app_state.dispatch_service.clone(), period))
        }
        None => {
            tracing::warn!("DISPATCH_SWEEP_INTERVAL_SECS is 0, scheduled requests need a manual sweep");
            None
        }
    };

    let app = handlers::router(app_state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Ambulance dispatch listening on {}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
