use anyhow::Result;
use axum::Router;
use demand_forecast_refresh::{api, config, controller, telemetry};
use config::Config;
use telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = Config::load()?;

    let app_state = controller::AppState::new(cfg.clone()).await?;

    #[allow(unused_mut)]
    let mut app: Router = api::router(app_state.clone(), &cfg);

    #[cfg(feature = "metrics")]
    {
        app = api::with_metrics(app);
    }

    let addr = cfg.server.socket_addr()?;

    if cfg.server.host == "0.0.0.0" {
        warn!(
            "Server binding to 0.0.0.0 - the refresh trigger will be reachable from the network. \
            Bind to 127.0.0.1 unless behind a firewall/reverse proxy."
        );
    }

    info!(
        %addr,
        horizon = cfg.forecast.default_horizon,
        lookback_days = cfg.forecast.default_lookback_days,
        "starting demand forecast refresh service"
    );

    controller::spawn_refresh_task(app_state.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    warn!("shutdown complete");
    Ok(())
}
