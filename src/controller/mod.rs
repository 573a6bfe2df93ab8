pub mod refresh;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::ml::{DemandPredictor, LinearDemandModel};
use crate::repo::Repositories;

pub use refresh::{RefreshError, RefreshParams, RefreshService};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Config,
    pub refresh: Arc<RefreshService>,
}

impl AppState {
    pub async fn new(cfg: Config) -> Result<Self> {
        let repos = Repositories::new(&cfg).await?;

        let mut model = LinearDemandModel::load(&cfg.model.path)
            .await
            .with_context(|| format!("loading demand model from {}", cfg.model.path.display()))?;
        if let Some(identifier) = &cfg.model.identifier {
            model = model.with_identifier(identifier.clone());
        }
        info!(model = model.identifier(), "demand model loaded");

        Ok(Self::from_parts(cfg, repos, Arc::new(model)))
    }

    /// Assemble state from already-built collaborators
    pub fn from_parts(cfg: Config, repos: Repositories, predictor: Arc<dyn DemandPredictor>) -> Self {
        let refresh = Arc::new(RefreshService::new(
            repos.history,
            predictor,
            repos.forecasts,
            cfg.forecast.clone(),
        ));
        Self { cfg, refresh }
    }
}

/// Start the periodic refresh loop when `forecast.refresh_every_minutes` is set.
pub fn spawn_refresh_task(state: AppState) {
    let every = state.cfg.forecast.refresh_every_minutes;
    if every == 0 {
        return;
    }
    let service = state.refresh.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(every * 60));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let params = match service.resolve(None, None) {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "scheduled refresh stopped");
                    return;
                }
            };
            match service.refresh(params).await {
                Ok(summary) => info!(saved_rows = summary.saved_rows, "scheduled refresh done"),
                Err(e) => warn!(error = %e, "scheduled refresh failed"),
            }
        }
    });
}
