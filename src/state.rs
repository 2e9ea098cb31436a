// src/state.rs
use std::sync::Arc;
use std::time::Duration;
use tracing;

use crate::errors::{DispatchError, DispatchResult};
use crate::services::{
    clock::{Clock, SystemClock},
    dispatch_service::{CancellationPolicy, DispatchConfig, DispatchService},
    eta_service::{EtaConfig, EtaEstimator},
    event_sink::AuditLog,
    fleet_service::FleetService,
    memory_store::MemoryStore,
};

pub struct AppState {
    pub dispatch_service: Arc<DispatchService>,
    pub fleet_service: Arc<FleetService>,
    pub audit_log: Arc<AuditLog>,
    pub config: AppConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub sweep_interval_secs: u64,
    pub eta: EtaConfig,
    pub eta_seed: Option<u64>,
    pub dispatch: DispatchConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            sweep_interval_secs: 60,
            eta: EtaConfig::default(),
            eta_seed: None,
            dispatch: DispatchConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> DispatchResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source, falling back to defaults
    /// for unset or blank keys.
    pub fn from_lookup<F>(lookup: F) -> DispatchResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = AppConfig::default();

        if let Some(addr) = get("DISPATCH_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(raw) = get("DISPATCH_SWEEP_INTERVAL_SECS") {
            config.sweep_interval_secs = parse("DISPATCH_SWEEP_INTERVAL_SECS", &raw)?;
        }
        if let Some(raw) = get("DISPATCH_BASE_SPEED_KMH") {
            let speed: f64 = parse("DISPATCH_BASE_SPEED_KMH", &raw)?;
            if !speed.is_finite() || speed <= 0.0 {
                return Err(DispatchError::configuration(format!(
                    "DISPATCH_BASE_SPEED_KMH must be positive, got {}",
                    raw
                )));
            }
            config.eta.base_speed_kmh = speed;
        }
        if let Some(raw) = get("DISPATCH_SPEED_VARIANCE") {
            let variance: f64 = parse("DISPATCH_SPEED_VARIANCE", &raw)?;
            if !(0.0..1.0).contains(&variance) {
                return Err(DispatchError::configuration(format!(
                    "DISPATCH_SPEED_VARIANCE must be in [0, 1), got {}",
                    raw
                )));
            }
            config.eta.speed_variance = variance;
        }
        if let Some(raw) = get("DISPATCH_ETA_SEED") {
            config.eta_seed = Some(parse("DISPATCH_ETA_SEED", &raw)?);
        }
        if let Some(raw) = get("DISPATCH_CANCEL_POLICY") {
            config.dispatch.cancellation_policy = match raw.to_ascii_lowercase().as_str() {
                "retain" => CancellationPolicy::Retain,
                "release" => CancellationPolicy::Release,
                other => {
                    return Err(DispatchError::configuration(format!(
                        "DISPATCH_CANCEL_POLICY must be 'retain' or 'release', got '{}'",
                        other
                    )));
                }
            };
        }

        Ok(config)
    }

    /// `None` when the periodic sweeper is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> DispatchResult<T> {
    raw.parse()
        .map_err(|_| DispatchError::configuration(format!("{} has an invalid value: '{}'", key, raw)))
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let audit_log = Arc::new(AuditLog::new(clock.clone()));

        let eta = match config.eta_seed {
            Some(seed) => {
                tracing::info!("ETA random source seeded with {}", seed);
                EtaEstimator::seeded(config.eta, seed)
            }
            None => EtaEstimator::from_entropy(config.eta),
        };

        let dispatch_service = Arc::new(
            DispatchService::new(store.clone(), store.clone(), store.clone())
                .with_eta(Arc::new(eta))
                .with_clock(clock.clone())
                .with_events(audit_log.clone())
                .with_config(config.dispatch.clone()),
        );
        let fleet_service = Arc::new(FleetService::new(store.clone(), store, clock));

        Self {
            dispatch_service,
            fleet_service,
            audit_log,
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.sweep_interval(), Some(Duration::from_secs(60)));
        assert_eq!(config.eta.base_speed_kmh, 60.0);
        assert_eq!(config.dispatch.cancellation_policy, CancellationPolicy::Retain);
        assert!(config.eta_seed.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("DISPATCH_BIND_ADDR", "127.0.0.1:8080"),
            ("DISPATCH_SWEEP_INTERVAL_SECS", "0"),
            ("DISPATCH_SPEED_VARIANCE", "0"),
            ("DISPATCH_ETA_SEED", "42"),
            ("DISPATCH_CANCEL_POLICY", "Release"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.sweep_interval(), None);
        assert_eq!(config.eta.speed_variance, 0.0);
        assert_eq!(config.eta_seed, Some(42));
        assert_eq!(config.dispatch.cancellation_policy, CancellationPolicy::Release);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for pairs in [
            [("DISPATCH_SPEED_VARIANCE", "1.0")],
            [("DISPATCH_BASE_SPEED_KMH", "-5")],
            [("DISPATCH_SWEEP_INTERVAL_SECS", "soon")],
            [("DISPATCH_CANCEL_POLICY", "forget")],
        ] {
            let result = AppConfig::from_lookup(lookup(&pairs));
            assert!(matches!(result, Err(DispatchError::Configuration(_))), "{:?}", pairs);
        }
    }

    #[tokio::test]
    async fn test_state_wires_shared_store() {
        use crate::services::{DispatchOperations, FleetOperations};

        let state = AppState::new(AppConfig::default());

        assert!(state.fleet_service.list_ambulances().await.unwrap().is_empty());
        assert!(state.dispatch_service.list_requests().await.unwrap().is_empty());
    }
}
