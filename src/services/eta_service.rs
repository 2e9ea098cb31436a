// src/services/eta_service.rs
use chrono::{DateTime, TimeDelta, Utc};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::sync::Mutex;
use tracing;

use crate::models::{Ambulance, AmbulanceRequest};
use crate::services::geo::DistanceProvider;

const MS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EtaConfig {
    pub base_speed_kmh: f64,
    /// Half-width of the uniform speed factor, e.g. 0.2 gives speeds in [0.8, 1.2] x base.
    pub speed_variance: f64,
}

impl Default for EtaConfig {
    fn default() -> Self {
        Self {
            base_speed_kmh: 60.0,
            speed_variance: 0.2,
        }
    }
}

/// Estimates arrival time at the pickup point from the assigned vehicle's position.
///
/// Every estimate draws a fresh speed factor from the injected generator, so two
/// estimates for the same inputs may differ. Seed the generator for reproducible runs.
pub struct EtaEstimator {
    config: EtaConfig,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl EtaEstimator {
    pub fn with_rng(config: EtaConfig, rng: impl RngCore + Send + 'static) -> Self {
        Self {
            config,
            rng: Mutex::new(Box::new(rng)),
        }
    }

    pub fn seeded(config: EtaConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy(config: EtaConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Average speed for one estimate: base x (1 + U), U ~ uniform[-variance, variance].
    pub fn sample_speed_kmh(&self) -> f64 {
        let variance = self.config.speed_variance;
        if variance <= 0.0 {
            return self.config.base_speed_kmh;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let factor: f64 = rng.random_range(-variance..=variance);
        self.config.base_speed_kmh * (1.0 + factor)
    }

    /// `None` when the sampled speed is not positive or the arrival falls
    /// outside the representable time range.
    pub fn estimate(&self, request_time: DateTime<Utc>, distance_km: f64) -> Option<DateTime<Utc>> {
        let speed_kmh = self.sample_speed_kmh();
        let eta = travel_time(distance_km, speed_kmh).and_then(|travel| request_time.checked_add_signed(travel));
        if eta.is_none() {
            tracing::warn!("No arrival estimate for {} km at {} km/h", distance_km, speed_kmh);
        }
        eta
    }

    /// Earliest and latest arrival the estimator can produce for this distance.
    pub fn bounds(&self, request_time: DateTime<Utc>, distance_km: f64) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let fastest = self.config.base_speed_kmh * (1.0 + self.config.speed_variance);
        let slowest = self.config.base_speed_kmh * (1.0 - self.config.speed_variance);
        let earliest = request_time.checked_add_signed(travel_time(distance_km, fastest)?)?;
        let latest = request_time.checked_add_signed(travel_time(distance_km, slowest)?)?;
        Some((earliest, latest))
    }

    /// ETA for a request, or `None` unless it has a pickup location and an
    /// assigned vehicle with a known position.
    pub fn estimate_for(
        &self,
        request: &AmbulanceRequest,
        ambulance: Option<&Ambulance>,
        distance: &dyn DistanceProvider,
    ) -> Option<DateTime<Utc>> {
        let pickup = request.pickup_location.as_ref()?;
        let vehicle_at = ambulance?.current_location.as_ref()?;

        let distance_km = distance.distance_km(vehicle_at, pickup);
        if !distance_km.is_finite() || distance_km < 0.0 {
            tracing::warn!("Ignoring invalid distance {} for request {}", distance_km, request.id);
            return None;
        }

        self.estimate(request.request_time, distance_km)
    }
}

fn travel_time(distance_km: f64, speed_kmh: f64) -> Option<TimeDelta> {
    if !distance_km.is_finite() || distance_km < 0.0 || !speed_kmh.is_finite() || speed_kmh <= 0.0 {
        return None;
    }
    let millis = (distance_km / speed_kmh * MS_PER_HOUR).round();
    if !millis.is_finite() || millis >= i64::MAX as f64 {
        return None;
    }
    TimeDelta::try_milliseconds(millis as i64)
}
