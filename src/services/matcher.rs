// src/services/matcher.rs
use serde::Serialize;
use tracing;

use crate::models::{Ambulance, Location, RequestStatus};
use crate::services::geo::DistanceProvider;

/// Outcome of one nearest-vehicle assignment attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AssignmentResult {
    Assigned { ambulance_id: String, distance_km: f64 },
    /// Guarded no-op: the request is no longer pending.
    NotPending { status: RequestStatus },
    /// Guarded no-op: the request is pending but still holds a vehicle.
    AlreadyAssigned { ambulance_id: String },
    NoAvailableVehicle,
}

/// Picks the candidate closest to `pickup`.
///
/// Candidates without a known position are skipped. On equal distance the
/// earlier candidate wins, so the result is deterministic for a stable
/// candidate order.
pub fn select_nearest<'a, I>(
    pickup: &Location,
    candidates: I,
    distance: &dyn DistanceProvider,
) -> Option<(&'a Ambulance, f64)>
where
    I: IntoIterator<Item = &'a Ambulance>,
{
    let mut best: Option<(&'a Ambulance, f64)> = None;

    for ambulance in candidates {
        let Some(position) = ambulance.current_location.as_ref() else {
            tracing::debug!("Skipping ambulance {} with unknown location", ambulance.id);
            continue;
        };

        let distance_km = distance.distance_km(position, pickup);
        if !distance_km.is_finite() {
            tracing::warn!("Skipping ambulance {}: distance is not finite", ambulance.id);
            continue;
        }

        if best.is_none_or(|(_, best_km)| distance_km < best_km) {
            best = Some((ambulance, distance_km));
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::geo::HaversineDistance;

    /// Straight-line distance in coordinate units, handy for grid scenarios.
    struct GridDistance;

    impl DistanceProvider for GridDistance {
        fn distance_km(&self, from: &Location, to: &Location) -> f64 {
            ((from.latitude - to.latitude).powi(2) + (from.longitude - to.longitude).powi(2)).sqrt()
        }
    }

    fn at(id: &str, x: f64, y: f64) -> Ambulance {
        Ambulance::new(id, id, Some(Location::new(format!("loc-{}", id), id, x, y)))
    }

    #[test]
    fn test_picks_minimum_distance() {
        let fleet = vec![at("far", 10.0, 10.0), at("near", 0.0, 0.0), at("mid", 3.0, 0.0)];
        let pickup = Location::new("loc-p", "Pickup", 1.0, 0.0);

        let (chosen, distance_km) = select_nearest(&pickup, &fleet, &GridDistance).unwrap();
        assert_eq!(chosen.id, "near");
        assert_eq!(distance_km, 1.0);
    }

    #[test]
    fn test_tie_goes_to_first_listed() {
        let fleet = vec![at("west", 0.0, 0.0), at("east", 2.0, 0.0)];
        let pickup = Location::new("loc-p", "Pickup", 1.0, 0.0);

        let (chosen, _) = select_nearest(&pickup, &fleet, &GridDistance).unwrap();
        assert_eq!(chosen.id, "west");

        let reversed: Vec<Ambulance> = fleet.into_iter().rev().collect();
        let (chosen, _) = select_nearest(&pickup, &reversed, &GridDistance).unwrap();
        assert_eq!(chosen.id, "east");
    }

    #[test]
    fn test_unlocated_vehicles_are_skipped() {
        let fleet = vec![Ambulance::new("ghost", "Ghost", None), at("real", 5.0, 5.0)];
        let pickup = Location::new("loc-p", "Pickup", 0.0, 0.0);

        let (chosen, _) = select_nearest(&pickup, &fleet, &HaversineDistance).unwrap();
        assert_eq!(chosen.id, "real");
    }

    #[test]
    fn test_empty_fleet() {
        let pickup = Location::new("loc-p", "Pickup", 0.0, 0.0);
        assert!(select_nearest(&pickup, &Vec::<Ambulance>::new(), &HaversineDistance).is_none());
    }
}
