// src/handlers/fleet_handler.rs
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::{
    errors::DispatchResult,
    models::{Ambulance, AmbulanceLocationUpdate, AmbulanceRegistration, Driver, DriverRegistration},
    services::FleetOperations,
    state::AppState,
};

pub async fn register_ambulance(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AmbulanceRegistration>,
) -> DispatchResult<(StatusCode, Json<Ambulance>)> {
    let ambulance = state.fleet_service.register_ambulance(payload).await?;
    Ok((StatusCode::CREATED, Json(ambulance)))
}

pub async fn list_ambulances(State(state): State<Arc<AppState>>) -> DispatchResult<Json<Vec<Ambulance>>> {
    Ok(Json(state.fleet_service.list_ambulances().await?))
}

pub async fn get_ambulance(
    State(state): State<Arc<AppState>>,
    Path(ambulance_id): Path<String>,
) -> DispatchResult<Json<Ambulance>> {
    Ok(Json(state.fleet_service.get_ambulance(&ambulance_id).await?))
}

pub async fn update_ambulance_location(
    State(state): State<Arc<AppState>>,
    Path(ambulance_id): Path<String>,
    Json(payload): Json<AmbulanceLocationUpdate>,
) -> DispatchResult<Json<Ambulance>> {
    let ambulance = state
        .fleet_service
        .update_ambulance_location(&ambulance_id, payload.location)
        .await?;
    Ok(Json(ambulance))
}

pub async fn register_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DriverRegistration>,
) -> DispatchResult<(StatusCode, Json<Driver>)> {
    let driver = state.fleet_service.register_driver(payload).await?;
    Ok((StatusCode::CREATED, Json(driver)))
}

pub async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<String>,
) -> DispatchResult<Json<Driver>> {
    Ok(Json(state.fleet_service.get_driver(&driver_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DispatchError;
    use crate::models::Location;
    use crate::state::AppConfig;

    #[tokio::test]
    async fn test_ambulance_roundtrip_through_handlers() {
        let state = Arc::new(AppState::new(AppConfig::default()));

        let (status, Json(ambulance)) = register_ambulance(
            State(state.clone()),
            Json(AmbulanceRegistration {
                name: "Medic 3".to_string(),
                current_location: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let Json(moved) = update_ambulance_location(
            State(state.clone()),
            Path(ambulance.id.clone()),
            Json(AmbulanceLocationUpdate {
                location: Location::new("loc-9", "Hodan district", 2.02, 45.30),
            }),
        )
        .await
        .unwrap();
        assert!(moved.current_location.is_some());

        let Json(fetched) = get_ambulance(State(state.clone()), Path(ambulance.id.clone())).await.unwrap();
        assert_eq!(fetched.name, "Medic 3");
        assert_eq!(fetched.current_location.map(|l| l.id).as_deref(), Some("loc-9"));

        let Json(all) = list_ambulances(State(state)).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_moving_unknown_ambulance() {
        let state = Arc::new(AppState::new(AppConfig::default()));
        let result = update_ambulance_location(
            State(state.clone()),
            Path("amb-240301-zzzzz".to_string()),
            Json(AmbulanceLocationUpdate {
                location: Location::new("loc-9", "Hodan district", 2.02, 45.30),
            }),
        )
        .await;
        assert!(matches!(result, Err(DispatchError::AmbulanceNotFound(_))));

        let missing = get_ambulance(State(state), Path("amb-240301-zzzzz".to_string())).await;
        assert!(matches!(missing, Err(DispatchError::AmbulanceNotFound(_))));
    }

    #[tokio::test]
    async fn test_driver_registration() {
        let state = Arc::new(AppState::new(AppConfig::default()));
        let (_, Json(driver)) = register_driver(
            State(state.clone()),
            Json(DriverRegistration {
                first_name: "Ayaan".to_string(),
                last_name: "Farah".to_string(),
                phone_number: "+252 61 555 0144".to_string(),
            }),
        )
        .await
        .unwrap();

        let Json(fetched) = get_driver(State(state), Path(driver.id.clone())).await.unwrap();
        assert_eq!(fetched.full_name(), "Ayaan Farah");
        assert!(fetched.is_available);
    }
}
