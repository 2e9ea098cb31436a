// src/handlers/request_handler.rs
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::{
    errors::DispatchResult,
    models::{IncidentState, NewRequest, PickupUpdate, RequestResponse, RequestStatus},
    services::{
        event_sink::AuditEntry,
        sweeper::SweepReport,
        DispatchOperations,
    },
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct StatusChangeResponse {
    pub request: RequestResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ambulance_released: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rebalance: Option<SweepReport>,
}

impl StatusChangeResponse {
    fn plain(request: impl Into<RequestResponse>) -> Self {
        Self {
            request: request.into(),
            ambulance_released: None,
            rebalance: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BroadcastResponse {
    pub request_id: String,
    pub ambulances_notified: usize,
}

pub async fn create_request(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewRequest>,
) -> DispatchResult<(StatusCode, Json<RequestResponse>)> {
    let request = state.dispatch_service.create_request(payload).await?;
    Ok((StatusCode::CREATED, Json(request.into())))
}

pub async fn list_requests(State(state): State<Arc<AppState>>) -> DispatchResult<Json<Vec<RequestResponse>>> {
    let requests = state.dispatch_service.list_requests().await?;
    Ok(Json(requests.into_iter().map(RequestResponse::from).collect()))
}

pub async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
) -> DispatchResult<Json<RequestResponse>> {
    let request = state.dispatch_service.get_request(&request_id).await?;
    Ok(Json(request.into()))
}

pub async fn get_request_events(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
) -> DispatchResult<Json<Vec<AuditEntry>>> {
    // 404 for unknown requests rather than an empty trail
    state.dispatch_service.get_request(&request_id).await?;
    Ok(Json(state.audit_log.entries_for(&request_id).await))
}

pub async fn assign_request(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
) -> DispatchResult<Json<RequestResponse>> {
    let request = state.dispatch_service.intelligent_assign_ambulance(&request_id).await?;
    Ok(Json(request.into()))
}

pub async fn set_status(
    State(state): State<Arc<AppState>>,
    Path((request_id, status)): Path<(String, RequestStatus)>,
) -> DispatchResult<Json<StatusChangeResponse>> {
    let dispatch = &state.dispatch_service;
    let response = match status {
        RequestStatus::Pending => StatusChangeResponse::plain(dispatch.set_pending(&request_id).await?),
        RequestStatus::InProgress => StatusChangeResponse::plain(dispatch.set_in_progress(&request_id).await?),
        RequestStatus::Canceled => StatusChangeResponse::plain(dispatch.set_canceled(&request_id).await?),
        RequestStatus::Completed => {
            let report = dispatch.set_completed(&request_id).await?;
            StatusChangeResponse {
                request: report.request.into(),
                ambulance_released: Some(report.ambulance_released),
                rebalance: Some(report.rebalance),
            }
        }
    };
    Ok(Json(response))
}

pub async fn set_incident_state(
    State(state): State<Arc<AppState>>,
    Path((request_id, incident_state)): Path<(String, IncidentState)>,
) -> DispatchResult<Json<RequestResponse>> {
    let request = state
        .dispatch_service
        .set_incident_state(&request_id, incident_state)
        .await?;
    Ok(Json(request.into()))
}

pub async fn update_pickup(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
    Json(payload): Json<PickupUpdate>,
) -> DispatchResult<Json<RequestResponse>> {
    let request = state
        .dispatch_service
        .update_pickup_location(&request_id, payload.location)
        .await?;
    Ok(Json(request.into()))
}

pub async fn broadcast_incident(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
) -> DispatchResult<Json<BroadcastResponse>> {
    let ambulances_notified = state.dispatch_service.broadcast_incident(&request_id).await?;
    Ok(Json(BroadcastResponse {
        request_id,
        ambulances_notified,
    }))
}

pub async fn run_scheduled_sweep(State(state): State<Arc<AppState>>) -> DispatchResult<Json<SweepReport>> {
    let report = state.dispatch_service.assign_scheduled_ambulances().await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DispatchError;
    use crate::models::{AmbulanceRegistration, IncidentPriority, Location, Priority};
    use crate::services::FleetOperations;
    use crate::state::AppConfig;

    fn state() -> Arc<AppState> {
        let config = AppConfig {
            eta_seed: Some(7),
            ..AppConfig::default()
        };
        Arc::new(AppState::new(config))
    }

    fn draft() -> NewRequest {
        NewRequest {
            patient_id: "pat-240301-aaaaa".to_string(),
            pickup_location: Some(Location::new("loc-1", "KM4 junction", 2.03, 45.32)),
            destination_location: None,
            caller_name: None,
            caller_phone: Some("+252 61 555 0102".to_string()),
            patient_condition: Some("Fall injury".to_string()),
            priority: Priority::Medium,
            incident_priority: IncidentPriority::Immediate,
            scheduled_time: None,
            driver_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_assign_and_complete() {
        let state = state();
        state
            .fleet_service
            .register_ambulance(AmbulanceRegistration {
                name: "Medic 1".to_string(),
                current_location: Some(Location::new("loc-2", "Depot", 2.04, 45.34)),
            })
            .await
            .unwrap();

        let (status, Json(created)) = create_request(State(state.clone()), Json(draft())).await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.status, RequestStatus::Pending);

        let Json(assigned) = assign_request(State(state.clone()), Path(created.id.clone())).await.unwrap();
        assert_eq!(assigned.status, RequestStatus::InProgress);
        assert!(assigned.eta.is_some());

        let Json(done) = set_status(State(state.clone()), Path((created.id.clone(), RequestStatus::Completed)))
            .await
            .unwrap();
        assert_eq!(done.request.status, RequestStatus::Completed);
        assert_eq!(done.ambulance_released, Some(true));
        assert!(done.request.response_time_minutes.is_some());

        let Json(events) = get_request_events(State(state), Path(created.id)).await.unwrap();
        assert!(events.iter().any(|e| e.message == "Request marked as completed."));
    }

    #[tokio::test]
    async fn test_assign_with_empty_fleet_is_conflict() {
        let state = state();
        let (_, Json(created)) = create_request(State(state.clone()), Json(draft())).await.unwrap();

        let result = assign_request(State(state.clone()), Path(created.id.clone())).await;
        assert!(matches!(result, Err(DispatchError::NoAvailableVehicle)));

        let Json(unchanged) = get_request(State(state), Path(created.id)).await.unwrap();
        assert_eq!(unchanged.status, RequestStatus::Pending);
        assert!(unchanged.assigned_ambulance.is_none());
    }

    #[tokio::test]
    async fn test_unknown_request_events() {
        let result = get_request_events(State(state()), Path("amr-240301-zzzzz".to_string())).await;
        assert!(matches!(result, Err(DispatchError::RequestNotFound(_))));
    }
}
