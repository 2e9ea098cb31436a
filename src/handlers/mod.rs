// src/handlers/mod.rs
pub mod fleet_handler;
pub mod request_handler;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/requests",
            get(request_handler::list_requests).post(request_handler::create_request),
        )
        .route("/requests/:id", get(request_handler::get_request))
        .route("/requests/:id/events", get(request_handler::get_request_events))
        .route("/requests/:id/assign", post(request_handler::assign_request))
        .route("/requests/:id/status/:status", post(request_handler::set_status))
        .route("/requests/:id/incident/:state", post(request_handler::set_incident_state))
        .route("/requests/:id/pickup", put(request_handler::update_pickup))
        .route("/requests/:id/broadcast", post(request_handler::broadcast_incident))
        .route("/dispatch/scheduled", post(request_handler::run_scheduled_sweep))
        .route(
            "/ambulances",
            get(fleet_handler::list_ambulances).post(fleet_handler::register_ambulance),
        )
        .route("/ambulances/:id", get(fleet_handler::get_ambulance))
        .route("/ambulances/:id/location", put(fleet_handler::update_ambulance_location))
        .route("/drivers", post(fleet_handler::register_driver))
        .route("/drivers/:id", get(fleet_handler::get_driver))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
