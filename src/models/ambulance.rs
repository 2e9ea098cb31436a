// src/models/ambulance.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::id_generator::{IdGenerator, IdType};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AmbulanceStatus {
    Available,    // Parked or roaming, can take a request
    InService,    // Dispatched to a request
    Maintenance,  // Vehicle is in the workshop
    OutOfService, // Off the roster
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Location {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(id: impl Into<String>, name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            latitude,
            longitude,
        }
    }

    /// Gives a caller-supplied location without an ID a generated `loc` one.
    pub fn with_id_or_generated(mut self, now: DateTime<Utc>) -> Self {
        if self.id.trim().is_empty() {
            self.id = IdGenerator::generate_with_timestamp(IdType::Location, now);
        }
        self
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Ambulance {
    pub id: String,
    pub name: String,                      // Call sign shown to operators
    pub status: AmbulanceStatus,
    pub is_available: bool,                // Mirrors `status == Available`
    pub current_location: Option<Location>,
    pub current_request: Option<String>,   // Request currently holding this vehicle
}

impl Ambulance {
    pub fn new(id: impl Into<String>, name: impl Into<String>, current_location: Option<Location>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: AmbulanceStatus::Available,
            is_available: true,
            current_location,
            current_request: None,
        }
    }

    pub fn is_dispatchable(&self) -> bool {
        self.status == AmbulanceStatus::Available && self.is_available
    }

    /// Claims the vehicle for `request_id`. Returns false if it was not available.
    pub fn claim_for(&mut self, request_id: &str) -> bool {
        if !self.is_dispatchable() {
            return false;
        }
        self.status = AmbulanceStatus::InService;
        self.is_available = false;
        self.current_request = Some(request_id.to_string());
        true
    }

    /// Returns the vehicle to the pool, but only if `request_id` still holds it.
    pub fn release_from(&mut self, request_id: &str) -> bool {
        if self.current_request.as_deref() != Some(request_id) {
            return false;
        }
        self.status = AmbulanceStatus::Available;
        self.is_available = true;
        self.current_request = None;
        true
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AmbulanceRegistration {
    pub name: String,
    pub current_location: Option<Location>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AmbulanceLocationUpdate {
    pub location: Location,
}
