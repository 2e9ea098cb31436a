// src/services/repository.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    errors::DispatchResult,
    models::{Ambulance, AmbulanceRequest, Driver, Location},
};

/// Ambulance store. Listing order must be stable: nearest-vehicle ties go to
/// the first vehicle listed.
#[async_trait]
pub trait FleetRepository: Send + Sync {
    /// Vehicles whose status is `available`.
    async fn find_available(&self) -> DispatchResult<Vec<Ambulance>>;
    async fn find_all(&self) -> DispatchResult<Vec<Ambulance>>;
    async fn get_ambulance(&self, ambulance_id: &str) -> DispatchResult<Option<Ambulance>>;
    async fn upsert_ambulance(&self, ambulance: Ambulance) -> DispatchResult<()>;

    /// Conditional update: claims the vehicle for `request_id` iff it is still
    /// available. Returns false when another request got there first.
    async fn claim(&self, ambulance_id: &str, request_id: &str) -> DispatchResult<bool>;

    /// Returns the vehicle to the pool iff `request_id` still holds it.
    async fn release(&self, ambulance_id: &str, request_id: &str) -> DispatchResult<bool>;

    async fn update_location(&self, ambulance_id: &str, location: Location) -> DispatchResult<Ambulance>;
}

#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn get_request(&self, request_id: &str) -> DispatchResult<Option<AmbulanceRequest>>;
    async fn insert_request(&self, request: AmbulanceRequest) -> DispatchResult<()>;
    async fn save_request(&self, request: &AmbulanceRequest) -> DispatchResult<()>;
    async fn list_requests(&self) -> DispatchResult<Vec<AmbulanceRequest>>;

    /// Pending `schedule` requests whose scheduled time is at or before `now`.
    async fn find_pending_scheduled_due(&self, now: DateTime<Utc>) -> DispatchResult<Vec<AmbulanceRequest>>;

    /// Pending requests without an assigned vehicle.
    async fn find_pending_unassigned(&self) -> DispatchResult<Vec<AmbulanceRequest>>;
}

#[async_trait]
pub trait StaffRepository: Send + Sync {
    async fn get_driver(&self, driver_id: &str) -> DispatchResult<Option<Driver>>;
    async fn upsert_driver(&self, driver: Driver) -> DispatchResult<()>;

    /// Returns false if the driver does not exist.
    async fn set_driver_available(&self, driver_id: &str, available: bool) -> DispatchResult<bool>;
}
