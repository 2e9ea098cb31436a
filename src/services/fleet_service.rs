// src/services/fleet_service.rs
use async_trait::async_trait;
use std::sync::Arc;
use tracing;

use crate::{
    errors::{DispatchError, DispatchResult, ValidationError},
    models::{Ambulance, AmbulanceRegistration, Driver, DriverRegistration, Location},
    services::{
        clock::Clock,
        repository::{FleetRepository, StaffRepository},
    },
    utils::id_generator::{IdGenerator, IdType},
};

#[async_trait]
pub trait FleetOperations: Send + Sync {
    async fn register_ambulance(&self, registration: AmbulanceRegistration) -> DispatchResult<Ambulance>;
    async fn get_ambulance(&self, ambulance_id: &str) -> DispatchResult<Ambulance>;
    async fn list_ambulances(&self) -> DispatchResult<Vec<Ambulance>>;
    async fn update_ambulance_location(&self, ambulance_id: &str, location: Location) -> DispatchResult<Ambulance>;
    async fn register_driver(&self, registration: DriverRegistration) -> DispatchResult<Driver>;
    async fn get_driver(&self, driver_id: &str) -> DispatchResult<Driver>;
}

/// Roster upkeep for vehicles and crews. Dispatch state changes go through
/// `DispatchService`; this only adds records and moves vehicles.
pub struct FleetService {
    fleet: Arc<dyn FleetRepository>,
    staff: Arc<dyn StaffRepository>,
    clock: Arc<dyn Clock>,
}

impl FleetService {
    pub fn new(fleet: Arc<dyn FleetRepository>, staff: Arc<dyn StaffRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { fleet, staff, clock }
    }
}

#[async_trait]
impl FleetOperations for FleetService {
    async fn register_ambulance(&self, registration: AmbulanceRegistration) -> DispatchResult<Ambulance> {
        if registration.name.trim().is_empty() {
            return Err(DispatchError::validation_error("name", "Ambulance call sign is required"));
        }

        let now = self.clock.now();
        let id = IdGenerator::generate_with_timestamp(IdType::Ambulance, now);
        let location = registration.current_location.map(|l| l.with_id_or_generated(now));
        let ambulance = Ambulance::new(id, registration.name, location);
        self.fleet.upsert_ambulance(ambulance.clone()).await?;

        tracing::info!("Ambulance registered: {} ({})", ambulance.id, ambulance.name);
        Ok(ambulance)
    }

    async fn get_ambulance(&self, ambulance_id: &str) -> DispatchResult<Ambulance> {
        self.fleet
            .get_ambulance(ambulance_id)
            .await?
            .ok_or_else(|| DispatchError::ambulance_not_found(ambulance_id))
    }

    async fn list_ambulances(&self) -> DispatchResult<Vec<Ambulance>> {
        self.fleet.find_all().await
    }

    async fn update_ambulance_location(&self, ambulance_id: &str, location: Location) -> DispatchResult<Ambulance> {
        tracing::debug!("Moving ambulance {} to {}", ambulance_id, location.name);
        let location = location.with_id_or_generated(self.clock.now());
        self.fleet.update_location(ambulance_id, location).await
    }

    async fn register_driver(&self, registration: DriverRegistration) -> DispatchResult<Driver> {
        let mut errors = Vec::new();
        if registration.first_name.trim().is_empty() {
            errors.push(ValidationError::new("first_name", "First name is required"));
        }
        if registration.phone_number.trim().is_empty() {
            errors.push(ValidationError::new("phone_number", "Phone number is required"));
        }
        if !errors.is_empty() {
            return Err(DispatchError::ValidationFailed(errors));
        }

        let driver = Driver {
            id: IdGenerator::generate_with_timestamp(IdType::Driver, self.clock.now()),
            first_name: registration.first_name,
            last_name: registration.last_name,
            phone_number: registration.phone_number,
            is_available: true,
        };
        self.staff.upsert_driver(driver.clone()).await?;

        tracing::info!("Driver registered: {} ({})", driver.id, driver.full_name());
        Ok(driver)
    }

    async fn get_driver(&self, driver_id: &str) -> DispatchResult<Driver> {
        self.staff
            .get_driver(driver_id)
            .await?
            .ok_or_else(|| DispatchError::driver_not_found(driver_id))
    }
}
