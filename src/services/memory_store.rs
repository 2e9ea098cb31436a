// src/services/memory_store.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::{
    errors::{DispatchError, DispatchResult},
    models::{Ambulance, AmbulanceRequest, Driver, Location},
    services::repository::{FleetRepository, RequestRepository, StaffRepository},
};

/// Insertion-ordered table keyed by record ID.
#[derive(Debug)]
struct Table<T> {
    rows: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T: Clone> Table<T> {
    fn new() -> Self {
        Self {
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn get(&self, id: &str) -> Option<&T> {
        self.index.get(id).map(|&pos| &self.rows[pos])
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        match self.index.get(id) {
            Some(&pos) => Some(&mut self.rows[pos]),
            None => None,
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Replaces in place, keeping the original position, or appends.
    fn upsert(&mut self, id: &str, row: T) {
        match self.index.get(id) {
            Some(&pos) => self.rows[pos] = row,
            None => {
                self.index.insert(id.to_string(), self.rows.len());
                self.rows.push(row);
            }
        }
    }

    fn iter(&self) -> impl Iterator<Item = &T> {
        self.rows.iter()
    }
}

/// In-process store backing all three repositories.
///
/// Each write takes the table's write lock for the whole read-check-write, so
/// `claim` and `release` are atomic with respect to every other caller.
pub struct MemoryStore {
    ambulances: RwLock<Table<Ambulance>>,
    requests: RwLock<Table<AmbulanceRequest>>,
    drivers: RwLock<Table<Driver>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            ambulances: RwLock::new(Table::new()),
            requests: RwLock::new(Table::new()),
            drivers: RwLock::new(Table::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FleetRepository for MemoryStore {
    async fn find_available(&self) -> DispatchResult<Vec<Ambulance>> {
        let table = self.ambulances.read().await;
        Ok(table.iter().filter(|a| a.is_dispatchable()).cloned().collect())
    }

    async fn find_all(&self) -> DispatchResult<Vec<Ambulance>> {
        Ok(self.ambulances.read().await.iter().cloned().collect())
    }

    async fn get_ambulance(&self, ambulance_id: &str) -> DispatchResult<Option<Ambulance>> {
        Ok(self.ambulances.read().await.get(ambulance_id).cloned())
    }

    async fn upsert_ambulance(&self, ambulance: Ambulance) -> DispatchResult<()> {
        let id = ambulance.id.clone();
        self.ambulances.write().await.upsert(&id, ambulance);
        Ok(())
    }

    async fn claim(&self, ambulance_id: &str, request_id: &str) -> DispatchResult<bool> {
        let mut table = self.ambulances.write().await;
        let ambulance = table
            .get_mut(ambulance_id)
            .ok_or_else(|| DispatchError::ambulance_not_found(ambulance_id))?;
        Ok(ambulance.claim_for(request_id))
    }

    async fn release(&self, ambulance_id: &str, request_id: &str) -> DispatchResult<bool> {
        let mut table = self.ambulances.write().await;
        let ambulance = table
            .get_mut(ambulance_id)
            .ok_or_else(|| DispatchError::ambulance_not_found(ambulance_id))?;
        Ok(ambulance.release_from(request_id))
    }

    async fn update_location(&self, ambulance_id: &str, location: Location) -> DispatchResult<Ambulance> {
        let mut table = self.ambulances.write().await;
        let ambulance = table
            .get_mut(ambulance_id)
            .ok_or_else(|| DispatchError::ambulance_not_found(ambulance_id))?;
        ambulance.current_location = Some(location);
        Ok(ambulance.clone())
    }
}

#[async_trait]
impl RequestRepository for MemoryStore {
    async fn get_request(&self, request_id: &str) -> DispatchResult<Option<AmbulanceRequest>> {
        Ok(self.requests.read().await.get(request_id).cloned())
    }

    async fn insert_request(&self, request: AmbulanceRequest) -> DispatchResult<()> {
        let mut table = self.requests.write().await;
        if table.contains(&request.id) {
            return Err(DispatchError::validation_error("id", format!("Request {} already exists", request.id)));
        }
        let id = request.id.clone();
        table.upsert(&id, request);
        Ok(())
    }

    async fn save_request(&self, request: &AmbulanceRequest) -> DispatchResult<()> {
        let mut table = self.requests.write().await;
        if !table.contains(&request.id) {
            return Err(DispatchError::request_not_found(&request.id));
        }
        table.upsert(&request.id, request.clone());
        Ok(())
    }

    async fn list_requests(&self) -> DispatchResult<Vec<AmbulanceRequest>> {
        Ok(self.requests.read().await.iter().cloned().collect())
    }

    async fn find_pending_scheduled_due(&self, now: DateTime<Utc>) -> DispatchResult<Vec<AmbulanceRequest>> {
        let table = self.requests.read().await;
        Ok(table.iter().filter(|r| r.is_scheduled_due(now)).cloned().collect())
    }

    async fn find_pending_unassigned(&self) -> DispatchResult<Vec<AmbulanceRequest>> {
        let table = self.requests.read().await;
        Ok(table.iter().filter(|r| r.is_awaiting_vehicle()).cloned().collect())
    }
}

#[async_trait]
impl StaffRepository for MemoryStore {
    async fn get_driver(&self, driver_id: &str) -> DispatchResult<Option<Driver>> {
        Ok(self.drivers.read().await.get(driver_id).cloned())
    }

    async fn upsert_driver(&self, driver: Driver) -> DispatchResult<()> {
        let id = driver.id.clone();
        self.drivers.write().await.upsert(&id, driver);
        Ok(())
    }

    async fn set_driver_available(&self, driver_id: &str, available: bool) -> DispatchResult<bool> {
        let mut table = self.drivers.write().await;
        match table.get_mut(driver_id) {
            Some(driver) => {
                driver.is_available = available;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AmbulanceStatus;

    fn ambulance(id: &str) -> Ambulance {
        Ambulance::new(id, id.to_uppercase(), Some(Location::new("loc-1", "Depot", 0.0, 0.0)))
    }

    #[tokio::test]
    async fn test_available_listing_keeps_insertion_order() {
        let store = MemoryStore::new();
        for id in ["amb-c", "amb-a", "amb-b"] {
            store.upsert_ambulance(ambulance(id)).await.unwrap();
        }
        // Re-upserting keeps the original slot
        store.upsert_ambulance(ambulance("amb-c")).await.unwrap();

        let ids: Vec<String> = store.find_available().await.unwrap().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["amb-c", "amb-a", "amb-b"]);
    }

    #[tokio::test]
    async fn test_claim_is_check_and_set() {
        let store = MemoryStore::new();
        store.upsert_ambulance(ambulance("amb-1")).await.unwrap();

        assert!(store.claim("amb-1", "amr-1").await.unwrap());
        assert!(!store.claim("amb-1", "amr-2").await.unwrap());
        assert!(store.find_available().await.unwrap().is_empty());

        let held = store.get_ambulance("amb-1").await.unwrap().unwrap();
        assert_eq!(held.status, AmbulanceStatus::InService);
        assert_eq!(held.current_request.as_deref(), Some("amr-1"));
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let store = std::sync::Arc::new(MemoryStore::new());
        store.upsert_ambulance(ambulance("amb-1")).await.unwrap();

        let mut handles = Vec::new();
        for n in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.claim("amb-1", &format!("amr-{}", n)).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_claim_unknown_ambulance_fails() {
        let store = MemoryStore::new();
        let result = store.claim("amb-missing", "amr-1").await;
        assert!(matches!(result, Err(DispatchError::AmbulanceNotFound(_))));
    }

    #[tokio::test]
    async fn test_save_requires_existing_request() {
        let store = MemoryStore::new();
        let request = crate::models::AmbulanceRequest::new(
            "amr-1".to_string(),
            crate::models::NewRequest {
                patient_id: "pat-1".to_string(),
                pickup_location: None,
                destination_location: None,
                caller_name: None,
                caller_phone: None,
                patient_condition: None,
                priority: crate::models::Priority::Low,
                incident_priority: Default::default(),
                scheduled_time: None,
                driver_id: None,
            },
            Utc::now(),
        );

        assert!(matches!(store.save_request(&request).await, Err(DispatchError::RequestNotFound(_))));
        store.insert_request(request.clone()).await.unwrap();
        assert!(store.insert_request(request.clone()).await.is_err());
        store.save_request(&request).await.unwrap();
        assert_eq!(store.find_pending_unassigned().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_driver_availability() {
        let store = MemoryStore::new();
        store
            .upsert_driver(Driver {
                id: "drv-1".to_string(),
                first_name: "Abdi".to_string(),
                last_name: "Warsame".to_string(),
                phone_number: "+252 61 555 0199".to_string(),
                is_available: false,
            })
            .await
            .unwrap();

        assert!(store.set_driver_available("drv-1", true).await.unwrap());
        assert!(store.get_driver("drv-1").await.unwrap().unwrap().is_available);
        assert!(!store.set_driver_available("drv-missing", true).await.unwrap());
    }
}
