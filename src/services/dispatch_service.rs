// src/services/dispatch_service.rs
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing;

use crate::{
    errors::{DispatchError, DispatchResult},
    models::{
        Ambulance, AmbulanceRequest, IncidentState, Location, NewRequest, RequestStatus,
    },
    services::{
        clock::{Clock, SystemClock},
        eta_service::{EtaConfig, EtaEstimator},
        event_sink::{EventSink, TracingEventSink},
        geo::{DistanceProvider, HaversineDistance},
        matcher::{select_nearest, AssignmentResult},
        repository::{FleetRepository, RequestRepository, StaffRepository},
        sweeper::SweepReport,
    },
    utils::id_generator::{IdGenerator, IdType},
};

/// What cancelling a request does with a vehicle it still holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationPolicy {
    /// Leave the vehicle in service. Completion is the only release path.
    #[default]
    Retain,
    /// Return the vehicle (and driver) to the pool on cancellation.
    Release,
}

#[derive(Debug, Clone, Default)]
pub struct DispatchConfig {
    pub cancellation_policy: CancellationPolicy,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionReport {
    pub request: AmbulanceRequest,
    pub ambulance_released: bool,
    pub driver_released: bool,
    pub rebalance: SweepReport,
}

/// Command surface of the dispatch engine.
#[async_trait]
pub trait DispatchOperations: Send + Sync {
    async fn create_request(&self, draft: NewRequest) -> DispatchResult<AmbulanceRequest>;
    async fn get_request(&self, request_id: &str) -> DispatchResult<AmbulanceRequest>;
    async fn list_requests(&self) -> DispatchResult<Vec<AmbulanceRequest>>;
    async fn update_pickup_location(&self, request_id: &str, location: Location) -> DispatchResult<AmbulanceRequest>;

    async fn intelligent_assign_ambulance(&self, request_id: &str) -> DispatchResult<AmbulanceRequest>;
    async fn assign_scheduled_ambulances(&self) -> DispatchResult<SweepReport>;
    async fn broadcast_incident(&self, request_id: &str) -> DispatchResult<usize>;

    async fn set_pending(&self, request_id: &str) -> DispatchResult<AmbulanceRequest>;
    async fn set_in_progress(&self, request_id: &str) -> DispatchResult<AmbulanceRequest>;
    async fn set_completed(&self, request_id: &str) -> DispatchResult<CompletionReport>;
    async fn set_canceled(&self, request_id: &str) -> DispatchResult<AmbulanceRequest>;

    async fn set_incident_state(&self, request_id: &str, state: IncidentState) -> DispatchResult<AmbulanceRequest>;

    async fn set_reported(&self, request_id: &str) -> DispatchResult<AmbulanceRequest> {
        self.set_incident_state(request_id, IncidentState::Reported).await
    }

    async fn set_dispatched(&self, request_id: &str) -> DispatchResult<AmbulanceRequest> {
        self.set_incident_state(request_id, IncidentState::Dispatched).await
    }

    async fn set_on_scene(&self, request_id: &str) -> DispatchResult<AmbulanceRequest> {
        self.set_incident_state(request_id, IncidentState::OnScene).await
    }

    async fn set_intervention(&self, request_id: &str) -> DispatchResult<AmbulanceRequest> {
        self.set_incident_state(request_id, IncidentState::Intervention).await
    }

    async fn set_reporting(&self, request_id: &str) -> DispatchResult<AmbulanceRequest> {
        self.set_incident_state(request_id, IncidentState::Reporting).await
    }
}

pub struct DispatchService {
    fleet: Arc<dyn FleetRepository>,
    requests: Arc<dyn RequestRepository>,
    staff: Arc<dyn StaffRepository>,
    distance: Arc<dyn DistanceProvider>,
    eta: Arc<EtaEstimator>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    config: DispatchConfig,
    // One mutating operation at a time, cascades included
    write_lock: Mutex<()>,
}

impl DispatchService {
    pub fn new(
        fleet: Arc<dyn FleetRepository>,
        requests: Arc<dyn RequestRepository>,
        staff: Arc<dyn StaffRepository>,
    ) -> Self {
        Self {
            fleet,
            requests,
            staff,
            distance: Arc::new(HaversineDistance),
            eta: Arc::new(EtaEstimator::from_entropy(EtaConfig::default())),
            clock: Arc::new(SystemClock),
            events: Arc::new(TracingEventSink),
            config: DispatchConfig::default(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_distance(mut self, distance: Arc<dyn DistanceProvider>) -> Self {
        self.distance = distance;
        self
    }

    pub fn with_eta(mut self, eta: Arc<EtaEstimator>) -> Self {
        self.eta = eta;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    async fn load(&self, request_id: &str) -> DispatchResult<AmbulanceRequest> {
        self.requests
            .get_request(request_id)
            .await?
            .ok_or_else(|| DispatchError::request_not_found(request_id))
    }

    async fn refresh_eta(&self, request: &mut AmbulanceRequest) -> DispatchResult<()> {
        let ambulance = match &request.assigned_ambulance {
            Some(ambulance_id) => self.fleet.get_ambulance(ambulance_id).await?,
            None => None,
        };
        request.eta = self.eta.estimate_for(request, ambulance.as_ref(), self.distance.as_ref());
        Ok(())
    }

    /// Nearest-vehicle assignment for one request. Caller holds the write lock.
    ///
    /// The claim is a conditional update, so a vehicle taken by another writer
    /// between listing and claiming is dropped from the candidates and the
    /// selection runs again.
    async fn assign_locked(&self, request: &mut AmbulanceRequest) -> DispatchResult<AssignmentResult> {
        if request.status != RequestStatus::Pending {
            tracing::debug!("Request {} is {}, not assigning", request.id, request.status);
            return Ok(AssignmentResult::NotPending { status: request.status });
        }
        if let Some(ambulance_id) = &request.assigned_ambulance {
            tracing::debug!("Request {} is pending but still holds {}", request.id, ambulance_id);
            return Ok(AssignmentResult::AlreadyAssigned {
                ambulance_id: ambulance_id.clone(),
            });
        }
        let pickup = request
            .pickup_location
            .clone()
            .ok_or_else(|| DispatchError::MissingReference {
                request_id: request.id.clone(),
                field: "pickup location",
            })?;

        let mut lost_races: HashSet<String> = HashSet::new();
        loop {
            let available = self.fleet.find_available().await?;
            let candidates = available.iter().filter(|a| !lost_races.contains(&a.id));

            let Some((nearest, distance_km)) = select_nearest(&pickup, candidates, self.distance.as_ref()) else {
                self.events
                    .warn(&request.id, "All ambulances are busy. Cannot assign.")
                    .await;
                return Ok(AssignmentResult::NoAvailableVehicle);
            };
            let ambulance: Ambulance = nearest.clone();

            if !self.fleet.claim(&ambulance.id, &request.id).await? {
                tracing::warn!(
                    "Ambulance {} was claimed elsewhere while assigning request {}, retrying",
                    ambulance.id,
                    request.id
                );
                lost_races.insert(ambulance.id);
                continue;
            }

            request.attach_ambulance(&ambulance.id);
            request.eta = self.eta.estimate_for(request, Some(&ambulance), self.distance.as_ref());

            if let Err(e) = self.requests.save_request(request).await {
                // Hand the vehicle back rather than strand it
                self.fleet.release(&ambulance.id, &request.id).await?;
                return Err(e);
            }

            self.events
                .info(
                    &request.id,
                    &format!("Assigned ambulance {} to request {}", ambulance.id, request.id),
                )
                .await;

            return Ok(AssignmentResult::Assigned {
                ambulance_id: ambulance.id,
                distance_km,
            });
        }
    }

    /// One pass over `batch`, in the given order. Recoverable per-request
    /// problems are recorded and the pass continues.
    async fn sweep_locked(&self, batch: Vec<AmbulanceRequest>) -> DispatchResult<SweepReport> {
        let mut report = SweepReport::default();

        for listed in batch {
            // Earlier iterations may have changed it
            let Some(mut request) = self.requests.get_request(&listed.id).await? else {
                report.record_failure(&listed.id, "Request disappeared during sweep");
                continue;
            };

            match self.assign_locked(&mut request).await {
                Ok(result) => report.record(&request.id, &result),
                Err(e) if e.is_recoverable() => {
                    self.events.warn(&request.id, &e.to_string()).await;
                    report.record_failure(&request.id, e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    /// Frees the vehicle and driver held by `request`.
    async fn release_resources(&self, request: &AmbulanceRequest) -> DispatchResult<(bool, bool)> {
        let Some(ambulance_id) = &request.assigned_ambulance else {
            return Ok((false, false));
        };

        let ambulance_released = self.fleet.release(ambulance_id, &request.id).await?;
        if ambulance_released {
            tracing::info!("Ambulance {} released by request {}", ambulance_id, request.id);
        } else {
            tracing::warn!(
                "Ambulance {} is no longer held by request {}, leaving it as is",
                ambulance_id,
                request.id
            );
        }

        let mut driver_released = false;
        if let Some(driver_id) = &request.assigned_driver {
            driver_released = self.staff.set_driver_available(driver_id, true).await?;
            if !driver_released {
                tracing::warn!("Driver {} on request {} not found", driver_id, request.id);
            }
        }

        Ok((ambulance_released, driver_released))
    }

    /// Clears `assigned_ambulance` when that vehicle is gone or now serves
    /// another request. A request reopened after completion (or after a
    /// releasing cancellation) waits for a fresh assignment this way.
    async fn drop_stale_ambulance(&self, request: &mut AmbulanceRequest) -> DispatchResult<bool> {
        let Some(ambulance_id) = &request.assigned_ambulance else {
            return Ok(false);
        };
        let still_held = self
            .fleet
            .get_ambulance(ambulance_id)
            .await?
            .is_some_and(|ambulance| ambulance.current_request.as_deref() == Some(request.id.as_str()));
        if still_held {
            return Ok(false);
        }

        if let Some(dropped) = request.detach_ambulance() {
            tracing::info!("Request {} no longer holds ambulance {}", request.id, dropped);
            self.events
                .info(&request.id, &format!("Ambulance {} is no longer attached to request {}.", dropped, request.id))
                .await;
        }
        Ok(true)
    }

    async fn apply_status_locked(
        &self,
        request_id: &str,
        target: RequestStatus,
    ) -> DispatchResult<(AmbulanceRequest, bool)> {
        let mut request = self.load(request_id).await?;
        let transition = request.apply_status(target, self.clock.now());
        if !transition.is_applied() {
            tracing::debug!(
                "Ignoring {} on request {}: already {}",
                target,
                request.id,
                request.status
            );
            return Ok((request, false));
        }
        self.requests.save_request(&request).await?;
        Ok((request, true))
    }
}

#[async_trait]
impl DispatchOperations for DispatchService {
    async fn create_request(&self, draft: NewRequest) -> DispatchResult<AmbulanceRequest> {
        let errors = draft.validate();
        if !errors.is_empty() {
            return Err(DispatchError::ValidationFailed(errors));
        }
        if let Some(driver_id) = &draft.driver_id {
            if self.staff.get_driver(driver_id).await?.is_none() {
                return Err(DispatchError::driver_not_found(driver_id));
            }
        }

        let _guard = self.write_lock.lock().await;
        let now = self.clock.now();
        let mut draft = draft;
        draft.pickup_location = draft.pickup_location.map(|l| l.with_id_or_generated(now));
        draft.destination_location = draft.destination_location.map(|l| l.with_id_or_generated(now));

        let id = IdGenerator::generate_with_timestamp(IdType::Request, now);
        let mut request = AmbulanceRequest::new(id, draft, now);
        self.refresh_eta(&mut request).await?;

        self.requests.insert_request(request.clone()).await?;
        self.events.info(&request.id, "Request created.").await;

        Ok(request)
    }

    async fn get_request(&self, request_id: &str) -> DispatchResult<AmbulanceRequest> {
        self.load(request_id).await
    }

    async fn list_requests(&self) -> DispatchResult<Vec<AmbulanceRequest>> {
        self.requests.list_requests().await
    }

    async fn update_pickup_location(&self, request_id: &str, location: Location) -> DispatchResult<AmbulanceRequest> {
        let _guard = self.write_lock.lock().await;
        let mut request = self.load(request_id).await?;
        if request.status.is_terminal() {
            return Err(DispatchError::InvalidStateTransition {
                request_id: request.id,
                from: request.status,
                action: "relocate",
            });
        }

        let message = format!("Pickup location changed to '{}'.", location.name);
        request.pickup_location = Some(location.with_id_or_generated(self.clock.now()));
        self.refresh_eta(&mut request).await?;
        self.requests.save_request(&request).await?;
        self.events.info(&request.id, &message).await;

        Ok(request)
    }

    async fn intelligent_assign_ambulance(&self, request_id: &str) -> DispatchResult<AmbulanceRequest> {
        let _guard = self.write_lock.lock().await;
        let mut request = self.load(request_id).await?;

        match self.assign_locked(&mut request).await? {
            AssignmentResult::NoAvailableVehicle => Err(DispatchError::NoAvailableVehicle),
            _ => Ok(request),
        }
    }

    async fn assign_scheduled_ambulances(&self) -> DispatchResult<SweepReport> {
        let _guard = self.write_lock.lock().await;
        let now = self.clock.now();

        let due = self.requests.find_pending_scheduled_due(now).await?;
        tracing::debug!("Scheduled sweep at {}: {} requests due", now, due.len());

        self.sweep_locked(due).await
    }

    async fn broadcast_incident(&self, request_id: &str) -> DispatchResult<usize> {
        let request = self.load(request_id).await?;
        let ambulances = self.fleet.find_all().await?;

        let message = format!("Incident {} broadcasted to this ambulance.", request.id);
        for ambulance in &ambulances {
            self.events.info(&ambulance.id, &message).await;
        }
        self.events
            .info(&request.id, "Incident broadcasted to all ambulances.")
            .await;

        Ok(ambulances.len())
    }

    async fn set_pending(&self, request_id: &str) -> DispatchResult<AmbulanceRequest> {
        let _guard = self.write_lock.lock().await;
        let (mut request, applied) = self.apply_status_locked(request_id, RequestStatus::Pending).await?;
        if !applied {
            return Ok(request);
        }
        self.events.info(&request.id, "Status changed to 'pending'.").await;

        if self.drop_stale_ambulance(&mut request).await? {
            self.requests.save_request(&request).await?;
        }
        Ok(request)
    }

    async fn set_in_progress(&self, request_id: &str) -> DispatchResult<AmbulanceRequest> {
        let _guard = self.write_lock.lock().await;
        let (request, applied) = self.apply_status_locked(request_id, RequestStatus::InProgress).await?;
        if applied {
            self.events.info(&request.id, "Status changed to 'in progress'.").await;
        }
        Ok(request)
    }

    async fn set_completed(&self, request_id: &str) -> DispatchResult<CompletionReport> {
        let _guard = self.write_lock.lock().await;
        let (request, applied) = self.apply_status_locked(request_id, RequestStatus::Completed).await?;
        if !applied {
            return Ok(CompletionReport {
                request,
                ambulance_released: false,
                driver_released: false,
                rebalance: SweepReport::default(),
            });
        }
        self.events.info(&request.id, "Request marked as completed.").await;

        let (ambulance_released, driver_released) = self.release_resources(&request).await?;
        if let (true, Some(ambulance_id)) = (ambulance_released, &request.assigned_ambulance) {
            self.events
                .info(
                    &request.id,
                    &format!("Request {} completed. Ambulance {} is now available.", request.id, ambulance_id),
                )
                .await;
        }

        // Single rebalancing pass over requests still waiting for a vehicle
        let waiting = self.requests.find_pending_unassigned().await?;
        let rebalance = if waiting.is_empty() {
            tracing::info!("No pending requests without an ambulance");
            SweepReport::default()
        } else {
            let report = self.sweep_locked(waiting).await?;
            tracing::info!(
                "Rebalanced after completing {}: {} checked, {} assigned",
                request.id,
                report.examined,
                report.assigned.len()
            );
            report
        };

        Ok(CompletionReport {
            request,
            ambulance_released,
            driver_released,
            rebalance,
        })
    }

    async fn set_canceled(&self, request_id: &str) -> DispatchResult<AmbulanceRequest> {
        let _guard = self.write_lock.lock().await;
        let (request, applied) = self.apply_status_locked(request_id, RequestStatus::Canceled).await?;
        if !applied {
            return Ok(request);
        }
        self.events.info(&request.id, "Request has been canceled.").await;

        if self.config.cancellation_policy == CancellationPolicy::Release {
            let (ambulance_released, _) = self.release_resources(&request).await?;
            if let (true, Some(ambulance_id)) = (ambulance_released, &request.assigned_ambulance) {
                self.events
                    .info(&request.id, &format!("Ambulance {} released by cancellation.", ambulance_id))
                    .await;
            }
        }

        Ok(request)
    }

    async fn set_incident_state(&self, request_id: &str, state: IncidentState) -> DispatchResult<AmbulanceRequest> {
        let _guard = self.write_lock.lock().await;
        let mut request = self.load(request_id).await?;

        request.set_incident_state(state);
        self.requests.save_request(&request).await?;
        self.events
            .info(&request.id, &format!("Incident state changed to '{}'.", state))
            .await;

        Ok(request)
    }
}
