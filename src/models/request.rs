// src/models/request.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ValidationError;
use crate::models::ambulance::Location;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,    // Waiting for a vehicle
    InProgress, // Vehicle assigned and responding
    Completed,  // Patient delivered, vehicle released
    Canceled,   // Withdrawn by the operator
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Canceled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
            RequestStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clinical urgency. Informational only, it does not reorder assignment.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IncidentPriority {
    #[default]
    Immediate,
    Queued,
    Schedule, // Deferred until `scheduled_time`, picked up by the sweeper
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IncidentState {
    #[default]
    Reported,
    Dispatched,
    OnScene,
    Intervention,
    Reporting,
}

impl IncidentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentState::Reported => "reported",
            IncidentState::Dispatched => "dispatched",
            IncidentState::OnScene => "on_scene",
            IncidentState::Intervention => "intervention",
            IncidentState::Reporting => "reporting",
        }
    }
}

impl fmt::Display for IncidentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AmbulanceRequest {
    pub id: String,
    pub patient_id: String,
    pub pickup_location: Option<Location>,
    pub destination_location: Option<Location>,

    // Caller details
    pub caller_name: Option<String>,
    pub caller_phone: Option<String>,
    pub patient_condition: Option<String>,

    // Timing information
    pub request_time: DateTime<Utc>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub completed_time: Option<DateTime<Utc>>,
    pub eta: Option<DateTime<Utc>>,

    // Assignment
    pub assigned_ambulance: Option<String>,
    pub assigned_driver: Option<String>,

    pub status: RequestStatus,
    pub priority: Priority,
    pub incident_priority: IncidentPriority,
    pub incident_state: IncidentState,
}

/// Result of applying an operator status command to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied { from: RequestStatus },
    Ignored { from: RequestStatus },
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied { .. })
    }
}

impl AmbulanceRequest {
    pub fn new(id: String, draft: NewRequest, now: DateTime<Utc>) -> Self {
        Self {
            id,
            patient_id: draft.patient_id,
            pickup_location: draft.pickup_location,
            destination_location: draft.destination_location,
            caller_name: draft.caller_name,
            caller_phone: draft.caller_phone,
            patient_condition: draft.patient_condition,
            request_time: now,
            scheduled_time: draft.scheduled_time,
            completed_time: None,
            eta: None,
            assigned_ambulance: None,
            assigned_driver: draft.driver_id,
            status: RequestStatus::Pending,
            priority: draft.priority,
            incident_priority: draft.incident_priority,
            incident_state: IncidentState::Reported,
        }
    }

    /// Pending and not holding a vehicle.
    pub fn is_awaiting_vehicle(&self) -> bool {
        self.status == RequestStatus::Pending && self.assigned_ambulance.is_none()
    }

    pub fn is_scheduled_due(&self, now: DateTime<Utc>) -> bool {
        self.status == RequestStatus::Pending
            && self.incident_priority == IncidentPriority::Schedule
            && self.scheduled_time.is_some_and(|at| at <= now)
    }

    /// Minutes from request to completion; only defined once completed.
    pub fn response_time_minutes(&self) -> Option<f64> {
        if self.status != RequestStatus::Completed {
            return None;
        }
        let completed = self.completed_time?;
        Some((completed - self.request_time).num_milliseconds() as f64 / 60_000.0)
    }

    /// Attaches a claimed vehicle and moves the request into `in_progress`.
    pub fn attach_ambulance(&mut self, ambulance_id: &str) {
        self.assigned_ambulance = Some(ambulance_id.to_string());
        self.status = RequestStatus::InProgress;
    }

    /// Drops a vehicle reference the fleet no longer backs. Returns the
    /// dropped ID.
    pub fn detach_ambulance(&mut self) -> Option<String> {
        self.eta = None;
        self.assigned_ambulance.take()
    }

    /// Applies an operator status command.
    ///
    /// `Pending` is an administrative override accepted from every state. The
    /// other targets are ignored once the request is terminal, which also makes
    /// repeated completion a no-op. `completed_time` is stamped on the first
    /// completion only and never precedes `request_time`.
    ///
    /// Vehicle assignment is left alone here. The dispatch engine decides
    /// whether a reopened request keeps its vehicle.
    pub fn apply_status(&mut self, target: RequestStatus, now: DateTime<Utc>) -> Transition {
        let from = self.status;
        if target != RequestStatus::Pending && from.is_terminal() {
            return Transition::Ignored { from };
        }

        self.status = target;
        if target == RequestStatus::Completed && self.completed_time.is_none() {
            self.completed_time = Some(now.max(self.request_time));
        }
        Transition::Applied { from }
    }

    /// Incident tracking is advisory: any stage may follow any other.
    pub fn set_incident_state(&mut self, state: IncidentState) -> IncidentState {
        std::mem::replace(&mut self.incident_state, state)
    }
}

// Request/Response Models
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NewRequest {
    pub patient_id: String,
    pub pickup_location: Option<Location>,
    pub destination_location: Option<Location>,
    pub caller_name: Option<String>,
    pub caller_phone: Option<String>,
    pub patient_condition: Option<String>,
    pub priority: Priority,
    #[serde(default)]
    pub incident_priority: IncidentPriority,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub driver_id: Option<String>,
}

impl NewRequest {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.patient_id.trim().is_empty() {
            errors.push(ValidationError::new("patient_id", "Patient is required"));
        }
        if self.caller_phone.as_deref().is_some_and(|phone| phone.trim().is_empty()) {
            errors.push(ValidationError::new("caller_phone", "Caller phone must not be blank"));
        }

        match (self.incident_priority, self.scheduled_time) {
            (IncidentPriority::Schedule, None) => {
                errors.push(ValidationError::new(
                    "scheduled_time",
                    "Scheduled requests need a scheduled time",
                ));
            }
            (IncidentPriority::Immediate | IncidentPriority::Queued, Some(_)) => {
                errors.push(ValidationError::new(
                    "scheduled_time",
                    "Only scheduled requests may carry a scheduled time",
                ));
            }
            _ => {}
        }

        errors
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PickupUpdate {
    pub location: Location,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RequestResponse {
    pub id: String,
    pub patient_id: String,
    pub status: RequestStatus,
    pub priority: Priority,
    pub incident_priority: IncidentPriority,
    pub incident_state: IncidentState,
    pub pickup_location: Option<Location>,
    pub destination_location: Option<Location>,
    pub assigned_ambulance: Option<String>,
    pub assigned_driver: Option<String>,
    pub request_time: DateTime<Utc>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub completed_time: Option<DateTime<Utc>>,
    pub eta: Option<DateTime<Utc>>,
    pub response_time_minutes: Option<f64>,
}

impl From<AmbulanceRequest> for RequestResponse {
    fn from(request: AmbulanceRequest) -> Self {
        let response_time_minutes = request.response_time_minutes();
        Self {
            id: request.id,
            patient_id: request.patient_id,
            status: request.status,
            priority: request.priority,
            incident_priority: request.incident_priority,
            incident_state: request.incident_state,
            pickup_location: request.pickup_location,
            destination_location: request.destination_location,
            assigned_ambulance: request.assigned_ambulance,
            assigned_driver: request.assigned_driver,
            request_time: request.request_time,
            scheduled_time: request.scheduled_time,
            completed_time: request.completed_time,
            eta: request.eta,
            response_time_minutes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn draft() -> NewRequest {
        NewRequest {
            patient_id: "pat-1".to_string(),
            pickup_location: Some(Location::new("loc-1", "Market", 2.04, 45.31)),
            destination_location: None,
            caller_name: Some("Hodan".to_string()),
            caller_phone: Some("+252 61 555 0101".to_string()),
            patient_condition: None,
            priority: Priority::High,
            incident_priority: IncidentPriority::Immediate,
            scheduled_time: None,
            driver_id: None,
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_new_request_starts_pending_and_reported() {
        let request = AmbulanceRequest::new("amr-1".to_string(), draft(), start());
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.incident_state, IncidentState::Reported);
        assert!(request.is_awaiting_vehicle());
        assert!(request.eta.is_none());
        assert!(request.response_time_minutes().is_none());
    }

    #[test]
    fn test_completion_stamps_time_once() {
        let mut request = AmbulanceRequest::new("amr-1".to_string(), draft(), start());
        request.attach_ambulance("amb-1");

        let first = start() + Duration::minutes(42);
        assert!(request.apply_status(RequestStatus::Completed, first).is_applied());
        assert_eq!(request.completed_time, Some(first));
        assert_eq!(request.response_time_minutes(), Some(42.0));

        let second = first + Duration::minutes(5);
        let transition = request.apply_status(RequestStatus::Completed, second);
        assert_eq!(transition, Transition::Ignored { from: RequestStatus::Completed });
        assert_eq!(request.completed_time, Some(first));
    }

    #[test]
    fn test_completed_time_never_precedes_request_time() {
        let mut request = AmbulanceRequest::new("amr-1".to_string(), draft(), start());
        request.apply_status(RequestStatus::Completed, start() - Duration::hours(1));
        assert_eq!(request.completed_time, Some(start()));
    }

    #[test]
    fn test_detach_clears_vehicle_and_eta() {
        let mut request = AmbulanceRequest::new("amr-1".to_string(), draft(), start());
        request.attach_ambulance("amb-1");
        request.eta = Some(start() + Duration::minutes(8));
        request.apply_status(RequestStatus::Pending, start());

        assert_eq!(request.detach_ambulance().as_deref(), Some("amb-1"));
        assert!(request.is_awaiting_vehicle());
        assert!(request.eta.is_none());
        assert!(request.detach_ambulance().is_none());
    }

    #[test]
    fn test_terminal_states_only_reopen_through_pending() {
        let mut request = AmbulanceRequest::new("amr-1".to_string(), draft(), start());
        assert!(request.apply_status(RequestStatus::Canceled, start()).is_applied());

        assert!(!request.apply_status(RequestStatus::InProgress, start()).is_applied());
        assert!(!request.apply_status(RequestStatus::Completed, start()).is_applied());
        assert_eq!(request.status, RequestStatus::Canceled);

        let transition = request.apply_status(RequestStatus::Pending, start());
        assert_eq!(transition, Transition::Applied { from: RequestStatus::Canceled });
        assert_eq!(request.status, RequestStatus::Pending);
    }

    #[test]
    fn test_incident_state_is_unchecked() {
        let mut request = AmbulanceRequest::new("amr-1".to_string(), draft(), start());
        assert_eq!(request.set_incident_state(IncidentState::Reporting), IncidentState::Reported);
        assert_eq!(request.set_incident_state(IncidentState::Dispatched), IncidentState::Reporting);
        assert_eq!(request.status, RequestStatus::Pending);
    }

    #[test]
    fn test_scheduled_due() {
        let mut new = draft();
        new.incident_priority = IncidentPriority::Schedule;
        new.scheduled_time = Some(start() + Duration::hours(1));
        let request = AmbulanceRequest::new("amr-1".to_string(), new, start());

        assert!(!request.is_scheduled_due(start()));
        assert!(request.is_scheduled_due(start() + Duration::hours(1)));
    }

    #[test]
    fn test_validation_of_schedule_fields() {
        let mut scheduled_without_time = draft();
        scheduled_without_time.incident_priority = IncidentPriority::Schedule;
        let errors = scheduled_without_time.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "scheduled_time");

        let mut immediate_with_time = draft();
        immediate_with_time.scheduled_time = Some(start());
        assert_eq!(immediate_with_time.validate().len(), 1);

        assert!(draft().validate().is_empty());
    }
}
