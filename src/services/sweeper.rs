// src/services/sweeper.rs
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing;

use crate::services::dispatch_service::DispatchOperations;
use crate::services::matcher::AssignmentResult;

/// What one batch pass (scheduled sweep or post-completion rebalance) did.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub assigned: Vec<(String, String)>, // (request_id, ambulance_id)
    pub unassigned: Vec<String>,          // no vehicle was free
    pub skipped: Vec<String>,             // no longer eligible when reached
    pub failed: Vec<(String, String)>,    // (request_id, reason)
}

impl SweepReport {
    pub fn record(&mut self, request_id: &str, result: &AssignmentResult) {
        self.examined += 1;
        match result {
            AssignmentResult::Assigned { ambulance_id, .. } => {
                self.assigned.push((request_id.to_string(), ambulance_id.clone()));
            }
            AssignmentResult::NoAvailableVehicle => self.unassigned.push(request_id.to_string()),
            AssignmentResult::NotPending { .. } | AssignmentResult::AlreadyAssigned { .. } => {
                self.skipped.push(request_id.to_string());
            }
        }
    }

    pub fn record_failure(&mut self, request_id: &str, reason: impl Into<String>) {
        self.examined += 1;
        self.failed.push((request_id.to_string(), reason.into()));
    }

    pub fn assigned_to(&self, request_id: &str) -> Option<&str> {
        self.assigned
            .iter()
            .find(|(request, _)| request == request_id)
            .map(|(_, ambulance)| ambulance.as_str())
    }
}

/// Runs the scheduled-assignment sweep every `period` until the task is aborted.
///
/// A failed sweep is logged and the next tick runs as usual.
pub fn spawn_scheduled_sweeper(dispatch: Arc<dyn DispatchOperations>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match dispatch.assign_scheduled_ambulances().await {
                Ok(report) if report.examined == 0 => {
                    tracing::debug!("Scheduled sweep: nothing due");
                }
                Ok(report) => {
                    tracing::info!(
                        "Scheduled sweep: {} examined, {} assigned, {} waiting, {} failed",
                        report.examined,
                        report.assigned.len(),
                        report.unassigned.len(),
                        report.failed.len()
                    );
                }
                Err(e) => {
                    tracing::error!("Scheduled sweep failed: {}", e);
                }
            }
        }
    })
}
