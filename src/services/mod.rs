pub mod clock;
pub mod dispatch_service;
pub mod eta_service;
pub mod event_sink;
pub mod fleet_service;
pub mod geo;
pub mod matcher;
pub mod memory_store;
pub mod repository;
pub mod sweeper;

pub use dispatch_service::{CancellationPolicy, DispatchConfig, DispatchOperations, DispatchService};
pub use fleet_service::{FleetOperations, FleetService};
