// src/models/mod.rs
pub mod ambulance;
pub mod request;
pub mod staff;

pub use ambulance::*;
pub use request::*;
pub use staff::*;
