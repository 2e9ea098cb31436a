// src/models/staff.rs
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Driver {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub is_available: bool,
}

impl Driver {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DriverRegistration {
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
}
