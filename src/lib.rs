pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod tables;

// Port trait for the external geocoding collaborator and its adapters.
pub mod infra;
pub mod ports;
