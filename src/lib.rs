pub mod cli;
pub mod commands;
pub mod config;
pub mod constants;
pub mod error;
pub mod health;
pub mod launcher;
pub mod manager;
pub mod manifest;
pub mod ports;
pub mod registry;

pub use error::{DeployError, HealthCheckFailure};
pub use manager::{Deploy, DeployManager, DeployService};
