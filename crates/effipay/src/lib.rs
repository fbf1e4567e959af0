pub mod allocation;
pub mod config;
pub mod error;
pub mod profiles;
pub mod recommendation;
pub mod telemetry;
