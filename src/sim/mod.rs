pub mod telemetry_sim;
pub mod types;
