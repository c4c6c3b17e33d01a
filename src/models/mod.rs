pub mod identity;
pub mod telemetry;
pub mod vin;
