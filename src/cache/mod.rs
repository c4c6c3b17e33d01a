pub mod vin_cache;

pub use vin_cache::VinCache;
