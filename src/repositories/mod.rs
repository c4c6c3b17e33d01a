pub mod vin_repository;

pub use vin_repository::VinRepository;
