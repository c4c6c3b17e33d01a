pub mod vehicle_controller;
pub mod vehicle_delete_controller;
