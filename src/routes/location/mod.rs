mod handler;
mod model;

pub use handler::{distance_between, location_history, register_location};
