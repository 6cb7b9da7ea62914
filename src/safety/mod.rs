//! Admission control for optimize calls.

pub mod single_flight;

pub use single_flight::{FlightPermit, SingleFlight};
