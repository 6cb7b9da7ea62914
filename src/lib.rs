pub mod cli;
pub mod client;
pub mod config;
pub mod logging;
pub mod safety;
pub mod stats;
pub mod surface;
pub mod utils;
pub mod web;
