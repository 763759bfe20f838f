//! Library exports for taxtracker, shared between the binary and tests.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod startup;
pub mod state;
pub mod upload;
pub mod utils;
