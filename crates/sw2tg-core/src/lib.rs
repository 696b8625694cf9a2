//! Core domain + application logic for the SugarWOD → Telegram bridge.
//!
//! This crate is framework-agnostic. The SugarWOD web client and the Telegram
//! bot live behind ports (traits) implemented in adapter crates.

pub mod bridge;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod jobs;
pub mod logging;
pub mod messaging;
pub mod poller;
pub mod scheduler;
pub mod workouts;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
