//! Simulated ASIC mining fleet.
//!
//! A periodic simulator advances a fleet of mock mining devices through
//! their power and thermal states. The daemon owns the fleet, drives the
//! tick, and exposes the result over a local HTTP API.

pub mod api;
pub mod api_client;
pub mod config;
pub mod daemon;
pub mod device;
pub mod error;
pub mod fleet;
pub mod preferences;
pub mod random;
pub mod runner;
pub mod sink;
pub mod tracing;
