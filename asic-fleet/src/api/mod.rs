//! HTTP API server.
//!
//! A local REST API for monitoring and controlling the simulated fleet,
//! built on Axum with an OpenAPI description served through Swagger UI.
//! Handlers read the latest published snapshot and send mutations to the
//! runner as commands.
//!
//! The API binds to localhost by default and does not require
//! authentication for local access.

pub mod commands;
pub mod server;
mod v0;

pub use server::{ApiConfig, serve};
