//! PhishSim API - HTTP surface
//!
//! This crate provides the public tracking endpoints reached from
//! recipients' mail clients, and the authenticated operator API for
//! campaigns, targets, dispatch and statistics.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod landing;
pub mod openapi;
pub mod routes;

pub use auth::AppState;
pub use openapi::create_openapi_routes;
pub use routes::create_router;
