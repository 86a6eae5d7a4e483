//! PhishSim Common - Shared types and utilities
//!
//! This crate provides configuration, the error taxonomy and the domain
//! vocabulary (event types, grouping dimensions, event metadata) shared
//! across all PhishSim components.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
