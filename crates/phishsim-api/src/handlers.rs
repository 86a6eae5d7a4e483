//! API request handlers

pub mod campaigns;
pub mod health;
pub mod stats;
pub mod tracking;

pub use health::*;
