//! PhishSim Storage - Database abstraction
//!
//! This crate provides the durable record store for campaigns, targets and
//! tracking events. Every collection is reached through a repository trait,
//! backed either by PostgreSQL or by an in-process store.

pub mod db;
pub mod memory;
pub mod models;
pub mod repository;

pub use db::{Database, DatabasePool};
pub use memory::MemoryStore;
pub use models::*;
pub use repository::*;
