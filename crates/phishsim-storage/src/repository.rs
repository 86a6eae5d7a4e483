//! Repository layer for data access

pub mod campaigns;
pub mod events;
pub mod stats;
pub mod targets;

use crate::db::DatabasePool;
use crate::memory::MemoryStore;
use std::sync::Arc;

// Re-export concrete repository implementations with simple names
pub use campaigns::DbCampaignRepository;
pub use events::DbEventRepository;
pub use stats::DbStatsRepository;
pub use targets::DbTargetRepository;

// Re-export repository traits
pub use campaigns::CampaignRepository;
pub use events::EventRepository;
pub use stats::StatsRepository;
pub use targets::TargetRepository;

/// Backend behind a set of repositories
#[derive(Clone)]
enum Backend {
    Postgres(DatabasePool),
    Memory,
}

/// The full set of repositories used by the application
#[derive(Clone)]
pub struct Repositories {
    pub campaigns: Arc<dyn CampaignRepository>,
    pub targets: Arc<dyn TargetRepository>,
    pub events: Arc<dyn EventRepository>,
    pub stats: Arc<dyn StatsRepository>,
    backend: Backend,
}

impl Repositories {
    /// Repositories backed by PostgreSQL
    pub fn postgres(pool: DatabasePool) -> Self {
        Self {
            campaigns: Arc::new(DbCampaignRepository::new(pool.clone())),
            targets: Arc::new(DbTargetRepository::new(pool.clone())),
            events: Arc::new(DbEventRepository::new(pool.clone())),
            stats: Arc::new(DbStatsRepository::new(pool.clone())),
            backend: Backend::Postgres(pool),
        }
    }

    /// Repositories backed by a shared in-process store
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            campaigns: store.clone(),
            targets: store.clone(),
            events: store.clone(),
            stats: store,
            backend: Backend::Memory,
        }
    }

    /// Name of the backing store
    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Postgres(_) => "postgres",
            Backend::Memory => "memory",
        }
    }

    /// Check that the backing store is reachable
    pub async fn health_check(&self) -> phishsim_common::Result<()> {
        match &self.backend {
            Backend::Postgres(pool) => pool.health_check().await,
            Backend::Memory => Ok(()),
        }
    }
}
