//! [`ResourceProbe`] backed by the sqlx connection pool.

use salesdesk_core::import_diagnostics::{ProcessMemoryProbe, ResourceProbe};

use crate::DbPool;

/// Reports pool occupancy alongside process memory.
#[derive(Debug, Clone)]
pub struct PoolProbe {
    pool: DbPool,
    memory: ProcessMemoryProbe,
}

impl PoolProbe {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            memory: ProcessMemoryProbe,
        }
    }
}

/// Connections in use as a percentage of the pool maximum.
pub fn pool_usage_percent(active: u32, max_connections: u32) -> f64 {
    if max_connections == 0 {
        return 0.0;
    }
    f64::from(active) / f64::from(max_connections) * 100.0
}

impl ResourceProbe for PoolProbe {
    fn memory_usage_mb(&self) -> f64 {
        self.memory.memory_usage_mb()
    }

    fn connection_pool_usage(&self) -> f64 {
        pool_usage_percent(
            self.active_connections(),
            self.pool.options().get_max_connections(),
        )
    }

    fn active_connections(&self) -> u32 {
        let idle = u32::try_from(self.pool.num_idle()).unwrap_or(u32::MAX);
        self.pool.size().saturating_sub(idle)
    }
}
