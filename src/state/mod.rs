//! Shared, process-wide state handed to every task: the connection registry,
//! the database, the KV cache, and the bus, bundled so the gateway, router,
//! worker, and sync layers all see the same instances.

mod registry;

pub use registry::SessionRegistry;

use crate::bus::Bus;
use crate::config::Config;
use crate::db::Database;
use crate::kv::Kv;
use std::sync::Arc;

/// The service's shared core. Cloned cheaply (everything inside is already
/// an `Arc` or `Clone`-able pool handle) and passed into every task spawned
/// at startup.
#[derive(Clone)]
pub struct Hub {
    pub config: Arc<Config>,
    pub db: Database,
    pub kv: Kv,
    pub bus: Arc<dyn Bus>,
    pub sessions: Arc<SessionRegistry>,
}

impl Hub {
    pub fn new(config: Arc<Config>, db: Database, kv: Kv, bus: Arc<dyn Bus>) -> Self {
        Self {
            config,
            db,
            kv,
            bus,
            sessions: Arc::new(SessionRegistry::new()),
        }
    }
}
