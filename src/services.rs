//! Shared, `Arc`-held services injected into the browser at construction
//! time rather than reached for as globals (the original implementation's
//! `COOKIE_JAR`/`cache_manager`/`_socket_map` module-level singletons, made
//! explicit and owned).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::cookies::CookieJar;
use crate::network::NetworkDispatcher;
use crate::pool::ConnectionPool;

pub struct Services {
    pub cookies: Arc<CookieJar>,
    pub cache: Arc<ResponseCache>,
    pub pool: Arc<ConnectionPool>,
    pub network: Arc<NetworkDispatcher>,
    frame_ids: AtomicU64,
}

impl Services {
    pub fn new(workers: usize) -> Arc<Services> {
        Arc::new(Services {
            cookies: Arc::new(CookieJar::new()),
            cache: Arc::new(ResponseCache::new()),
            pool: Arc::new(ConnectionPool::new()),
            network: Arc::new(NetworkDispatcher::new(workers)),
            frame_ids: AtomicU64::new(1),
        })
    }

    /// Globally-unique frame id, mirroring `_generate_frame_id` in the
    /// original implementation's scripting bridge.
    pub fn next_frame_id(&self) -> u64 {
        self.frame_ids.fetch_add(1, Ordering::Relaxed)
    }
}
