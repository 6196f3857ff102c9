//! HTTP response cache keyed by the full request URL string, grounded on
//! the original implementation's `networking/cache_manager.py`: max-age-only
//! freshness (no ETag/validators), lazy eviction on read, `no-store` skips
//! storage entirely.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::csp::ContentSecurityPolicy;

#[derive(Clone)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub csp: Option<ContentSecurityPolicy>,
}

struct Entry {
    response: CachedResponse,
    expires_at: Instant,
}

pub struct ResponseCache {
    entries: Mutex<BTreeMap<String, Entry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self { entries: Mutex::new(BTreeMap::new()) }
    }

    pub fn get(&self, url: &str) -> Option<CachedResponse> {
        let mut entries = self.entries.lock().unwrap();
        let fresh = match entries.get(url) {
            Some(e) => Instant::now() < e.expires_at,
            None => return None,
        };
        if fresh {
            Some(entries.get(url).unwrap().response.clone())
        } else {
            entries.remove(url);
            None
        }
    }

    pub fn set(&self, url: &str, response: &CachedResponse) {
        let cache_control = response.headers.get("cache-control").map(|s| s.to_lowercase()).unwrap_or_default();
        if cache_control.split(',').any(|d| d.trim() == "no-store") {
            return;
        }
        let max_age = cache_control.split(',').find_map(|directive| {
            let directive = directive.trim();
            directive.strip_prefix("max-age=").and_then(|v| v.parse::<u64>().ok())
        });
        let max_age = match max_age {
            Some(m) => m,
            None => return,
        };
        self.entries.lock().unwrap().insert(
            url.to_string(),
            Entry { response: response.clone(), expires_at: Instant::now() + Duration::from_secs(max_age) },
        );
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resp(headers: &[(&str, &str)]) -> CachedResponse {
        CachedResponse {
            status: 200,
            headers: headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            body: "hi".into(),
            csp: None,
        }
    }

    #[test]
    fn caches_with_max_age() {
        let cache = ResponseCache::new();
        cache.set("http://a.com/", &resp(&[("cache-control", "max-age=60")]));
        assert!(cache.get("http://a.com/").is_some());
    }

    #[test]
    fn no_store_is_not_cached() {
        let cache = ResponseCache::new();
        cache.set("http://a.com/", &resp(&[("cache-control", "no-store")]));
        assert!(cache.get("http://a.com/").is_none());
    }

    #[test]
    fn missing_max_age_is_not_cached() {
        let cache = ResponseCache::new();
        cache.set("http://a.com/", &resp(&[]));
        assert!(cache.get("http://a.com/").is_none());
    }
}
