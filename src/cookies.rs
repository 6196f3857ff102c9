//! Cookie jar keyed by host. No `cookie_jar.py` exists in the retrieved
//! original source (only its call sites in `networking/http_base.py` do);
//! designed directly from those call sites and SPEC_FULL.md §3's
//! SameSite=Lax rule.

use std::collections::BTreeMap;
use std::sync::Mutex;

/// One stored cookie plus its `Set-Cookie` attribute params (lowercased
/// keys and values, e.g. `samesite` -> `lax`).
#[derive(Clone, Debug)]
pub struct StoredCookie {
    pub cookie: String,
    pub params: BTreeMap<String, String>,
}

pub struct CookieJar {
    by_host: Mutex<BTreeMap<String, StoredCookie>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self { by_host: Mutex::new(BTreeMap::new()) }
    }

    /// Parses a raw `Set-Cookie` header value and stores it for `host`.
    pub fn set_from_header(&self, host: &str, raw: &str) {
        let mut parts = raw.splitn(2, ';');
        let cookie = parts.next().unwrap_or("").trim().to_string();
        let mut params = BTreeMap::new();
        if let Some(rest) = parts.next() {
            for param in rest.split(';') {
                let param = param.trim();
                if param.is_empty() {
                    continue;
                }
                let (k, v) = match param.split_once('=') {
                    Some((k, v)) => (k.trim().to_lowercase(), v.trim().to_lowercase()),
                    None => (param.to_lowercase(), "true".to_string()),
                };
                params.insert(k, v);
            }
        }
        self.by_host.lock().unwrap().insert(host.to_string(), StoredCookie { cookie, params });
    }

    /// Returns the `Cookie:` header value to send for a request to `host`,
    /// honoring SameSite=Lax: withheld on non-GET cross-site requests.
    pub fn header_for(&self, host: &str, method: &str, referrer_host: Option<&str>) -> Option<String> {
        let jar = self.by_host.lock().unwrap();
        let stored = jar.get(host)?;
        if stored.params.get("samesite").map(|s| s.as_str()) == Some("lax") {
            if method != "GET" {
                let same_site = referrer_host.map(|h| h == host).unwrap_or(false);
                if !same_site {
                    return None;
                }
            }
        }
        Some(stored.cookie.clone())
    }
}

impl Default for CookieJar {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samesite_lax_withholds_cross_site_post() {
        let jar = CookieJar::new();
        jar.set_from_header("a.com", "session=abc; SameSite=Lax");
        assert!(jar.header_for("a.com", "GET", Some("b.com")).is_some());
        assert!(jar.header_for("a.com", "POST", Some("b.com")).is_none());
        assert!(jar.header_for("a.com", "POST", Some("a.com")).is_some());
    }

    #[test]
    fn cookie_without_samesite_always_sent() {
        let jar = CookieJar::new();
        jar.set_from_header("a.com", "session=abc");
        assert!(jar.header_for("a.com", "POST", Some("b.com")).is_some());
    }
}
