//! URL parsing, relative resolution, and scheme dispatch. Grounded on the
//! original implementation's `networking/protocols/base_url.py` (host/path
//! parsing, `origin()`) and `networking/url_factory.py` (`resolve`/`resolve_str`
//! relative-path algorithm, `../` segment popping, default-port elision).

use std::fmt;

use crate::error::{BrowserError, Result};
use crate::http;
use crate::services::Services;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
    File,
    About,
}

impl Scheme {
    fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
            Scheme::File => "file",
            Scheme::About => "about",
        }
    }

    fn default_port(&self) -> Option<u16> {
        match self {
            Scheme::Http => Some(80),
            Scheme::Https => Some(443),
            Scheme::File | Scheme::About => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Url {
    pub scheme: Scheme,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: String,
}

impl Url {
    pub fn parse(raw: &str) -> Result<Url> {
        if raw == "about:blank" {
            return Ok(Url { scheme: Scheme::About, host: None, port: None, path: "blank".into() });
        }

        let (scheme_str, rest) = raw
            .split_once("://")
            .ok_or_else(|| BrowserError::Parse(format!("missing scheme in {:?}", raw)))?;

        let scheme = match scheme_str {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            "file" => Scheme::File,
            other => return Err(BrowserError::Parse(format!("unsupported scheme: {other}"))),
        };

        if scheme == Scheme::File {
            return Ok(Url { scheme, host: None, port: None, path: rest.to_string() });
        }

        let rest_with_slash = if rest.contains('/') { rest.to_string() } else { format!("{rest}/") };
        let (host_part, path) = rest_with_slash.split_once('/').unwrap();
        let (host, port) = match host_part.split_once(':') {
            Some((h, p)) => (
                h.to_string(),
                Some(p.parse::<u16>().map_err(|_| BrowserError::Parse(format!("bad port: {p}")))?),
            ),
            None => (host_part.to_string(), None),
        };

        Ok(Url { scheme, host: Some(host), port: port.or_else(|| scheme.default_port()), path: format!("/{path}") })
    }

    pub fn origin(&self) -> String {
        match (&self.host, self.port) {
            (Some(host), Some(port)) => format!("{}://{}:{}", self.scheme.as_str(), host, port),
            (Some(host), None) => format!("{}://{}", self.scheme.as_str(), host),
            _ => self.scheme.as_str().to_string(),
        }
    }

    /// Resolves a possibly-relative `href`/`src` string against `self`,
    /// producing an absolute `Url`.
    pub fn resolve(&self, href: &str) -> Result<Url> {
        if href.contains("://") || href == "about:blank" {
            return Url::parse(href);
        }

        if self.scheme == Scheme::File {
            let base_dir = match self.path.rsplit_once('/') {
                Some((dir, _)) if !dir.is_empty() => dir.to_string(),
                _ => ".".to_string(),
            };
            let mut base_dir = base_dir;
            let mut href = href.to_string();
            if !href.starts_with('/') {
                if let Some(stripped) = href.strip_prefix("./") {
                    href = stripped.to_string();
                }
                while let Some(stripped) = href.strip_prefix("../") {
                    href = stripped.to_string();
                    base_dir = match base_dir.rsplit_once('/') {
                        Some((dir, _)) if !dir.is_empty() => dir.to_string(),
                        _ => ".".to_string(),
                    };
                }
                let full = normalize_path(&format!("{base_dir}/{href}"));
                return Ok(Url { scheme: Scheme::File, host: None, port: None, path: full });
            }
            return Ok(Url { scheme: Scheme::File, host: None, port: None, path: href });
        }

        let mut dir = match self.path.rsplit_once('/') {
            Some((dir, _)) if !dir.is_empty() => dir.to_string(),
            _ => self.path.clone(),
        };
        let mut href = href.to_string();
        if !href.starts_with('/') {
            while let Some(stripped) = href.strip_prefix("../") {
                href = stripped.to_string();
                if let Some((parent, _)) = dir.rsplit_once('/') {
                    dir = parent.to_string();
                }
            }
            href = format!("{dir}/{href}");
        }

        let default_port = self.scheme.default_port();
        let url_str = if default_port == self.port {
            format!("{}://{}{}", self.scheme.as_str(), self.host.as_deref().unwrap_or(""), href)
        } else {
            format!(
                "{}://{}:{}{}",
                self.scheme.as_str(),
                self.host.as_deref().unwrap_or(""),
                self.port.unwrap_or(0),
                href
            )
        };
        Url::parse(&url_str)
    }

    /// Dispatches the fetch by scheme: HTTP(S) goes through the network
    /// stack (pool, cache, cookies, CSP), `file:` reads the local
    /// filesystem, `about:blank` is a built-in empty document.
    pub fn request(&self, services: &Services, referrer: Option<&Url>, payload: Option<&str>) -> Result<http::Response> {
        match self.scheme {
            Scheme::Http | Scheme::Https => http::fetch(self, services, referrer, payload),
            Scheme::File => {
                let body = std::fs::read_to_string(&self.path)
                    .map_err(|e| BrowserError::Network(format!("{}: {e}", self.path)))?;
                Ok(http::Response { status: 200, headers: Default::default(), body, csp: None })
            }
            Scheme::About => Ok(http::Response { status: 200, headers: Default::default(), body: String::new(), csp: None }),
        }
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scheme == Scheme::File {
            return write!(f, "file://{}", self.path);
        }
        if self.scheme == Scheme::About {
            return write!(f, "about:blank");
        }
        let default_port = self.scheme.default_port();
        if self.port == default_port {
            write!(f, "{}://{}{}", self.scheme.as_str(), self.host.as_deref().unwrap_or(""), self.path)
        } else {
            write!(
                f,
                "{}://{}:{}{}",
                self.scheme.as_str(),
                self.host.as_deref().unwrap_or(""),
                self.port.unwrap_or(0),
                self.path
            )
        }
    }
}

fn normalize_path(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            s => out.push(s),
        }
    }
    let joined = out.join("/");
    if path.starts_with('/') {
        format!("/{joined}")
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_http_url_with_default_port() {
        let u = Url::parse("http://example.com/a/b").unwrap();
        assert_eq!(u.host.as_deref(), Some("example.com"));
        assert_eq!(u.port, Some(80));
        assert_eq!(u.path, "/a/b");
    }

    #[test]
    fn parses_explicit_port() {
        let u = Url::parse("http://example.com:8080/").unwrap();
        assert_eq!(u.port, Some(8080));
    }

    #[test]
    fn resolves_relative_path() {
        let base = Url::parse("http://example.com/a/b/c").unwrap();
        let resolved = base.resolve("d").unwrap();
        assert_eq!(resolved.path, "/a/b/d");
    }

    #[test]
    fn resolves_parent_relative_path() {
        let base = Url::parse("http://example.com/a/b/c").unwrap();
        let resolved = base.resolve("../d").unwrap();
        assert_eq!(resolved.path, "/a/d");
    }

    #[test]
    fn resolves_absolute_href() {
        let base = Url::parse("http://example.com/a/b").unwrap();
        let resolved = base.resolve("https://other.com/x").unwrap();
        assert_eq!(resolved.scheme, Scheme::Https);
        assert_eq!(resolved.host.as_deref(), Some("other.com"));
    }

    #[test]
    fn origin_omits_default_port() {
        let u = Url::parse("http://example.com/").unwrap();
        assert_eq!(u.origin(), "http://example.com:80");
    }
}
