//! Content-Security-Policy header parsing and source matching, grounded on
//! the original implementation's `networking/security/csp.py`.

use std::collections::BTreeMap;

#[derive(Clone, Debug, Default)]
pub struct ContentSecurityPolicy {
    directives: BTreeMap<String, Vec<String>>,
}

impl ContentSecurityPolicy {
    pub fn parse(header: &str) -> Self {
        let mut directives = BTreeMap::new();
        for part in header.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let mut tokens = part.split_whitespace();
            let name = match tokens.next() {
                Some(n) => n.to_lowercase(),
                None => continue,
            };
            directives.insert(name, tokens.map(|s| s.to_string()).collect());
        }
        Self { directives }
    }

    fn allows_source(&self, directive: &str, source: &str) -> bool {
        let values = self.directives.get(directive).or_else(|| self.directives.get("default-src"));
        let values = match values {
            Some(v) => v,
            None => return true,
        };
        Self::check_against_values(source, values)
    }

    fn check_against_values(source: &str, values: &[String]) -> bool {
        let source_lower = source.to_lowercase();
        for value in values {
            let value_lower = value.to_lowercase();
            match value_lower.as_str() {
                "'none'" => return false,
                "*" => {
                    if !source_lower.starts_with("data:") && !source_lower.starts_with("blob:") {
                        return true;
                    }
                }
                "'self'" => continue,
                "'unsafe-inline'" => {
                    if source_lower == "inline" {
                        return true;
                    }
                }
                "'unsafe-eval'" => {
                    if source_lower == "eval" {
                        return true;
                    }
                }
                "data:" => {
                    if source_lower.starts_with("data:") {
                        return true;
                    }
                }
                "blob:" => {
                    if source_lower.starts_with("blob:") {
                        return true;
                    }
                }
                _ => {
                    if Self::match_host_source(&source_lower, &value_lower) {
                        return true;
                    }
                }
            }
        }
        false
    }

    fn match_host_source(source: &str, pattern: &str) -> bool {
        let source_host = source.split("://").last().unwrap_or(source).split('/').next().unwrap_or("");
        let pattern_host = pattern.split("://").last().unwrap_or(pattern).split('/').next().unwrap_or("");

        if source_host == pattern_host {
            return true;
        }
        if let Some(domain) = pattern_host.strip_prefix("*.") {
            if source_host == domain || source_host.ends_with(&format!(".{domain}")) {
                return true;
            }
        }
        false
    }

    pub fn allows_script(&self, source: &str) -> bool {
        self.allows_source("script-src", source)
    }

    pub fn allows_style(&self, source: &str) -> bool {
        self.allows_source("style-src", source)
    }

    pub fn allows_image(&self, source: &str) -> bool {
        self.allows_source("img-src", source)
    }

    pub fn allows_connect(&self, source: &str) -> bool {
        self.allows_source("connect-src", source)
    }

    pub fn allows_frame(&self, source: &str) -> bool {
        self.allows_source("frame-src", source)
    }

    pub fn allows_inline_script(&self) -> bool {
        self.allows_source("script-src", "inline")
    }

    pub fn allows_inline_style(&self) -> bool {
        self.allows_source("style-src", "inline")
    }

    pub fn allows_eval(&self) -> bool {
        self.allows_source("script-src", "eval")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_blocks_everything() {
        let csp = ContentSecurityPolicy::parse("script-src 'none'");
        assert!(!csp.allows_script("https://cdn.example.com/a.js"));
    }

    #[test]
    fn wildcard_subdomain_matches() {
        let csp = ContentSecurityPolicy::parse("img-src *.example.com");
        assert!(csp.allows_image("https://cdn.example.com/a.png"));
        assert!(!csp.allows_image("https://evil.com/a.png"));
    }

    #[test]
    fn missing_directive_falls_back_to_default_src() {
        let csp = ContentSecurityPolicy::parse("default-src 'self'");
        assert!(!csp.allows_connect("https://other.com/x"));
    }

    #[test]
    fn no_csp_allows_everything() {
        let csp = ContentSecurityPolicy::default();
        assert!(csp.allows_script("https://anywhere.com/a.js"));
    }
}
