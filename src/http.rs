//! HTTP/1.1 request framing and response parsing, grounded on the original
//! implementation's `networking/http_base.py`: pooled sockets, chunked and
//! `Content-Length` body framing, gzip decoding, `Set-Cookie` parsed before
//! the body is read, `Connection: close` teardown, and redirect following.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;

use flate2::read::GzDecoder;

use crate::csp::ContentSecurityPolicy;
use crate::error::{BrowserError, Result};
use crate::pool::Conn;
use crate::services::Services;
use crate::url::{Scheme, Url};

const USER_AGENT: &str = "crate-browser/0.1";
const MAX_REDIRECTS: u32 = 10;

#[derive(Clone)]
pub struct Response {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub csp: Option<ContentSecurityPolicy>,
}

/// Fetches `url`, following redirects up to [`MAX_REDIRECTS`] hops. A
/// redirect response missing `Location` is treated as fatal and falls back
/// to `about:blank`, per the documented edge-case behavior.
pub fn fetch(url: &Url, services: &Services, referrer: Option<&Url>, payload: Option<&str>) -> Result<Response> {
    let mut current = url.clone();
    let mut hops = 0;

    loop {
        let response = fetch_one(&current, services, referrer, payload)?;
        if !(300..400).contains(&response.status) {
            return Ok(response);
        }
        hops += 1;
        if hops > MAX_REDIRECTS {
            return Err(BrowserError::Redirect(format!("too many redirects from {url}")));
        }
        let location = match response.headers.get("location") {
            Some(l) => l,
            None => {
                tracing::warn!(%current, "redirect with no Location header, falling back to about:blank");
                return Url::parse("about:blank")?.request(services, referrer, None);
            }
        };
        current = current.resolve(location)?;
    }
}

fn fetch_one(url: &Url, services: &Services, referrer: Option<&Url>, payload: Option<&str>) -> Result<Response> {
    let method = if payload.is_some() { "POST" } else { "GET" };
    let url_str = url.to_string();

    if method == "GET" {
        if let Some(cached) = services.cache.get(&url_str) {
            return Ok(Response { status: cached.status, headers: cached.headers, body: cached.body, csp: cached.csp });
        }
    }

    let host = url.host.clone().ok_or_else(|| BrowserError::Network("missing host".into()))?;
    let port = url.port.unwrap_or(if url.scheme == Scheme::Https { 443 } else { 80 });
    let scheme_key = if url.scheme == Scheme::Https { "https" } else { "http" };

    let mut conn = match services.pool.take(scheme_key, &host, port) {
        Some(conn) => conn,
        None => connect(url, &host, port)?,
    };

    let request_bytes = build_request(url, method, &host, referrer, payload, services);

    if conn.write_all(&request_bytes).is_err() {
        conn = connect(url, &host, port)?;
        conn.write_all(&request_bytes).map_err(|e| BrowserError::Network(e.to_string()))?;
    }

    let (status, headers, body) = read_response(&mut conn, &host, services)?;

    if headers.get("connection").map(|v| v.eq_ignore_ascii_case("close")).unwrap_or(false) {
        services.pool.remove(scheme_key, &host, port);
    } else {
        services.pool.put(scheme_key, &host, port, conn);
    }

    let csp = headers.get("content-security-policy").map(|h| ContentSecurityPolicy::parse(h));

    let response = Response { status, headers, body, csp };
    if method == "GET" {
        services.cache.set(
            &url_str,
            &crate::cache::CachedResponse {
                status: response.status,
                headers: response.headers.clone(),
                body: response.body.clone(),
                csp: response.csp.clone(),
            },
        );
    }
    Ok(response)
}

fn connect(url: &Url, host: &str, port: u16) -> Result<Conn> {
    let stream = TcpStream::connect((host, port)).map_err(|e| BrowserError::Network(format!("{host}:{port}: {e}")))?;
    if url.scheme == Scheme::Https {
        let connector = native_tls::TlsConnector::new().map_err(|e| BrowserError::Network(e.to_string()))?;
        let tls = connector.connect(host, stream).map_err(|e| BrowserError::Network(e.to_string()))?;
        Ok(Conn::Tls(Box::new(tls)))
    } else {
        Ok(Conn::Plain(stream))
    }
}

fn build_request(url: &Url, method: &str, host: &str, referrer: Option<&Url>, payload: Option<&str>, services: &Services) -> Vec<u8> {
    let mut req = format!(
        "{method} {path} HTTP/1.1\r\nHost: {host}\r\nUser-Agent: {USER_AGENT}\r\nConnection: keep-alive\r\nAccept-Encoding: gzip\r\n",
        path = url.path,
    );

    if let Some(referrer) = referrer {
        req += &format!("Referer: {referrer}\r\n");
    }

    let referrer_host = referrer.and_then(|r| r.host.as_deref());
    if let Some(cookie) = services.cookies.header_for(host, method, referrer_host) {
        req += &format!("Cookie: {cookie}\r\n");
    }

    let mut bytes = if let Some(payload) = payload {
        req += "Content-Type: application/x-www-form-urlencoded\r\n";
        req += &format!("Content-Length: {}\r\n\r\n", payload.len());
        req.into_bytes()
    } else {
        req += "\r\n";
        req.into_bytes()
    };

    if let Some(payload) = payload {
        bytes.extend_from_slice(payload.as_bytes());
    }
    bytes
}

fn read_response(conn: &mut Conn, host: &str, services: &Services) -> Result<(u16, BTreeMap<String, String>, String)> {
    let mut reader = BufReader::new(conn);

    let mut status_line = String::new();
    reader.read_line(&mut status_line).map_err(|e| BrowserError::Network(e.to_string()))?;
    if status_line.trim().is_empty() {
        return Err(BrowserError::Network("connection closed before response".into()));
    }
    let mut parts = status_line.splitn(3, ' ');
    let _version = parts.next();
    let status: u16 = parts
        .next()
        .ok_or_else(|| BrowserError::Parse(format!("invalid status line: {status_line:?}")))?
        .parse()
        .map_err(|_| BrowserError::Parse(format!("invalid status line: {status_line:?}")))?;

    let mut headers = BTreeMap::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).map_err(|e| BrowserError::Network(e.to_string()))?;
        if line == "\r\n" || line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_string());
        }
    }

    if let Some(cookie) = headers.get("set-cookie") {
        services.cookies.set_from_header(host, cookie);
    }

    let body_bytes = if headers.get("transfer-encoding").map(|v| v.eq_ignore_ascii_case("chunked")).unwrap_or(false) {
        read_chunked(&mut reader)?
    } else if let Some(len) = headers.get("content-length").and_then(|v| v.parse::<usize>().ok()) {
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).map_err(|e| BrowserError::Network(e.to_string()))?;
        buf
    } else {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).map_err(|e| BrowserError::Network(e.to_string()))?;
        buf
    };

    let body_bytes = if headers.get("content-encoding").map(|v| v.eq_ignore_ascii_case("gzip")).unwrap_or(false) {
        let mut decoder = GzDecoder::new(&body_bytes[..]);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).map_err(|e| BrowserError::Network(e.to_string()))?;
        out
    } else {
        body_bytes
    };

    let body = String::from_utf8_lossy(&body_bytes).into_owned();
    Ok((status, headers, body))
}

fn read_chunked<R: BufRead>(reader: &mut R) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    loop {
        let mut size_line = String::new();
        reader.read_line(&mut size_line).map_err(|e| BrowserError::Network(e.to_string()))?;
        let size = u64::from_str_radix(size_line.trim(), 16)
            .map_err(|_| BrowserError::Parse(format!("bad chunk size: {size_line:?}")))?;
        if size == 0 {
            let mut trailer = String::new();
            reader.read_line(&mut trailer).map_err(|e| BrowserError::Network(e.to_string()))?;
            break;
        }
        let mut chunk = vec![0u8; size as usize];
        reader.read_exact(&mut chunk).map_err(|e| BrowserError::Network(e.to_string()))?;
        body.extend_from_slice(&chunk);
        let mut crlf = String::new();
        reader.read_line(&mut crlf).map_err(|e| BrowserError::Network(e.to_string()))?;
    }
    Ok(body)
}
