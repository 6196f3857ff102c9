//! Persistent TCP/TLS connections keyed by `(scheme, host, port)`, grounded
//! on the original implementation's `networking/http_base.py` socket map
//! (`_socket_map`, `_get_socket`/`_set_socket`/`_remove_socket`): one
//! connection reused across requests to the same origin, dropped on
//! `Connection: close` or when the peer has gone away.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::Mutex;

pub type PoolKey = (&'static str, String, u16);

pub enum Conn {
    Plain(TcpStream),
    Tls(Box<native_tls::TlsStream<TcpStream>>),
}

impl Read for Conn {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Conn::Plain(s) => s.read(buf),
            Conn::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Conn {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Conn::Plain(s) => s.write(buf),
            Conn::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Conn::Plain(s) => s.flush(),
            Conn::Tls(s) => s.flush(),
        }
    }
}

pub struct ConnectionPool {
    conns: Mutex<HashMap<(String, String, u16), Conn>>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self { conns: Mutex::new(HashMap::new()) }
    }

    pub fn take(&self, scheme: &str, host: &str, port: u16) -> Option<Conn> {
        self.conns.lock().unwrap().remove(&(scheme.to_string(), host.to_string(), port))
    }

    pub fn put(&self, scheme: &str, host: &str, port: u16, conn: Conn) {
        self.conns.lock().unwrap().insert((scheme.to_string(), host.to_string(), port), conn);
    }

    pub fn remove(&self, scheme: &str, host: &str, port: u16) {
        self.conns.lock().unwrap().remove(&(scheme.to_string(), host.to_string(), port));
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}
