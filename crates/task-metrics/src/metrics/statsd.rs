//! StatsD gauge sink over UDP

use std::io;
use std::net::{ToSocketAddrs, UdpSocket};

use super::MetricsSink;

/// Sends `{prefix}.{name}:{value}|g` datagrams to a StatsD daemon
#[derive(Debug)]
pub struct StatsdSink {
    socket: UdpSocket,
    prefix: String,
}

impl StatsdSink {
    /// Resolve `host:port` and connect a non-blocking UDP socket to it.
    pub fn connect(host: &str, port: u16, prefix: &str) -> io::Result<Self> {
        let addr = (host, port).to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no address for {host}:{port}"),
            )
        })?;

        let bind_addr = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_nonblocking(true)?;
        socket.connect(addr)?;

        Ok(Self {
            socket,
            prefix: prefix.trim_end_matches('.').to_string(),
        })
    }

    fn format_gauge(&self, name: &str, value: f64) -> String {
        if self.prefix.is_empty() {
            format!("{name}:{value}|g")
        } else {
            format!("{}.{name}:{value}|g", self.prefix)
        }
    }
}

impl MetricsSink for StatsdSink {
    fn gauge(&self, name: &str, value: f64) {
        let payload = self.format_gauge(name, value);
        if let Err(e) = self.socket.send(payload.as_bytes()) {
            tracing::debug!("dropped statsd gauge {name}: {e}");
        }
    }
}
