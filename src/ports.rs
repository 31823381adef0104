use std::collections::BTreeSet;
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::time::Duration;

use crate::config::PortRange;
use crate::error::{DeployError, Result};

/// Decides whether something is already listening on a local port.
pub trait PortProbe: Send + Sync {
    fn in_use(&self, port: u16) -> bool;
}

/// Probes by connecting to `127.0.0.1:<port>`.
///
/// Binding a throwaway listener is not a reliable occupancy test on every platform (a bind can
/// succeed next to an existing listener), so a refused connect is what counts as "free". The
/// answer is only a snapshot: the port can be taken before the caller's process binds it.
#[derive(Debug, Clone)]
pub struct TcpConnectProbe {
    pub connect_timeout: Duration,
}

impl PortProbe for TcpConnectProbe {
    fn in_use(&self, port: u16) -> bool {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        match TcpStream::connect_timeout(&addr, self.connect_timeout) {
            Ok(stream) => {
                drop(stream);
                true
            }
            Err(_) => false,
        }
    }
}

pub struct PortAllocator {
    range: PortRange,
    probe: Box<dyn PortProbe>,
}

impl PortAllocator {
    pub fn new(range: PortRange, probe: Box<dyn PortProbe>) -> Self {
        Self { range, probe }
    }

    pub fn tcp(range: PortRange, connect_timeout: Duration) -> Self {
        Self::new(range, Box::new(TcpConnectProbe { connect_timeout }))
    }

    pub fn range(&self) -> PortRange {
        self.range
    }

    pub fn find_free_port(&self) -> Result<u16> {
        self.find_free_port_excluding(&BTreeSet::new())
    }

    /// First candidate that is neither in `reserved` nor answering connects.
    pub fn find_free_port_excluding(&self, reserved: &BTreeSet<u16>) -> Result<u16> {
        for port in self.range.iter() {
            if reserved.contains(&port) {
                continue;
            }
            if !self.probe.in_use(port) {
                return Ok(port);
            }
            tracing::debug!(port, "port in use");
        }
        Err(DeployError::NoFreePortAvailable {
            start: self.range.start,
            end: self.range.end,
        })
    }
}
