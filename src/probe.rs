use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::error::{BenchError, Result};

/// Default iperf v2 listen port.
pub const IPERF_PORT: u16 = 5001;
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Open and drop a TCP connection to `server:port`.
pub fn check_server_alive(server: &str, port: u16, timeout: Duration) -> Result<()> {
    let addr = format!("{server}:{port}");
    let candidates = addr
        .to_socket_addrs()
        .map_err(|source| BenchError::Connectivity {
            addr: addr.clone(),
            source,
        })?;

    let mut last = io::Error::new(io::ErrorKind::NotFound, "no addresses resolved");
    for sa in candidates {
        match TcpStream::connect_timeout(&sa, timeout) {
            Ok(_) => {
                debug!("iperf server reachable at {sa}");
                return Ok(());
            }
            Err(e) => last = e,
        }
    }
    Err(BenchError::Connectivity { addr, source: last })
}
