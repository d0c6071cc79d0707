//! bgp.tools whois lookup.
//!
//! Uses the bulk whois interface on TCP port 43:
//!
//! ```text
//! > begin
//! > 203.0.113.7
//! > end
//! < 64500 | 203.0.113.7 | 203.0.113.0/24 | US | ARIN | 2001-01-01 | Example Networks
//! ```

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::{NetworkInfo, NetworkLookup, NotifyError};
use crate::constants::{BGP_TOOLS_TIMEOUT_SECS, BGP_TOOLS_WHOIS_ADDR};

/// Whois client for bgp.tools.
#[derive(Debug, Clone)]
pub struct BgpToolsLookup {
    addr: String,
    timeout: Duration,
}

impl Default for BgpToolsLookup {
    fn default() -> Self {
        Self {
            addr: BGP_TOOLS_WHOIS_ADDR.to_string(),
            timeout: Duration::from_secs(BGP_TOOLS_TIMEOUT_SECS),
        }
    }
}

impl BgpToolsLookup {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    async fn query_whois(&self, ip: IpAddr) -> Result<String, NotifyError> {
        let fail = |reason: String| NotifyError::Lookup {
            address: ip.to_string(),
            reason,
        };

        let mut stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| fail(format!("connect to {}: {}", self.addr, e)))?;
        stream
            .write_all(format!("begin\n{}\nend\n", ip).as_bytes())
            .await
            .map_err(|e| fail(e.to_string()))?;

        let mut raw = Vec::new();
        stream
            .read_to_end(&mut raw)
            .await
            .map_err(|e| fail(e.to_string()))?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }
}

#[async_trait]
impl NetworkLookup for BgpToolsLookup {
    async fn lookup(&self, address: &str) -> Result<NetworkInfo, NotifyError> {
        let ip: IpAddr = address.parse().map_err(|_| NotifyError::Lookup {
            address: address.to_string(),
            reason: "not an IP address".to_string(),
        })?;

        if !is_globally_routed(&ip) {
            return Ok(NetworkInfo::default());
        }

        let response = tokio::time::timeout(self.timeout, self.query_whois(ip))
            .await
            .map_err(|_| NotifyError::Lookup {
                address: address.to_string(),
                reason: "timed out".to_string(),
            })??;

        Ok(parse_whois_response(&response, &ip.to_string()))
    }
}

/// Parse a bulk whois response, returning the row for `address`.
pub fn parse_whois_response(response: &str, address: &str) -> NetworkInfo {
    for line in response.lines() {
        let fields: Vec<&str> = line.split('|').map(str::trim).collect();
        if fields.len() < 7 || fields[1] != address {
            continue;
        }
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        return NetworkInfo {
            asn: fields[0].parse().ok(),
            prefix: non_empty(fields[2]),
            country: non_empty(fields[3]),
            rir: non_empty(fields[4]),
            allocated: non_empty(fields[5]),
            // The AS name may itself contain '|'.
            org: non_empty(&fields[6..].join(" | ")),
        };
    }
    NetworkInfo::default()
}

/// Whether an address could appear in the global routing table.
fn is_globally_routed(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            let shared = octets[0] == 100 && (octets[1] & 0xc0) == 64;
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation()
                || v4.is_multicast()
                || shared)
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            let unique_local = (first & 0xfe00) == 0xfc00;
            let link_local = (first & 0xffc0) == 0xfe80;
            let documentation = first == 0x2001 && v6.segments()[1] == 0x0db8;
            !(v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_multicast()
                || unique_local
                || link_local
                || documentation)
        }
    }
}
