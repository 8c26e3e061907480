//! Post-install summary of the URLs the frontend is reachable at.

use std::io::{self, Write};
use std::net::IpAddr;

/// Addresses bound to local interfaces. Enumeration failures yield none.
pub fn local_addresses() -> Vec<IpAddr> {
    let interfaces = match nix::ifaddrs::getifaddrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            log::warn!("Cannot list network interfaces: {e}");
            return Vec::new();
        }
    };

    interfaces
        .filter_map(|ifaddr| ifaddr.address)
        .filter_map(|address| {
            if let Some(v4) = address.as_sockaddr_in() {
                Some(IpAddr::V4(v4.ip()))
            } else {
                address.as_sockaddr_in6().map(|v6| IpAddr::V6(v6.ip()))
            }
        })
        .collect()
}

fn is_link_local(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_link_local(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
    }
}

/// `localhost` first, then every non-loopback, non-link-local address once.
pub fn reachable_urls(addrs: &[IpAddr], port: u16, ssl: bool) -> Vec<String> {
    let scheme = if ssl { "https" } else { "http" };
    let mut urls = vec![format!("{scheme}://localhost:{port}")];

    for addr in addrs {
        if addr.is_loopback() || addr.is_unspecified() || is_link_local(addr) {
            continue;
        }
        let url = match addr {
            IpAddr::V4(v4) => format!("{scheme}://{v4}:{port}"),
            IpAddr::V6(v6) => format!("{scheme}://[{v6}]:{port}"),
        };
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    urls
}

pub fn write_banner(out: &mut impl Write, service: &str, urls: &[String]) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{service} is running. Open the frontend at:")?;
    for url in urls {
        writeln!(out, "  {url}")?;
    }
    out.flush()
}
