//! SSDP-based WeMo appliance discovery.
//!
//! Supports both multicast (239.255.255.250) and broadcast discovery methods
//! for networks with different multicast configurations.
//!
//! Both methods use the same socket for send AND receive since appliances
//! reply unicast back to the sending socket/port.

use local_ip_address::list_afinet_netifas;
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::timeout;

use super::types::{
    is_virtual_interface, normalize_uuid, DiscoveredAppliance, DiscoveryError, DiscoveryMethod,
};
use crate::protocol_constants::{
    SSDP_LIMITED_BROADCAST_ADDR, SSDP_MULTICAST_ADDR, WEMO_RESPONSE_MARKER, WEMO_SEARCH_TARGET,
};
use crate::utils::{contains_ignore_ascii_case, starts_with_ignore_ascii_case};

/// Build the M-SEARCH message.
///
/// HOST always uses the multicast address, even when sending via broadcast.
fn build_msearch_message(mx: u64) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: 239.255.255.250:1900\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {}\r\n\
         ST: {}\r\n\r\n",
        mx, WEMO_SEARCH_TARGET
    )
}

/// Network interface information for discovery.
#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    /// Interface name (e.g., "en0", "eth0").
    pub name: String,
    /// IPv4 address bound to this interface.
    pub ip: Ipv4Addr,
    /// Broadcast address for this interface (if available).
    pub broadcast: Option<Ipv4Addr>,
}

/// Gets all usable network interfaces for discovery.
///
/// Filters out virtual/container interfaces and loopback. When `only` is set,
/// returns just the interface carrying that address.
pub fn get_interfaces(only: Option<Ipv4Addr>) -> Vec<InterfaceInfo> {
    list_afinet_netifas()
        .unwrap_or_else(|e| {
            log::warn!("Failed to list network interfaces: {}", e);
            Vec::new()
        })
        .into_iter()
        .filter_map(|(name, addr)| {
            let IpAddr::V4(ipv4) = addr else {
                return None;
            };
            if let Some(wanted) = only {
                if ipv4 != wanted {
                    return None;
                }
            } else if is_virtual_interface(&name) || ipv4.is_loopback() {
                log::debug!("Skipping interface: {} ({})", name, ipv4);
                return None;
            }
            log::debug!("Using interface {} ({})", name, ipv4);
            // Assume /24 for the directed broadcast address
            let octets = ipv4.octets();
            let broadcast = Ipv4Addr::new(octets[0], octets[1], octets[2], 255);
            Some(InterfaceInfo {
                name,
                ip: ipv4,
                broadcast: Some(broadcast),
            })
        })
        .collect()
}

/// Creates a UDP socket bound to a specific interface.
///
/// Sets up socket options for SSDP discovery:
/// - SO_REUSEADDR for rapid restarts
/// - SO_REUSEPORT on Unix
/// - Multicast TTL of 4 per UPnP spec
/// - SO_BROADCAST for broadcast mode
fn create_socket(iface_ip: Ipv4Addr, enable_broadcast: bool) -> Result<UdpSocket, DiscoveryError> {
    let bind_addr = SocketAddr::new(IpAddr::V4(iface_ip), 0);

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(DiscoveryError::SocketBind)?;

    if let Err(e) = socket.set_reuse_address(true) {
        log::warn!("Failed to set SO_REUSEADDR on {}: {}", iface_ip, e);
    }

    #[cfg(unix)]
    if let Err(e) = socket.set_reuse_port(true) {
        log::warn!("Failed to set SO_REUSEPORT on {}: {}", iface_ip, e);
    }

    if let Err(e) = socket.set_multicast_ttl_v4(4) {
        log::warn!("Failed to set multicast TTL on {}: {}", iface_ip, e);
    }

    if enable_broadcast {
        if let Err(e) = socket.set_broadcast(true) {
            log::warn!("Failed to set SO_BROADCAST on {}: {}", iface_ip, e);
        }
    }

    socket
        .set_nonblocking(true)
        .map_err(DiscoveryError::SocketBind)?;

    socket
        .bind(&bind_addr.into())
        .map_err(DiscoveryError::SocketBind)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket).map_err(DiscoveryError::SocketBind)
}

/// Parses an SSDP response and extracts appliance info.
///
/// Returns None if the response doesn't come from a WeMo appliance or has no
/// LOCATION header (the description URL is required to fetch a descriptor).
fn parse_ssdp_response(
    response: &str,
    src_ip: &str,
    method: DiscoveryMethod,
) -> Option<DiscoveredAppliance> {
    if !contains_ignore_ascii_case(response, WEMO_RESPONSE_MARKER) {
        return None;
    }

    // Split at the first colon only, LOCATION values contain colons
    let header = |name: &str| {
        response
            .lines()
            .find(|l| starts_with_ignore_ascii_case(l, name))
            .and_then(|l| l.find(':').map(|idx| l[idx + 1..].trim().to_string()))
    };

    let location = header("location:").filter(|l| !l.is_empty())?;
    let uuid = header("usn:")
        .map(|usn| normalize_uuid(&usn))
        .unwrap_or_default();

    Some(DiscoveredAppliance::new(
        src_ip.to_string(),
        uuid,
        location,
        method,
    ))
}

/// Configuration for SSDP discovery.
#[derive(Debug, Clone)]
pub struct SsdpConfig {
    /// Number of M-SEARCH packets to send.
    pub send_count: u64,
    /// Delay between M-SEARCH retries.
    pub retry_delay: Duration,
    /// Total receive window; bounds how long one scan can take.
    pub discovery_timeout: Duration,
    /// MX value (max response delay in seconds).
    pub mx_value: u64,
    /// Restrict discovery to the interface with this address.
    pub interface_ip: Option<Ipv4Addr>,
}

impl Default for SsdpConfig {
    fn default() -> Self {
        Self {
            send_count: 3,
            retry_delay: Duration::from_millis(800),
            discovery_timeout: Duration::from_secs(3),
            mx_value: 1,
            interface_ip: None,
        }
    }
}

/// Discovers WeMo appliances using SSDP multicast.
pub async fn discover_multicast(
    config: &SsdpConfig,
) -> Result<Vec<DiscoveredAppliance>, DiscoveryError> {
    discover_ssdp(config, DiscoveryMethod::SsdpMulticast, false).await
}

/// Discovers WeMo appliances using SSDP broadcast.
///
/// Uses two layers:
/// 1. Directed broadcast per interface (e.g., 192.168.1.255)
/// 2. Limited broadcast fallback (255.255.255.255)
pub async fn discover_broadcast(
    config: &SsdpConfig,
) -> Result<Vec<DiscoveredAppliance>, DiscoveryError> {
    discover_ssdp(config, DiscoveryMethod::SsdpBroadcast, true).await
}

async fn discover_ssdp(
    config: &SsdpConfig,
    method: DiscoveryMethod,
    use_broadcast: bool,
) -> Result<Vec<DiscoveredAppliance>, DiscoveryError> {
    let interfaces = get_interfaces(config.interface_ip);

    if interfaces.is_empty() {
        return Err(DiscoveryError::NoInterfaces);
    }

    let msg = build_msearch_message(config.mx_value);

    let mut sockets: Vec<(InterfaceInfo, Arc<UdpSocket>)> = Vec::new();
    for iface in &interfaces {
        match create_socket(iface.ip, use_broadcast) {
            Ok(socket) => sockets.push((iface.clone(), Arc::new(socket))),
            Err(e) => {
                log::warn!(
                    "Failed to create socket for {} ({}): {}",
                    iface.name,
                    iface.ip,
                    e
                );
            }
        }
    }

    if sockets.is_empty() {
        return Err(DiscoveryError::NoInterfaces);
    }

    log::debug!(
        "[{}] Starting scan on {} interface(s) ({} sends, {}ms window)",
        method,
        sockets.len(),
        config.send_count,
        config.discovery_timeout.as_millis()
    );

    let discovered: Arc<Mutex<Vec<DiscoveredAppliance>>> = Arc::new(Mutex::new(Vec::new()));

    let target_addrs = |iface: &InterfaceInfo| -> Vec<String> {
        if use_broadcast {
            let mut addrs = Vec::new();
            if let Some(broadcast) = iface.broadcast {
                addrs.push(format!("{}:1900", broadcast));
            }
            addrs.push(SSDP_LIMITED_BROADCAST_ADDR.to_string());
            addrs
        } else {
            vec![SSDP_MULTICAST_ADDR.to_string()]
        }
    };

    let send_futures: Vec<_> = sockets
        .iter()
        .map(|(iface, socket)| {
            let socket = Arc::clone(socket);
            let iface = iface.clone();
            let msg = msg.as_bytes().to_vec();
            let send_count = config.send_count;
            let retry_delay = config.retry_delay;
            let targets = target_addrs(&iface);

            async move {
                for i in 0..send_count {
                    if i > 0 {
                        tokio::time::sleep(retry_delay).await;
                    }
                    for target in &targets {
                        if let Err(e) = socket.send_to(&msg, target).await {
                            log::warn!(
                                "[{}] Failed to send M-SEARCH on {} to {} (attempt {}): {}",
                                method,
                                iface.name,
                                target,
                                i + 1,
                                e
                            );
                        }
                    }
                }
            }
        })
        .collect();

    let recv_futures: Vec<_> = sockets
        .iter()
        .map(|(iface, socket)| {
            let socket = Arc::clone(socket);
            let iface_name = iface.name.clone();
            let discovered = Arc::clone(&discovered);
            let window = config.discovery_timeout;

            async move {
                let mut buf = [0u8; 2048];
                let start = std::time::Instant::now();

                while start.elapsed() < window {
                    let remaining = window.saturating_sub(start.elapsed());
                    match timeout(remaining, socket.recv_from(&mut buf)).await {
                        Ok(Ok((amt, src))) => {
                            let response = String::from_utf8_lossy(&buf[..amt]);
                            if let Some(appliance) =
                                parse_ssdp_response(&response, &src.ip().to_string(), method)
                            {
                                log::trace!(
                                    "[{}] Response from {} ({}) via {}",
                                    method,
                                    appliance.ip,
                                    appliance.location,
                                    iface_name
                                );
                                discovered.lock().await.push(appliance);
                            }
                        }
                        Ok(Err(e)) => {
                            log::warn!("[{}] Socket recv error on {}: {}", method, iface_name, e);
                        }
                        Err(_) => break,
                    }
                }
            }
        })
        .collect();

    tokio::join!(
        futures::future::join_all(send_futures),
        futures::future::join_all(recv_futures)
    );

    let discovered = std::mem::take(&mut *discovered.lock().await);
    let appliances = dedup_appliances(discovered);

    log::debug!(
        "[{}] Scan complete: {} unique appliance(s)",
        method,
        appliances.len()
    );

    Ok(appliances)
}

/// Merges duplicate responses (appliances answer every M-SEARCH) and sorts
/// by key for consistent ordering.
pub(crate) fn dedup_appliances(discovered: Vec<DiscoveredAppliance>) -> Vec<DiscoveredAppliance> {
    let mut by_key: HashMap<String, DiscoveredAppliance> = HashMap::new();
    for appliance in discovered {
        match by_key.get_mut(appliance.dedup_key()) {
            Some(existing) => existing.merge(appliance),
            None => {
                by_key.insert(appliance.dedup_key().to_string(), appliance);
            }
        }
    }

    let mut appliances: Vec<_> = by_key.into_values().collect();
    appliances.sort_by(|a, b| a.dedup_key().cmp(b.dedup_key()));
    appliances
}
