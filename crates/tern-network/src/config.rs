//! Transport configuration.

use std::time::Duration;

use tern_core::constants::NetworkKind;

/// Configuration for dialing and maintaining peer channels.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Which Bitcoin network to join.
    pub network: NetworkKind,
    /// Timeout for an outbound TCP dial.
    pub connect_timeout: Duration,
    /// Timeout for the version/verack exchange after the dial.
    pub handshake_timeout: Duration,
    /// Keepalive ping interval on established channels.
    pub ping_interval: Duration,
    /// Seed addresses ("host:port"); defaults to the network's DNS seeds.
    pub seeds: Vec<String>,
    /// Chain height advertised in our `version` message.
    pub advertised_height: i32,
}

impl NetworkConfig {
    /// Defaults for the given network.
    pub fn for_network(network: NetworkKind) -> Self {
        Self {
            network,
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(15),
            ping_interval: Duration::from_secs(120),
            seeds: network.dns_seeds().iter().map(|s| s.to_string()).collect(),
            advertised_height: 0,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::for_network(NetworkKind::Mainnet)
    }
}
