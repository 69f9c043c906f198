//! Protocol constants and per-network parameters.

use crate::checkpoint::Checkpoint;
use crate::types::Hash256;

/// Protocol version advertised in the `version` handshake.
pub const PROTOCOL_VERSION: i32 = 70016;

/// User agent advertised in the `version` handshake.
pub const USER_AGENT: &str = concat!("/tern:", env!("CARGO_PKG_VERSION"), "/");

/// Service bits advertised by this node. We serve nothing during bootstrap.
pub const SERVICES_NONE: u64 = 0;

/// A `headers` response carrying exactly this many entries signals that the
/// peer has more; anything shorter means the peer's chain is exhausted.
pub const HEADERS_BATCH: usize = 2000;

/// Maximum inventory entries per `getdata` request.
pub const MAX_GET_DATA: usize = 50_000;

/// Frames with payloads beyond this are rejected before allocation.
pub const MAX_PAYLOAD_SIZE: usize = 32 * 1024 * 1024;

/// Inventory type for a block in its stripped (non-witness) serialization.
pub const INV_BLOCK: u32 = 2;

/// Network selection: magic bytes, ports, genesis, and seeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NetworkKind {
    /// The production Bitcoin network.
    #[default]
    Mainnet,
    /// The public test network (testnet3).
    Testnet,
    /// Local regression-test network.
    Regtest,
}

impl NetworkKind {
    /// Four-byte network identifier prefixed to every P2P message.
    pub fn magic_bytes(&self) -> [u8; 4] {
        match self {
            Self::Mainnet => [0xF9, 0xBE, 0xB4, 0xD9],
            Self::Testnet => [0x0B, 0x11, 0x09, 0x07],
            Self::Regtest => [0xFA, 0xBF, 0xB5, 0xDA],
        }
    }

    /// Default P2P TCP port.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Mainnet => 8333,
            Self::Testnet => 18333,
            Self::Regtest => 18444,
        }
    }

    /// The genesis block hash, in internal byte order.
    pub fn genesis_hash(&self) -> Hash256 {
        match self {
            // 000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f
            Self::Mainnet => Hash256([
                0x6f, 0xe2, 0x8c, 0x0a, 0xb6, 0xf1, 0xb3, 0x72, 0xc1, 0xa6, 0xa2, 0x46, 0xae,
                0x63, 0xf7, 0x4f, 0x93, 0x1e, 0x83, 0x65, 0xe1, 0x5a, 0x08, 0x9c, 0x68, 0xd6,
                0x19, 0x00, 0x00, 0x00, 0x00, 0x00,
            ]),
            // 000000000933ea01ad0ee984209779baaec3ced90fa3f408719526f8d77f4943
            Self::Testnet => Hash256([
                0x43, 0x49, 0x7f, 0xd7, 0xf8, 0x26, 0x95, 0x71, 0x08, 0xf4, 0xa3, 0x0f, 0xd9,
                0xce, 0xc3, 0xae, 0xba, 0x79, 0x97, 0x20, 0x84, 0xe9, 0x0e, 0xad, 0x01, 0xea,
                0x33, 0x09, 0x00, 0x00, 0x00, 0x00,
            ]),
            // 0f9188f13cb7b2c71f2a335e3a4fc328bf5beb436012afca590b1a11466e2206
            Self::Regtest => Hash256([
                0x06, 0x22, 0x6e, 0x46, 0x11, 0x1a, 0x0b, 0x59, 0xca, 0xaf, 0x12, 0x60, 0x43,
                0xeb, 0x5b, 0xbf, 0x28, 0xc3, 0x4f, 0x3a, 0x5e, 0x33, 0x2a, 0x1f, 0xc7, 0xb2,
                0xb7, 0x3c, 0xf1, 0x88, 0x91, 0x0f,
            ]),
        }
    }

    /// DNS seeds used to bootstrap the host directory.
    pub fn dns_seeds(&self) -> &'static [&'static str] {
        match self {
            Self::Mainnet => &[
                "seed.bitcoin.sipa.be:8333",
                "dnsseed.bluematt.me:8333",
                "seed.btc.petertodd.net:8333",
                "seed.bitcoin.sprovoost.nl:8333",
                "dnsseed.emzy.de:8333",
                "seed.bitcoin.wiz.biz:8333",
            ],
            Self::Testnet => &[
                "testnet-seed.bitcoin.jonasschnelli.ch:18333",
                "seed.tbtc.petertodd.net:18333",
                "testnet-seed.bluematt.me:18333",
            ],
            Self::Regtest => &[],
        }
    }

    /// Compiled-in checkpoints for this network.
    ///
    /// Currently empty: header sync works unanchored and the CLI can inject
    /// anchors. The machinery is what matters; adding one is a one-line
    /// change here.
    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_bytes_distinct_per_network() {
        let m = NetworkKind::Mainnet.magic_bytes();
        let t = NetworkKind::Testnet.magic_bytes();
        let r = NetworkKind::Regtest.magic_bytes();
        assert_ne!(m, t);
        assert_ne!(m, r);
        assert_ne!(t, r);
    }

    #[test]
    fn mainnet_magic_value() {
        assert_eq!(NetworkKind::Mainnet.magic_bytes(), [0xF9, 0xBE, 0xB4, 0xD9]);
    }

    #[test]
    fn default_network_is_mainnet() {
        assert_eq!(NetworkKind::default(), NetworkKind::Mainnet);
    }

    #[test]
    fn genesis_hash_renders_in_rpc_order() {
        assert_eq!(
            NetworkKind::Mainnet.genesis_hash().to_string(),
            "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
        );
        assert_eq!(
            NetworkKind::Regtest.genesis_hash().to_string(),
            "0f9188f13cb7b2c71f2a335e3a4fc328bf5beb436012afca590b1a11466e2206"
        );
    }

    #[test]
    fn regtest_has_no_seeds() {
        assert!(NetworkKind::Regtest.dns_seeds().is_empty());
        assert!(!NetworkKind::Mainnet.dns_seeds().is_empty());
    }
}
