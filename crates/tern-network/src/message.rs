//! Typed Bitcoin P2P messages and their payload encodings.
//!
//! Covers the message set the sync core exchanges: the handshake pair,
//! keepalives, address gossip, and the header/block request cycle. Commands
//! outside that set decode to [`Message::Unknown`] and are ignored upstream
//! rather than dropping the channel.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tern_core::codec::{put_var_int, Reader};
use tern_core::constants::{HEADERS_BATCH, PROTOCOL_VERSION, SERVICES_NONE, USER_AGENT};
use tern_core::error::WireError;
use tern_core::types::{Block, BlockHeader, Hash256};

/// `addr` messages beyond this entry count are rejected outright.
const MAX_ADDR_ENTRIES: usize = 1000;

/// Locators beyond this length are malformed.
const MAX_LOCATOR_HASHES: usize = 101;

/// Inventory vectors beyond this length are malformed.
const MAX_INVENTORY_ENTRIES: usize = 50_000;

/// A network endpoint as carried in `version` and `addr` payloads.
///
/// On the wire this is a 16-byte IP field (IPv4 uses the `::ffff:` mapped
/// prefix) followed by a big-endian port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetAddress {
    pub services: u64,
    pub ip: IpAddr,
    pub port: u16,
}

impl NetAddress {
    pub fn unroutable() -> Self {
        Self {
            services: SERVICES_NONE,
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.services.to_le_bytes());
        let octets = match self.ip {
            IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
            IpAddr::V6(v6) => v6.octets(),
        };
        out.extend_from_slice(&octets);
        out.extend_from_slice(&self.port.to_be_bytes());
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let services = r.u64_le("net_addr services")?;
        let octets: [u8; 16] = r
            .take(16, "net_addr ip")?
            .try_into()
            .expect("slice length matches array");
        let port = r.u16_be("net_addr port")?;
        let v6 = Ipv6Addr::from(octets);
        let ip = match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        };
        Ok(Self { services, ip, port })
    }
}

/// The `version` handshake payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMessage {
    pub version: i32,
    pub services: u64,
    pub timestamp: i64,
    pub receiver: NetAddress,
    pub sender: NetAddress,
    pub nonce: u64,
    pub user_agent: String,
    pub start_height: i32,
    pub relay: bool,
}

impl VersionMessage {
    /// Build our own `version` announcement.
    pub fn local(timestamp: i64, nonce: u64, start_height: i32) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            services: SERVICES_NONE,
            timestamp,
            receiver: NetAddress::unroutable(),
            sender: NetAddress::unroutable(),
            nonce,
            user_agent: USER_AGENT.to_string(),
            start_height,
            relay: false,
        }
    }

    /// The peer's advertised chain height, clamped at zero.
    pub fn advertised_height(&self) -> u32 {
        self.start_height.max(0) as u32
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.services.to_le_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        self.receiver.encode_into(out);
        self.sender.encode_into(out);
        out.extend_from_slice(&self.nonce.to_le_bytes());
        put_var_int(out, self.user_agent.len() as u64);
        out.extend_from_slice(self.user_agent.as_bytes());
        out.extend_from_slice(&self.start_height.to_le_bytes());
        out.push(u8::from(self.relay));
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let version = r.i32_le("version")?;
        let services = r.u64_le("version services")?;
        let timestamp = r.i64_le("version timestamp")?;
        let receiver = NetAddress::decode(r)?;
        let sender = NetAddress::decode(r)?;
        let nonce = r.u64_le("version nonce")?;
        let agent_bytes = r.var_bytes("user_agent", 256)?;
        let user_agent = String::from_utf8(agent_bytes)
            .map_err(|_| WireError::Malformed("user_agent"))?;
        let start_height = r.i32_le("start_height")?;
        // The relay flag is optional in old protocol versions.
        let relay = !r.is_empty() && r.u8("relay")? != 0;
        Ok(Self {
            version,
            services,
            timestamp,
            receiver,
            sender,
            nonce,
            user_agent,
            start_height,
            relay,
        })
    }
}

/// One entry of an `addr` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrEntry {
    pub timestamp: u32,
    pub address: NetAddress,
}

/// The `getheaders` request: block locator plus stop hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetHeaders {
    pub version: u32,
    pub locator: Vec<Hash256>,
    pub stop: Hash256,
}

impl GetHeaders {
    /// Request successors of `tip`, unbounded (zero stop hash).
    pub fn from_tip(tip: Hash256) -> Self {
        Self {
            version: PROTOCOL_VERSION as u32,
            locator: vec![tip],
            stop: Hash256::ZERO,
        }
    }
}

/// One entry of an inventory vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inventory {
    pub kind: u32,
    pub hash: Hash256,
}

impl Inventory {
    pub fn block(hash: Hash256) -> Self {
        Self { kind: tern_core::constants::INV_BLOCK, hash }
    }
}

/// A decoded Bitcoin P2P message.
#[derive(Debug, Clone)]
pub enum Message {
    Version(VersionMessage),
    Verack,
    Ping(u64),
    Pong(u64),
    GetAddr,
    Addr(Vec<AddrEntry>),
    GetHeaders(GetHeaders),
    Headers(Vec<BlockHeader>),
    GetData(Vec<Inventory>),
    Inv(Vec<Inventory>),
    NotFound(Vec<Inventory>),
    Block(Box<Block>),
    Unknown { command: String },
}

impl Message {
    /// The 12-byte command string for this message.
    pub fn command(&self) -> &str {
        match self {
            Message::Version(_) => "version",
            Message::Verack => "verack",
            Message::Ping(_) => "ping",
            Message::Pong(_) => "pong",
            Message::GetAddr => "getaddr",
            Message::Addr(_) => "addr",
            Message::GetHeaders(_) => "getheaders",
            Message::Headers(_) => "headers",
            Message::GetData(_) => "getdata",
            Message::Inv(_) => "inv",
            Message::NotFound(_) => "notfound",
            Message::Block(_) => "block",
            Message::Unknown { command } => command,
        }
    }

    /// Encode the payload (without the frame header).
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Message::Version(v) => v.encode_into(&mut out),
            Message::Verack | Message::GetAddr | Message::Unknown { .. } => {}
            Message::Ping(nonce) | Message::Pong(nonce) => {
                out.extend_from_slice(&nonce.to_le_bytes());
            }
            Message::Addr(entries) => {
                put_var_int(&mut out, entries.len() as u64);
                for entry in entries {
                    out.extend_from_slice(&entry.timestamp.to_le_bytes());
                    entry.address.encode_into(&mut out);
                }
            }
            Message::GetHeaders(g) => {
                out.extend_from_slice(&g.version.to_le_bytes());
                put_var_int(&mut out, g.locator.len() as u64);
                for hash in &g.locator {
                    out.extend_from_slice(hash.as_bytes());
                }
                out.extend_from_slice(g.stop.as_bytes());
            }
            Message::Headers(headers) => {
                put_var_int(&mut out, headers.len() as u64);
                for header in headers {
                    header.encode_into(&mut out);
                    // Each headers entry carries an always-zero tx count.
                    put_var_int(&mut out, 0);
                }
            }
            Message::GetData(inv) | Message::Inv(inv) | Message::NotFound(inv) => {
                put_var_int(&mut out, inv.len() as u64);
                for entry in inv {
                    out.extend_from_slice(&entry.kind.to_le_bytes());
                    out.extend_from_slice(entry.hash.as_bytes());
                }
            }
            Message::Block(block) => block.encode_into(&mut out),
        }
        out
    }

    /// Decode a payload for the given command.
    pub fn decode(command: &str, payload: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(payload);
        let message = match command {
            "version" => Message::Version(VersionMessage::decode(&mut r)?),
            "verack" => Message::Verack,
            "ping" => Message::Ping(r.u64_le("ping nonce")?),
            "pong" => Message::Pong(r.u64_le("pong nonce")?),
            "getaddr" => Message::GetAddr,
            "addr" => Message::Addr(decode_addr(&mut r)?),
            "getheaders" => Message::GetHeaders(decode_get_headers(&mut r)?),
            "headers" => Message::Headers(decode_headers(&mut r)?),
            "getdata" => Message::GetData(decode_inventory(&mut r, "getdata")?),
            "inv" => Message::Inv(decode_inventory(&mut r, "inv")?),
            "notfound" => Message::NotFound(decode_inventory(&mut r, "notfound")?),
            "block" => Message::Block(Box::new(Block::decode(&mut r)?)),
            other => Message::Unknown { command: other.to_string() },
        };
        Ok(message)
    }
}

fn decode_addr(r: &mut Reader<'_>) -> Result<Vec<AddrEntry>, WireError> {
    let count = r.var_int("addr count")? as usize;
    if count > MAX_ADDR_ENTRIES {
        return Err(WireError::TooManyEntries {
            field: "addr count",
            count,
            max: MAX_ADDR_ENTRIES,
        });
    }
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        entries.push(AddrEntry {
            timestamp: r.u32_le("addr timestamp")?,
            address: NetAddress::decode(r)?,
        });
    }
    Ok(entries)
}

fn decode_get_headers(r: &mut Reader<'_>) -> Result<GetHeaders, WireError> {
    let version = r.u32_le("getheaders version")?;
    let count = r.var_int("locator count")? as usize;
    if count > MAX_LOCATOR_HASHES {
        return Err(WireError::TooManyEntries {
            field: "locator count",
            count,
            max: MAX_LOCATOR_HASHES,
        });
    }
    let mut locator = Vec::with_capacity(count);
    for _ in 0..count {
        locator.push(Hash256(r.digest("locator hash")?));
    }
    let stop = Hash256(r.digest("stop hash")?);
    Ok(GetHeaders { version, locator, stop })
}

fn decode_headers(r: &mut Reader<'_>) -> Result<Vec<BlockHeader>, WireError> {
    let count = r.var_int("headers count")? as usize;
    // A compliant peer never exceeds the full batch; larger claims would
    // also defeat the "short response means exhausted" completion signal.
    if count > HEADERS_BATCH {
        return Err(WireError::TooManyEntries {
            field: "headers count",
            count,
            max: HEADERS_BATCH,
        });
    }
    let mut headers = Vec::with_capacity(count);
    for _ in 0..count {
        headers.push(BlockHeader::decode(r)?);
        let tx_count = r.var_int("headers tx count")?;
        if tx_count != 0 {
            return Err(WireError::Malformed("headers tx count"));
        }
    }
    Ok(headers)
}

fn decode_inventory(r: &mut Reader<'_>, field: &'static str) -> Result<Vec<Inventory>, WireError> {
    let count = r.var_int(field)? as usize;
    if count > MAX_INVENTORY_ENTRIES {
        return Err(WireError::TooManyEntries {
            field,
            count,
            max: MAX_INVENTORY_ENTRIES,
        });
    }
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        entries.push(Inventory {
            kind: r.u32_le("inventory kind")?,
            hash: Hash256(r.digest("inventory hash")?),
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: Message) -> Message {
        let payload = msg.encode_payload();
        Message::decode(msg.command(), &payload).unwrap()
    }

    #[test]
    fn version_round_trip_preserves_fields() {
        let msg = VersionMessage::local(1_700_000_000, 0xDEADBEEF, 820_000);
        match round_trip(Message::Version(msg.clone())) {
            Message::Version(decoded) => assert_eq!(decoded, msg),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn version_relay_byte_optional() {
        let msg = VersionMessage::local(0, 1, 2);
        let mut payload = Message::Version(msg).encode_payload();
        payload.pop();
        match Message::decode("version", &payload).unwrap() {
            Message::Version(decoded) => assert!(!decoded.relay),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn advertised_height_clamps_negative() {
        let mut msg = VersionMessage::local(0, 1, -5);
        assert_eq!(msg.advertised_height(), 0);
        msg.start_height = 7;
        assert_eq!(msg.advertised_height(), 7);
    }

    #[test]
    fn net_address_ipv4_uses_mapped_encoding() {
        let addr = NetAddress {
            services: 1,
            ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            port: 8333,
        };
        let mut out = Vec::new();
        addr.encode_into(&mut out);
        // services (8) + 10 zero bytes + ffff + ipv4 + port
        assert_eq!(&out[8..18], &[0u8; 10]);
        assert_eq!(&out[18..20], &[0xFF, 0xFF]);
        let decoded = NetAddress::decode(&mut Reader::new(&out)).unwrap();
        assert_eq!(decoded, addr);
    }

    #[test]
    fn get_headers_from_tip_shape() {
        let tip = Hash256([0x42; 32]);
        let g = GetHeaders::from_tip(tip);
        assert_eq!(g.locator, vec![tip]);
        assert!(g.stop.is_zero());
        match round_trip(Message::GetHeaders(g.clone())) {
            Message::GetHeaders(decoded) => assert_eq!(decoded, g),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn headers_round_trip_with_zero_tx_counts() {
        let headers = vec![
            BlockHeader {
                version: 4,
                previous_block_hash: Hash256([1; 32]),
                merkle_root: Hash256([2; 32]),
                timestamp: 100,
                bits: 0x1d00ffff,
                nonce: 7,
            };
            3
        ];
        match round_trip(Message::Headers(headers.clone())) {
            Message::Headers(decoded) => assert_eq!(decoded, headers),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn headers_rejects_nonzero_tx_count() {
        let mut payload = Message::Headers(vec![BlockHeader {
            version: 1,
            previous_block_hash: Hash256::ZERO,
            merkle_root: Hash256::ZERO,
            timestamp: 0,
            bits: 0,
            nonce: 0,
        }])
        .encode_payload();
        *payload.last_mut().unwrap() = 1;
        assert_eq!(
            Message::decode("headers", &payload).unwrap_err(),
            WireError::Malformed("headers tx count")
        );
    }

    #[test]
    fn headers_rejects_oversized_count_claim() {
        let mut payload = Vec::new();
        put_var_int(&mut payload, (HEADERS_BATCH + 1) as u64);
        assert!(matches!(
            Message::decode("headers", &payload).unwrap_err(),
            WireError::TooManyEntries { .. }
        ));
    }

    #[test]
    fn inventory_round_trip() {
        let inv = vec![Inventory::block(Hash256([9; 32])), Inventory::block(Hash256([8; 32]))];
        match round_trip(Message::GetData(inv.clone())) {
            Message::GetData(decoded) => assert_eq!(decoded, inv),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn unknown_command_tolerated() {
        match Message::decode("wtxidrelay", &[]).unwrap() {
            Message::Unknown { command } => assert_eq!(command, "wtxidrelay"),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn ping_pong_nonce_round_trip() {
        match round_trip(Message::Ping(0x0123_4567_89AB_CDEF)) {
            Message::Ping(nonce) => assert_eq!(nonce, 0x0123_4567_89AB_CDEF),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn addr_rejects_oversized_count() {
        let mut payload = Vec::new();
        put_var_int(&mut payload, (MAX_ADDR_ENTRIES + 1) as u64);
        assert!(matches!(
            Message::decode("addr", &payload).unwrap_err(),
            WireError::TooManyEntries { .. }
        ));
    }
}
