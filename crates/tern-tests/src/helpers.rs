//! Scripted peers and chain builders for end-to-end sync tests.
//!
//! A scripted peer is a real TCP listener speaking the real wire protocol,
//! so integration tests exercise the connector, the channel tasks, and the
//! frame codec along with the protocol under test.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};

use tern_core::constants::NetworkKind;
use tern_core::error::StoreError;
use tern_core::traits::BlockStore;
use tern_core::types::{Block, BlockHeader, Hash256};
use tern_network::codec::{read_frame, write_frame};
use tern_network::message::{GetHeaders, Inventory, Message, VersionMessage};
use tern_network::{Connector, NetworkConfig};
use tern_sync::SyncConfig;

/// All integration tests run against regtest parameters.
pub const TEST_NETWORK: NetworkKind = NetworkKind::Regtest;

/// Fixed nonce for scripted peers; the connector only rejects its own.
const PEER_NONCE: u64 = 0x7EA7_0000_0000_0001;

pub fn magic() -> [u8; 4] {
    TEST_NETWORK.magic_bytes()
}

pub fn hash(seed: u8) -> Hash256 {
    Hash256([seed; 32])
}

/// A header extending `previous`; `nonce` differentiates siblings.
pub fn header_on(previous: Hash256, nonce: u32) -> BlockHeader {
    BlockHeader {
        version: 4,
        previous_block_hash: previous,
        merkle_root: Hash256::ZERO,
        timestamp: 1_700_000_000,
        bits: 0x207fffff,
        nonce,
    }
}

/// `count` linked headers starting from `from`.
pub fn linked_chain(from: Hash256, count: usize) -> Vec<BlockHeader> {
    let mut headers = Vec::with_capacity(count);
    let mut previous = from;
    for nonce in 0..count {
        let header = header_on(previous, nonce as u32);
        previous = header.hash();
        headers.push(header);
    }
    headers
}

/// An (empty) body for a header.
pub fn body_for(header: BlockHeader) -> Block {
    Block { header, transactions: vec![] }
}

/// A connector with short timeouts against the test network.
pub fn test_connector() -> Connector {
    let mut config = NetworkConfig::for_network(TEST_NETWORK);
    config.connect_timeout = Duration::from_secs(2);
    config.handshake_timeout = Duration::from_secs(2);
    Connector::new(config)
}

/// Sync tuning for tests: fast ticks, eviction disabled unless a test
/// raises the minimums.
pub fn test_sync_config() -> SyncConfig {
    SyncConfig {
        headers_per_second: 0,
        blocks_per_minute: 0,
        quorum: 1,
        connections: 1,
        header_tick: Duration::from_millis(100),
        block_tick: Duration::from_millis(100),
    }
}

/// The server side of one scripted connection.
pub struct PeerConn {
    stream: TcpStream,
}

impl PeerConn {
    /// Complete the version/verack exchange, advertising `start_height`.
    pub async fn handshake(&mut self, start_height: i32) {
        // The dialer speaks first.
        loop {
            if let Message::Version(_) = self.read_message().await {
                break;
            }
        }
        let version = VersionMessage::local(1_700_000_000, PEER_NONCE, start_height);
        self.send(Message::Version(version)).await;
        self.send(Message::Verack).await;
        loop {
            if let Message::Verack = self.read_message().await {
                break;
            }
        }
    }

    /// Read the next decodable message. When the dialer hangs up the script
    /// parks forever instead of failing; the test runtime reaps it.
    pub async fn read_message(&mut self) -> Message {
        match read_frame(&mut self.stream, magic()).await {
            Ok(frame) => {
                Message::decode(&frame.command, &frame.payload).expect("scripted peer decode")
            }
            Err(_) => std::future::pending().await,
        }
    }

    /// Hold the connection open, consuming whatever the dialer sends.
    pub async fn idle(&mut self) {
        loop {
            self.read_message().await;
        }
    }

    /// Read messages until `select` matches, ignoring everything else
    /// (the dialer's `getaddr` and keepalives in particular).
    pub async fn expect<T>(&mut self, select: impl Fn(Message) -> Option<T>) -> T {
        loop {
            if let Some(found) = select(self.read_message().await) {
                return found;
            }
        }
    }

    pub async fn expect_get_headers(&mut self) -> GetHeaders {
        self.expect(|m| match m {
            Message::GetHeaders(g) => Some(g),
            _ => None,
        })
        .await
    }

    pub async fn expect_get_data(&mut self) -> Vec<Inventory> {
        self.expect(|m| match m {
            Message::GetData(inv) => Some(inv),
            _ => None,
        })
        .await
    }

    pub async fn send(&mut self, message: Message) {
        write_frame(&mut self.stream, magic(), message.command(), &message.encode_payload())
            .await
            .expect("scripted peer write");
    }
}

/// Start a scripted peer on an ephemeral port. Every accepted connection
/// runs `script`; peers that should fail can simply drop the connection.
pub async fn spawn_peer<F, Fut>(script: F) -> SocketAddr
where
    F: Fn(PeerConn) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind scripted peer");
    let address = listener.local_addr().expect("scripted peer address");
    let script = Arc::new(script);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else { return };
            let script = Arc::clone(&script);
            tokio::spawn(async move {
                script(PeerConn { stream }).await;
            });
        }
    });
    address
}

/// A peer that serves one linked header chain, batch by batch, and then
/// answers further locators with an empty `headers` message.
pub async fn spawn_header_peer(start_height: i32, headers: Vec<BlockHeader>) -> SocketAddr {
    let headers = Arc::new(headers);
    spawn_peer(move |mut conn| {
        let headers = Arc::clone(&headers);
        async move {
            conn.handshake(start_height).await;
            loop {
                let request = conn.expect_get_headers().await;
                let locator = request.locator.first().copied().unwrap_or(Hash256::ZERO);
                let from = headers
                    .iter()
                    .position(|h| h.previous_block_hash == locator)
                    .unwrap_or(headers.len());
                let batch: Vec<BlockHeader> = headers
                    .iter()
                    .skip(from)
                    .take(tern_core::constants::HEADERS_BATCH)
                    .copied()
                    .collect();
                conn.send(Message::Headers(batch)).await;
            }
        }
    })
    .await
}

/// A peer that serves block bodies for whatever inventories are requested.
pub async fn spawn_block_peer(start_height: i32, blocks: Vec<Block>) -> SocketAddr {
    let by_hash: HashMap<Hash256, Block> =
        blocks.into_iter().map(|b| (b.hash(), b)).collect();
    let by_hash = Arc::new(by_hash);
    spawn_peer(move |mut conn| {
        let by_hash = Arc::clone(&by_hash);
        async move {
            conn.handshake(start_height).await;
            loop {
                let inventory = conn.expect_get_data().await;
                for entry in inventory {
                    if let Some(block) = by_hash.get(&entry.hash) {
                        conn.send(Message::Block(Box::new(block.clone()))).await;
                    }
                }
            }
        }
    })
    .await
}

/// In-memory [`BlockStore`] for tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    blocks: HashMap<Hash256, Block>,
    heights: HashMap<u32, Hash256>,
    tip: Option<(u32, Hash256)>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn block_count(&self) -> usize {
        self.inner.lock().unwrap().blocks.len()
    }

    pub fn hash_at_height(&self, height: u32) -> Option<Hash256> {
        self.inner.lock().unwrap().heights.get(&height).copied()
    }
}

impl BlockStore for MemoryStore {
    fn store_block(&self, height: u32, block: &Block) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let hash = block.hash();
        inner.blocks.insert(hash, block.clone());
        inner.heights.insert(height, hash);
        if inner.tip.map_or(true, |(tip_height, _)| height > tip_height) {
            inner.tip = Some((height, hash));
        }
        Ok(())
    }

    fn contains(&self, hash: &Hash256) -> Result<bool, StoreError> {
        Ok(self.inner.lock().unwrap().blocks.contains_key(hash))
    }

    fn tip(&self) -> Result<(u32, Hash256), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .tip
            .ok_or_else(|| StoreError::Database("empty store".to_string()))
    }
}
