//! Core Bitcoin data types: hashes, headers, transactions, blocks.
//!
//! Wire serialization follows the Bitcoin consensus encoding: little-endian
//! integers, CompactSize counts, and the legacy (pre-segwit) transaction
//! layout. Block bodies are requested with the plain block inventory type,
//! so peers reply with the stripped serialization this module understands.
//! The bincode derives serve the storage layer only; nothing bincode-encoded
//! ever crosses the wire.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::{double_sha256, put_var_int, Reader};
use crate::error::WireError;

/// Scripts have a consensus ceiling of 10 000 bytes.
const MAX_SCRIPT_SIZE: usize = 10_000;

/// Transaction counts beyond this are rejected before allocation.
const MAX_TXS_PER_BLOCK: usize = 1_000_000;

/// A 32-byte double-SHA256 digest in internal (little-endian) byte order.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash. Used as the `getheaders` stop marker and for coinbase
    /// previous outpoints.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Parse from the conventional reversed (RPC) hex representation.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        bytes.reverse();
        Ok(Self(bytes))
    }
}

impl fmt::Display for Hash256 {
    /// Renders in the conventional reversed byte order, matching block
    /// explorers and RPC output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter().rev() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Reference to a specific output of a previous transaction.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash,
    bincode::Encode, bincode::Decode,
)]
pub struct OutPoint {
    pub txid: Hash256,
    pub index: u32,
}

impl OutPoint {
    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.txid.as_bytes());
        out.extend_from_slice(&self.index.to_le_bytes());
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            txid: Hash256(r.digest("outpoint txid")?),
            index: r.u32_le("outpoint index")?,
        })
    }
}

/// A transaction input spending a previous output.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxInput {
    pub previous_output: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

/// A transaction output.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxOutput {
    /// Value in satoshis.
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

/// A transaction in the legacy serialization.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u32,
}

impl Transaction {
    /// The transaction ID: double SHA-256 over the consensus encoding.
    pub fn txid(&self) -> Hash256 {
        let mut data = Vec::new();
        self.encode_into(&mut data);
        Hash256(double_sha256(&data))
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        put_var_int(out, self.inputs.len() as u64);
        for input in &self.inputs {
            input.previous_output.encode_into(out);
            put_var_int(out, input.script_sig.len() as u64);
            out.extend_from_slice(&input.script_sig);
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }
        put_var_int(out, self.outputs.len() as u64);
        for output in &self.outputs {
            out.extend_from_slice(&output.value.to_le_bytes());
            put_var_int(out, output.script_pubkey.len() as u64);
            out.extend_from_slice(&output.script_pubkey);
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let version = r.i32_le("tx version")?;
        let input_count = r.var_int("tx input count")? as usize;
        let mut inputs = Vec::with_capacity(input_count.min(1024));
        for _ in 0..input_count {
            inputs.push(TxInput {
                previous_output: OutPoint::decode(r)?,
                script_sig: r.var_bytes("script_sig", MAX_SCRIPT_SIZE)?,
                sequence: r.u32_le("sequence")?,
            });
        }
        let output_count = r.var_int("tx output count")? as usize;
        let mut outputs = Vec::with_capacity(output_count.min(1024));
        for _ in 0..output_count {
            outputs.push(TxOutput {
                value: r.u64_le("output value")?,
                script_pubkey: r.var_bytes("script_pubkey", MAX_SCRIPT_SIZE)?,
            });
        }
        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time: r.u32_le("lock_time")?,
        })
    }
}

/// The 80-byte block header.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockHeader {
    pub version: i32,
    pub previous_block_hash: Hash256,
    pub merkle_root: Hash256,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// Serialized size on the wire.
    pub const SERIALIZED_LEN: usize = 80;

    /// The block hash: double SHA-256 over the 80-byte consensus encoding.
    pub fn hash(&self) -> Hash256 {
        let mut data = Vec::with_capacity(Self::SERIALIZED_LEN);
        self.encode_into(&mut data);
        Hash256(double_sha256(&data))
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(self.previous_block_hash.as_bytes());
        out.extend_from_slice(self.merkle_root.as_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.bits.to_le_bytes());
        out.extend_from_slice(&self.nonce.to_le_bytes());
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            version: r.i32_le("header version")?,
            previous_block_hash: Hash256(r.digest("previous block hash")?),
            merkle_root: Hash256(r.digest("merkle root")?),
            timestamp: r.u32_le("header timestamp")?,
            bits: r.u32_le("header bits")?,
            nonce: r.u32_le("header nonce")?,
        })
    }
}

/// A complete block: header plus transactions.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// The block identity is its header hash.
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        self.header.encode_into(out);
        put_var_int(out, self.transactions.len() as u64);
        for tx in &self.transactions {
            tx.encode_into(out);
        }
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let header = BlockHeader::decode(r)?;
        let count = r.var_int("block tx count")? as usize;
        if count > MAX_TXS_PER_BLOCK {
            return Err(WireError::TooManyEntries {
                field: "block tx count",
                count,
                max: MAX_TXS_PER_BLOCK,
            });
        }
        let mut transactions = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            transactions.push(Transaction::decode(r)?);
        }
        Ok(Self { header, transactions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> BlockHeader {
        BlockHeader {
            version: 4,
            previous_block_hash: Hash256([0x11; 32]),
            merkle_root: Hash256([0x22; 32]),
            timestamp: 1_700_000_000,
            bits: 0x1d00ffff,
            nonce: 42,
        }
    }

    fn sample_tx() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: OutPoint { txid: Hash256::ZERO, index: u32::MAX },
                script_sig: vec![0x51],
                sequence: 0xFFFF_FFFF,
            }],
            outputs: vec![TxOutput {
                value: 50_0000_0000,
                script_pubkey: vec![0x6a],
            }],
            lock_time: 0,
        }
    }

    // --- Hash256 ---

    #[test]
    fn hash256_display_is_reversed() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xAB;
        let h = Hash256(bytes);
        let s = h.to_string();
        assert_eq!(s.len(), 64);
        assert!(s.starts_with("00"));
        assert!(s.ends_with("ab"));
    }

    #[test]
    fn hash256_hex_round_trip() {
        let h = Hash256([0x3C; 32]);
        assert_eq!(Hash256::from_hex(&h.to_string()).unwrap(), h);
    }

    #[test]
    fn hash256_from_hex_rejects_bad_length() {
        assert!(Hash256::from_hex("abcd").is_err());
    }

    // --- BlockHeader ---

    #[test]
    fn header_serializes_to_80_bytes() {
        let mut out = Vec::new();
        sample_header().encode_into(&mut out);
        assert_eq!(out.len(), BlockHeader::SERIALIZED_LEN);
    }

    #[test]
    fn header_decode_round_trip() {
        let header = sample_header();
        let mut out = Vec::new();
        header.encode_into(&mut out);
        let decoded = BlockHeader::decode(&mut Reader::new(&out)).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn header_hash_deterministic_and_nonce_sensitive() {
        let h1 = sample_header();
        let mut h2 = h1;
        h2.nonce += 1;
        assert_eq!(h1.hash(), h1.hash());
        assert_ne!(h1.hash(), h2.hash());
    }

    #[test]
    fn header_decode_truncated_fails() {
        let mut out = Vec::new();
        sample_header().encode_into(&mut out);
        out.truncate(79);
        assert!(BlockHeader::decode(&mut Reader::new(&out)).is_err());
    }

    // --- Transaction / Block ---

    #[test]
    fn transaction_round_trip() {
        let tx = sample_tx();
        let mut out = Vec::new();
        tx.encode_into(&mut out);
        let decoded = Transaction::decode(&mut Reader::new(&out)).unwrap();
        assert_eq!(decoded, tx);
    }

    #[test]
    fn txid_changes_with_lock_time() {
        let tx1 = sample_tx();
        let mut tx2 = sample_tx();
        tx2.lock_time = 1;
        assert_ne!(tx1.txid(), tx2.txid());
    }

    #[test]
    fn block_round_trip() {
        let block = Block {
            header: sample_header(),
            transactions: vec![sample_tx()],
        };
        let mut out = Vec::new();
        block.encode_into(&mut out);
        let decoded = Block::decode(&mut Reader::new(&out)).unwrap();
        assert_eq!(decoded, block);
    }

    #[test]
    fn block_hash_is_header_hash() {
        let block = Block { header: sample_header(), transactions: vec![] };
        assert_eq!(block.hash(), block.header.hash());
    }

    #[test]
    fn oversized_script_rejected() {
        let mut tx = sample_tx();
        tx.inputs[0].script_sig = vec![0u8; MAX_SCRIPT_SIZE + 1];
        let mut out = Vec::new();
        tx.encode_into(&mut out);
        assert!(Transaction::decode(&mut Reader::new(&out)).is_err());
    }

    #[test]
    fn bincode_round_trip_block() {
        let block = Block {
            header: sample_header(),
            transactions: vec![sample_tx()],
        };
        let encoded = bincode::encode_to_vec(&block, bincode::config::standard()).unwrap();
        let (decoded, _): (Block, usize) =
            bincode::decode_from_slice(&encoded, bincode::config::standard()).unwrap();
        assert_eq!(decoded, block);
    }
}
