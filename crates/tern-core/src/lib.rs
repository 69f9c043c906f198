//! # tern-core
//! Foundation types for the Tern Bitcoin sync node: hashes, headers,
//! blocks, consensus encoding, checkpoints, and the error taxonomy.

pub mod checkpoint;
pub mod codec;
pub mod constants;
pub mod error;
pub mod traits;
pub mod types;
