//! # tern-network — Bitcoin P2P transport.
//!
//! Raw-TCP plumbing under the sync core: message framing and payload
//! codecs, the per-peer [`Channel`] abstraction, the dialing
//! [`Connector`] with version handshake, the [`HostPool`] address
//! directory, and the small ping / address-exchange protocols attached to
//! every sync channel.

pub mod address;
pub mod channel;
pub mod codec;
pub mod config;
pub mod connector;
pub mod hosts;
pub mod message;
pub mod ping;
pub mod shutdown;

pub use address::spawn_address_exchange;
pub use channel::Channel;
pub use config::NetworkConfig;
pub use connector::Connector;
pub use hosts::HostPool;
pub use message::Message;
pub use ping::spawn_ping;
pub use shutdown::Shutdown;
