//! Outbound dialer with Bitcoin version handshake.
//!
//! `connect` produces a [`Channel`] whose peer has completed the
//! `version`/`verack` exchange, so callers can read the advertised
//! `start_height` before attaching any protocol.

use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use tern_core::error::NetworkError;

use crate::channel::Channel;
use crate::codec::{read_frame, write_frame};
use crate::config::NetworkConfig;
use crate::message::{Message, VersionMessage};

/// Dials peers and runs the handshake.
#[derive(Clone)]
pub struct Connector {
    config: NetworkConfig,
}

impl Connector {
    pub fn new(config: NetworkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Establish a channel to `authority` with the handshake complete.
    pub async fn connect(&self, authority: SocketAddr) -> Result<Channel, NetworkError> {
        let stream = timeout(self.config.connect_timeout, TcpStream::connect(authority))
            .await
            .map_err(|_| NetworkError::ConnectTimeout)?
            .map_err(|e| NetworkError::Io(e.to_string()))?;

        let magic = self.config.network.magic_bytes();
        let peer_version = timeout(
            self.config.handshake_timeout,
            handshake(stream, magic, self.config.advertised_height),
        )
        .await
        .map_err(|_| NetworkError::Handshake("timed out".to_string()))?;

        let (stream, peer_version) = peer_version?;
        debug!(
            %authority,
            peer_agent = %peer_version.user_agent,
            peer_height = peer_version.start_height,
            "handshake complete"
        );
        Ok(Channel::spawn(stream, authority, peer_version, magic))
    }
}

/// Exchange `version` and `verack` on a fresh stream.
///
/// Modern peers send feature negotiation (`wtxidrelay`, `sendaddrv2`, ...)
/// between `version` and `verack`; anything that is not part of the
/// handshake is ignored here.
async fn handshake(
    mut stream: TcpStream,
    magic: [u8; 4],
    advertised_height: i32,
) -> Result<(TcpStream, VersionMessage), NetworkError> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default();
    let nonce = rand::thread_rng().gen();

    let local = VersionMessage::local(timestamp, nonce, advertised_height);
    let version = Message::Version(local);
    write_frame(&mut stream, magic, version.command(), &version.encode_payload()).await?;

    let mut peer_version: Option<VersionMessage> = None;
    let mut got_verack = false;

    while peer_version.is_none() || !got_verack {
        let frame = read_frame(&mut stream, magic).await?;
        match Message::decode(&frame.command, &frame.payload)? {
            Message::Version(v) => {
                if v.nonce == nonce {
                    return Err(NetworkError::Handshake("connected to self".to_string()));
                }
                peer_version = Some(v);
                let verack = Message::Verack;
                write_frame(&mut stream, magic, verack.command(), &verack.encode_payload())
                    .await?;
            }
            Message::Verack => got_verack = true,
            other => {
                debug!(command = other.command(), "ignoring pre-verack message");
            }
        }
    }

    let peer_version = peer_version.expect("loop exits only with a version");
    Ok((stream, peer_version))
}
