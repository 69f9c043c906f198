//! Per-peer message channel.
//!
//! A [`Channel`] wraps one handshaken TCP connection with two background
//! tasks: a writer draining an outgoing queue and a reader decoding frames
//! into a broadcast of typed [`Message`]s. Subscribers receive every
//! message delivered after they subscribe, in arrival order.
//!
//! Stopping is cooperative and idempotent: either task failing, the peer
//! hanging up, or an explicit [`Channel::stop`] trips the shared latch, and
//! both tasks unwind. Handles stay usable for `stopped()` checks afterwards.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, trace};

use tern_core::error::NetworkError;

use crate::codec::{read_frame, write_frame};
use crate::message::{Message, VersionMessage};
use crate::shutdown::Shutdown;

/// Broadcast buffer depth per channel. Sync protocols consume promptly; a
/// lagging subscriber loses the oldest messages and is told so.
const EVENT_BUFFER: usize = 256;

struct Shared {
    authority: SocketAddr,
    peer_version: VersionMessage,
    stop: Shutdown,
}

/// Handle to one peer connection.
#[derive(Clone)]
pub struct Channel {
    shared: Arc<Shared>,
    outgoing: mpsc::UnboundedSender<Message>,
    events: broadcast::Sender<Message>,
}

impl Channel {
    /// Take ownership of a handshaken stream and spawn the reader/writer
    /// tasks. Used by the connector once `version`/`verack` has completed.
    pub(crate) fn spawn(
        stream: TcpStream,
        authority: SocketAddr,
        peer_version: VersionMessage,
        magic: [u8; 4],
    ) -> Self {
        let (read_half, write_half) = stream.into_split();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(EVENT_BUFFER);

        let shared = Arc::new(Shared {
            authority,
            peer_version,
            stop: Shutdown::new(),
        });

        tokio::spawn(writer_task(
            write_half,
            magic,
            outgoing_rx,
            Arc::clone(&shared),
        ));
        tokio::spawn(reader_task(
            read_half,
            magic,
            events_tx.clone(),
            Arc::clone(&shared),
        ));

        Self { shared, outgoing: outgoing_tx, events: events_tx }
    }

    /// The peer's network identity.
    pub fn authority(&self) -> SocketAddr {
        self.shared.authority
    }

    /// The peer's `version` announcement captured during the handshake.
    pub fn peer_version(&self) -> &VersionMessage {
        &self.shared.peer_version
    }

    /// The chain height the peer advertised at handshake time.
    pub fn peer_start_height(&self) -> u32 {
        self.shared.peer_version.advertised_height()
    }

    /// Queue a message for the writer task.
    pub fn send(&self, message: Message) -> Result<(), NetworkError> {
        if self.stopped() {
            return Err(NetworkError::ChannelClosed);
        }
        self.outgoing
            .send(message)
            .map_err(|_| NetworkError::ChannelClosed)
    }

    /// Subscribe to incoming messages from this point onward.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.events.subscribe()
    }

    /// Stop the channel. Idempotent; both background tasks unwind.
    pub fn stop(&self) {
        self.shared.stop.trigger();
    }

    pub fn stopped(&self) -> bool {
        self.shared.stop.is_triggered()
    }

    /// Resolve once the channel has stopped.
    pub async fn wait_stop(&self) {
        self.shared.stop.wait().await;
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("authority", &self.shared.authority)
            .field("stopped", &self.stopped())
            .finish()
    }
}

async fn writer_task(
    mut io: OwnedWriteHalf,
    magic: [u8; 4],
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    shared: Arc<Shared>,
) {
    loop {
        tokio::select! {
            _ = shared.stop.wait() => break,
            queued = outgoing.recv() => {
                let Some(message) = queued else { break };
                let payload = message.encode_payload();
                trace!(
                    authority = %shared.authority,
                    command = message.command(),
                    bytes = payload.len(),
                    "sending message"
                );
                if let Err(e) = write_frame(&mut io, magic, message.command(), &payload).await {
                    debug!(authority = %shared.authority, error = %e, "send failed");
                    break;
                }
            }
        }
    }
    shared.stop.trigger();
}

async fn reader_task(
    mut io: OwnedReadHalf,
    magic: [u8; 4],
    events: broadcast::Sender<Message>,
    shared: Arc<Shared>,
) {
    loop {
        tokio::select! {
            _ = shared.stop.wait() => break,
            frame = read_frame(&mut io, magic) => {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(e) => {
                        debug!(authority = %shared.authority, error = %e, "read failed");
                        break;
                    }
                };
                match Message::decode(&frame.command, &frame.payload) {
                    Ok(message) => {
                        trace!(
                            authority = %shared.authority,
                            command = %frame.command,
                            "received message"
                        );
                        // No subscribers is fine; messages are simply dropped.
                        let _ = events.send(message);
                    }
                    Err(e) => {
                        debug!(
                            authority = %shared.authority,
                            command = %frame.command,
                            error = %e,
                            "undecodable message"
                        );
                        break;
                    }
                }
            }
        }
    }
    shared.stop.trigger();
}
