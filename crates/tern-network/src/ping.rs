//! Keepalive protocol: answer peer pings, emit our own periodically.

use std::time::Duration;

use rand::Rng;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::channel::Channel;
use crate::message::Message;

/// Attach the ping protocol to a channel. The task ends when the channel
/// stops; it never stops the channel itself except on send failure.
pub fn spawn_ping(channel: Channel, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = channel.subscribe();
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so the handshake is not
        // followed by an instant ping.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = channel.wait_stop() => return,
                event = events.recv() => match event {
                    Ok(Message::Ping(nonce)) => {
                        trace!(authority = %channel.authority(), nonce, "answering ping");
                        if channel.send(Message::Pong(nonce)).is_err() {
                            return;
                        }
                    }
                    Ok(Message::Pong(nonce)) => {
                        trace!(authority = %channel.authority(), nonce, "pong received");
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(authority = %channel.authority(), skipped, "ping subscriber lagged");
                    }
                    Err(RecvError::Closed) => return,
                },
                _ = ticker.tick() => {
                    let nonce = rand::thread_rng().gen();
                    if channel.send(Message::Ping(nonce)).is_err() {
                        return;
                    }
                }
            }
        }
    })
}
