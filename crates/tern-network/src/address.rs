//! Address-exchange protocol: harvest peer addresses into the host pool.
//!
//! Sends a single `getaddr` after attach and feeds every `addr` reply into
//! the directory. Serving addresses back is deliberately absent.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::channel::Channel;
use crate::hosts::HostPool;
use crate::message::Message;

/// Attach the address-exchange protocol to a channel. The task ends when
/// the channel stops.
pub fn spawn_address_exchange(channel: Channel, hosts: Arc<HostPool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = channel.subscribe();
        if channel.send(Message::GetAddr).is_err() {
            return;
        }

        loop {
            tokio::select! {
                _ = channel.wait_stop() => return,
                event = events.recv() => match event {
                    Ok(Message::Addr(entries)) => {
                        let count = entries.len();
                        hosts.insert(entries.iter().map(|e| e.address.socket_addr()));
                        debug!(
                            authority = %channel.authority(),
                            count,
                            known = hosts.len(),
                            "harvested addresses"
                        );
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => return,
                },
            }
        }
    })
}
