//! Communication channel - Bounded message queues between host and plugin
//!
//! A channel is a pair of FIFO queues, one per direction. [`Communication::pair`]
//! hands out the two ends: whatever one end sends, the other end receives.
//! Closing either end closes both queues.

use async_channel::{Receiver, Sender, TryRecvError, TrySendError};

use crate::application::errors::ChannelError;

/// Opaque message carried over a channel
pub type Payload = serde_json::Value;

/// Queue capacity used when the config does not say otherwise
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10;

/// One end of a bidirectional plugin channel
#[derive(Debug, Clone)]
pub struct Communication {
    outgoing: Sender<Payload>,
    incoming: Receiver<Payload>,
}

impl Communication {
    /// Create a connected `(host, plugin)` pair with the given per-queue capacity.
    pub fn pair(capacity: usize) -> (Communication, Communication) {
        let capacity = capacity.max(1);
        let (to_plugin_tx, to_plugin_rx) = async_channel::bounded(capacity);
        let (to_host_tx, to_host_rx) = async_channel::bounded(capacity);

        let host = Communication {
            outgoing: to_plugin_tx,
            incoming: to_host_rx,
        };
        let plugin = Communication {
            outgoing: to_host_tx,
            incoming: to_plugin_rx,
        };
        (host, plugin)
    }

    /// Enqueue a payload, waiting while the queue is full.
    pub async fn send(&self, payload: Payload) -> Result<(), ChannelError> {
        self.outgoing
            .send(payload)
            .await
            .map_err(|_| ChannelError::Closed)
    }

    /// Blocking variant of [`send`](Self::send) for plugin threads.
    /// Must not be called from inside an async task.
    pub fn send_blocking(&self, payload: Payload) -> Result<(), ChannelError> {
        self.outgoing
            .send_blocking(payload)
            .map_err(|_| ChannelError::Closed)
    }

    /// Enqueue without waiting.
    pub fn try_send(&self, payload: Payload) -> Result<(), ChannelError> {
        self.outgoing.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => ChannelError::Full,
            TrySendError::Closed(_) => ChannelError::Closed,
        })
    }

    /// Addressed send. There is a single queue per direction, so `to` is
    /// currently ignored and the payload goes to the other end.
    pub fn send_message(&self, to: &str, payload: Payload) -> Result<(), ChannelError> {
        let _ = to;
        self.send_blocking(payload)
    }

    /// Lazy sequence over the incoming queue. Ends once the channel is closed.
    pub fn receive(&self) -> Incoming {
        Incoming {
            rx: self.incoming.clone(),
        }
    }

    /// Wait for the next incoming payload; `None` once closed.
    pub async fn recv(&self) -> Option<Payload> {
        self.incoming.recv().await.ok()
    }

    /// Take a payload if one is queued.
    pub fn try_recv(&self) -> Result<Option<Payload>, ChannelError> {
        match self.incoming.try_recv() {
            Ok(payload) => Ok(Some(payload)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Closed) => Err(ChannelError::Closed),
        }
    }

    /// Close both queues. Pending and future sends fail, receivers see end-of-stream.
    pub fn close(&self) {
        self.outgoing.close();
        self.incoming.close();
    }

    pub fn is_closed(&self) -> bool {
        self.outgoing.is_closed() && self.incoming.is_closed()
    }

    /// Number of payloads waiting to be received on this end
    pub fn pending(&self) -> usize {
        self.incoming.len()
    }

    pub fn capacity(&self) -> usize {
        self.outgoing.capacity().unwrap_or(DEFAULT_CHANNEL_CAPACITY)
    }
}

/// Incoming payload sequence returned by [`Communication::receive`]
#[derive(Debug, Clone)]
pub struct Incoming {
    rx: Receiver<Payload>,
}

impl Incoming {
    /// Async counterpart of [`Iterator::next`]
    pub async fn next_message(&mut self) -> Option<Payload> {
        self.rx.recv().await.ok()
    }
}

impl Iterator for Incoming {
    type Item = Payload;

    fn next(&mut self) -> Option<Payload> {
        self.rx.recv_blocking().ok()
    }
}
