//! Event dispatcher - Logs incoming events, answers, and fans them out to plugins

use std::time::Duration;
use tokio::sync::mpsc;

use crate::domain::entities::{Event, GroupMessage, MessageKind};
use crate::domain::traits::Bot;
use crate::infrastructure::config::RelayConfig;
use crate::plugins::SharedPluginManager;
use crate::utils::timestamp_format;

/// Routes events from the OneBot connection
pub struct EventDispatcher<B: Bot> {
    bot: B,
    plugins: SharedPluginManager,
    relay: RelayConfig,
    delivery_timeout: Duration,
}

impl<B: Bot> EventDispatcher<B> {
    pub fn new(
        bot: B,
        plugins: SharedPluginManager,
        relay: RelayConfig,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            bot,
            plugins,
            relay,
            delivery_timeout,
        }
    }

    /// Process events until the queue is closed
    pub async fn run(&self, mut events: mpsc::Receiver<Event>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        tracing::info!("Event queue closed, dispatcher stopping");
    }

    pub async fn handle(&self, event: Event) {
        self.log_and_reply(&event).await;
        self.deliver(&event).await;
    }

    async fn log_and_reply(&self, event: &Event) {
        let peer = self.bot.peer().unwrap_or_else(|| "-".to_string());
        let time = timestamp_format(event.time);

        match event.message_kind() {
            Some(MessageKind::Group) => {
                if self.relay.reply_groups.contains(&event.group_id) {
                    let reply = GroupMessage {
                        group_id: event.group_id,
                        message: self.relay.reply_text.clone(),
                    };
                    if let Err(e) = self.bot.send_group_message(reply).await {
                        tracing::warn!("Send request error: {}", e);
                    }
                }
                tracing::info!(
                    "[{}][{}][{}][{}]{}: {}",
                    time,
                    peer,
                    event.group_id,
                    event.sender.user_id,
                    event.sender.nickname,
                    event.plain_text()
                );
            }
            Some(MessageKind::Private) => {
                tracing::info!(
                    "[{}][{}][{}]{}: {}",
                    time,
                    peer,
                    event.sender.user_id,
                    event.sender.nickname,
                    event.plain_text()
                );
            }
            Some(MessageKind::Other(kind)) => {
                tracing::debug!("[{}][{}] Unhandled message type {}: {:?}", time, peer, kind, event);
            }
            None => {
                tracing::debug!("{:?}", event);
            }
        }
    }

    /// Offer the event to every loaded plugin. Returns how many accepted it.
    ///
    /// Sends happen outside the registry lock; a plugin that does not take
    /// the event within the delivery timeout is skipped.
    pub async fn deliver(&self, event: &Event) -> usize {
        let payload = event.to_payload();
        let mut delivered = 0;

        for (name, comm) in self.plugins.communications() {
            match tokio::time::timeout(self.delivery_timeout, comm.send(payload.clone())).await {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(_)) => tracing::debug!("Plugin '{}' channel is closed", name),
                Err(_) => tracing::warn!(
                    "Plugin '{}' did not accept event within {:?}, skipping",
                    name,
                    self.delivery_timeout
                ),
            }
        }
        delivered
    }
}
