use async_trait::async_trait;

use crate::application::errors::BotError;
use crate::domain::entities::{GroupMessage, PrivateMessage, Request};

/// Bot trait - abstraction over the connection that carries outgoing requests
#[async_trait]
pub trait Bot: Send + Sync {
    /// Send an action request. Returns the echo assigned to it.
    async fn send_request(&self, request: Request) -> Result<String, BotError>;

    /// Send a message to a group
    async fn send_group_message(&self, message: GroupMessage) -> Result<String, BotError> {
        let params = serde_json::to_value(message).map_err(|e| BotError::Parse(e.to_string()))?;
        self.send_request(Request::new("send_group_msg", params)).await
    }

    /// Send a private message to a user
    async fn send_private_message(&self, message: PrivateMessage) -> Result<String, BotError> {
        let params = serde_json::to_value(message).map_err(|e| BotError::Parse(e.to_string()))?;
        self.send_request(Request::new("send_private_msg", params)).await
    }

    /// Address of the connected client, if any
    fn peer(&self) -> Option<String>;

    /// Bot info
    fn bot_info(&self) -> BotInfo;
}

/// Bot information
#[derive(Debug, Clone)]
pub struct BotInfo {
    pub name: String,
    pub endpoint: String,
}

