//! OneBot v11 reverse WebSocket endpoint
//!
//! The OneBot client (the chat account's bridge) connects to us. Events it
//! pushes are parsed and queued for the dispatcher; requests go back over the
//! same socket. Only one connection is active at a time: a new connection
//! takes over from the previous one.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request as HandshakeRequest, Response as HandshakeResponse,
};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

use crate::application::errors::BotError;
use crate::domain::entities::{Event, Request};
use crate::domain::traits::{Bot, BotInfo};
use crate::infrastructure::config::ServerConfig;

/// Capacity of the queue between the socket reader and the dispatcher
pub const EVENT_QUEUE_CAPACITY: usize = 100;

struct Connection {
    id: u64,
    peer: SocketAddr,
    tx: mpsc::UnboundedSender<Message>,
}

struct ClientState {
    connection: Mutex<Option<Connection>>,
    next_echo: AtomicI64,
    next_connection: AtomicU64,
    endpoint: String,
}

/// Sends requests over whichever connection is currently active
#[derive(Clone)]
pub struct OneBotClient {
    state: Arc<ClientState>,
}

impl OneBotClient {
    fn new(endpoint: String) -> Self {
        Self {
            state: Arc::new(ClientState {
                connection: Mutex::new(None),
                next_echo: AtomicI64::new(0),
                next_connection: AtomicU64::new(0),
                endpoint,
            }),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state
            .connection
            .lock()
            .map(|c| c.is_some())
            .unwrap_or(false)
    }

    fn attach(&self, peer: SocketAddr, tx: mpsc::UnboundedSender<Message>) -> u64 {
        let id = self.state.next_connection.fetch_add(1, Ordering::Relaxed) + 1;
        if let Ok(mut current) = self.state.connection.lock() {
            if let Some(old) = current.replace(Connection { id, peer, tx }) {
                tracing::info!("[{}] Replaced by new connection from {}", old.peer, peer);
            }
        }
        id
    }

    fn detach(&self, id: u64) {
        if let Ok(mut current) = self.state.connection.lock() {
            if current.as_ref().map(|c| c.id) == Some(id) {
                *current = None;
            }
        }
    }

    fn sender(&self) -> Option<mpsc::UnboundedSender<Message>> {
        self.state
            .connection
            .lock()
            .ok()?
            .as_ref()
            .map(|c| c.tx.clone())
    }

    fn next_echo(&self) -> i64 {
        self.state.next_echo.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[async_trait]
impl Bot for OneBotClient {
    async fn send_request(&self, mut request: Request) -> Result<String, BotError> {
        if request.echo.is_empty() {
            request.echo = self.next_echo().to_string();
        }
        let text = serde_json::to_string(&request).map_err(|e| BotError::Parse(e.to_string()))?;

        let tx = self.sender().ok_or(BotError::NotConnected)?;
        tx.send(Message::Text(text))
            .map_err(|_| BotError::NotConnected)?;
        Ok(request.echo)
    }

    fn peer(&self) -> Option<String> {
        self.state
            .connection
            .lock()
            .ok()?
            .as_ref()
            .map(|c| c.peer.to_string())
    }

    fn bot_info(&self) -> BotInfo {
        BotInfo {
            name: "amadeus-relay".to_string(),
            endpoint: self.state.endpoint.clone(),
        }
    }
}

/// WebSocket server accepting the OneBot client
pub struct OneBotServer {
    config: ServerConfig,
    client: OneBotClient,
    events: mpsc::Sender<Event>,
}

impl OneBotServer {
    /// Create the server and the receiving end of its event queue
    pub fn new(config: ServerConfig) -> (Self, mpsc::Receiver<Event>) {
        let (events, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let endpoint = format!("{}:{}{}", config.host, config.port, config.path);
        let server = Self {
            client: OneBotClient::new(endpoint),
            config,
            events,
        };
        (server, rx)
    }

    pub fn client(&self) -> OneBotClient {
        self.client.clone()
    }

    /// Bind the configured address and serve forever
    pub async fn run(&self) -> Result<(), BotError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| BotError::Network(format!("Failed to bind {}: {}", addr, e)))?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<(), BotError> {
        let local = listener
            .local_addr()
            .map_err(|e| BotError::Network(e.to_string()))?;
        tracing::info!("Server started on {}, path {}", local, self.config.path);

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            tokio::spawn(handle_connection(
                stream,
                peer,
                self.config.path.clone(),
                self.client.clone(),
                self.events.clone(),
            ));
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    path: String,
    client: OneBotClient,
    events: mpsc::Sender<Event>,
) {
    let expected = path.clone();
    let check_path = move |req: &HandshakeRequest,
                           resp: HandshakeResponse|
          -> Result<HandshakeResponse, ErrorResponse> {
        if req.uri().path() == expected {
            return Ok(resp);
        }
        let mut err = ErrorResponse::new(Some(format!(
            "no endpoint at {}",
            req.uri().path()
        )));
        *err.status_mut() = StatusCode::NOT_FOUND;
        Err(err)
    };

    let ws = match tokio_tungstenite::accept_hdr_async(stream, check_path).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!("[{}] WebSocket handshake failed: {}", peer, e);
            return;
        }
    };
    tracing::info!("[{}] Connected to {}", peer, path);

    let (mut write, mut read) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let connection_id = client.attach(peer, tx);

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = write.send(msg).await {
                tracing::warn!("[{}] Send request error: {}", peer, e);
                break;
            }
        }
        let _ = write.close().await;
    });

    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<Event>(&text) {
                Ok(event) => {
                    if events.send(event).await.is_err() {
                        tracing::warn!("[{}] Event queue closed", peer);
                        break;
                    }
                }
                Err(e) => tracing::debug!("[{}] Skipping unparseable frame: {}", peer, e),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("[{}] Read error: {}", peer, e);
                break;
            }
        }
    }

    client.detach(connection_id);
    let _ = writer.await;
    tracing::warn!("[{}] Connection closed", peer);
}
