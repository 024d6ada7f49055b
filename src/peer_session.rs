//! Owns one TCP connection to a peer and drives it through the handshake
//! state machine. Each worker owns exactly one `PeerSession` exclusively —
//! no sharing, no locking here.

use std::time::Duration;

use rand::RngCore;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::addr_key::Endpoint;
use crate::error::SessionError;
use crate::wire::types::{NetAddrNoTime, MAGIC_MAINNET, PROTOCOL_VERSION};
use crate::wire::{read_frame, write_frame, Message, VersionPayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    New,
    Connected,
    Handshaked,
    Closed,
}

/// One peer connection, from dial to disconnect.
pub struct PeerSession {
    pub remote_endpoint: Endpoint,
    stream: Option<TcpStream>,
    state: SessionState,
    user_agent: String,
    read_timeout: Duration,
    sent_nonce: u64,
    pub negotiated_protocol_version: i32,
    pub remote_user_agent: String,
    pub remote_services: u64,
}

impl PeerSession {
    pub fn new(remote_endpoint: Endpoint, user_agent: String, read_timeout: Duration) -> Self {
        Self {
            remote_endpoint,
            stream: None,
            state: SessionState::New,
            user_agent,
            read_timeout,
            sent_nonce: 0,
            negotiated_protocol_version: 0,
            remote_user_agent: String::new(),
            remote_services: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Opens the TCP connection with a deadline. `AlreadyConnected` if
    /// called a second time.
    pub async fn connect(&mut self, connect_timeout: Duration) -> Result<(), SessionError> {
        if self.state != SessionState::New {
            return Err(SessionError::AlreadyConnected);
        }
        let stream = timeout(connect_timeout, TcpStream::connect(self.remote_endpoint.as_str()))
            .await
            .map_err(|_| SessionError::ConnectTimeout(connect_timeout))?
            .map_err(SessionError::ConnectFailed)?;
        self.stream = Some(stream);
        self.state = SessionState::Connected;
        Ok(())
    }

    /// Sends `version` with a freshly-generated nonce, reads the remote
    /// `version`, then sends `verack`. Negotiates `min(local, remote)` as
    /// the protocol version. Does not check the nonce for self-connection:
    /// this crawler never accepts inbound connections, so that check would
    /// be dead code here.
    pub async fn handshake(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Connected {
            return Err(SessionError::HandshakeFailed("not connected".to_string()));
        }

        self.sent_nonce = rand::thread_rng().next_u64();
        let version = Message::Version(VersionPayload {
            version: PROTOCOL_VERSION,
            services: 0,
            timestamp: now_unix(),
            addr_recv: NetAddrNoTime::unroutable(),
            addr_from: NetAddrNoTime::unroutable(),
            nonce: self.sent_nonce,
            user_agent: self.user_agent.clone(),
            start_height: 0,
            relay: false,
        });
        self.write_raw(&version).await.map_err(|e| {
            self.state = SessionState::Closed;
            SessionError::HandshakeFailed(e.to_string())
        })?;

        let remote_version = match self.read_raw().await {
            Ok(Message::Version(v)) => v,
            Ok(other) => {
                self.state = SessionState::Closed;
                return Err(SessionError::HandshakeFailed(format!(
                    "expected version, got {}",
                    other.command()
                )));
            }
            Err(e) => {
                self.state = SessionState::Closed;
                return Err(SessionError::HandshakeFailed(e.to_string()));
            }
        };

        self.negotiated_protocol_version = PROTOCOL_VERSION.min(remote_version.version);
        self.remote_user_agent = remote_version.user_agent;
        self.remote_services = remote_version.services;

        self.write_raw(&Message::Verack).await.map_err(|e| {
            self.state = SessionState::Closed;
            SessionError::HandshakeFailed(e.to_string())
        })?;

        self.state = SessionState::Handshaked;
        Ok(())
    }

    /// Writes a message using the negotiated session. Only `version` may be
    /// written before `HANDSHAKED`.
    pub async fn write(&mut self, msg: &Message) -> Result<(), SessionError> {
        if self.state != SessionState::Handshaked {
            return Err(SessionError::NotHandshaked);
        }
        self.write_raw(msg).await
    }

    /// Reads one message, bounded by the configured read timeout so a
    /// silent peer can't pin a worker's concurrency permit forever.
    pub async fn read(&mut self) -> Result<Message, SessionError> {
        if self.state != SessionState::Handshaked {
            return Err(SessionError::NotHandshaked);
        }
        match timeout(self.read_timeout, self.read_raw()).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::ReadTimeout(self.read_timeout)),
        }
    }

    /// Closes the connection. Idempotent.
    pub fn disconnect(&mut self) {
        self.stream = None;
        self.state = SessionState::Closed;
    }

    async fn write_raw(&mut self, msg: &Message) -> Result<(), SessionError> {
        let stream = self.stream.as_mut().ok_or(SessionError::NotHandshaked)?;
        write_frame(stream, MAGIC_MAINNET, msg.command(), &msg.encode())
            .await
            .map_err(SessionError::from)
    }

    async fn read_raw(&mut self) -> Result<Message, SessionError> {
        let stream = self.stream.as_mut().ok_or(SessionError::NotHandshaked)?;
        let frame = read_frame(stream, MAGIC_MAINNET).await?;
        debug!(peer = %self.remote_endpoint, command = %frame.command, "received message");
        Ok(Message::decode(&frame.command, &frame.payload)?)
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
