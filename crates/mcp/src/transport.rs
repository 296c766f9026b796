// SSE transport: one per streaming connection

use crate::protocol::JsonRpcResponse;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Opaque identifier of a streaming session, generated by the transport
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event pushed down the stream to the connected agent
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Where the agent must POST its messages. Always the first event.
    Endpoint(String),
    /// JSON-RPC response to a posted message
    Message(JsonRpcResponse),
}

impl TransportEvent {
    /// SSE `event:` field
    pub fn name(&self) -> &'static str {
        match self {
            Self::Endpoint(_) => "endpoint",
            Self::Message(_) => "message",
        }
    }

    /// SSE `data:` field
    pub fn data(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Endpoint(endpoint) => Ok(endpoint.clone()),
            Self::Message(response) => serde_json::to_string(response),
        }
    }
}

/// Lifecycle of a session: `Open` until closed by either side, then `Closed`
/// for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("session {0} is closed")]
    Closed(SessionId),
}

/// Server side of one SSE connection.
///
/// Holding the only sender of the event channel means closing the transport
/// ends the stream once buffered events are drained.
pub struct SseTransport {
    session_id: SessionId,
    endpoint: String,
    sender: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    torn_down: AtomicBool,
}

impl SseTransport {
    /// Buffered events per session before `send` waits on the agent
    pub const CHANNEL_CAPACITY: usize = 64;

    /// Open a transport whose agent posts to `message_path`. Returns the
    /// receiving end of the event stream with the endpoint event queued.
    pub fn open(message_path: &str) -> (Arc<Self>, mpsc::Receiver<TransportEvent>) {
        let session_id = SessionId::generate();
        let endpoint = format!("{}?sessionId={}", message_path, session_id);
        let (sender, receiver) = mpsc::channel(Self::CHANNEL_CAPACITY);

        // Fresh channel with spare capacity, cannot fail
        let _ = sender.try_send(TransportEvent::Endpoint(endpoint.clone()));

        let transport = Arc::new(Self {
            session_id,
            endpoint,
            sender: Mutex::new(Some(sender)),
            torn_down: AtomicBool::new(false),
        });

        (transport, receiver)
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Message endpoint advertised to the agent
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> SessionState {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match sender.as_ref() {
            Some(sender) if !sender.is_closed() => SessionState::Open,
            _ => SessionState::Closed,
        }
    }

    /// Queue a response for delivery over the stream
    pub async fn send(&self, response: JsonRpcResponse) -> Result<(), TransportError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or_else(|| TransportError::Closed(self.session_id.clone()))?;

        sender
            .send(TransportEvent::Message(response))
            .await
            .map_err(|_| TransportError::Closed(self.session_id.clone()))
    }

    /// Stop accepting events. Fails if the transport was already closed.
    pub fn close(&self) -> Result<(), TransportError> {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .map(drop)
            .ok_or_else(|| TransportError::Closed(self.session_id.clone()))
    }

    /// Claim the right to tear this session down. True for the first caller only.
    pub(crate) fn begin_teardown(&self) -> bool {
        !self.torn_down.swap(true, Ordering::SeqCst)
    }
}

impl std::fmt::Debug for SseTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseTransport")
            .field("session_id", &self.session_id)
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .finish()
    }
}
