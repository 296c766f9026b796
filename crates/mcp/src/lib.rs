// MCP (Model Context Protocol) server implementation
// Exposes the OpenPaye payroll tools to agents over HTTP + SSE

pub mod client;
pub mod protocol;
pub mod server;
pub mod session;
pub mod tools;
pub mod transport;

pub use client::{OpenPayeClient, OpenPayeConfig, OpenPayeError};
pub use server::McpServer;
pub use session::{open_session, InMemorySessionRegistry, OpenSession, SessionRegistry};
pub use transport::{SessionId, SseTransport, TransportError, TransportEvent};
