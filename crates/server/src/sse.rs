use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures::Stream;
use openpaye_relay_mcp::{open_session, OpenSession, SessionId};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use crate::api::{client_error, ApiResult};
use crate::config::AppState;

/// Route agents POST their JSON-RPC messages to
pub const MESSAGE_PATH: &str = "/messages";

/// Headers checked, in order, when the query carries no session id
const SESSION_HEADERS: [&str; 2] = ["mcp-session-id", "x-session-id"];

/// Open a streaming session. The first event tells the agent where to post.
pub async fn open_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let OpenSession { events, guard, .. } = open_session(state.sessions.clone(), MESSAGE_PATH);

    let stream = async_stream::stream! {
        // Dropped with the stream, which tears the session down
        let _guard = guard;
        let mut events = events;

        while let Some(event) = events.recv().await {
            match event.data() {
                Ok(data) => yield Ok::<Event, Infallible>(Event::default().event(event.name()).data(data)),
                Err(e) => tracing::error!("Failed to encode SSE event: {}", e),
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new().interval(Duration::from_secs(state.config.sse.keep_alive_secs)),
    )
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// Session id from the `sessionId` query parameter, else from the headers
fn resolve_session_id(query: &MessageQuery, headers: &HeaderMap) -> Option<SessionId> {
    let from_headers = || {
        SESSION_HEADERS
            .iter()
            .filter_map(|name| headers.get(*name))
            .filter_map(|value| value.to_str().ok())
            .map(str::trim)
            .find(|value| !value.is_empty())
            .map(str::to_string)
    };

    query
        .session_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .or_else(from_headers)
        .map(SessionId::new)
}

/// Deliver a posted message to its session; the reply travels over the stream
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MessageQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let Some(session_id) = resolve_session_id(&query, &headers) else {
        return Ok(client_error(StatusCode::BAD_REQUEST, "missing session id"));
    };

    let Some(transport) = state.sessions.get(&session_id) else {
        tracing::debug!(session_id = %session_id, "Message for unknown session");
        return Ok(client_error(
            StatusCode::NOT_FOUND,
            format!("unknown session: {}", session_id),
        ));
    };

    let message: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(e) => {
            return Ok(client_error(
                StatusCode::BAD_REQUEST,
                format!("invalid JSON-RPC message: {}", e),
            ))
        }
    };

    state.mcp.serve_message(&transport, message).await?;

    Ok((StatusCode::ACCEPTED, "Accepted").into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn query(session_id: Option<&str>) -> MessageQuery {
        MessageQuery {
            session_id: session_id.map(str::to_string),
        }
    }

    #[test]
    fn test_query_parameter_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("mcp-session-id", HeaderValue::from_static("from-header"));

        let id = resolve_session_id(&query(Some("from-query")), &headers).unwrap();
        assert_eq!(id.as_str(), "from-query");
    }

    #[test]
    fn test_header_order() {
        let mut headers = HeaderMap::new();
        headers.insert("x-session-id", HeaderValue::from_static("second"));
        assert_eq!(
            resolve_session_id(&query(None), &headers).unwrap().as_str(),
            "second"
        );

        headers.insert("mcp-session-id", HeaderValue::from_static("first"));
        assert_eq!(
            resolve_session_id(&query(None), &headers).unwrap().as_str(),
            "first"
        );
    }

    #[test]
    fn test_blank_values_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("mcp-session-id", HeaderValue::from_static(" "));

        assert!(resolve_session_id(&query(Some("")), &headers).is_none());
    }
}
