use crate::config::{AppState, ServerConfig};
use crate::sse;
use anyhow::Result;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

mod handlers;

/// Start the API server
pub async fn serve(config: ServerConfig) -> Result<()> {
    let state = AppState::new(&config)?;

    let app = create_router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("API server stopped");
    Ok(())
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(liveness))
        // MCP over SSE
        .route("/sse", get(sse::open_stream))
        .route(sse::MESSAGE_PATH, post(sse::post_message))
        // Credential registration
        .route(
            "/connect",
            get(handlers::connect_form).post(handlers::register_credentials),
        )
        // Middleware
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new())
                .on_response(DefaultOnResponse::new()),
        )
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Liveness endpoint
async fn liveness() -> &'static str {
    "OpenPaye MCP relay is running"
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// Reject a request the caller got wrong
pub fn client_error(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::new(error))).into_response()
}

/// Custom error type for API handlers
pub struct ApiError(anyhow::Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_msg = self.0.to_string();
        let details = self.0.chain().skip(1).map(|e| e.to_string()).collect::<Vec<_>>().join(": ");

        tracing::error!("Request failed: {:#}", self.0);

        let response = if details.is_empty() {
            ErrorResponse::new(error_msg)
        } else {
            ErrorResponse::with_details(error_msg, details)
        };

        (StatusCode::INTERNAL_SERVER_ERROR, Json(response)).into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use futures::StreamExt;
    use openpaye_relay_core::ClientId;
    use openpaye_relay_mcp::{open_session, OpenSession};
    use serde_json::json;
    use tower::ServiceExt;
    use wiremock::matchers::{any, body_json, header as header_matcher, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_state(openpaye_base_url: &str) -> AppState {
        let mut config = ServerConfig::default();
        config.openpaye.base_url = openpaye_base_url.to_string();
        AppState::new(&config).unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn register_request(form: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/connect")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .unwrap()
    }

    fn message_request(uri: &str, message: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(message.to_string()))
            .unwrap()
    }

    fn create_employee_call(id: u64, client_id: &str) -> serde_json::Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": {
                "name": "create_employee",
                "arguments": {
                    "client_id": client_id,
                    "employee": {"firstname": "Ada", "lastname": "Lovelace", "email": "ada@example.com"}
                }
            }
        })
    }

    /// Skip the endpoint event and decode the next message event
    async fn next_message(session: &mut OpenSession) -> serde_json::Value {
        loop {
            let event = session.events.recv().await.unwrap();
            if event.name() == "message" {
                return serde_json::from_str(&event.data().unwrap()).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_liveness() {
        let app = create_router(create_state("https://api.example.com"));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "OpenPaye MCP relay is running");
    }

    #[tokio::test]
    async fn test_register_then_tool_call_uses_credentials() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/dossiers/4000/employees"))
            .and(header_matcher("Authorization", "Bearer sk_x"))
            .and(body_json(json!({
                "firstname": "Ada",
                "lastname": "Lovelace",
                "email": "ada@example.com"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "emp_1"})))
            .expect(1)
            .mount(&upstream)
            .await;

        let state = create_state(&upstream.uri());
        let app = create_router(state.clone());

        let response = app
            .clone()
            .oneshot(register_request("client_id=acme&dossier_id=4000&api_key=sk_x"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("acme"));

        let mut session = open_session(state.sessions.clone(), sse::MESSAGE_PATH);
        let endpoint = session.transport.endpoint().to_string();

        let response = app
            .oneshot(message_request(&endpoint, create_employee_call(1, "acme")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let message = next_message(&mut session).await;
        assert_eq!(message["id"], 1);
        assert_eq!(
            message["result"]["structuredContent"],
            json!({"ok": true, "data": {"id": "emp_1"}})
        );
    }

    #[tokio::test]
    async fn test_padded_client_id_matches_registration() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/dossiers/4000/employees"))
            .and(header_matcher("Authorization", "Bearer sk_x"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "emp_1"})))
            .expect(1)
            .mount(&upstream)
            .await;

        let state = create_state(&upstream.uri());
        let app = create_router(state.clone());

        let response = app
            .clone()
            .oneshot(register_request("client_id=+acme+&dossier_id=4000&api_key=sk_x"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut session = open_session(state.sessions.clone(), sse::MESSAGE_PATH);
        let endpoint = session.transport.endpoint().to_string();

        let response = app
            .oneshot(message_request(&endpoint, create_employee_call(1, " acme ")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let message = next_message(&mut session).await;
        assert_eq!(
            message["result"]["structuredContent"],
            json!({"ok": true, "data": {"id": "emp_1"}})
        );
    }

    #[tokio::test]
    async fn test_reregistration_overwrites_credentials() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/dossiers/5000/employees"))
            .and(header_matcher("Authorization", "Bearer sk_new"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "emp_2"})))
            .expect(1)
            .mount(&upstream)
            .await;

        let state = create_state(&upstream.uri());
        let app = create_router(state.clone());

        for form in [
            "client_id=acme&dossier_id=4000&api_key=sk_old",
            "client_id=acme&dossier_id=5000&api_key=sk_new",
        ] {
            let response = app.clone().oneshot(register_request(form)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let credential = state
            .credentials
            .get(&ClientId::new("acme"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(credential.api_key, "sk_new");

        let mut session = open_session(state.sessions.clone(), sse::MESSAGE_PATH);
        let endpoint = session.transport.endpoint().to_string();

        let response = app
            .oneshot(message_request(&endpoint, create_employee_call(2, "acme")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let message = next_message(&mut session).await;
        assert_eq!(message["result"]["structuredContent"]["data"]["id"], "emp_2");
    }

    #[tokio::test]
    async fn test_upstream_error_is_relayed_verbatim() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("invalid email"))
            .mount(&upstream)
            .await;

        let state = create_state(&upstream.uri());
        let app = create_router(state.clone());

        app.clone()
            .oneshot(register_request("client_id=acme&dossier_id=4000&api_key=sk_x"))
            .await
            .unwrap();

        let mut session = open_session(state.sessions.clone(), sse::MESSAGE_PATH);
        let endpoint = session.transport.endpoint().to_string();
        app.oneshot(message_request(&endpoint, create_employee_call(3, "acme")))
            .await
            .unwrap();

        let message = next_message(&mut session).await;
        assert_eq!(
            message["result"]["structuredContent"],
            json!({"ok": false, "error": "OpenPaye 422: invalid email"})
        );
        assert_eq!(message["result"]["isError"], true);
    }

    #[tokio::test]
    async fn test_register_rejects_empty_fields() {
        let state = create_state("https://api.example.com");
        let app = create_router(state.clone());

        let response = app
            .oneshot(register_request("client_id=acme&dossier_id=&api_key=sk_x"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(response).await.contains("dossier_id"));
        assert_eq!(state.credentials.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_connect_form_escapes_client_id() {
        let app = create_router(create_state("https://api.example.com"));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/connect?client_id=%3Cscript%3Ealert(1)%3C%2Fscript%3E")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_string(response).await;
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!html.contains("<script>alert(1)"));
    }

    #[tokio::test]
    async fn test_connect_form_without_client_id() {
        let app = create_router(create_state("https://api.example.com"));

        let response = app
            .oneshot(Request::builder().uri("/connect").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_string(response).await;
        assert!(html.contains(r#"name="client_id" value="""#));
    }

    #[tokio::test]
    async fn test_message_without_session_id() {
        let app = create_router(create_state("https://api.example.com"));

        let response = app
            .oneshot(message_request(
                "/messages",
                json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_message_for_unknown_session_invokes_nothing() {
        let upstream = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&upstream)
            .await;

        let state = create_state(&upstream.uri());
        let app = create_router(state.clone());
        app.clone()
            .oneshot(register_request("client_id=acme&dossier_id=4000&api_key=sk_x"))
            .await
            .unwrap();

        let response = app
            .oneshot(message_request(
                "/messages?sessionId=does-not-exist",
                create_employee_call(1, "acme"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_string(response).await.contains("does-not-exist"));
    }

    #[tokio::test]
    async fn test_session_id_from_headers() {
        let state = create_state("https://api.example.com");
        let app = create_router(state.clone());

        for header_name in ["Mcp-Session-Id", "x-session-id"] {
            let mut session = open_session(state.sessions.clone(), sse::MESSAGE_PATH);
            let session_id = session.transport.session_id().to_string();

            let request = Request::builder()
                .method("POST")
                .uri("/messages")
                .header(header_name, &session_id)
                .body(Body::from(
                    json!({"jsonrpc": "2.0", "id": 5, "method": "ping"}).to_string(),
                ))
                .unwrap();

            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::ACCEPTED, "{}", header_name);

            let message = next_message(&mut session).await;
            assert_eq!(message["id"], 5);
        }
    }

    #[tokio::test]
    async fn test_closed_session_rejects_messages() {
        let state = create_state("https://api.example.com");
        let app = create_router(state.clone());

        let session = open_session(state.sessions.clone(), sse::MESSAGE_PATH);
        let endpoint = session.transport.endpoint().to_string();
        assert_eq!(state.sessions.len(), 1);

        // Connection goes away
        drop(session);
        assert!(state.sessions.is_empty());

        let response = app
            .oneshot(message_request(
                &endpoint,
                json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_json_body() {
        let state = create_state("https://api.example.com");
        let app = create_router(state.clone());
        let session = open_session(state.sessions.clone(), sse::MESSAGE_PATH);

        let request = Request::builder()
            .method("POST")
            .uri(session.transport.endpoint())
            .body(Body::from("{not json"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delivery_on_closed_transport_is_server_error() {
        let state = create_state("https://api.example.com");
        let app = create_router(state.clone());

        let session = open_session(state.sessions.clone(), sse::MESSAGE_PATH);
        let endpoint = session.transport.endpoint().to_string();

        // Stream receiver gone while the registry entry lingers
        let OpenSession {
            transport,
            events,
            guard,
        } = session;
        drop(events);
        std::mem::forget(guard);
        assert!(state.sessions.get(transport.session_id()).is_some());

        let response = app
            .oneshot(message_request(
                &endpoint,
                json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_string(response).await.contains("closed"));
    }

    #[tokio::test]
    async fn test_sse_stream_registers_and_cleans_up_session() {
        let state = create_state("https://api.example.com");
        let app = create_router(state.clone());

        let response = app
            .oneshot(Request::builder().uri("/sse").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );
        assert_eq!(state.sessions.len(), 1);

        // Client disconnects
        drop(response);
        assert!(state.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_sse_stream_starts_with_endpoint_event() {
        let state = create_state("https://api.example.com");
        let app = create_router(state.clone());

        let response = app
            .oneshot(Request::builder().uri("/sse").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let mut body = response.into_body().into_data_stream();

        let mut frame = String::new();
        while !frame.contains("\n\n") {
            let chunk = body.next().await.unwrap().unwrap();
            frame.push_str(std::str::from_utf8(&chunk).unwrap());
        }

        let mut lines = frame.lines();
        assert_eq!(lines.next(), Some("event: endpoint"));
        let data = lines.next().unwrap();
        let session_id = data
            .strip_prefix("data: /messages?sessionId=")
            .unwrap_or_else(|| panic!("unexpected endpoint data: {}", data));

        assert!(state
            .sessions
            .get(&openpaye_relay_mcp::SessionId::new(session_id))
            .is_some());

        drop(body);
        assert!(state.sessions.is_empty());
    }
}
