// MCP server: turns posted JSON-RPC messages into responses on a session's stream

use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, ServerCapabilities, ServerInfo,
    ToolsCapability, PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS,
};
use crate::tools::ToolRegistry;
use crate::transport::{SseTransport, TransportError};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub struct McpServer {
    registry: ToolRegistry,
    server_info: ServerInfo,
}

impl McpServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            server_info: ServerInfo {
                name: "openpaye-relay".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    /// Handle one posted message and queue the response, if any, on the
    /// session's stream.
    pub async fn serve_message(
        &self,
        transport: &SseTransport,
        message: serde_json::Value,
    ) -> Result<(), TransportError> {
        if let Some(response) = self.handle_message(message).await {
            transport.send(response).await?;
        }
        Ok(())
    }

    /// Handle a raw JSON-RPC message. Notifications and client responses
    /// produce nothing.
    pub async fn handle_message(&self, message: serde_json::Value) -> Option<JsonRpcResponse> {
        if message.is_array() {
            return Some(JsonRpcResponse::error(
                serde_json::Value::Null,
                JsonRpcError::invalid_request("batch messages are not supported"),
            ));
        }

        let id = message.get("id").cloned().unwrap_or(serde_json::Value::Null);

        // Responses to server-initiated requests; we never send any
        if message.get("method").is_none()
            && (message.get("result").is_some() || message.get("error").is_some())
        {
            tracing::debug!("Ignoring JSON-RPC response from client");
            return None;
        }

        let request: JsonRpcRequest = match serde_json::from_value(message) {
            Ok(request) => request,
            Err(e) => {
                return Some(JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_request(e.to_string()),
                ))
            }
        };

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                id,
                JsonRpcError::invalid_request("jsonrpc must be \"2.0\""),
            ));
        }

        self.handle_request(request).await
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            tracing::debug!(method = %request.method, "Received notification");
            return None;
        }
        let id = request.id.unwrap_or_default();

        let result = match request.method.as_str() {
            "initialize" => self.initialize(request.params),
            "ping" => Ok(serde_json::json!({})),
            "tools/list" => to_result(&ListToolsResult {
                tools: self.registry.list_schemas(),
            }),
            "tools/call" => self.call_tool(request.params).await,
            method => Err(JsonRpcError::method_not_found(method)),
        };

        Some(match result {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error),
        })
    }

    fn initialize(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let params: InitializeParams = parse_params(params)?;

        tracing::info!(
            client = %params.client_info.name,
            client_version = %params.client_info.version,
            protocol_version = %params.protocol_version,
            "Client initialized"
        );

        let protocol_version = if SUPPORTED_PROTOCOL_VERSIONS.contains(&params.protocol_version.as_str()) {
            params.protocol_version
        } else {
            PROTOCOL_VERSION.to_string()
        };

        to_result(&InitializeResult {
            protocol_version,
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: self.server_info.clone(),
        })
    }

    async fn call_tool(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let params: CallToolParams = parse_params(params)?;

        let tool = self
            .registry
            .get(&params.name)
            .ok_or_else(|| JsonRpcError::invalid_params(format!("Unknown tool: {}", params.name)))?;

        tracing::info!(tool = %params.name, "Calling tool");

        let envelope = tool.execute(params.arguments).await.map_err(|e| {
            tracing::info!(tool = %params.name, "Rejected tool arguments: {}", e);
            JsonRpcError::invalid_params(e.to_string())
        })?;

        if !envelope.ok {
            tracing::warn!(
                tool = %params.name,
                error = envelope.error.as_deref().unwrap_or_default(),
                "Tool call failed"
            );
        }

        let result = CallToolResult::from_envelope(&envelope)
            .map_err(|e| JsonRpcError::internal_error(e.to_string()))?;
        to_result(&result)
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<serde_json::Value>) -> Result<T, JsonRpcError> {
    let params = params.unwrap_or(serde_json::Value::Null);
    serde_json::from_value(params).map_err(|e| JsonRpcError::invalid_params(e.to_string()))
}

fn to_result<T: Serialize>(value: &T) -> Result<serde_json::Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}
