use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identifier a calling agent uses to select its stored OpenPaye access
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// OpenPaye account (tenant) that scopes every upstream call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DossierId(pub String);

impl DossierId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DossierId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stored OpenPaye access for one client
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub client_id: ClientId,
    pub dossier_id: DossierId,
    /// Bearer token sent to OpenPaye. Never logged.
    pub api_key: String,
    pub registered_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(
        client_id: impl Into<String>,
        dossier_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client_id: ClientId::new(client_id),
            dossier_id: DossierId::new(dossier_id),
            api_key: api_key.into(),
            registered_at: Utc::now(),
        }
    }

    /// Short SHA-256 fingerprint of the API key, safe to log
    pub fn key_fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.api_key.as_bytes());
        let digest = hex::encode(hasher.finalize());
        digest[..12].to_string()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("client_id", &self.client_id)
            .field("dossier_id", &self.dossier_id)
            .field("api_key", &"<redacted>")
            .field("registered_at", &self.registered_at)
            .finish()
    }
}

/// Uniform result of every tool invocation.
///
/// `ok` is the discriminant: successful envelopes carry `data`, failed ones
/// carry `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    pub fn success(data: serde_json::Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn from_result<E: std::fmt::Display>(result: Result<serde_json::Value, E>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(e) => Self::failure(e.to_string()),
        }
    }

    /// JSON schema describing the envelope, used as every tool's output schema
    pub fn json_schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "ok": { "type": "boolean" },
                "data": { "description": "Parsed OpenPaye response body on success" },
                "error": { "type": "string" }
            },
            "required": ["ok"]
        })
    }
}
