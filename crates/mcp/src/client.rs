//! HTTP client for the OpenPaye payroll API.
//!
//! One request per call: no retries, no timeout override, no idempotency key.

use openpaye_relay_core::payroll::{Contract, Employee};
use openpaye_relay_core::Credential;
use reqwest::{header, Client};
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

/// Default OpenPaye API root
pub const DEFAULT_BASE_URL: &str = "https://api.openpaye.co";

/// Result type for OpenPaye calls.
pub type OpenPayeResult<T> = Result<T, OpenPayeError>;

/// Errors returned by [`OpenPayeClient`].
///
/// Display output is what ends up in a failed envelope's `error` field.
#[derive(Debug, thiserror::Error)]
pub enum OpenPayeError {
    /// OpenPaye answered with a non-2xx status.
    #[error("OpenPaye {status}: {body}")]
    Api { status: u16, body: String },

    /// The request could not be sent or the body could not be read.
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    /// 2xx response whose body is not JSON.
    #[error("invalid JSON in OpenPaye response: {0}")]
    Json(#[from] serde_json::Error),

    /// Base URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Configuration for the OpenPaye client.
#[derive(Debug, Clone)]
pub struct OpenPayeConfig {
    /// API root; dossier paths are appended to it.
    pub base_url: Url,
    /// User-Agent sent with every request.
    pub user_agent: String,
}

impl OpenPayeConfig {
    pub fn new(base_url: &str) -> OpenPayeResult<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(OpenPayeError::Config(format!(
                "OpenPaye base URL cannot carry paths: {}",
                base_url
            )));
        }

        Ok(Self {
            base_url,
            user_agent: concat!("openpaye-relay/", env!("CARGO_PKG_VERSION")).to_string(),
        })
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Thin OpenPaye API client. Credentials are supplied per call since every
/// client of the relay brings its own dossier and key.
#[derive(Debug, Clone)]
pub struct OpenPayeClient {
    client: Client,
    base_url: Url,
}

impl OpenPayeClient {
    pub fn new(config: OpenPayeConfig) -> OpenPayeResult<Self> {
        let client = Client::builder().user_agent(config.user_agent).build()?;

        Ok(Self {
            client,
            base_url: config.base_url,
        })
    }

    /// Build an endpoint URL from path segments, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> OpenPayeResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| OpenPayeError::Config("OpenPaye base URL cannot carry paths".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// `POST dossiers/{dossier_id}/employees`
    pub async fn create_employee(
        &self,
        credential: &Credential,
        employee: &Employee,
    ) -> OpenPayeResult<serde_json::Value> {
        let url = self.endpoint(&["dossiers", credential.dossier_id.as_str(), "employees"])?;
        self.post(url, &credential.api_key, employee).await
    }

    /// `POST dossiers/{dossier_id}/employees/{employee_id}/contracts`
    pub async fn create_contract(
        &self,
        credential: &Credential,
        employee_id: &str,
        contract: &Contract,
    ) -> OpenPayeResult<serde_json::Value> {
        let url = self.endpoint(&[
            "dossiers",
            credential.dossier_id.as_str(),
            "employees",
            employee_id,
            "contracts",
        ])?;
        self.post(url, &credential.api_key, contract).await
    }

    async fn post<B: Serialize>(
        &self,
        url: Url,
        api_key: &str,
        body: &B,
    ) -> OpenPayeResult<serde_json::Value> {
        debug!(url = %url, "POST request");

        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .header(header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "OpenPaye rejected request");
            return Err(OpenPayeError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }

        Ok(serde_json::from_str(&text)?)
    }
}
