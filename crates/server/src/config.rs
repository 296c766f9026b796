use anyhow::{Context, Result};
use openpaye_relay_core::storage::{CredentialStore, InMemoryCredentialStore};
use openpaye_relay_mcp::tools::{CreateContractTool, CreateEmployeeTool, ToolRegistry};
use openpaye_relay_mcp::{
    InMemorySessionRegistry, McpServer, OpenPayeClient, OpenPayeConfig, SessionRegistry,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub openpaye: OpenPayeSection,

    #[serde(default)]
    pub sse: SseConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPayeSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SseConfig {
    /// Interval between keep-alive comment frames. Idle sessions are never evicted.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

/// Values given on the command line or through the environment; they win
/// over the configuration file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub openpaye_base_url: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_base_url() -> String {
    openpaye_relay_mcp::client::DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    concat!("openpaye-relay/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_keep_alive_secs() -> u64 {
    15
}

impl Default for OpenPayeSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            openpaye: OpenPayeSection::default(),
            sse: SseConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(config_path: &Path, overrides: ConfigOverrides) -> Result<Self> {
        // Load config file if it exists, otherwise use defaults
        let mut config: Self = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .context("Failed to read configuration file")?;
            toml::from_str(&content).context("Failed to parse configuration file")?
        } else {
            tracing::info!("Configuration file not found, using defaults");
            Self::default()
        };

        if let Some(host) = overrides.host {
            config.host = host;
        }
        if let Some(port) = overrides.port {
            config.port = port;
        }
        if let Some(base_url) = overrides.openpaye_base_url {
            config.openpaye.base_url = base_url;
        }

        anyhow::ensure!(
            config.sse.keep_alive_secs > 0,
            "sse.keep_alive_secs must be at least 1"
        );

        Ok(config)
    }

    /// Address to bind the HTTP listener to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub credentials: Arc<dyn CredentialStore>,
    pub sessions: Arc<dyn SessionRegistry>,
    pub mcp: Arc<McpServer>,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let openpaye_config = OpenPayeConfig::new(&config.openpaye.base_url)
            .context("Invalid OpenPaye base URL")?
            .with_user_agent(config.openpaye.user_agent.clone());
        let openpaye = Arc::new(
            OpenPayeClient::new(openpaye_config).context("Failed to create OpenPaye client")?,
        );

        // Placeholder until credentials move to a database
        let credentials: Arc<dyn CredentialStore> = Arc::new(InMemoryCredentialStore::new());
        let sessions: Arc<dyn SessionRegistry> = Arc::new(InMemorySessionRegistry::new());

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CreateEmployeeTool::new(
            credentials.clone(),
            openpaye.clone(),
        )));
        registry.register(Arc::new(CreateContractTool::new(
            credentials.clone(),
            openpaye,
        )));

        tracing::info!(
            tools = registry.list_schemas().len(),
            openpaye = %config.openpaye.base_url,
            "Registered tools"
        );

        Ok(Self {
            config: Arc::new(config.clone()),
            credentials,
            sessions,
            mcp: Arc::new(McpServer::new(registry)),
        })
    }
}
