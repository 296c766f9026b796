use crate::types::{ClientId, Credential};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::RwLock;

/// Credential storage abstraction.
///
/// Keys are client ids chosen by whoever registers; a second `set` for the
/// same client replaces the first without conflict detection.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up the access registered for a client
    async fn get(&self, client_id: &ClientId) -> Result<Option<Credential>>;

    /// Store (or overwrite) the access for `credential.client_id`
    async fn set(&self, credential: Credential) -> Result<()>;

    /// Forget a client, returning the removed record
    async fn delete(&self, client_id: &ClientId) -> Result<Option<Credential>>;

    /// Number of registered clients
    async fn len(&self) -> Result<usize>;
}

/// Process-local credential store. Nothing survives a restart; this stands in
/// until a database-backed store exists.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    credentials: RwLock<HashMap<ClientId, Credential>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get(&self, client_id: &ClientId) -> Result<Option<Credential>> {
        let credentials = self
            .credentials
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(credentials.get(client_id).cloned())
    }

    async fn set(&self, credential: Credential) -> Result<()> {
        let client_id = credential.client_id.clone();
        let fingerprint = credential.key_fingerprint();
        let dossier_id = credential.dossier_id.clone();

        let previous = self
            .credentials
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(client_id.clone(), credential);

        tracing::info!(
            client_id = %client_id,
            dossier_id = %dossier_id,
            key_fingerprint = %fingerprint,
            replaced = previous.is_some(),
            "Stored OpenPaye credential"
        );

        Ok(())
    }

    async fn delete(&self, client_id: &ClientId) -> Result<Option<Credential>> {
        let removed = self
            .credentials
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(client_id);

        if removed.is_some() {
            tracing::info!(client_id = %client_id, "Deleted OpenPaye credential");
        }

        Ok(removed)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self
            .credentials
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len())
    }
}
