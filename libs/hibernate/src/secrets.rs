//! Secret-store boundary.
//!
//! Credential material reaches actuators only through this interface.
//! Real backends live with the surrounding orchestrator; this crate
//! ships the contract plus an in-memory store for tests and local
//! tooling.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::cluster::SecretRef;

/// Secret store errors.
#[derive(Debug, Error)]
pub enum SecretStoreError {
    /// The named secret does not exist. Retrying cannot help until an
    /// operator creates it.
    #[error("secret '{name}' not found")]
    NotFound { name: String },

    /// The backend failed to answer. Usually transient.
    #[error("secret backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// An opaque secret document: named entries of raw bytes.
///
/// Entries stay sorted by name so [`SecretDocument::data_hash`] is
/// deterministic regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretDocument {
    entries: BTreeMap<String, Vec<u8>>,
}

impl SecretDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from an iterator of entries.
    pub fn from_entries<I, K, V>(iter: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Vec<u8>>,
    {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Insert an entry, returning the previous value if the key existed.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Option<Vec<u8>> {
        self.entries.insert(key.into(), value.into())
    }

    /// Get an entry's bytes.
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(|v| v.as_slice())
    }

    /// Whether an entry exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterate over entries in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Entry names in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the document has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// SHA-256 fingerprint over the sorted entries.
    ///
    /// Safe to log: it identifies the material without revealing it.
    pub fn data_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for (key, value) in &self.entries {
            hasher.update(key.as_bytes());
            hasher.update([0u8]);
            hasher.update(value);
            hasher.update([0u8]);
        }
        format!("sha256:{}", hex::encode(hasher.finalize()))
    }
}

/// Read-only access to named secrets.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the document behind `secret_ref`.
    async fn fetch(&self, secret_ref: &SecretRef) -> Result<SecretDocument, SecretStoreError>;
}

/// In-memory secret store for tests and local tooling.
#[derive(Default)]
pub struct InMemorySecretStore {
    secrets: RwLock<BTreeMap<String, SecretDocument>>,
}

impl InMemorySecretStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a named secret.
    pub async fn put(&self, name: impl Into<String>, document: SecretDocument) {
        self.secrets.write().await.insert(name.into(), document);
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn fetch(&self, secret_ref: &SecretRef) -> Result<SecretDocument, SecretStoreError> {
        self.secrets
            .read()
            .await
            .get(&secret_ref.name)
            .cloned()
            .ok_or_else(|| SecretStoreError::NotFound {
                name: secret_ref.name.clone(),
            })
    }
}
