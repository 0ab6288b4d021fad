use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;

use crate::{PipeflowError, Result, ShareLock, secret::SecretStore};

/// Secret store backed by a map, for tests and embedding.
#[derive(Clone, Default)]
pub struct MemSecretStore {
    secrets: ShareLock<HashMap<String, String>>,
}

impl MemSecretStore {
    pub fn new() -> Self {
        Self {
            secrets: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert or rotate a secret.
    pub fn insert(
        &self,
        id: impl Into<String>,
        value: impl Into<String>,
    ) {
        if let Ok(mut secrets) = self.secrets.write() {
            secrets.insert(id.into(), value.into());
        }
    }

    pub fn remove(
        &self,
        id: &str,
    ) {
        if let Ok(mut secrets) = self.secrets.write() {
            secrets.remove(id);
        }
    }

    /// Load `id -> value` pairs from a JSON object.
    pub fn from_json(s: &str) -> Result<Self> {
        let values: HashMap<String, String> = serde_json::from_str(s)?;
        Ok(Self {
            secrets: Arc::new(RwLock::new(values)),
        })
    }
}

#[async_trait]
impl SecretStore for MemSecretStore {
    async fn get(
        &self,
        id: &str,
    ) -> Result<Option<String>> {
        let secrets = self.secrets.read().map_err(|e| PipeflowError::Secret(e.to_string()))?;
        Ok(secrets.get(id).cloned())
    }
}

/// Secret store that reads process environment variables.
///
/// A secret id `db-password` with prefix `PIPEFLOW_SECRET_` is looked up as
/// `PIPEFLOW_SECRET_DB_PASSWORD`.
#[derive(Clone, Debug)]
pub struct EnvSecretStore {
    prefix: String,
}

impl Default for EnvSecretStore {
    fn default() -> Self {
        Self::new("PIPEFLOW_SECRET_")
    }
}

impl EnvSecretStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn var_name(
        &self,
        id: &str,
    ) -> String {
        let normalized: String = id.chars().map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' }).collect();
        format!("{}{}", self.prefix, normalized)
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get(
        &self,
        id: &str,
    ) -> Result<Option<String>> {
        Ok(std::env::var(self.var_name(id)).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mem_store_rotation() {
        let store = MemSecretStore::new();
        store.insert("a", "1");
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
        store.insert("a", "2");
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("2"));
        store.remove("a");
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mem_store_from_json() {
        let store = MemSecretStore::from_json(r#"{"secret-1": "abc"}"#).unwrap();
        assert_eq!(store.get("secret-1").await.unwrap().as_deref(), Some("abc"));
        assert!(MemSecretStore::from_json("[1]").is_err());
    }

    #[tokio::test]
    async fn test_env_store_var_name() {
        let store = EnvSecretStore::new("PIPEFLOW_TEST_SECRET_");
        assert_eq!(store.var_name("rapid-api.key"), "PIPEFLOW_TEST_SECRET_RAPID_API_KEY");
        assert_eq!(store.get("definitely-unset-id").await.unwrap(), None);
    }
}
