//! Just-in-time secret resolution.
//!
//! Nodes only carry opaque references (`logical name -> secret id`). Right
//! before a node attempt runs, the dispatcher asks the [`SecretResolver`] to
//! turn those references into values. Nothing is cached between nodes or
//! attempts, so a rotated secret is picked up by the next attempt.

mod store;

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};

use async_trait::async_trait;
use tracing::trace;

use crate::{NodeError, Result};

pub use store::{EnvSecretStore, MemSecretStore};

/// Backend that owns secret values.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Look up a secret by id. `Ok(None)` means the id is unknown.
    async fn get(
        &self,
        id: &str,
    ) -> Result<Option<String>>;
}

/// Resolved secrets for one node attempt, keyed by logical name.
///
/// `Debug` never prints values.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secrets {
    values: HashMap<String, String>,
}

impl Secrets {
    pub fn get(
        &self,
        name: &str,
    ) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Secrets {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl fmt::Debug for Secrets {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let mut names: Vec<&String> = self.values.keys().collect();
        names.sort();
        f.debug_map().entries(names.into_iter().map(|k| (k, "<redacted>"))).finish()
    }
}

/// Resolves a node's secret references against a [`SecretStore`].
#[derive(Clone)]
pub struct SecretResolver {
    store: Arc<dyn SecretStore>,
}

impl SecretResolver {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self {
            store,
        }
    }

    /// Resolve every reference or fail closed.
    ///
    /// An unknown id fails with [`NodeError::MissingSecret`] naming the
    /// logical key. A failing backend is reported as a retryable execution
    /// error.
    pub async fn resolve(
        &self,
        refs: &BTreeMap<String, String>,
    ) -> std::result::Result<Secrets, NodeError> {
        let mut values = HashMap::with_capacity(refs.len());
        for (name, id) in refs {
            trace!("secret::resolve({})", name);
            match self.store.get(id).await {
                Ok(Some(value)) => {
                    values.insert(name.clone(), value);
                }
                Ok(None) => {
                    return Err(NodeError::MissingSecret {
                        key: name.clone(),
                    });
                }
                Err(err) => return Err(NodeError::execution(format!("secret store error for '{}': {}", name, err))),
            }
        }
        Ok(Secrets {
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::PipeflowError;

    struct FailingStore;

    #[async_trait]
    impl SecretStore for FailingStore {
        async fn get(
            &self,
            _id: &str,
        ) -> Result<Option<String>> {
            Err(PipeflowError::Secret("vault sealed".into()))
        }
    }

    struct CountingStore {
        inner: MemSecretStore,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SecretStore for CountingStore {
        async fn get(
            &self,
            id: &str,
        ) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.get(id).await
        }
    }

    fn refs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[tokio::test]
    async fn test_resolve_all() {
        let store = MemSecretStore::new();
        store.insert("secret-1", "abc");
        store.insert("secret-2", "");
        let resolver = SecretResolver::new(Arc::new(store));

        let secrets = resolver.resolve(&refs(&[("apiKey", "secret-1"), ("empty", "secret-2")])).await.unwrap();
        assert_eq!(secrets.get("apiKey"), Some("abc"));
        assert_eq!(secrets.get("empty"), Some(""));
        assert_eq!(secrets.len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_missing_names_logical_key() {
        let store = MemSecretStore::new();
        store.insert("secret-1", "abc");
        let resolver = SecretResolver::new(Arc::new(store));

        let err = resolver.resolve(&refs(&[("apiKey", "secret-1"), ("dbPassword", "nope")])).await.unwrap_err();
        assert_eq!(
            err,
            NodeError::MissingSecret {
                key: "dbPassword".into()
            }
        );
    }

    #[tokio::test]
    async fn test_resolve_store_failure_is_retryable() {
        let resolver = SecretResolver::new(Arc::new(FailingStore));
        let err = resolver.resolve(&refs(&[("apiKey", "x")])).await.unwrap_err();
        assert!(matches!(err, NodeError::Execution { .. }));
        assert!(err.is_retryable(false));
    }

    #[tokio::test]
    async fn test_resolve_never_caches() {
        let inner = MemSecretStore::new();
        inner.insert("s", "v1");
        let store = Arc::new(CountingStore {
            inner,
            calls: AtomicUsize::new(0),
        });
        let resolver = SecretResolver::new(store.clone());

        resolver.resolve(&refs(&[("k", "s")])).await.unwrap();
        store.inner.insert("s", "v2");
        let secrets = resolver.resolve(&refs(&[("k", "s")])).await.unwrap();

        assert_eq!(secrets.get("k"), Some("v2"));
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_debug_redacts_values() {
        let secrets: Secrets = [("apiKey", "super-secret")].into_iter().collect();
        let printed = format!("{:?}", secrets);
        assert!(printed.contains("apiKey"));
        assert!(!printed.contains("super-secret"));
    }
}
