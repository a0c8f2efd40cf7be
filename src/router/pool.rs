//! Per-provider client pool.
//!
//! The pool is the explicit owner of live provider connections, keyed by
//! provider id. Clients are created lazily on first use and replaced when a
//! provider's transport parameters change between turns. Turn correctness
//! never depends on a pooled client surviving: an evicted or respawned
//! client behaves the same as a fresh one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::registry::ToolProvider;
use crate::transport::{self, TransportClient, TransportError, TransportParams, TransportSettings};

// ─── Factory ─────────────────────────────────────────────────────────────────

/// Builds a transport client for a provider record.
pub trait ClientFactory: Send + Sync {
    fn create(&self, provider: &ToolProvider) -> Result<Arc<dyn TransportClient>, TransportError>;
}

/// Factory producing real wire clients via [`transport::connect`].
pub struct WireClientFactory {
    settings: TransportSettings,
}

impl WireClientFactory {
    pub fn new(settings: TransportSettings) -> Self {
        Self { settings }
    }
}

impl ClientFactory for WireClientFactory {
    fn create(&self, provider: &ToolProvider) -> Result<Arc<dyn TransportClient>, TransportError> {
        transport::connect(&provider.id, &provider.transport, &self.settings)
    }
}

// ─── ClientPool ──────────────────────────────────────────────────────────────

struct PoolEntry {
    params: TransportParams,
    client: Arc<dyn TransportClient>,
}

/// Registry of owned transport clients keyed by provider id.
pub struct ClientPool {
    factory: Arc<dyn ClientFactory>,
    clients: Mutex<HashMap<String, PoolEntry>>,
}

impl ClientPool {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Return the pooled client for `provider`, creating it if needed.
    ///
    /// A pooled client whose transport parameters differ from the current
    /// record is replaced; the stale one is shut down in the background.
    pub fn get_or_create(
        &self,
        provider: &ToolProvider,
    ) -> Result<Arc<dyn TransportClient>, TransportError> {
        let (client, stale) = {
            let mut clients = self.lock();
            if let Some(entry) = clients.get(&provider.id) {
                if entry.params == provider.transport {
                    return Ok(entry.client.clone());
                }
            }

            let client = self.factory.create(provider)?;
            tracing::debug!(
                provider = %provider.id,
                transport = %provider.kind(),
                "created transport client"
            );
            let old = clients.insert(
                provider.id.clone(),
                PoolEntry {
                    params: provider.transport.clone(),
                    client: client.clone(),
                },
            );
            (client, old.map(|e| e.client))
        };

        if let Some(old) = stale {
            tracing::info!(
                provider = %provider.id,
                "transport parameters changed, replacing client"
            );
            tokio::spawn(async move { old.shutdown().await });
        }
        Ok(client)
    }

    /// The pooled client for `provider_id`, if any.
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn TransportClient>> {
        self.lock().get(provider_id).map(|e| e.client.clone())
    }

    /// Drop and shut down the client for `provider_id`. Returns whether one
    /// was pooled.
    pub async fn evict(&self, provider_id: &str) -> bool {
        let removed = self.lock().remove(provider_id);
        match removed {
            Some(entry) => {
                tracing::info!(provider = %provider_id, "evicting transport client");
                entry.client.shutdown().await;
                true
            }
            None => false,
        }
    }

    /// Shut down every pooled client.
    pub async fn shutdown_all(&self) {
        let entries: Vec<(String, PoolEntry)> = self.lock().drain().collect();
        let count = entries.len();
        futures::future::join_all(entries.into_iter().map(|(_, e)| async move {
            e.client.shutdown().await;
        }))
        .await;
        if count > 0 {
            tracing::info!(count, "shut down all transport clients");
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PoolEntry>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
