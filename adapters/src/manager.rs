//! Adapter manager (registry of upstream adapters)

use crate::{
    adapter::ApiAdapter, config::ManagerConfig, transport::ReqwestTransport, types::*, Error,
    Result,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Adapter manager
///
/// Holds one [`ApiAdapter`] per upstream. Adapters never share breaker or
/// limiter state; the manager only routes calls by name.
#[derive(Default)]
pub struct AdapterManager {
    /// Adapters by upstream name
    adapters: RwLock<HashMap<String, Arc<ApiAdapter>>>,
}

impl AdapterManager {
    /// Create empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one reqwest-backed adapter per configured upstream
    ///
    /// All adapters share one HTTP connection pool.
    pub async fn from_config(config: ManagerConfig) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new()?);
        let manager = Self::new();

        for (name, upstream) in config.upstreams {
            let adapter_config = upstream.into_adapter_config(&name)?;
            let adapter = ApiAdapter::new(adapter_config, transport.clone())?;
            manager.register(adapter).await;
        }

        Ok(manager)
    }

    /// Register adapter (replaces any adapter with the same name)
    pub async fn register(&self, adapter: ApiAdapter) -> Arc<ApiAdapter> {
        let adapter = Arc::new(adapter);
        let mut adapters = self.adapters.write().await;
        if adapters
            .insert(adapter.name().to_string(), adapter.clone())
            .is_some()
        {
            info!("Replaced adapter {}", adapter.name());
        } else {
            info!("Registered adapter {}", adapter.name());
        }
        adapter
    }

    /// Get adapter by name
    pub async fn get(&self, name: &str) -> Result<Arc<ApiAdapter>> {
        let adapters = self.adapters.read().await;
        adapters
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownAdapter(name.to_string()))
    }

    /// Registered adapter names, sorted
    pub async fn names(&self) -> Vec<String> {
        let adapters = self.adapters.read().await;
        let mut names: Vec<String> = adapters.keys().cloned().collect();
        names.sort();
        names
    }

    /// Execute request through the named adapter
    pub async fn execute(
        &self,
        name: &str,
        request: &mut RequestDescriptor,
    ) -> Result<TransportResponse> {
        // Registry lock is released before the call suspends
        let adapter = self.get(name).await?;
        adapter.execute(request).await
    }

    /// Execute request through the named adapter with cancellation
    pub async fn execute_with_cancel(
        &self,
        name: &str,
        request: &mut RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<TransportResponse> {
        let adapter = self.get(name).await?;
        adapter.execute_with_cancel(request, cancel).await
    }

    /// Get adapter health
    pub async fn get_health(&self, name: &str) -> Result<AdapterHealth> {
        Ok(self.get(name).await?.health())
    }

    /// Health of every adapter, sorted by name
    pub async fn health_all(&self) -> Vec<AdapterHealth> {
        let adapters = self.adapters.read().await;
        let mut health: Vec<AdapterHealth> = adapters.values().map(|a| a.health()).collect();
        health.sort_by(|a, b| a.adapter.cmp(&b.adapter));
        health
    }

    /// Reset the named adapter's circuit breaker
    pub async fn reset_circuit(&self, name: &str) -> Result<()> {
        self.get(name).await?.reset_circuit();
        Ok(())
    }
}
