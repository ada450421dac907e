use std::sync::Arc;

use nimbus_provider::ProviderClient;
use nimbus_store::Store;

use crate::waiter::{AsyncWaiter, ResourceWaiter};

/// Shared handles a reconciliation step needs: the provider, the
/// persistence store, and the two waiter flavors. Cloned cheaply per job —
/// `Store` wraps a connection pool and `ProviderClient` is behind an `Arc`.
#[derive(Clone)]
pub struct EngineContext {
    pub provider: Arc<dyn ProviderClient>,
    pub store: Store,
    pub async_waiter: Arc<AsyncWaiter>,
    pub resource_waiter: Arc<ResourceWaiter>,
}

impl EngineContext {
    pub fn new(provider: Arc<dyn ProviderClient>, store: Store) -> Self {
        Self {
            provider,
            store,
            async_waiter: Arc::new(AsyncWaiter::default()),
            resource_waiter: Arc::new(ResourceWaiter::default()),
        }
    }
}
