use lorelai_core::config::{LorelaiConfig, Secret};
use lorelai_core::credentials::{default_refreshers, CredentialVault, TokenRefresher};
use lorelai_core::indexing::IndexingService;
use lorelai_core::integrations::{default_revokers, RevocationService, Revoker};
use lorelai_core::model::Provider;
use lorelai_core::storage::Store;
use std::collections::HashMap;
use std::sync::Arc;

pub struct AppState {
    pub store: Store,
    pub vault: CredentialVault,
    pub indexing: IndexingService,
    pub revocation: RevocationService,
    pub api_key: Option<Secret>,
}

impl AppState {
    pub fn new(
        store: Store,
        revokers: HashMap<Provider, Arc<dyn Revoker>>,
        api_key: Option<Secret>,
    ) -> Arc<Self> {
        Self::with_refreshers(store, revokers, HashMap::new(), api_key)
    }

    pub fn with_refreshers(
        store: Store,
        revokers: HashMap<Provider, Arc<dyn Revoker>>,
        refreshers: HashMap<Provider, Arc<dyn TokenRefresher>>,
        api_key: Option<Secret>,
    ) -> Arc<Self> {
        let vault = CredentialVault::new(store.clone());
        Arc::new(Self {
            indexing: IndexingService::new(store.clone()),
            revocation: RevocationService::new(vault.clone(), revokers)
                .with_refreshers(refreshers),
            vault,
            store,
            api_key,
        })
    }

    /// State wired to the real provider endpoints.
    pub fn from_config(store: Store, config: &LorelaiConfig) -> Arc<Self> {
        Self::with_refreshers(
            store,
            default_revokers(&config.oauth),
            default_refreshers(&config.oauth),
            config.api_key.clone(),
        )
    }
}
