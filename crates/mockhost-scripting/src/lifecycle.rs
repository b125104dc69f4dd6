//! Engine lifecycle hooks

use mockhost_store::StoreService;

/// Hooks the host calls at fixed points of its startup
pub trait EngineLifecycleListener: Send + Sync {
    /// Called once after all routes are configured, before traffic is served
    fn after_routes_configured(&self, stores: &StoreService) {
        let _ = stores;
    }
}
