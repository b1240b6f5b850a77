use std::path::PathBuf;
use std::sync::Arc;

use wh_domain::config::Config;
use wh_domain::Result;
use wh_providers::LlmProvider;
use wh_store::Store;

use crate::runtime::bus::EventBus;
use crate::runtime::gate::PermissionGate;
use crate::runtime::scheduler::SessionScheduler;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub bus: Arc<EventBus>,
    pub gate: Arc<PermissionGate>,
    /// `None` when no LLM endpoint is configured; turn submission then
    /// returns 503 while the rest of the API stays available.
    pub provider: Option<Arc<dyn LlmProvider>>,
    pub scheduler: Arc<SessionScheduler>,
    /// Sandbox root every filesystem tool is constrained to. Resolved once
    /// at startup.
    pub fs_root: Arc<PathBuf>,
}

impl AppState {
    /// Assemble the long-lived services around an opened store. Creates
    /// the sandbox root if needed and canonicalizes it.
    pub fn new(
        config: Arc<Config>,
        store: Arc<Store>,
        provider: Option<Arc<dyn LlmProvider>>,
    ) -> Result<Self> {
        let fs_root = config.resolved_fs_root();
        std::fs::create_dir_all(&fs_root)?;
        let fs_root = fs_root.canonicalize()?;

        let bus = Arc::new(EventBus::new(store.clone()));
        let gate = Arc::new(PermissionGate::new(store.clone(), config.clone()));
        let scheduler = Arc::new(SessionScheduler::new());

        Ok(Self {
            config,
            store,
            bus,
            gate,
            provider,
            scheduler,
            fs_root: Arc::new(fs_root),
        })
    }
}
