use std::sync::Arc;

use ag_bus::EventBus;
use ag_cache::ResultCache;
use ag_patterns::PatternExecutor;
use ag_session::SessionManager;
use ag_store::Store;

use crate::config::Config;
use crate::Result;

/// The process-lifetime singletons every command runs against: the event
/// bus (which owns the database handle), the session manager, and the
/// pattern executor. Declared in the order they're created so the
/// compiler's own reverse-drop-order rule tears them down bus-last — the
/// session manager and pattern executor only ever reach the store through
/// `EventBus::with_store`, so nothing may outlive it.
pub struct Context {
    pub bus: Arc<EventBus>,
    pub sessions: SessionManager,
    pub patterns: PatternExecutor,
    pub config: Config,
}

impl Context {
    pub fn bootstrap(config: Config) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Store::open(&config.db_path)?;
        let bus = Arc::new(EventBus::new(store));
        let sessions = SessionManager::new(bus.clone());
        let cache = if config.enable_result_cache {
            let cache_dir = config.db_path.with_file_name("result_cache");
            Some(Arc::new(ResultCache::new(cache_dir)?))
        } else {
            None
        };
        let patterns = PatternExecutor::with_token_limit(bus.clone(), cache, config.max_agent_tokens);
        Ok(Self { bus, sessions, patterns, config })
    }

    pub fn model(&self, override_model: Option<&str>) -> String {
        override_model.map(str::to_string).unwrap_or_else(|| self.config.default_model.clone())
    }
}
