//! Shared, explicitly-injected dependencies every stage is constructed
//! with — the Rust answer to the source's global singletons (spec §9
//! design note: they "become explicit dependencies injected at lifecycle
//! initialization; the core itself must not reach out to process-wide
//! state").

use crate::adapter::PlatformAdapter;
use crate::config::PipelineConfig;
use crate::conversation::ConversationManager;
use crate::llm::LLMProvider;
use crate::plugin::{HandlerRegistry, PlatformEnableMap};
use crate::tools::FunctionToolManager;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub struct PipelineContext {
    pub config: Arc<PipelineConfig>,
    pub handlers: Arc<HandlerRegistry>,
    pub conversations: Arc<ConversationManager>,
    pub tools: Arc<FunctionToolManager>,
    pub provider: Option<Arc<dyn LLMProvider>>,
    pub platform_enable_map: Arc<RwLock<PlatformEnableMap>>,
    adapters: RwLock<HashMap<String, Arc<dyn PlatformAdapter>>>,
}

impl PipelineContext {
    pub fn new(
        config: Arc<PipelineConfig>,
        handlers: Arc<HandlerRegistry>,
        conversations: Arc<ConversationManager>,
        tools: Arc<FunctionToolManager>,
        provider: Option<Arc<dyn LLMProvider>>,
    ) -> Self {
        Self {
            config,
            handlers,
            conversations,
            tools,
            provider,
            platform_enable_map: Arc::new(RwLock::new(PlatformEnableMap::new())),
            adapters: RwLock::new(HashMap::new()),
        }
    }

    pub fn register_adapter(&self, adapter: Arc<dyn PlatformAdapter>) {
        self.adapters.write().unwrap().insert(adapter.id().to_string(), adapter);
    }

    pub fn adapter(&self, platform_id: &str) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.read().unwrap().get(platform_id).cloned()
    }
}
