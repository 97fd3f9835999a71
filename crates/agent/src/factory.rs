//! Engine construction from validated configuration.
//!
//! An [`EngineFactory`] is an explicit value owning the configuration, the
//! shared tool registry, and a cache of chat clients. Create one per
//! application and pass it where engines are needed.

use std::sync::Arc;

use parking_lot::RwLock;
use stepwire_config::EngineConfig;
use stepwire_core::agent::Agent;
use stepwire_core::error::Result;
use stepwire_core::tool::{Tool, ToolRegistry};
use stepwire_providers::{ClientCache, build_from_config};
use tracing::{debug, info};

use crate::compaction::SimpleCompaction;
use crate::engine::Engine;
use crate::executor::ExecutorLimits;

pub struct EngineFactory {
    config: EngineConfig,
    cache: ClientCache,
    tools: RwLock<ToolRegistry>,
}

impl EngineFactory {
    /// Validate `config` and create a factory for it.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        info!(model = %config.model, base_url = %config.base_url, "Engine factory ready");
        Ok(Self {
            cache: ClientCache::new(config.client.cache_capacity),
            config,
            tools: RwLock::new(ToolRegistry::new()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &ClientCache {
        &self.cache
    }

    /// Make a tool available to engines created from now on.
    pub fn register_tool(&self, tool: Arc<dyn Tool>) {
        debug!(tool = %tool.name(), "Registering tool");
        self.tools.write().register(tool);
    }

    /// A snapshot of the registered tools.
    pub fn tools(&self) -> ToolRegistry {
        self.tools.read().clone()
    }

    /// Create an engine for `agent` using the configured model.
    pub fn create_engine(&self, agent: Agent) -> Result<Engine> {
        self.build_engine(agent, &self.config)
    }

    /// Create an engine for `agent` talking to a different model on the same
    /// endpoint. Clients are cached per model.
    pub fn create_engine_with_model(&self, agent: Agent, model: &str) -> Result<Engine> {
        let config = EngineConfig {
            model: model.to_string(),
            ..self.config.clone()
        };
        config.validate()?;
        self.build_engine(agent, &config)
    }

    fn build_engine(&self, agent: Agent, config: &EngineConfig) -> Result<Engine> {
        let client = self
            .cache
            .get_or_create(&config.model, || build_from_config(config))?;

        Engine::builder(agent)
            .client(client)
            .tools(self.tools())
            .compaction(Arc::new(SimpleCompaction::from_config(&config.compaction)))
            .delivery_mode(config.wire.delivery)
            .limits(ExecutorLimits::from_config(config))
            .build()
    }

    /// Release every cached client.
    pub fn shutdown(&self) {
        self.cache.clear();
        info!("Engine factory shut down");
    }
}

impl std::fmt::Debug for EngineFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineFactory")
            .field("config", &self.config)
            .field("cached_clients", &self.cache.len())
            .field("tools", &self.tools.read().names())
            .finish()
    }
}
