//! Shared metadata caches.
//!
//! A [`MetadataCache`] bundles the invocation cache and the operator table.
//! Converters hold an `Arc` to one; graphs converted through the same cache
//! share compiled thunks and operator delegates. [`MetadataCache::shared`]
//! is the process-wide default, configured from the environment on first use.

use std::sync::{Arc, OnceLock};

use crate::config::RuntimeConfig;
use crate::invoke::InvocationCache;
use crate::operators::OperatorTable;

#[derive(Debug)]
pub struct MetadataCache {
    invocations: Option<Arc<InvocationCache>>,
    operators: OperatorTable,
    config: RuntimeConfig,
}

impl MetadataCache {
    pub fn new(config: RuntimeConfig) -> Self {
        let invocations = config
            .use_invocation_cache
            .then(|| Arc::new(InvocationCache::from_config(&config)));
        MetadataCache {
            invocations,
            operators: OperatorTable::new(),
            config,
        }
    }

    /// Process-wide cache. Falls back to defaults when the environment
    /// holds an invalid setting.
    pub fn shared() -> Arc<MetadataCache> {
        static SHARED: OnceLock<Arc<MetadataCache>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| {
            let config = RuntimeConfig::from_env().unwrap_or_else(|e| {
                tracing::warn!("ignoring runtime configuration: {}", e);
                RuntimeConfig::default()
            });
            tracing::debug!(
                "shared metadata cache: capacity {}, invocation cache {}",
                config.invocation_cache_capacity,
                if config.use_invocation_cache { "on" } else { "off" }
            );
            Arc::new(MetadataCache::new(config))
        }))
    }

    /// `None` when accessors use the reflective slow path.
    pub fn invocations(&self) -> Option<&Arc<InvocationCache>> {
        self.invocations.as_ref()
    }

    pub fn operators(&self) -> &OperatorTable {
        &self.operators
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}
