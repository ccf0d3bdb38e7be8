//! Adapter and wrapper registry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use super::{Adapter, AdapterOptions, MemoryAdapter, PrefixAdapter, SqliteAdapter, TimedAdapter};
use crate::error::{MigrateError, Result};

/// Builds an adapter from its options.
pub type AdapterConstructor =
    Arc<dyn Fn(AdapterOptions) -> BoxFuture<'static, Result<Arc<dyn Adapter>>> + Send + Sync>;

/// Wraps an adapter in a decorator.
pub type WrapperConstructor = Arc<dyn Fn(Arc<dyn Adapter>) -> Arc<dyn Adapter> + Send + Sync>;

/// Registry of adapter kinds and wrapper names.
///
/// `sqlite` and `memory` adapters and the `timed` and `prefix` wrappers are
/// registered by default.
#[derive(Clone)]
pub struct AdapterFactory {
    adapters: BTreeMap<String, AdapterConstructor>,
    wrappers: BTreeMap<String, WrapperConstructor>,
}

impl fmt::Debug for AdapterFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterFactory")
            .field("adapters", &self.adapters.keys().collect::<Vec<_>>())
            .field("wrappers", &self.wrappers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for AdapterFactory {
    fn default() -> Self {
        let mut factory = Self::empty();
        factory.register_adapter(
            "sqlite",
            Arc::new(|options: AdapterOptions| -> BoxFuture<'static, Result<Arc<dyn Adapter>>> {
                async move {
                    let adapter: Arc<dyn Adapter> = Arc::new(SqliteAdapter::connect(options).await?);
                    Ok(adapter)
                }
                .boxed()
            }),
        );
        factory.register_adapter(
            "memory",
            Arc::new(|options: AdapterOptions| -> BoxFuture<'static, Result<Arc<dyn Adapter>>> {
                async move {
                    let adapter: Arc<dyn Adapter> = Arc::new(MemoryAdapter::new(options));
                    Ok(adapter)
                }
                .boxed()
            }),
        );
        factory.register_wrapper(
            "timed",
            Arc::new(|inner: Arc<dyn Adapter>| -> Arc<dyn Adapter> {
                Arc::new(TimedAdapter::new(inner))
            }),
        );
        factory.register_wrapper(
            "prefix",
            Arc::new(|inner: Arc<dyn Adapter>| -> Arc<dyn Adapter> {
                Arc::new(PrefixAdapter::new(inner))
            }),
        );
        factory
    }
}

impl AdapterFactory {
    /// Creates a factory with nothing registered.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            adapters: BTreeMap::new(),
            wrappers: BTreeMap::new(),
        }
    }

    /// Registers (or replaces) an adapter kind.
    pub fn register_adapter(&mut self, name: impl Into<String>, constructor: AdapterConstructor) {
        self.adapters.insert(name.into(), constructor);
    }

    /// Registers (or replaces) a wrapper.
    pub fn register_wrapper(&mut self, name: impl Into<String>, constructor: WrapperConstructor) {
        self.wrappers.insert(name.into(), constructor);
    }

    /// Returns true if an adapter kind is registered.
    #[must_use]
    pub fn has_adapter(&self, name: &str) -> bool {
        self.adapters.contains_key(name)
    }

    /// Builds the adapter named by `options.adapter`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAdapter` if the kind is not registered, or whatever
    /// the constructor reports.
    pub async fn get_adapter(&self, options: AdapterOptions) -> Result<Arc<dyn Adapter>> {
        let constructor = self
            .adapters
            .get(&options.adapter)
            .ok_or_else(|| MigrateError::UnknownAdapter(options.adapter.clone()))?;
        constructor(options).await
    }

    /// Wraps an adapter with the named wrapper.
    ///
    /// # Errors
    ///
    /// Returns `UnknownWrapper` if the name is not registered.
    pub fn get_wrapper(&self, name: &str, adapter: Arc<dyn Adapter>) -> Result<Arc<dyn Adapter>> {
        let constructor = self
            .wrappers
            .get(name)
            .ok_or_else(|| MigrateError::UnknownWrapper(name.to_string()))?;
        Ok(constructor(adapter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_adapters() {
        let factory = AdapterFactory::default();
        assert!(factory.has_adapter("sqlite"));

        let adapter = factory
            .get_adapter(AdapterOptions::new("memory"))
            .await
            .expect("memory adapter");
        assert_eq!(adapter.adapter_type(), "memory");

        let wrapped = factory.get_wrapper("timed", adapter).expect("timed wrapper");
        assert_eq!(wrapped.adapter_type(), "memory");
    }

    #[tokio::test]
    async fn test_unknown_names() {
        let factory = AdapterFactory::default();
        let result = factory.get_adapter(AdapterOptions::new("oracle")).await;
        assert!(matches!(result, Err(MigrateError::UnknownAdapter(ref kind)) if kind == "oracle"));

        let memory: Arc<dyn Adapter> = Arc::new(MemoryAdapter::new(AdapterOptions::new("memory")));
        assert!(matches!(
            factory.get_wrapper("audit", memory),
            Err(MigrateError::UnknownWrapper(_))
        ));
    }
}
