use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    sync::Arc,
};

use tessera_di::{Instance, TypeInfo};

use crate::errors::ConfigError;

/// A registry of all configs, keyed by their type.
///
/// Registration order is kept so [ConfigModule](crate::module::ConfigModule)
/// declares its providers deterministically.
#[derive(Default, Clone)]
pub struct ConfigProvider {
    configs: Vec<(TypeInfo, Arc<dyn Any + Send + Sync + 'static>)>,
    index: HashMap<TypeId, usize>,
}

impl fmt::Debug for ConfigProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.configs.iter().map(|(info, _)| info.type_name))
            .finish()
    }
}

impl ConfigProvider {
    /// Initializes an empty Config Provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieve a config with specified type, `None` if it was never registered
    pub fn get_config<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let index = self.index.get(&TypeId::of::<T>())?;
        self.configs[*index].1.clone().downcast().ok()
    }

    /// Like [ConfigProvider::get_config] but a missing config is an error
    pub fn require_config<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ConfigError> {
        self.get_config()
            .ok_or_else(|| ConfigError::Missing(TypeInfo::of::<T>()))
    }

    /// Add a config to the registry.
    ///
    /// If the config type is already registered, it will return
    /// [ConfigError::AlreadyRegistered] and keep the existing config.
    pub fn add_config<T: Send + Sync + 'static>(
        &mut self,
        config: T,
    ) -> Result<&mut Self, ConfigError> {
        let info = TypeInfo::of::<T>();
        if self.index.contains_key(&info.type_id) {
            tracing::warn!("Config {info} registered twice");
            return Err(ConfigError::AlreadyRegistered(info));
        }

        tracing::debug!("Registered config {info}");
        self.index.insert(info.type_id, self.configs.len());
        self.configs.push((info, Arc::new(config)));
        Ok(self)
    }

    /// Can optionally add a config to the registry.
    ///
    /// If the config provided is `Some(T)`, it will be the same as calling [`ConfigProvider::add_config`]
    /// If the config provided is `None`, then the function just returns `Ok(self)` for chaining
    pub fn maybe_add_config<T: Send + Sync + 'static>(
        &mut self,
        config: Option<T>,
    ) -> Result<&mut Self, ConfigError> {
        match config {
            Some(c) => self.add_config(c),
            None => Ok(self),
        }
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.index.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Every registered config as an injectable instance, in registration order
    pub(crate) fn instances(&self) -> impl Iterator<Item = Instance> + '_ {
        self.configs
            .iter()
            .map(|(info, config)| Instance::from_any(*info, config.clone()))
    }
}
