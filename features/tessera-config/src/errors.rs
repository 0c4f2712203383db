use tessera_di::TypeInfo;

/// Errors of the config registry
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No config of the requested type was registered
    #[error("Config '{0}' is not registered")]
    Missing(TypeInfo),
    /// A config of the same type was registered before
    #[error("Config '{0}' is already registered")]
    AlreadyRegistered(TypeInfo),
}
