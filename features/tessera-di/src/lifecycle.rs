use async_trait::async_trait;

use crate::types::DynError;

/// Hooks a provider can opt into with [ProviderBuilder::lifecycle](crate::provider::ProviderBuilder::lifecycle)
///
/// Order during the life of an [Application](crate::application::Application):
/// 1. `on_module_init` - right after the instance was constructed, before anyone can see it
/// 2. `on_application_bootstrap` - once all preloaded singletons exist
/// 3. `on_module_destroy` - on close, dependents before their dependencies
/// 4. `before_application_shutdown`
/// 5. `on_application_shutdown`
#[async_trait]
pub trait Lifecycle: Send + Sync {
    async fn on_module_init(&self) -> Result<(), DynError> {
        Ok(())
    }

    async fn on_application_bootstrap(&self) -> Result<(), DynError> {
        Ok(())
    }

    async fn on_module_destroy(&self) -> Result<(), DynError> {
        Ok(())
    }

    async fn before_application_shutdown(&self, _signal: Option<&str>) -> Result<(), DynError> {
        Ok(())
    }

    async fn on_application_shutdown(&self, _signal: Option<&str>) -> Result<(), DynError> {
        Ok(())
    }
}

/// Name of a lifecycle hook, used in errors and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    ModuleInit,
    ApplicationBootstrap,
    ModuleDestroy,
    BeforeApplicationShutdown,
    ApplicationShutdown,
}
impl std::fmt::Display for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Hook::ModuleInit => "on_module_init",
            Hook::ApplicationBootstrap => "on_application_bootstrap",
            Hook::ModuleDestroy => "on_module_destroy",
            Hook::BeforeApplicationShutdown => "before_application_shutdown",
            Hook::ApplicationShutdown => "on_application_shutdown",
        })
    }
}
