use tessera_di::{ModuleDefinition, Provider, Token};

use crate::provider::ConfigProvider;

/// Global module exposing a [ConfigProvider] and every config it holds
pub struct ConfigModule;

impl ConfigModule {
    /// Builds the module from the registered configs
    ///
    /// Import it once, usually from the root module, and every module can inject
    /// [Config](crate::config::Config) of a registered type as well as the [ConfigProvider] itself.
    pub fn for_root(provider: ConfigProvider) -> ModuleDefinition {
        let mut module = ModuleDefinition::of::<ConfigModule>().global();
        for config in provider.instances() {
            let token = Token::from(config.info);
            module = module
                .provider(Provider::instance(token.clone(), config))
                .export(token);
        }
        tracing::debug!("ConfigModule exports {} configs", provider.len());

        module
            .provider(Provider::value(provider))
            .export(Token::of::<ConfigProvider>())
    }
}
