//! Tessera Config provides a global registry of configs that can be injected in the rest of the
//! modules.
//!
//! Tessera Config is split into two major parts:
//! 1. ConfigProvider: Used to create the registry of all configs
//! 2. Config<T>: A wrapper type to be able to resolve and retrieve configs
//!
//! # Examples
//!
//! ```rust
//! use tessera_config::{Config, ConfigModule, ConfigProvider};
//! use tessera_di::{Application, InjectError, ModuleDefinition, Provider, Token};
//!
//! struct AppConfig {
//!     host: String,
//!     port: u16,
//! }
//!
//! struct Server {
//!     address: String,
//! }
//!
//! let mut configs = ConfigProvider::new();
//! configs
//!     .add_config(AppConfig {
//!         host: "localhost".to_string(),
//!         port: 8080,
//!     })
//!     .unwrap();
//!
//! let root = ModuleDefinition::named("Root")
//!     .import(ConfigModule::for_root(configs))
//!     .provider(
//!         Provider::factory(|mut di| async move {
//!             let config: Config<AppConfig> = di.resolve()?;
//!             Ok::<_, InjectError>(Server {
//!                 address: format!("{}:{}", config.host, config.port),
//!             })
//!         })
//!         .inject::<Config<AppConfig>>(),
//!     );
//!
//! futures::executor::block_on(async {
//!     let app = Application::create(root).await.unwrap();
//!     let server = app.get::<Server>().await.unwrap();
//!     assert_eq!(server.address, "localhost:8080");
//! });
//! ```
//!
//! Tessera Config consists of the following components:
//!
//! 1. Config - for declaring a struct as a config and handling resolution
//! 2. Provider - for creating a registry of configs, adding and retrieving configs
//! 3. Module - for exposing the registry to every module of an application
//! 4. Errors - for config errors

pub mod config;
pub mod errors;
pub mod module;
pub mod provider;

pub use config::Config;
pub use errors::ConfigError;
pub use module::ConfigModule;
pub use provider::ConfigProvider;
