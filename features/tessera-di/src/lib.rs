//! Tessera DI is a module based dependency injection container for async Rust.
//!
//! Applications are split into modules. Each module declares providers, imports other
//! modules and exports the providers its importers may see.
//!
//! Tessera DI is split into three major parts:
//! 1. Declaration: [ModuleDefinition] and [Provider] describe what exists
//! 2. Compilation: the [ModuleGraph](graph::ModuleGraph) resolves imports and checks exports
//! 3. Resolution: the [Injector](injector::Injector) builds instances per [Scope] and [ContextId]
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use tessera_di::{Application, InjectError, ModuleDefinition, Provider};
//!
//! struct Clock;
//! struct Greeter {
//!     clock: Arc<Clock>,
//! }
//!
//! let shared = ModuleDefinition::named("Shared")
//!     .provider(Provider::value(Clock))
//!     .export(tessera_di::Token::of::<Clock>());
//!
//! let root = ModuleDefinition::named("Root").import(shared).provider(
//!     Provider::factory(|mut di| async move {
//!         Ok::<_, InjectError>(Greeter { clock: di.resolve()? })
//!     })
//!     .inject::<Arc<Clock>>(),
//! );
//!
//! futures::executor::block_on(async {
//!     let app = Application::create(root).await.unwrap();
//!     let greeter = app.get::<Greeter>().await.unwrap();
//!     let clock = app.get::<Clock>().await.unwrap();
//!     assert!(Arc::ptr_eq(&greeter.clock, &clock));
//!     app.close(None).await.unwrap();
//! });
//! ```
//!
//! Tessera DI consists of the following components:
//!
//! 1. Module - module declarations, imports, exports and forward references
//! 2. Provider - class, factory, value and alias providers
//! 3. Graph - the compiled module graph and token visibility
//! 4. Injector - scoped construction and caching of instances
//! 5. Application - the root of it all, with lifecycle hooks
//! 6. Resolver - how factories take their dependencies, including [Lazy] forward references

pub mod application;
pub mod context;
pub mod dependency_graph;
pub mod errors;
pub mod factories;
pub mod graph;
pub mod injector;
pub mod lifecycle;
pub mod module;
pub mod provider;
pub mod resolver;
pub mod types;
pub mod wrapper;

pub use application::{Application, ApplicationOptions, ModuleRef, Preload};
pub use context::{ContextId, ContextIdFactory, ContextIdStrategy, STATIC_CONTEXT};
pub use errors::{ApplicationError, CompileError, InjectError, ResolveError};
pub use factories::{DependencyInfo, InstanceFactory, ProviderMetadata};
pub use injector::{ResolveOptions, Resolved};
pub use lifecycle::{Hook, Lifecycle};
pub use module::{forward_ref, Module, ModuleDefinition, ModuleImport, ModuleKey};
pub use provider::{Provider, ProviderBuilder, ProviderDefinition};
pub use resolver::{
    lazy::{Lazy, LazyOption},
    DiHandle, Resolver,
};
pub use types::{DynError, Injectable, Instance, Scope, Token, TypeInfo};
