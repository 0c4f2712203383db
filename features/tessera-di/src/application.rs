use std::{
    any::type_name,
    fmt::Debug,
    sync::Arc,
    thread::{self, sleep},
    time::Duration,
};

use futures::FutureExt;
use futures_channel::oneshot;

use crate::{
    context::{ContextId, STATIC_CONTEXT},
    dependency_graph::DependencyGraph,
    errors::{ApplicationError, ResolveError},
    graph::{ModuleGraph, ModuleId},
    injector::{Injector, ResolveOptions, Resolved},
    lifecycle::Hook,
    module::{Module, ModuleDefinition, ModuleKey},
    provider::ProviderKind,
    types::{Injectable, Instance, Token},
};

/// Which singletons are built while the application is created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Preload {
    /// Every singleton whose dependency tree is static
    All,
    /// Only singletons with lifecycle hooks, everything else is built on first use
    #[default]
    Lifecycle,
    /// Nothing, instances are built on first use
    None,
}

#[derive(Debug, Clone, Default)]
pub struct ApplicationOptions {
    /// Fail with [ApplicationError::Timeout] if creation takes longer
    pub init_timeout: Option<Duration>,
    pub preload: Preload,
}
impl ApplicationOptions {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = Some(timeout);
        self
    }

    pub fn preload(mut self, preload: Preload) -> Self {
        self.preload = preload;
        self
    }
}

/// A running application: the compiled module graph and its instances
#[derive(Clone)]
pub struct Application(Arc<ApplicationInner>);
struct ApplicationInner {
    injector: Injector,
    dependencies: DependencyGraph,
}
impl Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_struct("Application");
        for wrapper in self.graph().wrappers() {
            let val = match wrapper.get_instance_by_context_id(&STATIC_CONTEXT) {
                Some(_) => "constructed",
                None if wrapper.is_transient() => "transient",
                None => "pending",
            };
            map.field(&wrapper.token().to_string(), &val);
        }
        map.finish()
    }
}

impl Application {
    /// Compiles `root` and builds its singletons
    pub async fn create(root: ModuleDefinition) -> Result<Application, ApplicationError> {
        Self::create_with(root, ApplicationOptions::default()).await
    }

    /// Creates the application of the module type `M`
    pub async fn create_module<M: Module>() -> Result<Application, ApplicationError> {
        Self::create(M::definition()).await
    }

    pub async fn create_with(
        root: ModuleDefinition,
        options: ApplicationOptions,
    ) -> Result<Application, ApplicationError> {
        let Some(timeout) = options.init_timeout else {
            return Self::initiate(root, options.preload).await;
        };

        // We don't join the thread - it will just die after the timeout
        let (timeout_tx, mut timeout_rx) = oneshot::channel::<()>();
        thread::spawn(move || {
            sleep(timeout);
            let _ = timeout_tx.send(());
        });

        let initiate = Self::initiate(root, options.preload).fuse();
        futures::pin_mut!(initiate);
        futures::select! {
            result = initiate => result,
            _ = timeout_rx => {
                tracing::error!("Application creation timed out after {timeout:?}");
                Err(ApplicationError::Timeout)
            }
        }
    }

    async fn initiate(root: ModuleDefinition, preload: Preload) -> Result<Application, ApplicationError> {
        tracing::debug!("Creating application with root module {}", root.name);
        let graph = Arc::new(ModuleGraph::compile(root).await?);

        // Build and check Graph
        let dependencies = DependencyGraph::new(&graph);
        dependencies.check()?;

        let injector = Injector::new(graph.clone());
        let mut preloaded = 0;
        for wrapper in graph.wrappers() {
            let wanted = match preload {
                Preload::All => true,
                Preload::Lifecycle => wrapper.has_lifecycle(),
                Preload::None => false,
            };
            if !wanted || wrapper.is_transient() || matches!(wrapper.kind(), ProviderKind::Existing(_)) {
                continue;
            }
            // Request bound trees are built per context
            if !injector.plan(wrapper.id())?.is_static {
                continue;
            }

            injector.resolve_root(wrapper.id(), &STATIC_CONTEXT).await?;
            preloaded += 1;
        }
        tracing::debug!("Preloaded {preloaded} of {} providers", graph.wrappers().len());

        for (id, instance) in injector.constructed() {
            let Some(hooks) = instance.hooks() else {
                continue;
            };
            hooks.on_application_bootstrap().await.map_err(|error| {
                let token = graph.wrapper(id).token().clone();
                tracing::error!("{} of {token} failed: {error}", Hook::ApplicationBootstrap);
                ApplicationError::Hook {
                    token,
                    hook: Hook::ApplicationBootstrap,
                    error: Arc::new(error),
                }
            })?;
        }

        Ok(Application(Arc::new(ApplicationInner {
            injector,
            dependencies,
        })))
    }

    /// Runs the shutdown hooks of every built singleton, then drops all instances
    ///
    /// Hooks run dependents first. A failing hook does not stop the others, the first error is returned.
    pub async fn close(&self, signal: Option<&str>) -> Result<(), ApplicationError> {
        let injector = &self.0.injector;
        if injector.is_closed() {
            return Ok(());
        }

        tracing::debug!("Closing application, signal: {signal:?}");
        let constructed = injector.constructed();
        let mut first_error = None;

        for hook in [
            Hook::ModuleDestroy,
            Hook::BeforeApplicationShutdown,
            Hook::ApplicationShutdown,
        ] {
            for (id, instance) in constructed.iter().rev() {
                let Some(hooks) = instance.hooks() else {
                    continue;
                };
                let result = match hook {
                    Hook::ModuleDestroy => hooks.on_module_destroy().await,
                    Hook::BeforeApplicationShutdown => hooks.before_application_shutdown(signal).await,
                    Hook::ApplicationShutdown => hooks.on_application_shutdown(signal).await,
                    Hook::ModuleInit | Hook::ApplicationBootstrap => Ok(()),
                };

                if let Err(error) = result {
                    let token = self.graph().wrapper(*id).token().clone();
                    tracing::warn!("{hook} of {token} failed: {error}");
                    first_error.get_or_insert(ApplicationError::Hook {
                        token,
                        hook,
                        error: Arc::new(error),
                    });
                }
            }
        }

        injector.close();
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

// Access
impl Application {
    /// The root module
    pub fn root(&self) -> ModuleRef {
        ModuleRef {
            injector: self.0.injector.clone(),
            module: self.graph().root(),
        }
    }

    /// Any module of the graph
    pub fn select(&self, key: impl Into<ModuleKey>) -> Result<ModuleRef, ResolveError> {
        let module = self.graph().get_module_by_token(&key.into())?.id();
        Ok(ModuleRef {
            injector: self.0.injector.clone(),
            module,
        })
    }

    pub fn select_module<M: Module>(&self) -> Result<ModuleRef, ResolveError> {
        self.select(ModuleKey::of::<M>())
    }

    /// Resolves a singleton visible from the root module
    pub async fn get<T: Injectable>(&self) -> Result<Arc<T>, ResolveError> {
        self.root().get().await
    }

    pub async fn get_token<T: Injectable>(&self, token: impl Into<Token>) -> Result<Arc<T>, ResolveError> {
        self.root().get_token(token).await
    }

    /// Resolves `T` for one context, request scoped trees are built once per context
    pub async fn resolve<T: Injectable>(&self, context: &ContextId) -> Result<Arc<T>, ResolveError> {
        self.root().resolve(context).await
    }

    pub async fn resolve_token<T: Injectable>(
        &self,
        token: impl Into<Token>,
        context: &ContextId,
    ) -> Result<Arc<T>, ResolveError> {
        self.root().resolve_token(token, context).await
    }

    /// Every provider of `token` visible from the root module
    pub async fn resolve_all<T: Injectable>(
        &self,
        token: impl Into<Token>,
        context: &ContextId,
    ) -> Result<Vec<Arc<T>>, ResolveError> {
        self.root().resolve_all(token, context).await
    }

    /// Drops the instances cached for a finished context
    pub fn release_context(&self, context: &ContextId) -> usize {
        self.0.injector.release_context(context)
    }

    pub fn graph(&self) -> &Arc<ModuleGraph> {
        self.0.injector.graph()
    }

    pub fn dependency_graph(&self) -> &DependencyGraph {
        &self.0.dependencies
    }

    pub fn injector(&self) -> &Injector {
        &self.0.injector
    }
}

/// Resolves instances as seen from one module
#[derive(Clone, Debug)]
pub struct ModuleRef {
    injector: Injector,
    module: ModuleId,
}

impl ModuleRef {
    pub fn id(&self) -> ModuleId {
        self.module
    }

    pub fn name(&self) -> &Arc<str> {
        self.injector.graph().module(self.module).name()
    }

    pub async fn get<T: Injectable>(&self) -> Result<Arc<T>, ResolveError> {
        self.resolve_token(Token::of::<T>(), &STATIC_CONTEXT).await
    }

    pub async fn get_token<T: Injectable>(&self, token: impl Into<Token>) -> Result<Arc<T>, ResolveError> {
        self.resolve_token(token, &STATIC_CONTEXT).await
    }

    pub async fn resolve<T: Injectable>(&self, context: &ContextId) -> Result<Arc<T>, ResolveError> {
        self.resolve_token(Token::of::<T>(), context).await
    }

    pub async fn resolve_token<T: Injectable>(
        &self,
        token: impl Into<Token>,
        context: &ContextId,
    ) -> Result<Arc<T>, ResolveError> {
        let instance = self
            .injector
            .resolve_one(self.module, &token.into(), context, false)
            .await?;
        downcast(instance)
    }

    pub async fn resolve_all<T: Injectable>(
        &self,
        token: impl Into<Token>,
        context: &ContextId,
    ) -> Result<Vec<Arc<T>>, ResolveError> {
        self.resolve_with(&token.into(), context, ResolveOptions::each())
            .await?
            .into_vec()
            .into_iter()
            .map(downcast)
            .collect()
    }

    /// Untyped resolution with explicit options
    pub async fn resolve_with(
        &self,
        token: &Token,
        context: &ContextId,
        options: ResolveOptions,
    ) -> Result<Resolved, ResolveError> {
        self.injector.resolve(self.module, token, context, options).await
    }
}

fn downcast<T: Injectable>(instance: Instance) -> Result<Arc<T>, ResolveError> {
    instance
        .downcast()
        .map_err(|actual_type| ResolveError::DowncastFailed {
            required_type: type_name::<T>(),
            actual_type,
        })
}
