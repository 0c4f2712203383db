//! Resolution of instances out of a compiled [ModuleGraph]
//!
//! Every resolution runs in a session. Strong dependencies are resolved
//! depth first and awaited. Forward references are queued on the session and
//! only resolved once the root instance exists, so a construction never waits
//! on something that might wait on it.

use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use futures::{
    future::{try_join_all, BoxFuture},
    FutureExt, TryFutureExt,
};
use futures_channel::oneshot;
use parking_lot::Mutex;

use crate::{
    context::{ContextId, ContextKey},
    errors::ResolveError,
    graph::{LookupError, ModuleGraph, ModuleId},
    lifecycle::Hook,
    provider::ProviderKind,
    resolver::{DiHandle, ResolvedDependency},
    types::{Instance, Scope, Token},
    wrapper::{Claim, InstanceWrapper, Link, LinkFailure, TreeScope, WrapperId},
};

/// How [Injector::resolve] looks for a token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Only consider the requesting module's own providers
    pub strict: bool,
    /// Return every visible provider of the token instead of the first one
    pub each: bool,
}
impl ResolveOptions {
    pub fn strict() -> Self {
        ResolveOptions {
            strict: true,
            each: false,
        }
    }

    pub fn each() -> Self {
        ResolveOptions {
            strict: false,
            each: true,
        }
    }
}

/// Result of [Injector::resolve]
#[derive(Debug, Clone)]
pub enum Resolved {
    One(Instance),
    Each(Vec<Instance>),
}
impl Resolved {
    /// All resolved instances, in lookup order
    pub fn into_vec(self) -> Vec<Instance> {
        match self {
            Resolved::One(instance) => vec![instance],
            Resolved::Each(instances) => instances,
        }
    }
}

/// A forward reference waiting for its session's root to complete
struct Deferred {
    target: WrapperId,
    context: ContextId,
    sender: oneshot::Sender<Result<Instance, ResolveError>>,
}

type DeferredQueue = Mutex<VecDeque<Deferred>>;

/// Forward references collected while resolving one root
///
/// A construction keeps its session alive until it completes. If it outlives the
/// resolution that started it, the references it queued afterwards are handed
/// over to the injector and picked up by the next drain.
struct Session {
    deferred: DeferredQueue,
    orphans: Arc<DeferredQueue>,
}
impl Session {
    fn new(orphans: &Arc<DeferredQueue>) -> Arc<Session> {
        Arc::new(Session {
            deferred: Mutex::new(VecDeque::new()),
            orphans: orphans.clone(),
        })
    }
}
impl Drop for Session {
    fn drop(&mut self) {
        let left = std::mem::take(self.deferred.get_mut());
        if !left.is_empty() {
            tracing::debug!("Handing over {} orphaned forward references", left.len());
            self.orphans.lock().extend(left);
        }
    }
}

/// Builds and caches the instances of a [ModuleGraph]
#[derive(Clone)]
pub struct Injector(Arc<InjectorInner>);
struct InjectorInner {
    graph: Arc<ModuleGraph>,
    /// Static instances with lifecycle hooks, in construction order
    constructed: Mutex<Vec<(WrapperId, Instance)>>,
    /// Forward references whose session ended before it could resolve them
    orphans: Arc<DeferredQueue>,
    closed: AtomicBool,
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("graph", &self.0.graph)
            .field("constructed", &self.0.constructed.lock().len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Injector {
    pub fn new(graph: Arc<ModuleGraph>) -> Self {
        Injector(Arc::new(InjectorInner {
            graph,
            constructed: Mutex::new(Vec::new()),
            orphans: Arc::default(),
            closed: AtomicBool::new(false),
        }))
    }

    pub fn graph(&self) -> &Arc<ModuleGraph> {
        &self.0.graph
    }

    /// Resolves `token` as seen from `module`
    pub async fn resolve(
        &self,
        module: ModuleId,
        token: &Token,
        context: &ContextId,
        options: ResolveOptions,
    ) -> Result<Resolved, ResolveError> {
        if !options.each {
            return self
                .resolve_one(module, token, context, options.strict)
                .await
                .map(Resolved::One);
        }

        self.ensure_open()?;
        let targets = self.graph().lookup_all(module, token, options.strict);
        if targets.is_empty() {
            return Err(self.lookup_error(module, token, LookupError::NotFound));
        }

        let mut instances = Vec::with_capacity(targets.len());
        for target in targets {
            instances.push(self.resolve_root(target, context).await?);
        }
        Ok(Resolved::Each(instances))
    }

    /// Resolves the first provider of `token` visible from `module`
    pub async fn resolve_one(
        &self,
        module: ModuleId,
        token: &Token,
        context: &ContextId,
        strict: bool,
    ) -> Result<Instance, ResolveError> {
        self.ensure_open()?;
        let target = self
            .graph()
            .lookup(module, token, strict)
            .map_err(|error| self.lookup_error(module, token, error))?;
        self.resolve_root(target, context).await
    }

    /// Resolves one wrapper in a fresh session, filling its forward references before returning
    ///
    /// The session is drained even if the root fails, so siblings which were
    /// already built and cached get their forward references.
    pub async fn resolve_root(&self, id: WrapperId, context: &ContextId) -> Result<Instance, ResolveError> {
        let session = Session::new(&self.0.orphans);
        let resolved = self.resolve_planned(id, context.clone(), session.clone()).await;
        let drained = self.drain(&session).await;
        let instance = resolved?;
        drained?;
        Ok(instance)
    }

    /// Drops every instance cached for `context`
    ///
    /// Durable instances are shared beyond the context and stay cached.
    pub fn release_context(&self, context: &ContextId) -> usize {
        let released = self
            .graph()
            .wrappers()
            .iter()
            .filter(|wrapper| wrapper.release(context))
            .count();
        tracing::debug!("Released {released} instances of {context:?}");
        released
    }

    /// Static instances with lifecycle hooks, in construction order
    pub fn constructed(&self) -> Vec<(WrapperId, Instance)> {
        self.0.constructed.lock().clone()
    }

    /// Rejects further resolutions and drops all cached instances
    pub fn close(&self) {
        self.0.closed.store(true, Ordering::SeqCst);
        for wrapper in self.graph().wrappers() {
            wrapper.clear();
        }
        self.0.constructed.lock().clear();
        self.0.orphans.lock().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), ResolveError> {
        match self.is_closed() {
            true => Err(ResolveError::Closed),
            false => Ok(()),
        }
    }
}

// Planning
impl Injector {
    /// Verifies the strong dependency tree of `id` and derives its scope
    ///
    /// The result is memoized on the wrapper.
    pub(crate) fn plan(&self, id: WrapperId) -> Result<TreeScope, ResolveError> {
        self.plan_recurse(id, &mut Vec::new())
    }

    fn plan_recurse(&self, id: WrapperId, chain: &mut Vec<WrapperId>) -> Result<TreeScope, ResolveError> {
        let graph = self.graph();
        let wrapper = graph.wrapper(id);
        if let Some(tree) = wrapper.tree.get() {
            return Ok(*tree);
        }

        if let Some(start) = chain.iter().position(|entry| *entry == id) {
            let mut cycle: Vec<Token> = chain[start..]
                .iter()
                .map(|entry| graph.wrapper(*entry).token.clone())
                .collect();
            cycle.push(wrapper.token.clone());
            tracing::error!(
                "Circular dependency without forward reference: {}",
                crate::errors::format_chain(&cycle)
            );
            return Err(ResolveError::UndefinedForwardRef { cycle });
        }

        let links = graph
            .links_of(wrapper)
            .map_err(|failure| self.link_error(wrapper, failure, chain))?;

        chain.push(id);
        let mut tree = TreeScope::declared(&wrapper.kind, &wrapper.metadata);
        for link in links.strong() {
            if let Some(target) = link.target {
                tree = tree.merge(self.plan_recurse(target, chain)?);
            }
        }
        chain.pop();

        if !tree.is_static && wrapper.scope() != Scope::Request {
            tracing::debug!(
                "{} depends on request scoped providers and will be cached per context",
                wrapper.token
            );
        }

        Ok(*wrapper.tree.get_or_init(|| tree))
    }

    fn link_error(&self, wrapper: &InstanceWrapper, failure: LinkFailure, chain: &[WrapperId]) -> ResolveError {
        let graph = self.graph();
        let mut tokens: Vec<Token> = chain
            .iter()
            .map(|entry| graph.wrapper(*entry).token.clone())
            .collect();
        tokens.push(wrapper.token.clone());
        tokens.push(failure.dependency.clone());

        let error = match failure.error {
            LookupError::NotFound => ResolveError::UnknownElement {
                token: failure.dependency,
                module: wrapper.module_name.clone(),
                required_by: Some(wrapper.token.clone()),
                index: failure.index,
                chain: tokens,
            },
            LookupError::NotExported { exporter } => ResolveError::UnknownExport {
                token: failure.dependency,
                module: wrapper.module_name.clone(),
                exporter: graph.module(exporter).name().clone(),
                chain: tokens,
            },
        };
        tracing::error!("{error}");
        error
    }

    fn lookup_error(&self, module: ModuleId, token: &Token, error: LookupError) -> ResolveError {
        let graph = self.graph();
        let module = graph.module(module).name().clone();
        let error = match error {
            LookupError::NotFound => ResolveError::UnknownElement {
                token: token.clone(),
                module,
                required_by: None,
                index: None,
                chain: vec![token.clone()],
            },
            LookupError::NotExported { exporter } => ResolveError::UnknownExport {
                token: token.clone(),
                module,
                exporter: graph.module(exporter).name().clone(),
                chain: vec![token.clone()],
            },
        };
        tracing::error!("{error}");
        error
    }
}

// Construction
impl Injector {
    async fn resolve_planned(
        &self,
        id: WrapperId,
        context: ContextId,
        session: Arc<Session>,
    ) -> Result<Instance, ResolveError> {
        self.plan(id)?;
        self.resolve_wrapper(id, context, session).await
    }

    /// Resolves the queued forward references of a session, then any orphaned ones
    ///
    /// Keeps going after a failure so no reference is left hanging, returns the first
    /// error of the session's own references.
    async fn drain(&self, session: &Arc<Session>) -> Result<(), ResolveError> {
        let mut first_error = None;
        loop {
            let own = session.deferred.lock().pop_front();
            let (next, orphaned) = match own {
                Some(deferred) => (deferred, false),
                None => match self.0.orphans.lock().pop_front() {
                    Some(deferred) => (deferred, true),
                    None => break,
                },
            };
            let Deferred {
                target,
                context,
                sender,
            } = next;

            let result = self.resolve_planned(target, context, session.clone()).await;
            match &result {
                Err(error) if !orphaned => {
                    first_error.get_or_insert_with(|| error.clone());
                }
                Err(error) => tracing::warn!("Orphaned forward reference failed: {error}"),
                Ok(_) => {}
            }
            let _ = sender.send(result);
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn resolve_wrapper(
        &self,
        id: WrapperId,
        context: ContextId,
        session: Arc<Session>,
    ) -> BoxFuture<'static, Result<Instance, ResolveError>> {
        let this = self.clone();
        async move {
            this.ensure_open()?;
            let wrapper = this.graph().wrapper(id).clone();

            match &wrapper.kind {
                ProviderKind::Value(instance) if wrapper.hooks.is_none() => return Ok(instance.clone()),
                ProviderKind::Existing(_) => return this.resolve_existing(&wrapper, context, session).await,
                _ => {}
            }

            let Some(key) = wrapper.context_key(&context)? else {
                // Transient
                return this.construct(&wrapper, context, session).await;
            };

            let claim = wrapper.claim(key.clone(), || {
                let this = this.clone();
                let wrapper = wrapper.clone();
                let key = key.clone();
                async move {
                    let result = this.construct(&wrapper, context, session).await;
                    match &result {
                        Ok(instance) => {
                            wrapper.publish(&key, instance.clone());
                            this.record(&wrapper, &key, instance);
                        }
                        Err(_) => wrapper.abandon(&key),
                    }
                    result
                }
                .boxed()
                .shared()
            });

            match claim {
                Claim::Ready(instance) => {
                    tracing::trace!("Cache hit for {} under {key:?}", wrapper.token);
                    Ok(instance)
                }
                Claim::Pending(construction) => construction.await,
            }
        }
        .boxed()
    }

    async fn resolve_existing(
        &self,
        wrapper: &InstanceWrapper,
        context: ContextId,
        session: Arc<Session>,
    ) -> Result<Instance, ResolveError> {
        let links = self
            .graph()
            .links_of(wrapper)
            .map_err(|failure| self.link_error(wrapper, failure, &[]))?;

        match links.arguments.first().and_then(|link| link.target) {
            Some(target) => self.resolve_wrapper(target, context, session).await,
            None => Err(self.lookup_error(wrapper.module, &wrapper.token, LookupError::NotFound)),
        }
    }

    async fn construct(
        &self,
        wrapper: &InstanceWrapper,
        context: ContextId,
        session: Arc<Session>,
    ) -> Result<Instance, ResolveError> {
        let instance = match &wrapper.kind {
            ProviderKind::Value(instance) => instance.clone(),
            ProviderKind::Existing(_) => return self.resolve_existing(wrapper, context, session).await,
            ProviderKind::Factory(factory) => {
                let links = self
                    .graph()
                    .links_of(wrapper)
                    .map_err(|failure| self.link_error(wrapper, failure, &[]))?;

                let arguments = try_join_all(
                    links
                        .arguments
                        .iter()
                        .map(|link| self.dependency(link, &context, &session)),
                )
                .await?;
                let properties: HashMap<_, _> = try_join_all(links.properties.iter().map(|(name, link)| {
                    self.dependency(link, &context, &session)
                        .map_ok(move |dependency| (name.clone(), dependency))
                }))
                .await?
                .into_iter()
                .collect();

                tracing::debug!("Constructing {} of {}", wrapper.token, wrapper.module_name);
                let handle = DiHandle::new(arguments, properties, context);
                let instance = factory.construct(handle).await.map_err(|error| {
                    tracing::error!("Factory for {} failed: {error}", wrapper.token);
                    ResolveError::FactoryFailed {
                        token: wrapper.token.clone(),
                        error: Arc::new(error),
                    }
                })?;
                tracing::debug!("Constructed {}", instance.info);
                instance
            }
        };

        let hooks = wrapper.hooks.and_then(|cast| cast(&instance));
        if let Some(hooks) = &hooks {
            hooks.on_module_init().await.map_err(|error| {
                tracing::error!("{} of {} failed: {error}", Hook::ModuleInit, wrapper.token);
                ResolveError::LifecycleFailed {
                    token: wrapper.token.clone(),
                    hook: Hook::ModuleInit,
                    error: Arc::new(error),
                }
            })?;
        }

        Ok(instance.with_hooks(hooks))
    }

    async fn dependency(
        &self,
        link: &Link,
        context: &ContextId,
        session: &Arc<Session>,
    ) -> Result<ResolvedDependency, ResolveError> {
        let Some(target) = link.target else {
            return Ok(ResolvedDependency::Missing(link.dependency.token.clone()));
        };

        if link.dependency.forward {
            let (sender, receiver) = oneshot::channel();
            session.deferred.lock().push_back(Deferred {
                target,
                context: context.clone(),
                sender,
            });
            return Ok(ResolvedDependency::Deferred(receiver));
        }

        self.resolve_wrapper(target, context.clone(), session.clone())
            .await
            .map(ResolvedDependency::Instance)
    }

    fn record(&self, wrapper: &InstanceWrapper, key: &ContextKey, instance: &Instance) {
        if *key == ContextKey::Static && instance.hooks().is_some() {
            self.0.constructed.lock().push((wrapper.id, instance.clone()));
        }
    }
}
