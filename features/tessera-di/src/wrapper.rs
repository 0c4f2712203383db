use std::{
    collections::{hash_map::Entry, HashMap},
    fmt,
    sync::{Arc, OnceLock},
};

use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;

use crate::{
    context::{ContextId, ContextKey},
    errors::ResolveError,
    factories::{DependencyInfo, ProviderMetadata},
    graph::{LookupError, ModuleId},
    provider::{HookCaster, ProviderDefinition, ProviderKind},
    types::{Instance, Scope, Token},
};

/// Index of a wrapper inside its [ModuleGraph](crate::graph::ModuleGraph)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WrapperId(pub(crate) usize);

/// A construction in flight, awaited by everyone resolving the same (wrapper, context)
pub(crate) type SharedConstruction = Shared<BoxFuture<'static, Result<Instance, ResolveError>>>;

pub(crate) enum InstanceSlot {
    Pending(SharedConstruction),
    Ready(Instance),
}

/// Result of [InstanceWrapper::claim]
pub(crate) enum Claim {
    Ready(Instance),
    Pending(SharedConstruction),
}

/// A dependency bound to the wrapper providing it
#[derive(Debug, Clone)]
pub(crate) struct Link {
    pub dependency: DependencyInfo,
    /// None if the dependency is optional and nothing provides it
    pub target: Option<WrapperId>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Links {
    pub arguments: Vec<Link>,
    pub properties: Vec<(Arc<str>, Link)>,
}
impl Links {
    /// Links which must exist before the instance can be built
    pub fn strong(&self) -> impl Iterator<Item = &Link> {
        self.arguments
            .iter()
            .chain(self.properties.iter().map(|(_, link)| link))
            .filter(|link| !link.dependency.forward)
    }
}

/// Why a dependency could not be linked
#[derive(Debug, Clone)]
pub(crate) struct LinkFailure {
    pub dependency: Token,
    /// Constructor argument index, None for properties
    pub index: Option<usize>,
    pub error: LookupError,
}

/// Whether a wrapper's dependency tree is request bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TreeScope {
    pub is_static: bool,
    /// Only meaningful if not static: every request scoped provider in the tree is durable
    pub is_durable: bool,
}
impl TreeScope {
    pub(crate) fn declared(kind: &ProviderKind, metadata: &ProviderMetadata) -> Self {
        match (kind, metadata.scope) {
            (ProviderKind::Factory(_), Scope::Request) => TreeScope {
                is_static: false,
                is_durable: metadata.durable,
            },
            _ => TreeScope {
                is_static: true,
                is_durable: true,
            },
        }
    }

    pub fn merge(self, dependency: TreeScope) -> Self {
        if dependency.is_static {
            return self;
        }
        TreeScope {
            is_static: false,
            is_durable: self.is_durable && dependency.is_durable,
        }
    }
}

/// One provider of one module, caching its instances per context
pub struct InstanceWrapper {
    pub(crate) id: WrapperId,
    pub(crate) token: Token,
    pub(crate) module: ModuleId,
    pub(crate) module_name: Arc<str>,
    pub(crate) kind: ProviderKind,
    pub(crate) metadata: ProviderMetadata,
    pub(crate) hooks: Option<HookCaster>,
    /// Set once by the linker
    pub(crate) links: OnceLock<Result<Arc<Links>, LinkFailure>>,
    /// Set once the dependency tree was verified to be acyclic and complete
    pub(crate) tree: OnceLock<TreeScope>,
    instances: Mutex<HashMap<ContextKey, InstanceSlot>>,
}

impl fmt::Debug for InstanceWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceWrapper")
            .field("token", &self.token)
            .field("module", &self.module_name)
            .field("kind", &self.kind)
            .field("scope", &self.metadata.scope)
            .field("durable", &self.metadata.durable)
            .field("cached", &self.instances.lock().len())
            .finish()
    }
}

impl InstanceWrapper {
    pub(crate) fn new(
        id: WrapperId,
        module: ModuleId,
        module_name: Arc<str>,
        definition: ProviderDefinition,
    ) -> Self {
        let ProviderDefinition {
            token,
            kind,
            metadata,
            hooks,
        } = definition;

        InstanceWrapper {
            id,
            token,
            module,
            module_name,
            kind,
            metadata,
            hooks,
            links: OnceLock::new(),
            tree: OnceLock::new(),
            instances: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> WrapperId {
        self.id
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn module(&self) -> ModuleId {
        self.module
    }

    pub fn kind(&self) -> &ProviderKind {
        &self.kind
    }

    pub fn scope(&self) -> Scope {
        self.metadata.scope
    }

    pub fn is_durable(&self) -> bool {
        self.metadata.durable
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.kind, ProviderKind::Factory(_)) && self.metadata.scope == Scope::Transient
    }

    pub fn has_lifecycle(&self) -> bool {
        self.hooks.is_some()
    }

    /// None until the wrapper's dependency tree has been verified
    pub fn is_dependency_tree_static(&self) -> Option<bool> {
        self.tree.get().map(|tree| tree.is_static)
    }

    /// The cache key for `context`, None if nothing is cached
    pub(crate) fn context_key(&self, context: &ContextId) -> Result<Option<ContextKey>, ResolveError> {
        if self.is_transient() {
            return Ok(None);
        }

        let tree = self
            .tree
            .get()
            .copied()
            .unwrap_or_else(|| TreeScope::declared(&self.kind, &self.metadata));
        if tree.is_static {
            return Ok(Some(ContextKey::Static));
        }
        if context.is_static() {
            return Err(ResolveError::InvalidScope {
                token: self.token.clone(),
            });
        }

        match (tree.is_durable, context.durable_key()) {
            (true, Some(discriminant)) => Ok(Some(ContextKey::Durable(discriminant.clone()))),
            _ => Ok(Some(ContextKey::Context(context.id()))),
        }
    }

    /// Returns the constructed instance of `context`, pending constructions are not returned
    pub fn get_instance_by_context_id(&self, context: &ContextId) -> Option<Instance> {
        let key = self.context_key(context).ok()??;
        match self.instances.lock().get(&key) {
            Some(InstanceSlot::Ready(instance)) => Some(instance.clone()),
            _ => None,
        }
    }

    /// Stores an already built instance for `context`
    ///
    /// Ignored for transient providers.
    pub fn set_instance_by_context_id(
        &self,
        context: &ContextId,
        instance: Instance,
    ) -> Result<(), ResolveError> {
        if let Some(key) = self.context_key(context)? {
            self.instances.lock().insert(key, InstanceSlot::Ready(instance));
        }
        Ok(())
    }

    /// Returns what is cached under `key`, or stores the construction made by `construct`
    ///
    /// Check and store happen under one lock, so only the first caller's construction is ever started.
    pub(crate) fn claim(
        &self,
        key: ContextKey,
        construct: impl FnOnce() -> SharedConstruction,
    ) -> Claim {
        let mut instances = self.instances.lock();
        match instances.entry(key) {
            Entry::Occupied(entry) => match entry.get() {
                InstanceSlot::Ready(instance) => Claim::Ready(instance.clone()),
                InstanceSlot::Pending(pending) => Claim::Pending(pending.clone()),
            },
            Entry::Vacant(entry) => {
                let pending = construct();
                entry.insert(InstanceSlot::Pending(pending.clone()));
                Claim::Pending(pending)
            }
        }
    }

    /// Replaces the pending construction under `key` with its result
    pub(crate) fn publish(&self, key: &ContextKey, instance: Instance) {
        if let Some(slot) = self.instances.lock().get_mut(key) {
            *slot = InstanceSlot::Ready(instance);
        }
    }

    /// Removes a failed construction
    pub(crate) fn abandon(&self, key: &ContextKey) {
        let mut instances = self.instances.lock();
        if let Some(InstanceSlot::Pending(_)) = instances.get(key) {
            instances.remove(key);
        }
    }

    /// Drops everything cached for one request context
    pub(crate) fn release(&self, context: &ContextId) -> bool {
        self.instances
            .lock()
            .remove(&ContextKey::Context(context.id()))
            .is_some()
    }

    pub(crate) fn clear(&self) {
        self.instances.lock().clear();
    }
}
