use std::{
    any::Any,
    fmt,
    hash::{Hash, Hasher},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

/// Id `1` is reserved for [STATIC_CONTEXT]
static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(2);

/// The context all singleton lookups happen in
pub const STATIC_CONTEXT: ContextId = ContextId {
    id: 1,
    durable: None,
    payload: None,
};

/// Identifies one logical unit of work (usually a request)
///
/// Request-scoped providers are cached per `ContextId`. Two ids are only equal
/// if one was cloned from the other.
#[derive(Clone)]
pub struct ContextId {
    id: u64,
    durable: Option<Arc<str>>,
    payload: Option<Arc<dyn Any + Send + Sync>>,
}

impl ContextId {
    /// Creates a fresh, never seen before context
    pub fn new() -> Self {
        ContextId {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            durable: None,
            payload: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_static(&self) -> bool {
        self.id == STATIC_CONTEXT.id
    }

    /// Durable providers resolved in this context are shared with every
    /// context carrying the same discriminant
    pub fn with_durable_key(mut self, discriminant: impl Into<Arc<str>>) -> Self {
        self.durable = Some(discriminant.into());
        self
    }

    pub fn durable_key(&self) -> Option<&Arc<str>> {
        self.durable.as_ref()
    }

    /// Attaches arbitrary data (e.g. the incoming request) factories can read
    pub fn with_payload<P: Any + Send + Sync>(mut self, payload: P) -> Self {
        self.payload = Some(Arc::new(payload));
        self
    }

    pub fn payload<P: Any + Send + Sync>(&self) -> Option<&P> {
        self.payload.as_deref().and_then(|p| p.downcast_ref())
    }
}
impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}
impl PartialEq for ContextId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for ContextId {}
impl Hash for ContextId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
impl fmt::Debug for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_static() {
            return f.write_str("ContextId(static)");
        }
        let mut debug = f.debug_struct("ContextId");
        debug.field("id", &self.id);
        if let Some(durable) = &self.durable {
            debug.field("durable", durable);
        }
        debug.finish()
    }
}

/// Derives the durable discriminant (e.g. a tenant id) for a new context
pub trait ContextIdStrategy: Send + Sync {
    fn discriminant(&self, context: &ContextId) -> Option<Arc<str>>;
}
impl<F> ContextIdStrategy for F
where
    F: Fn(&ContextId) -> Option<Arc<str>> + Send + Sync,
{
    fn discriminant(&self, context: &ContextId) -> Option<Arc<str>> {
        self(context)
    }
}

/// Creates [ContextId]s, applying a [ContextIdStrategy] if one is set
#[derive(Clone, Default)]
pub struct ContextIdFactory {
    strategy: Option<Arc<dyn ContextIdStrategy>>,
}

impl ContextIdFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(mut self, strategy: impl ContextIdStrategy + 'static) -> Self {
        self.strategy = Some(Arc::new(strategy));
        self
    }

    pub fn create(&self) -> ContextId {
        self.attach(ContextId::new())
    }

    /// Creates a context for a unit of work described by `payload`
    pub fn for_payload<P: Any + Send + Sync>(&self, payload: P) -> ContextId {
        self.attach(ContextId::new().with_payload(payload))
    }

    fn attach(&self, context: ContextId) -> ContextId {
        let discriminant = self
            .strategy
            .as_ref()
            .and_then(|strategy| strategy.discriminant(&context));
        match discriminant {
            Some(discriminant) => context.with_durable_key(discriminant),
            None => context,
        }
    }
}

/// Key of a wrapper cache entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ContextKey {
    Static,
    Context(u64),
    Durable(Arc<str>),
}
