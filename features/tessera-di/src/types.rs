use std::{
    any::{Any, TypeId},
    fmt,
    sync::Arc,
};

use crate::lifecycle::Lifecycle;

/// Errors produced by user factories and hooks
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// We assume that we are using a multithreaded async runtime
/// So anything injectable needs to be Send + Sync + 'static
pub trait Injectable: Send + Sync + 'static {}
impl<T: Send + Sync + 'static> Injectable for T {}

/// Type Name and Type Id
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct TypeInfo {
    pub type_name: &'static str,
    pub type_id: TypeId,
}
impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}
impl TypeInfo {
    pub fn of<T: 'static + ?Sized>() -> TypeInfo {
        TypeInfo {
            type_name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
        }
    }
}

/// Key under which a provider (or a module) is registered
///
/// Type tokens are the common case, named tokens allow registering several
/// providers of the same type or values without a dedicated type.
#[derive(Clone, Hash, PartialEq, Eq)]
pub enum Token {
    Type(TypeInfo),
    Named(Arc<str>),
}
impl Token {
    pub fn of<T: 'static + ?Sized>() -> Token {
        Token::Type(TypeInfo::of::<T>())
    }

    pub fn named(name: impl Into<Arc<str>>) -> Token {
        Token::Named(name.into())
    }
}
impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Type(info) => f.write_str(info.type_name),
            Token::Named(name) => f.write_str(name),
        }
    }
}
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Type(info) => write!(f, "Type({})", info.type_name),
            Token::Named(name) => write!(f, "Named({name:?})"),
        }
    }
}
impl From<TypeInfo> for Token {
    fn from(info: TypeInfo) -> Self {
        Token::Type(info)
    }
}
impl From<&'static str> for Token {
    fn from(name: &'static str) -> Self {
        Token::Named(name.into())
    }
}
impl From<String> for Token {
    fn from(name: String) -> Self {
        Token::Named(name.into())
    }
}

/// Instance lifetime policy of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    /// One instance for the whole application
    #[default]
    Singleton,
    /// One instance per [ContextId](crate::context::ContextId)
    Request,
    /// A new instance for every resolution
    Transient,
}

/// Instance of a Provider
#[derive(Clone)]
pub struct Instance {
    pub info: TypeInfo,
    pub instance: Arc<dyn Any + Send + Sync + 'static>,
    hooks: Option<Arc<dyn Lifecycle>>,
}
impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type", &self.info.type_name)
            .field("hooks", &self.hooks.is_some())
            .finish()
    }
}

impl Instance {
    pub fn new<ExistingInstance: Injectable>(instance: ExistingInstance) -> Self {
        Self::from_arc(Arc::new(instance))
    }

    pub fn from_arc<ExistingInstance: Injectable>(instance: Arc<ExistingInstance>) -> Self {
        Instance {
            info: TypeInfo::of::<ExistingInstance>(),
            instance,
            hooks: None,
        }
    }

    /// Wraps an already type-erased value, `info` must describe its concrete type
    pub fn from_any(info: TypeInfo, instance: Arc<dyn Any + Send + Sync + 'static>) -> Self {
        Instance {
            info,
            instance,
            hooks: None,
        }
    }

    pub(crate) fn with_hooks(mut self, hooks: Option<Arc<dyn Lifecycle>>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn hooks(&self) -> Option<&Arc<dyn Lifecycle>> {
        self.hooks.as_ref()
    }

    pub fn downcast<T: Injectable>(&self) -> Result<Arc<T>, &'static str> {
        match Arc::downcast::<T>(self.instance.clone()) {
            Ok(downcasted) => Ok(downcasted),
            Err(_) => Err(self.info.type_name),
        }
    }

    /// True if both point to the same allocation
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.instance), Arc::as_ptr(&other.instance))
    }
}
