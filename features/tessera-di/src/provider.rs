use std::{fmt, future::Future, marker::PhantomData, sync::Arc};

use crate::{
    factories::{DependencyInfo, DynFactory, FnFactory, InstanceFactory, ProviderMetadata},
    lifecycle::Lifecycle,
    resolver::{DiHandle, Resolver},
    types::{DynError, Injectable, Instance, Scope, Token},
};

/// Extracts the lifecycle hooks out of a constructed instance
pub(crate) type HookCaster = fn(&Instance) -> Option<Arc<dyn Lifecycle>>;

fn lifecycle_of<T: Injectable + Lifecycle>(instance: &Instance) -> Option<Arc<dyn Lifecycle>> {
    instance
        .downcast::<T>()
        .ok()
        .map(|hooks| hooks as Arc<dyn Lifecycle>)
}

/// How a provider produces its instance
#[derive(Clone)]
pub enum ProviderKind {
    /// Built by a factory - classes and closures alike
    Factory(Arc<dyn DynFactory>),
    /// A prebuilt value
    Value(Instance),
    /// Alias to another token, resolved from the declaring module
    Existing(Token),
}
impl fmt::Debug for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Factory(factory) => write!(f, "Factory({})", factory.supplies()),
            ProviderKind::Value(instance) => write!(f, "Value({})", instance.info),
            ProviderKind::Existing(token) => write!(f, "Existing({token})"),
        }
    }
}

/// A provider as declared inside a module
#[derive(Clone, Debug)]
pub struct ProviderDefinition {
    pub(crate) token: Token,
    pub(crate) kind: ProviderKind,
    pub(crate) metadata: ProviderMetadata,
    pub(crate) hooks: Option<HookCaster>,
}
impl ProviderDefinition {
    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn kind(&self) -> &ProviderKind {
        &self.kind
    }

    pub fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }
}

/// Entry points for declaring providers
///
/// ```
/// # use std::{convert::Infallible, sync::Arc};
/// # use tessera_di::{Provider, Scope};
/// struct Clock;
/// struct Greeter { clock: Arc<Clock> }
///
/// let clock = Provider::value(Clock);
/// let greeter = Provider::factory(|mut di| async move {
///     Ok::<_, tessera_di::InjectError>(Greeter { clock: di.resolve()? })
/// })
/// .inject::<Arc<Clock>>()
/// .scope(Scope::Request);
/// ```
pub struct Provider;

impl Provider {
    /// A provider built by an [InstanceFactory], registered under its provided type
    pub fn class<F: InstanceFactory>(factory: F) -> ProviderBuilder<F::Provides> {
        ProviderBuilder::new(
            Token::of::<F::Provides>(),
            ProviderKind::Factory(Arc::new(factory)),
            F::metadata(),
        )
    }

    /// A provider built by an async closure, registered under its output type
    pub fn factory<T, F, Fut, E>(factory: F) -> ProviderBuilder<T>
    where
        T: Injectable,
        F: Fn(DiHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<DynError> + 'static,
    {
        ProviderBuilder::new(
            Token::of::<T>(),
            ProviderKind::Factory(Arc::new(FnFactory::new(factory))),
            ProviderMetadata::default(),
        )
    }

    /// A prebuilt value, registered under its type
    pub fn value<T: Injectable>(value: T) -> ProviderBuilder<T> {
        ProviderBuilder::new(
            Token::of::<T>(),
            ProviderKind::Value(Instance::new(value)),
            ProviderMetadata::default(),
        )
    }

    /// A prebuilt, already type-erased value
    pub fn instance(token: impl Into<Token>, instance: Instance) -> ProviderDefinition {
        ProviderDefinition {
            token: token.into(),
            kind: ProviderKind::Value(instance),
            metadata: ProviderMetadata::default(),
            hooks: None,
        }
    }

    /// Registers `token` as an alias of `target`
    pub fn existing(token: impl Into<Token>, target: impl Into<Token>) -> ProviderDefinition {
        let target = target.into();
        ProviderDefinition {
            token: token.into(),
            metadata: ProviderMetadata::new().inject_info(DependencyInfo::token(target.clone())),
            kind: ProviderKind::Existing(target),
            hooks: None,
        }
    }
}

/// Typed builder of a [ProviderDefinition]
pub struct ProviderBuilder<T> {
    definition: ProviderDefinition,
    _provides: PhantomData<fn() -> T>,
}

impl<T: Injectable> ProviderBuilder<T> {
    fn new(token: Token, kind: ProviderKind, metadata: ProviderMetadata) -> Self {
        ProviderBuilder {
            definition: ProviderDefinition {
                token,
                kind,
                metadata,
                hooks: None,
            },
            _provides: PhantomData,
        }
    }

    /// Registers the provider under another token
    pub fn provide(mut self, token: impl Into<Token>) -> Self {
        self.definition.token = token.into();
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.definition.metadata.scope = scope;
        self
    }

    /// Shares request scoped instances between contexts with the same durable key
    pub fn durable(mut self) -> Self {
        self.definition.metadata.durable = true;
        self
    }

    pub fn metadata(mut self, metadata: ProviderMetadata) -> Self {
        self.definition.metadata = metadata;
        self
    }

    /// Declares the next constructor dependency
    pub fn inject<R: Resolver>(mut self) -> Self {
        self.definition.metadata.dependencies.push(R::dependency_info());
        self
    }

    pub fn inject_token(self, token: impl Into<Token>) -> Self {
        self.inject_info(DependencyInfo::token(token))
    }

    pub fn inject_optional(self, token: impl Into<Token>) -> Self {
        self.inject_info(DependencyInfo::token(token).optional())
    }

    pub fn inject_forward(self, token: impl Into<Token>) -> Self {
        self.inject_info(DependencyInfo::token(token).forward())
    }

    pub fn inject_info(mut self, dependency: DependencyInfo) -> Self {
        self.definition.metadata.dependencies.push(dependency);
        self
    }

    /// Declares a dependency taken by name with [DiHandle::property]
    pub fn property<R: Resolver>(mut self, name: impl Into<Arc<str>>) -> Self {
        self.definition.metadata = self.definition.metadata.property::<R>(name);
        self
    }

    pub fn property_token(mut self, name: impl Into<Arc<str>>, token: impl Into<Token>) -> Self {
        self.definition.metadata = self
            .definition
            .metadata
            .property_info(name, DependencyInfo::token(token));
        self
    }

    pub fn build(self) -> ProviderDefinition {
        self.definition
    }
}

impl<T: Injectable + Lifecycle> ProviderBuilder<T> {
    /// Runs the [Lifecycle] hooks of every instance built by this provider
    pub fn lifecycle(mut self) -> Self {
        self.definition.hooks = Some(lifecycle_of::<T>);
        self
    }
}

impl<T: Injectable> From<ProviderBuilder<T>> for ProviderDefinition {
    fn from(builder: ProviderBuilder<T>) -> Self {
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Clock;

    #[test]
    fn existing_depends_on_its_target() {
        let alias = Provider::existing("CLOCK", Token::of::<Clock>());
        assert_eq!(alias.token(), &Token::named("CLOCK"));
        assert_eq!(alias.metadata().dependencies, vec![DependencyInfo::token(Token::of::<Clock>())]);
        assert!(matches!(alias.kind(), ProviderKind::Existing(_)));
    }

    #[test]
    fn builder_overrides_token_and_scope() {
        let definition: ProviderDefinition = Provider::value(Clock)
            .provide("WALL_CLOCK")
            .scope(Scope::Transient)
            .into();
        assert_eq!(definition.token(), &Token::named("WALL_CLOCK"));
        assert_eq!(definition.metadata().scope, Scope::Transient);
        assert!(definition.hooks.is_none());
    }
}
