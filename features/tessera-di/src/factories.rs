use std::{future::Future, marker::PhantomData, sync::Arc};

use futures::{future::BoxFuture, FutureExt};

use crate::{
    resolver::{DiHandle, Resolver},
    types::{DynError, Injectable, Instance, Scope, Token, TypeInfo},
};

/// Information about a Factory dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyInfo {
    /// The required token
    pub token: Token,
    /// If it is optional or required
    pub optional: bool,
    /// Forward reference - injected as [Lazy](crate::resolver::lazy::Lazy) once its cycle closes
    pub forward: bool,
}
impl DependencyInfo {
    /// Dependency info of anything which can be taken out of a [DiHandle]
    pub fn of<R: Resolver>() -> Self {
        R::dependency_info()
    }

    pub fn token(token: impl Into<Token>) -> Self {
        DependencyInfo {
            token: token.into(),
            optional: false,
            forward: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn forward(mut self) -> Self {
        self.forward = true;
        self
    }
}

/// A dependency injected by name instead of by position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyInfo {
    pub name: Arc<str>,
    pub dependency: DependencyInfo,
}

/// Everything the container needs to know about a provider before building it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderMetadata {
    /// Constructor dependencies, in the order the factory takes them
    pub dependencies: Vec<DependencyInfo>,
    pub properties: Vec<PropertyInfo>,
    pub scope: Scope,
    /// Request scoped only: share instances between contexts with the same durable key
    pub durable: bool,
}
impl ProviderMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    pub fn inject<R: Resolver>(self) -> Self {
        self.inject_info(R::dependency_info())
    }

    pub fn inject_info(mut self, dependency: DependencyInfo) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn property<R: Resolver>(self, name: impl Into<Arc<str>>) -> Self {
        self.property_info(name, R::dependency_info())
    }

    pub fn property_info(mut self, name: impl Into<Arc<str>>, dependency: DependencyInfo) -> Self {
        self.properties.push(PropertyInfo {
            name: name.into(),
            dependency,
        });
        self
    }
}

/// A Factory providing instances of a given type
pub trait InstanceFactory: Send + Sync + 'static {
    type Provides: Injectable;

    /// Returns the typeinfo about the factory's provided type
    fn supplies() -> TypeInfo {
        TypeInfo::of::<Self::Provides>()
    }

    /// Dependencies, scope and durability of the provided type
    fn metadata() -> ProviderMetadata;

    /// Constructs a new instance of the factory's provided type
    ///
    /// All declared dependencies are already resolved and can be taken out of `di` in declared order
    fn construct(
        &self,
        di: DiHandle,
    ) -> impl Future<Output = Result<Self::Provides, impl Into<DynError>>> + Send + '_;
}

/// Wrapper Trait for factories, providing instances of Any
pub trait DynFactory: Send + Sync {
    fn supplies(&self) -> TypeInfo;

    /// Constructs a new instance of the factory's provided type
    fn construct(&self, di: DiHandle) -> BoxFuture<'_, Result<Instance, DynError>>;
}
// Impl DynFactory for any InstanceFactory
impl<T: Injectable, SpecificFactory: InstanceFactory<Provides = T>> DynFactory for SpecificFactory {
    fn supplies(&self) -> TypeInfo {
        SpecificFactory::supplies()
    }

    fn construct(&self, di: DiHandle) -> BoxFuture<'_, Result<Instance, DynError>> {
        async move {
            // Forward the call to the specific implementation
            SpecificFactory::construct(self, di)
                .await
                .map(Instance::new)
                .map_err(|e| -> DynError { e.into() })
        }
        .boxed()
    }
}

/// Factory backed by an async closure
pub(crate) struct FnFactory<T, F> {
    factory: F,
    _provides: PhantomData<fn() -> T>,
}
impl<T, F> FnFactory<T, F> {
    pub(crate) fn new(factory: F) -> Self {
        FnFactory {
            factory,
            _provides: PhantomData,
        }
    }
}
impl<T, F, Fut, E> DynFactory for FnFactory<T, F>
where
    T: Injectable,
    F: Fn(DiHandle) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Into<DynError> + 'static,
{
    fn supplies(&self) -> TypeInfo {
        TypeInfo::of::<T>()
    }

    fn construct(&self, di: DiHandle) -> BoxFuture<'_, Result<Instance, DynError>> {
        (self.factory)(di)
            .map(|result| -> Result<Instance, DynError> {
                result.map(Instance::new).map_err(Into::into)
            })
            .boxed()
    }
}
