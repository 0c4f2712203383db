use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use futures_channel::oneshot;

use crate::{
    context::ContextId,
    errors::{InjectError, ResolveError},
    factories::DependencyInfo,
    types::{Instance, Token},
};

pub mod arc;
pub mod lazy;

/// Allows custom behaviour on injection
///
/// Dependencies are resolved before the factory runs, so taking them out of the handle is synchronous.
pub trait Resolver: Sized {
    fn resolve(handle: &mut DiHandle) -> Result<Self, InjectError>;

    fn dependency_info() -> DependencyInfo;
}

/// A dependency as handed to a factory
pub(crate) enum ResolvedDependency {
    Instance(Instance),
    /// Forward reference, filled once the resolution it belongs to completes
    Deferred(oneshot::Receiver<Result<Instance, ResolveError>>),
    /// Optional and not provided
    Missing(Token),
}

/// DI Handle passed to factories
///
/// Holds the resolved dependencies of one construction, in declaration order.
pub struct DiHandle {
    arguments: VecDeque<ResolvedDependency>,
    properties: HashMap<Arc<str>, ResolvedDependency>,
    context: ContextId,
}

impl DiHandle {
    pub(crate) fn new(
        arguments: Vec<ResolvedDependency>,
        properties: HashMap<Arc<str>, ResolvedDependency>,
        context: ContextId,
    ) -> Self {
        DiHandle {
            arguments: arguments.into(),
            properties,
            context,
        }
    }

    /// Takes the next declared dependency
    pub fn resolve<T: Resolver>(&mut self) -> Result<T, InjectError> {
        T::resolve(self)
    }

    /// Takes the dependency declared under `name`
    pub fn property<T: Resolver>(&mut self, name: &str) -> Result<T, InjectError> {
        let dependency = self
            .properties
            .remove(name)
            .ok_or_else(|| InjectError::MissingProperty(name.to_string()))?;

        let mut single = DiHandle {
            arguments: VecDeque::from([dependency]),
            properties: HashMap::new(),
            context: self.context.clone(),
        };
        T::resolve(&mut single)
    }

    /// The context this instance is built for
    pub fn context(&self) -> &ContextId {
        &self.context
    }

    /// Number of arguments not taken yet
    pub fn remaining(&self) -> usize {
        self.arguments.len()
    }

    pub(crate) fn next(&mut self, requested: &'static str) -> Result<ResolvedDependency, InjectError> {
        self.arguments
            .pop_front()
            .ok_or(InjectError::MissingArgument(requested))
    }

    pub(crate) fn peek(&self) -> Option<&ResolvedDependency> {
        self.arguments.front()
    }
}
