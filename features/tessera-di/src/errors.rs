use std::sync::Arc;

use futures_channel::oneshot;
use thiserror::Error;

use crate::{
    dependency_graph::DependencyGraphErrors,
    lifecycle::Hook,
    types::{DynError, Token},
};

/// Malformed module declarations, found while compiling the module graph
#[derive(Error, Debug, Clone)]
pub enum CompileError {
    /// A forward reference produced nothing, usually a circular import declared too early
    #[error("Module '{parent}' has an undefined import at index [{index}] - if this is a circular import, use a forward reference that resolves once both modules are declared")]
    UndefinedModule { parent: Arc<str>, index: usize },
    /// The import can't be turned into a module
    #[error("Module '{parent}' has an invalid import at index [{index}]: {reason}")]
    InvalidModule {
        parent: Arc<str>,
        index: usize,
        reason: &'static str,
    },
    /// A module exports something it does not own
    #[error("Module '{module}' exports '{token}' which is neither one of its providers nor an imported module")]
    UnknownExport { module: Arc<str>, token: Token },
}

/// Errors while resolving an instance
///
/// Must be Clone as concurrent resolvers of one instance share the same result
#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    /// The requesting module is not part of the graph
    #[error("Module '{0}' is not part of the module graph")]
    UnknownModule(Arc<str>),
    /// Nothing visible provides the token
    #[error("Can't resolve '{token}'{} in the '{module}' module - dependency chain: [{}]", describe_requirement(.required_by, .index), format_chain(.chain))]
    UnknownElement {
        token: Token,
        module: Arc<str>,
        required_by: Option<Token>,
        index: Option<usize>,
        chain: Vec<Token>,
    },
    /// The token exists in an imported module which does not export it
    #[error("'{token}' is provided by '{exporter}' but not exported to '{module}' - dependency chain: [{}]", format_chain(.chain))]
    UnknownExport {
        token: Token,
        module: Arc<str>,
        exporter: Arc<str>,
        chain: Vec<Token>,
    },
    /// Circular dependency where no edge is a forward reference
    #[error("A circular dependency exists through [{}] - declare one side as a forward reference", format_chain(.cycle))]
    UndefinedForwardRef { cycle: Vec<Token> },
    /// A request scoped dependency tree was resolved outside of a request
    #[error("'{token}' depends on request scoped providers and can't be resolved in the static context")]
    InvalidScope { token: Token },
    /// A Factory failed to build
    #[error("Factory for '{token}' failed - error: {error}")]
    FactoryFailed { token: Token, error: Arc<DynError> },
    /// The init hook of a freshly built instance failed
    #[error("Hook '{hook}' of '{token}' failed - error: {error}")]
    LifecycleFailed {
        token: Token,
        hook: Hook,
        error: Arc<DynError>,
    },
    #[error("Failed to downcast, required: '{required_type}' actual: '{actual_type}'")]
    DowncastFailed {
        required_type: &'static str,
        actual_type: &'static str,
    },
    /// The owning application was closed
    #[error("The application has been closed")]
    Closed,
}

/// Errors while a factory takes its dependencies out of the [DiHandle](crate::resolver::DiHandle)
#[derive(Error, Debug)]
pub enum InjectError {
    /// The factory asked for more dependencies than it declared
    #[error("No resolved dependency left for '{0}' - was it declared?")]
    MissingArgument(&'static str),
    /// The property was never declared
    #[error("No property named '{0}' was declared")]
    MissingProperty(String),
    /// An optional dependency was not provided but taken as required
    #[error("Dependency '{0}' is not provided - use Option to accept its absence")]
    NotProvided(Token),
    #[error("Failed to downcast, required: '{required_type}' actual: '{actual_type}'")]
    DowncastFailed {
        required_type: &'static str,
        actual_type: &'static str,
    },
    /// A forward declared dependency was taken eagerly
    #[error("'{0}' is declared as a forward reference and must be taken as Lazy")]
    ForwardReference(&'static str),
    /// The forward reference was dropped before its cycle closed
    #[error("Forward reference was abandoned before it could be resolved")]
    Unresolved,
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// Generic error during Injection
    #[error("Error during injection: {0}")]
    Other(DynError),
}
impl From<oneshot::Canceled> for InjectError {
    fn from(_: oneshot::Canceled) -> Self {
        Self::Unresolved
    }
}

/// Errors of the [Application](crate::application::Application) root
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    /// There are issues with the dependency graph
    #[error(transparent)]
    DependencyGraph(#[from] DependencyGraphErrors),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// A lifecycle hook failed outside of construction
    #[error("Hook '{hook}' of '{token}' failed - error: {error}")]
    Hook {
        token: Token,
        hook: Hook,
        error: Arc<DynError>,
    },
    /// Initiation timed out
    #[error("Initiation timed out")]
    Timeout,
}

fn describe_requirement(required_by: &Option<Token>, index: &Option<usize>) -> String {
    match (required_by, index) {
        (Some(parent), Some(index)) => format!(" (argument at index [{index}] of '{parent}')"),
        (Some(parent), None) => format!(" (required by '{parent}')"),
        _ => String::new(),
    }
}

pub(crate) fn format_chain(chain: &[Token]) -> String {
    chain
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}
