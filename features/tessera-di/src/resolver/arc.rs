use std::{any::type_name, sync::Arc};

use crate::{
    errors::InjectError,
    factories::DependencyInfo,
    resolver::{DiHandle, ResolvedDependency, Resolver},
    types::{Injectable, Token},
};

impl<T: Injectable> Resolver for Arc<T> {
    fn resolve(handle: &mut DiHandle) -> Result<Self, InjectError> {
        match handle.next(type_name::<T>())? {
            ResolvedDependency::Instance(instance) => {
                instance
                    .downcast::<T>()
                    .map_err(|actual_type| InjectError::DowncastFailed {
                        required_type: type_name::<T>(),
                        actual_type,
                    })
            }
            ResolvedDependency::Deferred(_) => Err(InjectError::ForwardReference(type_name::<T>())),
            ResolvedDependency::Missing(token) => Err(InjectError::NotProvided(token)),
        }
    }

    fn dependency_info() -> DependencyInfo {
        DependencyInfo::token(Token::of::<T>())
    }
}

impl<Resolvable: Resolver> Resolver for Option<Resolvable> {
    fn resolve(handle: &mut DiHandle) -> Result<Self, InjectError> {
        // If nothing provides the dependency Option does not fail
        if let Some(ResolvedDependency::Missing(_)) = handle.peek() {
            handle.next(type_name::<Self>())?;
            return Ok(None);
        }
        Resolvable::resolve(handle).map(Some)
    }

    fn dependency_info() -> DependencyInfo {
        Resolvable::dependency_info().optional()
    }
}
