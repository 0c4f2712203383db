use std::{
    any::type_name,
    fmt::Debug,
    future::Future,
    ops::Deref,
    pin::Pin,
    sync::{Arc, OnceLock},
    task::{Context, Poll},
};

use futures::FutureExt;
use futures_channel::oneshot;
use parking_lot::Mutex;

use crate::{
    errors::{InjectError, ResolveError},
    factories::DependencyInfo,
    resolver::{DiHandle, ResolvedDependency, Resolver},
    types::{Injectable, Instance, Token},
};

type LazyReceiver = oneshot::Receiver<Result<Instance, ResolveError>>;

/// Lazily resolved dependency, used to break circular dependencies
///
/// Should only be accessed after the resolution that built its owner has completed.
///
/// ### Panics
///
/// If accessed before the resolution has completed
///
/// Note:
///
/// This Type by itself has many panic conditions - However if used in the DI context, no panics should happen unless:
/// - It is accessed during construction, e.g. inside a factory
/// - It is accessed after the resolution has already failed
///
pub struct Lazy<T: Injectable>(Arc<LazyInner<T>>);
impl<T: Injectable> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Lazy(self.0.clone())
    }
}
impl<T: Injectable + Debug> Debug for Lazy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.try_get() {
            Some(Ok(instance)) => f.debug_tuple("Lazy").field(instance).finish(),
            Some(Err(err)) => f.debug_tuple("Lazy").field(err).finish(),
            None => f.debug_tuple("Lazy").field(&"pending").finish(),
        }
    }
}
struct LazyInner<T: Injectable> {
    once: OnceLock<Result<Arc<T>, InjectError>>,
    /// Taken once the result arrived
    rx: Mutex<Option<LazyReceiver>>,
}
impl<T: Injectable> Deref for Lazy<T> {
    type Target = Arc<T>;

    fn deref(&self) -> &Self::Target {
        self.get()
    }
}
impl<T: Injectable> Resolver for Lazy<T> {
    fn resolve(handle: &mut DiHandle) -> Result<Self, InjectError> {
        Ok(match handle.next(type_name::<T>())? {
            ResolvedDependency::Instance(instance) => Lazy::ready(Self::downcast(instance)),
            ResolvedDependency::Deferred(rx) => Lazy::pending(rx),
            ResolvedDependency::Missing(token) => Lazy::ready(Err(InjectError::NotProvided(token))),
        })
    }

    fn dependency_info() -> DependencyInfo {
        DependencyInfo::token(Token::of::<T>()).forward()
    }
}
impl<T: Injectable> Lazy<T> {
    fn ready(result: Result<Arc<T>, InjectError>) -> Self {
        Lazy(Arc::new(LazyInner {
            once: OnceLock::from(result),
            rx: Mutex::new(None),
        }))
    }

    fn pending(rx: LazyReceiver) -> Self {
        Lazy(Arc::new(LazyInner {
            once: OnceLock::new(),
            rx: Mutex::new(Some(rx)),
        }))
    }

    /// Accesses the Lazy Dependency
    ///
    /// # Panics
    /// - When accessed before the resolution has completed
    /// - When the resolution failed
    pub fn get(&self) -> &Arc<T> {
        self.try_get()
            .expect("Lazy inject accessed before initialized")
            .expect("Lazy inject accessed after DI failed")
    }

    /// Try to access the lazy dependency
    ///
    /// None while the forward reference is still being resolved
    pub fn try_get(&self) -> Option<Result<&Arc<T>, &InjectError>> {
        if let Some(result) = self.0.once.get() {
            return Some(result.as_ref());
        }

        // Lock receiver, so result is not taken out while we check
        let mut rx = self.0.rx.lock();

        // Double check once - it might have been set while we waited for the lock
        if let Some(result) = self.0.once.get() {
            return Some(result.as_ref());
        }

        let received = match rx.as_mut().map(oneshot::Receiver::try_recv) {
            Some(Ok(Some(received))) => Self::downcast_recv(received),
            Some(Ok(None)) => return None,
            Some(Err(canceled)) => Err(canceled.into()),
            None => Err(InjectError::Unresolved),
        };
        *rx = None;

        Some(self.0.once.get_or_init(|| received).as_ref())
    }

    /// Resolves as soon as the lazy is available
    ///
    /// Must not be awaited during construction, the forward reference is only filled afterwards
    pub fn wait_result(&self) -> LazyFuture<'_, T> {
        LazyFuture { lazy: &self.0 }
    }
}
impl<T: Injectable> Lazy<T> {
    fn downcast(instance: Instance) -> Result<Arc<T>, InjectError> {
        instance
            .downcast()
            .map_err(|actual_type| InjectError::DowncastFailed {
                required_type: type_name::<T>(),
                actual_type,
            })
    }

    fn downcast_recv(recv: Result<Instance, ResolveError>) -> Result<Arc<T>, InjectError> {
        match recv {
            Ok(instance) => Self::downcast(instance),
            Err(e) => Err(e.into()),
        }
    }
}

/// Future returned by [Lazy::wait_result]
pub struct LazyFuture<'a, T: Injectable> {
    lazy: &'a LazyInner<T>,
}
impl<'a, T: Injectable> Future for LazyFuture<'a, T> {
    type Output = Result<&'a Arc<T>, &'a InjectError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let lazy = self.lazy;

        // Lock receiver, so result is not taken out while we check
        let mut rx = lazy.rx.lock();

        // Check if result is ready
        if let Some(result) = lazy.once.get() {
            return Poll::Ready(result.as_ref());
        }

        let received = match rx.as_mut().map(|rx| rx.poll_unpin(cx)) {
            Some(Poll::Pending) => return Poll::Pending,
            Some(Poll::Ready(Ok(received))) => Lazy::<T>::downcast_recv(received),
            Some(Poll::Ready(Err(canceled))) => Err(canceled.into()),
            None => Err(InjectError::Unresolved),
        };
        *rx = None;

        Poll::Ready(lazy.once.get_or_init(|| received).as_ref())
    }
}

/// Lazy dependency which may not be provided at all
pub struct LazyOption<T: Injectable> {
    lazy: Lazy<T>,
}
impl<T: Injectable> Clone for LazyOption<T> {
    fn clone(&self) -> Self {
        LazyOption {
            lazy: self.lazy.clone(),
        }
    }
}
impl<T: Injectable + Debug> Debug for LazyOption<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.try_get() {
            Some(Ok(instance)) => f.debug_tuple("LazyOption").field(instance).finish(),
            Some(Err(InjectError::NotProvided(_))) => f.debug_tuple("LazyOption").field(&"None").finish(),
            Some(Err(err)) => f.debug_tuple("LazyOption").field(err).finish(),
            None => f.debug_tuple("LazyOption").field(&"pending").finish(),
        }
    }
}
impl<T: Injectable> Resolver for LazyOption<T> {
    fn resolve(handle: &mut DiHandle) -> Result<Self, InjectError> {
        Ok(LazyOption {
            lazy: Lazy::<T>::resolve(handle)?,
        })
    }

    fn dependency_info() -> DependencyInfo {
        Lazy::<T>::dependency_info().optional()
    }
}
impl<T: Injectable> LazyOption<T> {
    /// Accesses the Lazy Dependency - returning an error on access
    pub fn try_get(&self) -> Option<Result<&Arc<T>, &InjectError>> {
        self.lazy.try_get()
    }

    /// Accesses the Lazy Dependency
    ///
    /// # Panics
    /// - If accessed after DI has failed
    pub fn get(&self) -> Option<&Arc<T>> {
        match self.lazy.try_get() {
            None => None,
            Some(Ok(result)) => Some(result),
            Some(Err(InjectError::NotProvided(_))) => None,
            Some(Err(err)) => panic!("Accessed LazyOption after DI failure: {:?}", err),
        }
    }
}
