use std::{any::type_name, fmt, ops::Deref, sync::Arc};

use tessera_di::{DependencyInfo, DiHandle, InjectError, Resolver};

/// A wrapper type to allow for config injections
///
/// Configs registered through [ConfigModule](crate::module::ConfigModule) are
/// visible in every module, a factory only declares `Config<T>` as a dependency.
///
/// # Example
/// ```rust
/// # use tessera_config::Config;
/// # use tessera_di::{InjectError, Provider};
/// struct MailerConfig {
///     sender: String,
/// }
/// struct Mailer {
///     sender: String,
/// }
///
/// let mailer = Provider::factory(|mut di| async move {
///     let config: Config<MailerConfig> = di.resolve()?;
///     Ok::<_, InjectError>(Mailer { sender: config.sender.clone() })
/// })
/// .inject::<Config<MailerConfig>>();
/// ```
pub struct Config<T> {
    inner: Arc<T>,
}
impl<T> Deref for Config<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
impl<T> Clone for Config<T> {
    fn clone(&self) -> Self {
        Config {
            inner: self.inner.clone(),
        }
    }
}
impl<T: fmt::Debug> fmt::Debug for Config<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Config").field(&self.inner).finish()
    }
}
impl<T> Config<T> {
    pub fn inner(&self) -> Arc<T> {
        self.inner.clone()
    }

    pub fn into_inner(self) -> Arc<T> {
        self.inner
    }
}

impl<T: Send + Sync + 'static> Resolver for Config<T> {
    fn resolve(handle: &mut DiHandle) -> Result<Self, InjectError> {
        let inner = Arc::<T>::resolve(handle).inspect_err(|_| {
            tracing::error!("Config {} is not registered in the ConfigModule", type_name::<T>());
        })?;
        Ok(Config { inner })
    }

    fn dependency_info() -> DependencyInfo {
        DependencyInfo::of::<Arc<T>>()
    }
}
