use std::{fmt, future::Future, sync::Arc};

use futures::{future::BoxFuture, FutureExt};

use crate::{provider::ProviderDefinition, types::Token};

/// Stable identity of a module
///
/// Dynamic modules built from the same module type carry a discriminator so
/// that differently configured instances are registered as distinct modules.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ModuleKey {
    token: Token,
    discriminator: Option<Arc<str>>,
}
impl ModuleKey {
    pub fn of<M: 'static + ?Sized>() -> Self {
        ModuleKey {
            token: Token::of::<M>(),
            discriminator: None,
        }
    }

    pub fn named(name: impl Into<Arc<str>>) -> Self {
        ModuleKey {
            token: Token::named(name),
            discriminator: None,
        }
    }

    pub fn with_discriminator(mut self, discriminator: impl Into<Arc<str>>) -> Self {
        self.discriminator = Some(discriminator.into());
        self
    }

    pub fn token(&self) -> &Token {
        &self.token
    }
}
impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.discriminator {
            Some(discriminator) => write!(f, "{}[{discriminator}]", self.token),
            None => write!(f, "{}", self.token),
        }
    }
}
impl fmt::Debug for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleKey({self})")
    }
}
impl From<Token> for ModuleKey {
    fn from(token: Token) -> Self {
        ModuleKey {
            token,
            discriminator: None,
        }
    }
}

/// A module type, declared once and imported by type
pub trait Module: 'static {
    fn definition() -> ModuleDefinition;
}

/// Something a module makes visible to its importers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Export {
    /// One of the module's own providers
    Token(Token),
    /// Re-export everything an imported module exports
    Module(ModuleKey),
}

/// Deferred pointer to a module which can't be referenced directly yet
#[derive(Clone)]
pub struct ForwardRef(Arc<dyn Fn() -> Option<ModuleImport> + Send + Sync>);
impl ForwardRef {
    pub(crate) fn evaluate(&self) -> Option<ModuleImport> {
        (self.0)()
    }
}

/// Wraps a module reference which is only evaluated after all declarations were collected
///
/// Returning `None` reports the slot as undefined during compilation.
pub fn forward_ref<F>(reference: F) -> ModuleImport
where
    F: Fn() -> Option<ModuleImport> + Send + Sync + 'static,
{
    ModuleImport::Forward(ForwardRef(Arc::new(reference)))
}

/// One entry of a module's import list
pub enum ModuleImport {
    /// A [Module] type, defined only if it was not registered yet
    Module {
        key: ModuleKey,
        define: fn() -> ModuleDefinition,
    },
    /// A module built at runtime
    Dynamic(Box<ModuleDefinition>),
    /// Evaluated during the second compilation phase
    Forward(ForwardRef),
    /// Awaited during compilation
    Deferred(BoxFuture<'static, ModuleImport>),
}
impl ModuleImport {
    pub fn of<M: Module>() -> Self {
        ModuleImport::Module {
            key: ModuleKey::of::<M>(),
            define: M::definition,
        }
    }

    /// A module only available once `future` completes
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future + Send + 'static,
        F::Output: Into<ModuleImport>,
    {
        ModuleImport::Deferred(future.map(|import| -> ModuleImport { import.into() }).boxed())
    }
}
impl From<ModuleDefinition> for ModuleImport {
    fn from(definition: ModuleDefinition) -> Self {
        ModuleImport::Dynamic(Box::new(definition))
    }
}
impl fmt::Debug for ModuleImport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleImport::Module { key, .. } => write!(f, "Module({key})"),
            ModuleImport::Dynamic(definition) => write!(f, "Dynamic({})", definition.key),
            ModuleImport::Forward(_) => f.write_str("Forward"),
            ModuleImport::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

/// Declaration of a module: its providers, imports and exports
#[derive(Debug)]
pub struct ModuleDefinition {
    pub(crate) key: ModuleKey,
    pub(crate) name: Arc<str>,
    pub(crate) imports: Vec<ModuleImport>,
    pub(crate) providers: Vec<ProviderDefinition>,
    pub(crate) exports: Vec<Export>,
    pub(crate) global: bool,
}

impl ModuleDefinition {
    pub fn new(key: ModuleKey) -> Self {
        let name = short_name(&key).into();
        ModuleDefinition {
            key,
            name,
            imports: Vec::new(),
            providers: Vec::new(),
            exports: Vec::new(),
            global: false,
        }
    }

    /// Definition for the module type `M`
    pub fn of<M: 'static + ?Sized>() -> Self {
        Self::new(ModuleKey::of::<M>())
    }

    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self::new(ModuleKey::named(name))
    }

    /// Turns this into a distinct instance of the same module type
    pub fn dynamic(mut self, discriminator: impl Into<Arc<str>>) -> Self {
        self.key = self.key.with_discriminator(discriminator);
        self.name = short_name(&self.key).into();
        self
    }

    pub fn name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = name.into();
        self
    }

    pub fn import(mut self, import: impl Into<ModuleImport>) -> Self {
        self.imports.push(import.into());
        self
    }

    pub fn import_module<M: Module>(self) -> Self {
        self.import(ModuleImport::of::<M>())
    }

    pub fn provider(mut self, provider: impl Into<ProviderDefinition>) -> Self {
        self.providers.push(provider.into());
        self
    }

    pub fn export(mut self, token: impl Into<Token>) -> Self {
        self.exports.push(Export::Token(token.into()));
        self
    }

    pub fn export_module(mut self, key: impl Into<ModuleKey>) -> Self {
        self.exports.push(Export::Module(key.into()));
        self
    }

    /// Exports of a global module are visible everywhere without importing it
    pub fn global(mut self) -> Self {
        self.global = true;
        self
    }

    pub fn key(&self) -> &ModuleKey {
        &self.key
    }
}

/// `my_crate::modules::UsersModule` -> `UsersModule`
fn short_name(key: &ModuleKey) -> String {
    let token = key.token.to_string();
    let short = match token.contains('<') {
        true => token.as_str(),
        false => token.rsplit("::").next().unwrap_or(&token),
    };
    match &key.discriminator {
        Some(discriminator) => format!("{short}[{discriminator}]"),
        None => short.to_string(),
    }
}
