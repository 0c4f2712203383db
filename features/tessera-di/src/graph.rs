//! The module graph
//!
//! Compilation happens in two phases:
//! 1. Every reachable declaration is collected, awaiting deferred imports on the way.
//!    Forward references are only recorded as placeholders.
//! 2. Placeholders are evaluated once all declarations are known. Whatever they
//!    point to goes through phase 1 again, until no placeholder is left.
//!
//! Modules and wrappers live in arenas and reference each other by index, so
//! circular imports are just edges.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    fmt,
    sync::Arc,
};

use crate::{
    errors::{CompileError, ResolveError},
    module::{Export, ForwardRef, ModuleDefinition, ModuleImport, ModuleKey},
    provider::ProviderDefinition,
    types::Token,
    wrapper::{InstanceWrapper, Link, LinkFailure, Links, WrapperId},
};

/// Index of a module inside its [ModuleGraph]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub(crate) usize);

/// Why a token is not visible from a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LookupError {
    NotFound,
    /// Provided by `exporter`, which does not export it
    NotExported { exporter: ModuleId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExportTarget {
    Provider(WrapperId),
    Module(ModuleId),
}

/// A compiled module
pub struct CompiledModule {
    id: ModuleId,
    key: ModuleKey,
    name: Arc<str>,
    /// Declaration order
    providers: Vec<WrapperId>,
    provider_index: HashMap<Token, WrapperId>,
    imports: Vec<ModuleId>,
    exports: Vec<ExportTarget>,
    global: bool,
}

impl CompiledModule {
    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn key(&self) -> &ModuleKey {
        &self.key
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn providers(&self) -> &[WrapperId] {
        &self.providers
    }

    pub fn provider(&self, token: &Token) -> Option<WrapperId> {
        self.provider_index.get(token).copied()
    }

    pub fn imports(&self) -> &[ModuleId] {
        &self.imports
    }

    pub fn is_global(&self) -> bool {
        self.global
    }
}

impl fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledModule")
            .field("name", &self.name)
            .field("providers", &self.providers.len())
            .field("imports", &self.imports)
            .field("global", &self.global)
            .finish()
    }
}

/// Immutable graph of modules and their providers
pub struct ModuleGraph {
    modules: Vec<CompiledModule>,
    by_key: HashMap<ModuleKey, ModuleId>,
    wrappers: Vec<Arc<InstanceWrapper>>,
    globals: Vec<ModuleId>,
    root: ModuleId,
}

impl fmt::Debug for ModuleGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for module in &self.modules {
            let providers: Vec<String> = module
                .providers
                .iter()
                .map(|id| self.wrappers[id.0].token.to_string())
                .collect();
            map.entry(&module.name, &providers);
        }
        map.finish()
    }
}

/// A module whose imports are still being collected
struct PendingModule {
    key: ModuleKey,
    name: Arc<str>,
    imports: Vec<Option<ModuleId>>,
    providers: Vec<ProviderDefinition>,
    exports: Vec<Export>,
    global: bool,
}

#[derive(Default)]
struct Compiler {
    modules: Vec<PendingModule>,
    by_key: HashMap<ModuleKey, ModuleId>,
    queue: VecDeque<(ModuleId, usize, ModuleImport)>,
    forward_refs: Vec<(ModuleId, usize, ForwardRef)>,
}

impl Compiler {
    fn register(&mut self, definition: ModuleDefinition) -> ModuleId {
        if let Some(existing) = self.by_key.get(&definition.key) {
            return *existing;
        }

        let ModuleDefinition {
            key,
            name,
            imports,
            providers,
            exports,
            global,
        } = definition;

        let id = ModuleId(self.modules.len());
        let import_count = imports.len();
        tracing::debug!("Registering module {name} with {} providers", providers.len());

        for (index, import) in imports.into_iter().enumerate() {
            self.queue.push_back((id, index, import));
        }
        self.by_key.insert(key.clone(), id);
        self.modules.push(PendingModule {
            imports: vec![None; import_count],
            key,
            name,
            providers,
            exports,
            global,
        });

        id
    }

    fn link_import(&mut self, parent: ModuleId, index: usize, import: ModuleId) -> Result<(), CompileError> {
        let module = &mut self.modules[parent.0];
        if import == parent {
            return Err(CompileError::InvalidModule {
                parent: module.name.clone(),
                index,
                reason: "a module can't import itself",
            });
        }
        module.imports[index] = Some(import);
        Ok(())
    }

    /// Phase 1 - registers everything reachable without evaluating forward references
    async fn collect(&mut self) -> Result<(), CompileError> {
        while let Some((parent, index, import)) = self.queue.pop_front() {
            match import {
                ModuleImport::Module { key, define } => {
                    let id = match self.by_key.get(&key) {
                        Some(id) => *id,
                        None => self.register(define()),
                    };
                    self.link_import(parent, index, id)?;
                }
                ModuleImport::Dynamic(definition) => {
                    let id = self.register(*definition);
                    self.link_import(parent, index, id)?;
                }
                ModuleImport::Deferred(definition) => {
                    tracing::debug!(
                        "Awaiting deferred import [{index}] of {}",
                        self.modules[parent.0].name
                    );
                    let resolved = definition.await;
                    self.queue.push_front((parent, index, resolved));
                }
                ModuleImport::Forward(reference) => {
                    self.forward_refs.push((parent, index, reference));
                }
            }
        }
        Ok(())
    }

    /// Phase 2 - evaluates the recorded forward references
    fn resolve_forward_refs(&mut self) -> Result<(), CompileError> {
        for (parent, index, reference) in std::mem::take(&mut self.forward_refs) {
            let parent_name = self.modules[parent.0].name.clone();
            match reference.evaluate() {
                None => {
                    return Err(CompileError::UndefinedModule {
                        parent: parent_name,
                        index,
                    })
                }
                Some(ModuleImport::Forward(_)) => {
                    return Err(CompileError::InvalidModule {
                        parent: parent_name,
                        index,
                        reason: "a forward reference must resolve to a module, not to another forward reference",
                    })
                }
                Some(import) => self.queue.push_back((parent, index, import)),
            }
        }
        Ok(())
    }
}

impl ModuleGraph {
    /// Builds the graph of everything reachable from `root`
    pub async fn compile(root: ModuleDefinition) -> Result<ModuleGraph, CompileError> {
        let mut compiler = Compiler::default();
        let root = compiler.register(root);

        loop {
            compiler.collect().await?;
            if compiler.forward_refs.is_empty() {
                break;
            }
            compiler.resolve_forward_refs()?;
        }

        let graph = Self::assemble(compiler, root)?;
        tracing::debug!(
            "Compiled module graph with {} modules and {} providers",
            graph.modules.len(),
            graph.wrappers.len()
        );
        Ok(graph)
    }

    fn assemble(compiler: Compiler, root: ModuleId) -> Result<ModuleGraph, CompileError> {
        let Compiler {
            modules: pending,
            by_key,
            ..
        } = compiler;

        let mut wrappers = Vec::new();
        let mut modules = Vec::with_capacity(pending.len());
        let mut declared_exports = Vec::with_capacity(pending.len());

        for (index, module) in pending.into_iter().enumerate() {
            let id = ModuleId(index);
            // Later declarations override earlier ones, keeping their position
            let mut declared: Vec<ProviderDefinition> = Vec::with_capacity(module.providers.len());
            let mut positions: HashMap<Token, usize> = HashMap::new();
            for definition in module.providers {
                match positions.get(&definition.token) {
                    Some(position) => {
                        tracing::warn!(
                            "Provider {} is declared twice in {}, the last declaration wins",
                            definition.token,
                            module.name
                        );
                        declared[*position] = definition;
                    }
                    None => {
                        positions.insert(definition.token.clone(), declared.len());
                        declared.push(definition);
                    }
                }
            }

            let mut providers: Vec<WrapperId> = Vec::with_capacity(declared.len());
            let mut provider_index = HashMap::with_capacity(declared.len());
            for definition in declared {
                let wrapper_id = WrapperId(wrappers.len());
                provider_index.insert(definition.token.clone(), wrapper_id);
                providers.push(wrapper_id);
                wrappers.push(Arc::new(InstanceWrapper::new(
                    wrapper_id,
                    id,
                    module.name.clone(),
                    definition,
                )));
            }

            declared_exports.push(module.exports);
            modules.push(CompiledModule {
                id,
                key: module.key,
                name: module.name,
                providers,
                provider_index,
                // Every slot has been linked once the queue ran dry
                imports: module.imports.into_iter().flatten().collect(),
                exports: Vec::new(),
                global: module.global,
            });
        }

        // Exports can only be validated once every import is known
        for (index, exports) in declared_exports.into_iter().enumerate() {
            let mut targets = Vec::with_capacity(exports.len());
            for export in exports {
                targets.push(Self::validate_export(&modules, &by_key, ModuleId(index), export)?);
            }
            modules[index].exports = targets;
        }

        let globals = modules.iter().filter(|m| m.global).map(|m| m.id).collect();

        Ok(ModuleGraph {
            modules,
            by_key,
            wrappers,
            globals,
            root,
        })
    }

    fn validate_export(
        modules: &[CompiledModule],
        by_key: &HashMap<ModuleKey, ModuleId>,
        id: ModuleId,
        export: Export,
    ) -> Result<ExportTarget, CompileError> {
        let module = &modules[id.0];
        let imported = |key: &ModuleKey| {
            by_key
                .get(key)
                .copied()
                .filter(|imported| module.imports.contains(imported))
        };

        let target = match &export {
            Export::Token(token) => match module.provider(token) {
                Some(wrapper) => Some(ExportTarget::Provider(wrapper)),
                // Exporting a module type by its token re-exports the module
                None => imported(&ModuleKey::from(token.clone())).map(ExportTarget::Module),
            },
            Export::Module(key) => imported(key).map(ExportTarget::Module),
        };

        target.ok_or_else(|| CompileError::UnknownExport {
            module: module.name.clone(),
            token: match export {
                Export::Token(token) => token,
                Export::Module(key) => key.token().clone(),
            },
        })
    }
}

// Accessors
impl ModuleGraph {
    pub fn root(&self) -> ModuleId {
        self.root
    }

    pub fn modules(&self) -> &[CompiledModule] {
        &self.modules
    }

    pub fn module(&self, id: ModuleId) -> &CompiledModule {
        &self.modules[id.0]
    }

    pub fn get_module_by_token(&self, key: &ModuleKey) -> Result<&CompiledModule, ResolveError> {
        self.by_key
            .get(key)
            .map(|id| &self.modules[id.0])
            .ok_or_else(|| ResolveError::UnknownModule(key.to_string().into()))
    }

    pub fn wrappers(&self) -> &[Arc<InstanceWrapper>] {
        &self.wrappers
    }

    pub fn wrapper(&self, id: WrapperId) -> &Arc<InstanceWrapper> {
        &self.wrappers[id.0]
    }
}

// Visibility
impl ModuleGraph {
    /// The first provider of `token` visible from `module`
    ///
    /// Order: own providers, exports of imports in import order, global modules.
    pub(crate) fn lookup(
        &self,
        module: ModuleId,
        token: &Token,
        strict: bool,
    ) -> Result<WrapperId, LookupError> {
        let requesting = self.module(module);
        if let Some(own) = requesting.provider(token) {
            return Ok(own);
        }
        if strict {
            return Err(LookupError::NotFound);
        }

        let mut visited = HashSet::new();
        for import in self.visible_modules(module) {
            if let Some(found) = self.exported_by(import, token, &mut visited) {
                return Ok(found);
            }
        }

        match self.hidden_in(module, token) {
            Some(exporter) => Err(LookupError::NotExported { exporter }),
            None => Err(LookupError::NotFound),
        }
    }

    /// Every provider of `token` visible from `module`, in lookup order
    pub(crate) fn lookup_all(&self, module: ModuleId, token: &Token, strict: bool) -> Vec<WrapperId> {
        let mut found: Vec<WrapperId> = self.module(module).provider(token).into_iter().collect();
        if strict {
            return found;
        }

        for import in self.visible_modules(module) {
            let mut visited = HashSet::new();
            self.collect_exported(import, token, &mut visited, &mut found);
        }
        found
    }

    /// Imports followed by global modules
    fn visible_modules(&self, module: ModuleId) -> impl Iterator<Item = ModuleId> + '_ {
        let imports = self.module(module).imports.iter().copied();
        let globals = self
            .globals
            .iter()
            .copied()
            .filter(move |global| *global != module && !self.module(module).imports.contains(global));
        imports.chain(globals)
    }

    fn exported_by(
        &self,
        module: ModuleId,
        token: &Token,
        visited: &mut HashSet<ModuleId>,
    ) -> Option<WrapperId> {
        if !visited.insert(module) {
            return None;
        }
        for export in &self.module(module).exports {
            match export {
                ExportTarget::Provider(wrapper) if self.wrapper(*wrapper).token == *token => {
                    return Some(*wrapper)
                }
                ExportTarget::Module(reexported) => {
                    if let Some(found) = self.exported_by(*reexported, token, visited) {
                        return Some(found);
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn collect_exported(
        &self,
        module: ModuleId,
        token: &Token,
        visited: &mut HashSet<ModuleId>,
        found: &mut Vec<WrapperId>,
    ) {
        if !visited.insert(module) {
            return;
        }
        for export in &self.module(module).exports {
            match export {
                ExportTarget::Provider(wrapper) => {
                    if self.wrapper(*wrapper).token == *token && !found.contains(wrapper) {
                        found.push(*wrapper);
                    }
                }
                ExportTarget::Module(reexported) => {
                    self.collect_exported(*reexported, token, visited, found)
                }
            }
        }
    }

    /// A module reachable from `module` which provides `token` without exporting it that far
    ///
    /// Walks imports and re-export targets transitively, closest modules first.
    fn hidden_in(&self, module: ModuleId, token: &Token) -> Option<ModuleId> {
        let mut visited = HashSet::from([module]);
        let mut queue: VecDeque<ModuleId> = self.visible_modules(module).collect();
        while let Some(candidate) = queue.pop_front() {
            if !visited.insert(candidate) {
                continue;
            }
            let candidate = self.module(candidate);
            if candidate.provider(token).is_some() {
                return Some(candidate.id);
            }
            queue.extend(candidate.imports.iter().copied());
            queue.extend(candidate.exports.iter().filter_map(|export| match export {
                ExportTarget::Module(reexported) => Some(*reexported),
                ExportTarget::Provider(_) => None,
            }));
        }
        None
    }

    /// Binds every dependency of a wrapper to the wrapper providing it, relative to the declaring module
    pub(crate) fn link(&self, wrapper: &InstanceWrapper) -> Result<Links, LinkFailure> {
        let bind = |dependency: &crate::factories::DependencyInfo, index: Option<usize>| {
            match self.lookup(wrapper.module, &dependency.token, false) {
                Ok(target) => Ok(Link {
                    dependency: dependency.clone(),
                    target: Some(target),
                }),
                // Nothing visible provides it, wherever it may be hidden
                Err(_) if dependency.optional => Ok(Link {
                    dependency: dependency.clone(),
                    target: None,
                }),
                Err(error) => Err(LinkFailure {
                    dependency: dependency.token.clone(),
                    index,
                    error,
                }),
            }
        };

        let mut links = Links::default();
        for (index, dependency) in wrapper.metadata.dependencies.iter().enumerate() {
            links.arguments.push(bind(dependency, Some(index))?);
        }
        for property in &wrapper.metadata.properties {
            links
                .properties
                .push((property.name.clone(), bind(&property.dependency, None)?));
        }
        Ok(links)
    }

    /// Cached [ModuleGraph::link]
    pub(crate) fn links_of(&self, wrapper: &InstanceWrapper) -> Result<Arc<Links>, LinkFailure> {
        wrapper
            .links
            .get_or_init(|| self.link(wrapper).map(Arc::new))
            .clone()
    }
}
