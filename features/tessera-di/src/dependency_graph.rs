use std::{collections::HashSet, sync::Arc};

use thiserror::Error;

use crate::{
    errors::format_chain,
    factories::DependencyInfo,
    graph::{LookupError, ModuleGraph},
    types::Token,
    wrapper::WrapperId,
};

/// Graph of the entire application
/// Used to check for missing and circular dependencies before anything is built
pub struct DependencyGraph {
    entries: Vec<DependencyGraphEntry>,
    link_errors: Vec<DependencyGraphError>,
}

struct DependencyGraphEntry {
    token: Token,
    module: Arc<str>,
    dependencies: Vec<(DependencyInfo, Option<WrapperId>)>,
}

impl DependencyGraph {
    /// Links every provider of `modules`, collecting the dependencies which can't be found
    pub fn new(modules: &ModuleGraph) -> Self {
        let mut entries = Vec::with_capacity(modules.wrappers().len());
        let mut link_errors = Vec::new();

        for wrapper in modules.wrappers() {
            let dependencies = match modules.links_of(wrapper) {
                Ok(links) => links
                    .arguments
                    .iter()
                    .chain(links.properties.iter().map(|(_, link)| link))
                    .map(|link| (link.dependency.clone(), link.target))
                    .collect(),
                Err(failure) => {
                    let required_by = wrapper.token.clone();
                    let module = wrapper.module_name.clone();
                    link_errors.push(match failure.error {
                        LookupError::NotFound => DependencyGraphError::MissingDependency {
                            dependency: failure.dependency,
                            required_by,
                            module,
                        },
                        LookupError::NotExported { exporter } => DependencyGraphError::NotExported {
                            dependency: failure.dependency,
                            required_by,
                            module,
                            exporter: modules.module(exporter).name().clone(),
                        },
                    });
                    Vec::new()
                }
            };

            entries.push(DependencyGraphEntry {
                token: wrapper.token.clone(),
                module: wrapper.module_name.clone(),
                dependencies,
            });
        }

        Self {
            entries,
            link_errors,
        }
    }

    /// Validate the graph
    ///
    /// Returns a list of all issues
    pub fn check(&self) -> Result<(), DependencyGraphErrors> {
        let mut checked = HashSet::new();
        let mut errors = self.link_errors.clone();
        for index in 0..self.entries.len() {
            let mut dependency_chain = Vec::new();
            check_recurse(
                self,
                &mut checked,
                &mut errors,
                &mut dependency_chain,
                WrapperId(index),
            );
        }

        if !errors.is_empty() {
            return Err(DependencyGraphErrors { errors });
        }

        return Ok(());

        fn check_recurse(
            graph: &DependencyGraph,
            checked: &mut HashSet<WrapperId>,
            errors: &mut Vec<DependencyGraphError>,
            dependency_chain: &mut Vec<WrapperId>,
            id: WrapperId,
        ) {
            // Circular Dependency Check
            if let Some(start) = dependency_chain.iter().position(|entry| *entry == id) {
                let mut chain: Vec<Token> = dependency_chain[start..]
                    .iter()
                    .map(|entry| graph.entries[entry.0].token.clone())
                    .collect();
                let to = graph.entries[id.0].token.clone();
                chain.push(to.clone()); // Add current so chain is complete

                errors.push(DependencyGraphError::CircularDependency {
                    from: chain[0].clone(),
                    to,
                    chain,
                });
                return;
            }

            // Skip other checks if already checked
            if !checked.insert(id) {
                return;
            };

            dependency_chain.push(id);

            for (dependency, target) in &graph.entries[id.0].dependencies {
                let Some(target) = target else {
                    // Optional and not provided
                    continue;
                };

                if dependency.forward {
                    // Don't recurse, this will be checked by itself
                    continue;
                }

                check_recurse(graph, checked, errors, dependency_chain, *target);
            }

            dependency_chain.pop();
        }
    }

    /// Number of providers in the graph
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tokens the provider `id` depends on, with the module providing each of them
    pub fn dependencies_of(&self, id: WrapperId) -> Vec<(Token, Option<Arc<str>>)> {
        self.entries
            .get(id.0)
            .map(|entry| {
                entry
                    .dependencies
                    .iter()
                    .map(|(dependency, target)| {
                        let module = target.map(|target| self.entries[target.0].module.clone());
                        (dependency.token.clone(), module)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for entry in &self.entries {
            let dependencies: Vec<String> = entry
                .dependencies
                .iter()
                .map(|(dependency, _)| dependency.token.to_string())
                .collect();
            map.entry(&format!("{}::{}", entry.module, entry.token), &dependencies);
        }
        map.finish()
    }
}

#[derive(Error, Debug, Clone)]
pub enum DependencyGraphError {
    #[error("'{required_by}' in '{module}' needs '{dependency}' but it is missing")]
    MissingDependency {
        dependency: Token,
        required_by: Token,
        module: Arc<str>,
    },
    #[error("'{required_by}' in '{module}' needs '{dependency}' which '{exporter}' does not export")]
    NotExported {
        dependency: Token,
        required_by: Token,
        module: Arc<str>,
        exporter: Arc<str>,
    },
    #[error("A Circular Dependency exists between '{from}' and '{to}' through [{}] - Consider using `Lazy`", format_chain(.chain))]
    CircularDependency {
        from: Token,
        to: Token,
        chain: Vec<Token>,
    },
}
impl std::fmt::Display for DependencyGraphErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut display = Vec::new();
        display.push("The dependency graph had one or more errors:".to_string());
        for error in &self.errors {
            display.push(format!("- {}", error));
        }
        f.write_str(&display.join("\n"))
    }
}

#[derive(Error, Debug, Clone)]
pub struct DependencyGraphErrors {
    pub errors: Vec<DependencyGraphError>,
}
