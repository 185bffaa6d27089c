//! Module dependency graph validation and ordering
use crate::error::{BuildError, BuildResult};
use crate::module::Module;
use std::collections::{HashMap, HashSet, VecDeque};

/// A module in the dependency graph
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleNode {
    /// Module identifier
    pub name: String,
    /// Identifiers of modules this one depends on
    pub dependencies: Vec<String>,
}

impl ModuleNode {
    /// Create a new module node
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
        }
    }

    /// Add dependencies
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

/// Dependency graph over the modules of one build.
///
/// Keeps declaration order so that every traversal is deterministic.
#[derive(Debug, Clone, Default)]
pub struct ModuleGraph {
    order: Vec<String>,
    modules: HashMap<String, ModuleNode>,
}

impl ModuleGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from provided modules, rejecting duplicate identifiers
    pub fn from_modules(modules: &[Module]) -> BuildResult<Self> {
        let mut graph = Self::new();
        for module in modules {
            graph.add_module(
                ModuleNode::new(module.id.clone()).with_dependencies(module.dependencies.clone()),
            )?;
        }
        Ok(graph)
    }

    /// Add a module to the graph
    pub fn add_module(&mut self, module: ModuleNode) -> BuildResult<()> {
        if self.modules.contains_key(&module.name) {
            return Err(BuildError::DuplicateModule {
                module: module.name,
            });
        }
        self.order.push(module.name.clone());
        self.modules.insert(module.name.clone(), module);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Check that every dependency exists and that there are no cycles
    pub fn validate(&self) -> BuildResult<()> {
        for name in &self.order {
            let module = &self.modules[name];
            for dep in &module.dependencies {
                if !self.modules.contains_key(dep) {
                    return Err(BuildError::ModuleNotFound {
                        module: format!("{} (required by {})", dep, name),
                    });
                }
            }
        }
        self.compute_build_order().map(|_| ())
    }

    /// Dependency-first order (Kahn's algorithm), ties broken by declaration order
    pub fn compute_build_order(&self) -> BuildResult<Vec<String>> {
        // in-degree = number of unbuilt dependencies
        let mut in_degree: HashMap<&str, usize> = self
            .order
            .iter()
            .map(|name| {
                let module = &self.modules[name];
                let known = module
                    .dependencies
                    .iter()
                    .filter(|d| self.modules.contains_key(d.as_str()))
                    .collect::<HashSet<_>>()
                    .len();
                (name.as_str(), known)
            })
            .collect();

        let mut queue: VecDeque<&str> = self
            .order
            .iter()
            .map(String::as_str)
            .filter(|name| in_degree[name] == 0)
            .collect();
        let mut result = Vec::with_capacity(self.order.len());

        while let Some(current) = queue.pop_front() {
            result.push(current.to_string());

            for dependent in &self.order {
                let module = &self.modules[dependent];
                if module.dependencies.iter().any(|d| d == current) {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(dependent.as_str());
                        }
                    }
                }
            }
        }

        if result.len() != self.order.len() {
            return Err(BuildError::CircularDependency(self.find_cycle()));
        }

        Ok(result)
    }

    /// Find a cycle in the graph (for error reporting)
    fn find_cycle(&self) -> String {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for name in &self.order {
            if let Some(cycle) = self.dfs_find_cycle(name, &mut visited, &mut rec_stack, &mut path)
            {
                return cycle;
            }
        }

        "unknown cycle".to_string()
    }

    fn dfs_find_cycle(
        &self,
        name: &str,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<String> {
        if rec_stack.contains(name) {
            path.push(name.to_string());
            let start = path.iter().position(|m| m == name).unwrap_or(0);
            return Some(path[start..].join(" -> "));
        }

        if !visited.insert(name.to_string()) {
            return None;
        }

        rec_stack.insert(name.to_string());
        path.push(name.to_string());

        if let Some(module) = self.modules.get(name) {
            for dep in &module.dependencies {
                if let Some(cycle) = self.dfs_find_cycle(dep, visited, rec_stack, path) {
                    return Some(cycle);
                }
            }
        }

        rec_stack.remove(name);
        path.pop();
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, deps: &[&str]) -> ModuleNode {
        ModuleNode::new(name).with_dependencies(deps.iter().map(|d| d.to_string()).collect())
    }

    #[test]
    fn test_empty_graph() {
        let graph = ModuleGraph::new();
        assert!(graph.is_empty());
        assert_eq!(graph.compute_build_order().unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_linear_dependency_chain() {
        let mut graph = ModuleGraph::new();
        graph.add_module(node("a", &["b"])).unwrap();
        graph.add_module(node("b", &["c"])).unwrap();
        graph.add_module(node("c", &[])).unwrap();

        assert_eq!(graph.compute_build_order().unwrap(), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_independent_modules_keep_declaration_order() {
        let mut graph = ModuleGraph::new();
        for name in ["zeta", "alpha", "mid"] {
            graph.add_module(node(name, &[])).unwrap();
        }
        assert_eq!(
            graph.compute_build_order().unwrap(),
            vec!["zeta", "alpha", "mid"]
        );
    }

    #[test]
    fn test_diamond_dependency() {
        let mut graph = ModuleGraph::new();
        graph.add_module(node("a", &["b", "c"])).unwrap();
        graph.add_module(node("b", &["d"])).unwrap();
        graph.add_module(node("c", &["d"])).unwrap();
        graph.add_module(node("d", &[])).unwrap();

        assert_eq!(graph.compute_build_order().unwrap(), vec!["d", "b", "c", "a"]);
    }

    #[test]
    fn test_circular_dependency_detection() {
        let mut graph = ModuleGraph::new();
        graph.add_module(node("a", &["b"])).unwrap();
        graph.add_module(node("b", &["a"])).unwrap();

        match graph.validate() {
            Err(BuildError::CircularDependency(cycle)) => {
                assert!(cycle.contains("a -> b -> a"), "cycle was {}", cycle);
            }
            other => panic!("Expected CircularDependency error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_dependency() {
        let mut graph = ModuleGraph::new();
        graph.add_module(node("a", &["nonexistent"])).unwrap();

        match graph.validate() {
            Err(BuildError::ModuleNotFound { module }) => {
                assert!(module.contains("nonexistent"));
                assert!(module.contains("required by a"));
            }
            other => panic!("Expected ModuleNotFound error, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_module_rejected() {
        let mut graph = ModuleGraph::new();
        graph.add_module(node("a", &[])).unwrap();
        assert!(matches!(
            graph.add_module(node("a", &[])),
            Err(BuildError::DuplicateModule { .. })
        ));
    }
}
