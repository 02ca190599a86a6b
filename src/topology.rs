//! Dependency graph analysis.
//!
//! [`ServiceTopology`] is computed on demand from the registered descriptors.
//! Dependencies are resolved through the alias map; names that match no
//! registered service are reported as missing instead of failing.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Snapshot of the service dependency graph.
///
/// ```rust
/// use ferrous_registry::ServiceTopology;
/// use std::collections::{BTreeMap, HashMap};
///
/// let mut deps = BTreeMap::new();
/// deps.insert("a".to_string(), vec!["b".to_string()]);
/// deps.insert("b".to_string(), vec!["c".to_string()]);
/// deps.insert("c".to_string(), vec![]);
///
/// let topology = ServiceTopology::from_dependencies(&deps, &HashMap::new());
/// assert_eq!(topology.activation_order, vec!["c", "b", "a"]);
/// assert_eq!(topology.roots, vec!["c"]);
/// assert_eq!(topology.leaves, vec!["a"]);
/// assert!(topology.cycles.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ServiceTopology {
    /// Every service after all of its dependencies (DFS post-order)
    pub activation_order: Vec<String>,
    /// Services with no dependencies
    pub roots: Vec<String>,
    /// Services nothing depends on
    pub leaves: Vec<String>,
    /// Roots that are also leaves
    pub orphans: Vec<String>,
    /// Distinct cycles, each closed by repeating its first name
    pub cycles: Vec<Vec<String>>,
    /// Declared dependency names matching no registered service
    pub missing_dependencies: BTreeMap<String, Vec<String>>,
}

impl ServiceTopology {
    /// Builds the topology from `service -> declared dependencies`.
    pub fn from_dependencies(
        dependencies: &BTreeMap<String, Vec<String>>,
        aliases: &HashMap<String, String>,
    ) -> Self {
        let mut graph: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        let mut dependents: HashMap<&str, BTreeSet<&str>> =
            dependencies.keys().map(|name| (name.as_str(), BTreeSet::new())).collect();
        let mut missing: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (name, declared) in dependencies {
            let mut resolved: Vec<&str> = Vec::new();
            for dependency in declared {
                let target = aliases.get(dependency).unwrap_or(dependency);
                match dependencies.get_key_value(target) {
                    Some((target, _)) => {
                        if !resolved.contains(&target.as_str()) {
                            resolved.push(target.as_str());
                        }
                        dependents.entry(target.as_str()).or_default().insert(name.as_str());
                    }
                    None => missing.entry(name.clone()).or_default().push(dependency.clone()),
                }
            }
            graph.insert(name.as_str(), resolved);
        }
        for values in missing.values_mut() {
            values.sort();
        }

        let mut walk = Walk::default();
        for &name in graph.keys() {
            if !walk.done.contains(name) {
                walk.visit(name, &graph);
            }
        }

        let roots: Vec<String> = graph
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(name, _)| name.to_string())
            .collect();
        let leaves: Vec<String> = graph
            .keys()
            .filter(|name| dependents.get(*name).map_or(true, BTreeSet::is_empty))
            .map(|name| name.to_string())
            .collect();
        let orphans = roots
            .iter()
            .filter(|name| dependents.get(name.as_str()).map_or(true, BTreeSet::is_empty))
            .cloned()
            .collect();

        ServiceTopology {
            activation_order: walk.order.into_iter().map(str::to_string).collect(),
            roots,
            leaves,
            orphans,
            cycles: walk.cycles,
            missing_dependencies: missing,
        }
    }

    pub fn is_acyclic(&self) -> bool {
        self.cycles.is_empty()
    }
}

#[derive(Default)]
struct Walk<'g> {
    order: Vec<&'g str>,
    done: HashSet<&'g str>,
    cycles: Vec<Vec<String>>,
    seen_cycles: HashSet<BTreeSet<&'g str>>,
}

impl<'g> Walk<'g> {
    /// Post-order DFS from `root` with an explicit stack. `path` holds the
    /// nodes being expanded and the index of their next dependency.
    fn visit(&mut self, root: &'g str, graph: &BTreeMap<&'g str, Vec<&'g str>>) {
        if self.done.contains(root) {
            return;
        }
        let mut path: Vec<(&'g str, usize)> = vec![(root, 0)];
        let mut on_path: HashSet<&'g str> = HashSet::from([root]);

        while let Some((node, next)) = path.last_mut() {
            let node = *node;
            let dependencies = graph.get(node).map(Vec::as_slice).unwrap_or_default();
            let Some(&dependency) = dependencies.get(*next) else {
                path.pop();
                on_path.remove(node);
                self.done.insert(node);
                self.order.push(node);
                continue;
            };
            *next += 1;

            if on_path.contains(dependency) {
                let start = path.iter().position(|&(n, _)| n == dependency).unwrap_or_default();
                let members: BTreeSet<&str> = path[start..].iter().map(|&(n, _)| n).collect();
                if self.seen_cycles.insert(members) {
                    let mut cycle: Vec<String> = path[start..].iter().map(|(n, _)| n.to_string()).collect();
                    cycle.push(dependency.to_string());
                    self.cycles.push(cycle);
                }
            } else if !self.done.contains(dependency) {
                on_path.insert(dependency);
                path.push((dependency, 0));
            }
        }
    }
}
