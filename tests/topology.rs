use ferrous_registry::{ServiceDescriptor, ServiceRegistry, ServiceTopology};
use proptest::prelude::*;
use std::collections::{BTreeMap, HashMap};

fn service(name: &str, deps: &[&str]) -> ServiceDescriptor {
    ServiceDescriptor::singleton(name, |_| Ok(())).with_dependencies(deps.iter().copied())
}

#[test]
fn test_chain_activation_order() {
    let registry = ServiceRegistry::new();
    registry.register(service("api", &["repo"])).unwrap();
    registry.register(service("repo", &["db"])).unwrap();
    registry.register(service("db", &[])).unwrap();

    let topology = registry.service_topology();
    assert_eq!(topology.activation_order, vec!["db", "repo", "api"]);
    assert_eq!(topology.roots, vec!["db"]);
    assert_eq!(topology.leaves, vec!["api"]);
    assert!(topology.orphans.is_empty());
    assert!(topology.is_acyclic());
}

#[test]
fn test_missing_dependencies_and_aliases() {
    let registry = ServiceRegistry::new();
    registry
        .register(service("db", &[]).with_aliases(["database"]))
        .unwrap();
    registry.register(service("api", &["database", "metrics"])).unwrap();
    registry.register(service("cron", &[])).unwrap();

    let topology = registry.service_topology();
    assert_eq!(topology.activation_order.first().map(String::as_str), Some("db"));
    assert_eq!(
        topology.missing_dependencies,
        BTreeMap::from([("api".to_string(), vec!["metrics".to_string()])])
    );
    assert_eq!(topology.orphans, vec!["cron"]);
}

#[test]
fn test_cycles_are_reported_not_fatal() {
    let registry = ServiceRegistry::new();
    registry.register(service("a", &["b"])).unwrap();
    registry.register(service("b", &["c"])).unwrap();
    registry.register(service("c", &["a"])).unwrap();

    let topology = registry.service_topology();
    assert_eq!(topology.cycles.len(), 1);
    let cycle = &topology.cycles[0];
    assert_eq!(cycle.first(), cycle.last());
    assert_eq!(cycle.len(), 4);
    assert_eq!(topology.activation_order.len(), 3);
    assert!(topology.roots.is_empty());
}

#[test]
fn test_topology_follows_unregister() {
    let registry = ServiceRegistry::new();
    registry.register(service("db", &[])).unwrap();
    registry.register(service("api", &["db"])).unwrap();
    registry.unregister("db", true).unwrap();

    let topology = registry.service_topology();
    assert_eq!(topology.activation_order, vec!["api"]);
    assert_eq!(topology.missing_dependencies["api"], vec!["db"]);
}

#[test]
fn test_topology_of_very_long_chain() {
    const LEN: usize = 50_000;
    let registry = ServiceRegistry::new();
    for i in 0..LEN {
        let mut descriptor = ServiceDescriptor::transient(format!("s{:05}", i), |_| Ok(()));
        if i + 1 < LEN {
            descriptor = descriptor.with_dependencies([format!("s{:05}", i + 1)]);
        }
        registry.register(descriptor).unwrap();
    }

    let topology = registry.service_topology();
    assert_eq!(topology.activation_order.len(), LEN);
    assert_eq!(topology.activation_order.first().map(String::as_str), Some("s49999"));
    assert_eq!(topology.activation_order.last().map(String::as_str), Some("s00000"));
    assert_eq!(topology.roots, vec!["s49999"]);
    assert_eq!(topology.leaves, vec!["s00000"]);
    assert!(topology.is_acyclic());
}

proptest! {
    // Edges only point at lower indices, so every generated graph is acyclic.
    #[test]
    fn dependencies_precede_dependents(edges in prop::collection::vec(prop::collection::vec(any::<prop::sample::Index>(), 0..4), 1..12)) {
        let mut deps: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (i, targets) in edges.iter().enumerate() {
            let declared = if i == 0 {
                Vec::new()
            } else {
                targets.iter().map(|t| format!("s{:02}", t.index(i))).collect()
            };
            deps.insert(format!("s{:02}", i), declared);
        }

        let topology = ServiceTopology::from_dependencies(&deps, &HashMap::new());
        prop_assert!(topology.is_acyclic());
        prop_assert_eq!(topology.activation_order.len(), deps.len());

        let position: HashMap<&str, usize> = topology
            .activation_order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();
        for (name, declared) in &deps {
            for dependency in declared {
                prop_assert!(position[dependency.as_str()] < position[name.as_str()]);
            }
        }
    }
}
