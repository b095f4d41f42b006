//! Dependency resolver - orders plugins so hard dependencies load first
//!
//! Depth-first in discovery order. A plugin fails resolution when a hard
//! dependency is missing, when it sits on a hard cycle, or when any hard
//! dependency failed for one of those reasons. Unrelated plugins are never
//! affected. Cycles are searched on hard edges alone; soft dependencies only
//! influence order and a hint is dropped when honoring it would contradict a
//! hard edge.

use std::collections::{HashMap, HashSet};

use crate::application::errors::PluginError;
use crate::domain::entities::Manifest;

/// Outcome of resolving a set of manifests
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Load order of every plugin that can be attempted
    pub order: Vec<String>,
    /// Plugins excluded from loading, in discovery order
    pub failures: Vec<(String, PluginError)>,
}

impl Resolution {
    pub fn failure(&self, name: &str) -> Option<&PluginError> {
        self.failures.iter().find(|(n, _)| n == name).map(|(_, e)| e)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

struct Walk<'a> {
    index: HashMap<&'a str, &'a Manifest>,
    marks: HashMap<&'a str, Mark>,
    path: Vec<&'a str>,
    post_order: Vec<&'a str>,
    failed: HashMap<&'a str, PluginError>,
}

impl<'a> Walk<'a> {
    fn new(index: HashMap<&'a str, &'a Manifest>) -> Self {
        Self {
            index,
            marks: HashMap::new(),
            path: Vec::new(),
            post_order: Vec::new(),
            failed: HashMap::new(),
        }
    }

    fn fail(&mut self, name: &'a str, err: PluginError) {
        // First reason wins
        self.failed.entry(name).or_insert(err);
    }

    fn known(&self, name: &str) -> Option<&'a str> {
        self.index.get_key_value(name).map(|(k, _)| *k)
    }

    /// First pass: missing hard dependencies and hard cycles, hard edges only
    fn check_hard(&mut self, name: &'a str) {
        if self.marks.contains_key(name) {
            return;
        }
        let Some(manifest) = self.index.get(name).copied() else {
            return;
        };

        self.marks.insert(name, Mark::Visiting);
        self.path.push(name);

        for dep in &manifest.dependencies.hard {
            match self.known(dep) {
                None => self.fail(
                    name,
                    PluginError::MissingDependency {
                        plugin: name.to_string(),
                        dependency: dep.to_string(),
                    },
                ),
                Some(dep) if self.marks.get(dep) == Some(&Mark::Visiting) => {
                    let start = self.path.iter().position(|n| *n == dep).unwrap_or(0);
                    let members: Vec<&'a str> = self.path[start..].to_vec();
                    let mut cycle: Vec<String> = members.iter().map(|n| n.to_string()).collect();
                    cycle.push(dep.to_string());
                    tracing::error!(cycle = %cycle.join(" -> "), "Hard dependency cycle");
                    for member in members {
                        self.fail(member, PluginError::Cycle(cycle.clone()));
                    }
                }
                Some(dep) => self.check_hard(dep),
            }
        }

        self.path.pop();
        self.marks.insert(name, Mark::Done);
    }

    /// Whether `from` reaches a plugin on the current path through hard edges
    fn hard_reaches_path(&self, from: &'a str) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![from];
        while let Some(name) = stack.pop() {
            if !seen.insert(name) {
                continue;
            }
            if self.path.contains(&name) {
                return true;
            }
            if let Some(manifest) = self.index.get(name) {
                stack.extend(manifest.dependencies.hard.iter().filter_map(|d| self.known(d)));
            }
        }
        false
    }

    /// Second pass: post-order over hard edges, then soft hints
    fn order(&mut self, name: &'a str) {
        if self.marks.contains_key(name) {
            return;
        }
        let Some(manifest) = self.index.get(name).copied() else {
            return;
        };

        self.marks.insert(name, Mark::Visiting);
        self.path.push(name);

        // Edges into the path here are hard cycles, already failed
        for dep in &manifest.dependencies.hard {
            if let Some(dep) = self.known(dep) {
                self.order(dep);
            }
        }

        for dep in &manifest.dependencies.soft {
            match self.known(dep) {
                None => tracing::warn!(plugin = %name, dependency = %dep, "Soft dependency not present"),
                // Following the hint would have to load something on the path first
                Some(dep) if self.hard_reaches_path(dep) => {
                    tracing::debug!(plugin = %name, dependency = %dep, "Soft ordering hint dropped");
                }
                Some(dep) => self.order(dep),
            }
        }

        self.path.pop();
        self.marks.insert(name, Mark::Done);
        self.post_order.push(name);
    }
}

/// Resolve load order for `manifests`, given in discovery order
pub fn resolve(manifests: &[Manifest]) -> Resolution {
    let mut index = HashMap::new();
    let mut discovered = Vec::new();
    let mut duplicates = Vec::new();
    for manifest in manifests {
        if index.contains_key(manifest.name.as_str()) {
            duplicates.push(manifest.name.clone());
            continue;
        }
        index.insert(manifest.name.as_str(), manifest);
        discovered.push(manifest.name.as_str());
    }

    let mut walk = Walk::new(index);
    for name in discovered.iter().copied() {
        walk.check_hard(name);
    }
    walk.marks.clear();
    for name in discovered.iter().copied() {
        walk.order(name);
    }

    // Anything with a hard edge to a failed plugin fails too, transitively
    loop {
        let mut changed = false;
        for &name in &walk.post_order {
            if walk.failed.contains_key(name) {
                continue;
            }
            let manifest = walk.index[name];
            let unavailable = manifest
                .dependencies
                .hard
                .iter()
                .find(|dep| walk.failed.contains_key(dep.as_str()));
            if let Some(dep) = unavailable {
                walk.failed.insert(
                    name,
                    PluginError::DependencyUnavailable {
                        plugin: name.to_string(),
                        dependency: dep.clone(),
                    },
                );
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let order = walk
        .post_order
        .iter()
        .filter(|name| !walk.failed.contains_key(*name))
        .map(|name| name.to_string())
        .collect();

    let mut failures: Vec<(String, PluginError)> = discovered
        .iter()
        .filter_map(|name| walk.failed.get(name).map(|e| (name.to_string(), e.clone())))
        .collect();
    failures.extend(duplicates.into_iter().map(|name| (name.clone(), PluginError::Duplicate(name))));

    Resolution { order, failures }
}

/// Check that `order` places every plugin after its present hard dependencies
pub fn is_valid_order(manifests: &[Manifest], order: &[String]) -> bool {
    let position: HashMap<&str, usize> = order.iter().enumerate().map(|(i, n)| (n.as_str(), i)).collect();
    let loaded: HashSet<&str> = position.keys().copied().collect();
    manifests
        .iter()
        .filter(|m| loaded.contains(m.name.as_str()))
        .all(|m| {
            m.dependencies.hard.iter().all(|dep| match (position.get(dep.as_str()), position.get(m.name.as_str())) {
                (Some(d), Some(p)) => d < p,
                _ => false,
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(name: &str, hard: &[&str], soft: &[&str]) -> Manifest {
        let mut manifest = Manifest::new(name, "1.0.0");
        for dep in hard {
            manifest = manifest.with_hard_dependency(*dep);
        }
        for dep in soft {
            manifest = manifest.with_soft_dependency(*dep);
        }
        manifest
    }

    #[test]
    fn test_dependencies_load_first() {
        let manifests = vec![m("b", &["a"], &[]), m("c", &[], &[]), m("a", &[], &[])];
        let res = resolve(&manifests);
        assert_eq!(res.order, vec!["a", "b", "c"]);
        assert!(res.failures.is_empty());
        assert!(is_valid_order(&manifests, &res.order));
    }

    #[test]
    fn test_discovery_order_is_kept_within_a_tier() {
        let manifests = vec![m("x", &[], &[]), m("y", &[], &[]), m("z", &[], &[])];
        assert_eq!(resolve(&manifests).order, vec!["x", "y", "z"]);
    }

    #[test]
    fn test_missing_hard_dependency_fails_only_dependents() {
        let manifests = vec![
            m("a", &[], &[]),
            m("c", &["z"], &[]),
            m("d", &["c"], &[]),
            m("e", &["a"], &[]),
        ];
        let res = resolve(&manifests);
        assert_eq!(res.order, vec!["a", "e"]);
        assert!(matches!(res.failure("c"), Some(PluginError::MissingDependency { dependency, .. }) if dependency == "z"));
        assert!(matches!(res.failure("d"), Some(PluginError::DependencyUnavailable { dependency, .. }) if dependency == "c"));
    }

    #[test]
    fn test_cycle_members_are_excluded() {
        let manifests = vec![
            m("a", &["b"], &[]),
            m("b", &["c"], &[]),
            m("c", &["a"], &[]),
            m("d", &["a"], &[]),
            m("free", &[], &[]),
        ];
        let res = resolve(&manifests);
        assert_eq!(res.order, vec!["free"]);
        for name in ["a", "b", "c"] {
            assert!(matches!(res.failure(name), Some(PluginError::Cycle(_))), "{name}");
        }
        assert!(matches!(res.failure("d"), Some(PluginError::DependencyUnavailable { .. })));
    }

    #[test]
    fn test_soft_dependencies_only_order() {
        let manifests = vec![m("ui", &[], &["theme", "ghost"]), m("theme", &[], &[])];
        let res = resolve(&manifests);
        assert_eq!(res.order, vec!["theme", "ui"]);
        assert!(res.failures.is_empty());
    }

    #[test]
    fn test_soft_cycle_is_not_fatal() {
        let manifests = vec![m("a", &[], &["b"]), m("b", &[], &["a"])];
        let res = resolve(&manifests);
        assert_eq!(res.order, vec!["b", "a"]);
    }

    #[test]
    fn test_soft_hint_never_fakes_a_cycle() {
        let manifests = vec![m("a", &[], &["b"]), m("b", &["a"], &[])];
        let res = resolve(&manifests);
        assert!(res.failures.is_empty(), "{:?}", res.failures);
        assert_eq!(res.order, vec!["a", "b"]);
        assert!(is_valid_order(&manifests, &res.order));
    }

    #[test]
    fn test_soft_hint_dropped_through_longer_hard_chain() {
        let manifests = vec![
            m("a", &[], &["c"]),
            m("b", &["a"], &[]),
            m("c", &["b"], &[]),
        ];
        let res = resolve(&manifests);
        assert!(res.failures.is_empty());
        assert_eq!(res.order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_duplicate_names_keep_the_first() {
        let manifests = vec![m("a", &[], &[]), m("a", &[], &[])];
        let res = resolve(&manifests);
        assert_eq!(res.order, vec!["a"]);
        assert_eq!(res.failures, vec![("a".to_string(), PluginError::Duplicate("a".into()))]);
    }
}
