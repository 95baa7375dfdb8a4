//! Targets, their dependency graph, and the values they export.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;

use kiln_config::BuildPaths;

use crate::error::GraphError;

/// Append-only values a target publishes to the targets that depend on it.
///
/// Keys are namespaced strings such as `modules.flags`. Each entry is a
/// group of strings (a flag with its argument, a module name with its BMI).
/// Entries under one key keep insertion order and are never duplicated.
/// Once the producing target finishes building the bag is sealed and
/// further writes fail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportBag {
    values: BTreeMap<String, Vec<Vec<String>>>,
    sealed: bool,
}

impl ExportBag {
    /// Entries exported under `key`, empty if none.
    pub fn get(&self, key: &str) -> &[Vec<String>] {
        self.values.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns `true` once the producer has finished.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Iterates over every key and its entries.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Vec<String>])> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    fn add(&mut self, key: &str, entry: Vec<String>) -> bool {
        let slot = self.values.entry(key.to_string()).or_default();
        if slot.contains(&entry) {
            return false;
        }
        slot.push(entry);
        true
    }

    fn replace(&mut self, key: &str, entry: Vec<String>) {
        self.values.insert(key.to_string(), vec![entry]);
    }
}

/// Appends `args` to `flags` unless they already appear there in sequence.
fn push_args(flags: &mut Vec<String>, args: &[String]) -> bool {
    if args.is_empty() || flags.windows(args.len()).any(|w| w == args) {
        return false;
    }
    flags.extend_from_slice(args);
    true
}

/// A buildable target and the per-target state module builds need.
#[derive(Debug, Clone)]
pub struct Target {
    /// Target name, unique within a graph.
    pub name: String,
    /// Flags used to compile this target's own units.
    pub flags: Vec<String>,
    /// Flags that dependents must also compile with.
    pub public_flags: Vec<String>,
    /// Where this target's module BMIs go.
    pub module_cache_dir: PathBuf,
    /// Where this target's dependency records go.
    pub record_dir: PathBuf,
    exports: ExportBag,
}

impl Target {
    /// Creates a target with no flags.
    pub fn new(
        name: impl Into<String>,
        module_cache_dir: impl Into<PathBuf>,
        record_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            flags: Vec::new(),
            public_flags: Vec::new(),
            module_cache_dir: module_cache_dir.into(),
            record_dir: record_dir.into(),
            exports: ExportBag::default(),
        }
    }

    /// Creates a target laid out under the resolved build paths.
    pub fn from_paths(name: impl Into<String>, paths: &BuildPaths) -> Self {
        let name = name.into();
        let module_dir = paths.target_module_dir(&name);
        let record_dir = paths.target_record_dir(&name);
        Self::new(name, module_dir, record_dir)
    }

    /// Adds a single-word compile flag unless already present.
    pub fn add_flag(&mut self, flag: impl Into<String>) {
        push_args(&mut self.flags, &[flag.into()]);
    }

    /// Adds a flag made of several arguments unless that sequence is
    /// already present.
    pub fn add_flag_args(&mut self, args: &[String]) {
        push_args(&mut self.flags, args);
    }

    /// Adds flag arguments for this target and its dependents.
    pub fn add_public_flag_args(&mut self, args: &[String]) {
        push_args(&mut self.public_flags, args);
        push_args(&mut self.flags, args);
    }

    /// Values this target exports.
    pub fn exports(&self) -> &ExportBag {
        &self.exports
    }

    /// Appends `entry` under `key`. Returns `false` if it was already there.
    pub fn export(&mut self, key: &str, entry: Vec<String>) -> Result<bool, GraphError> {
        self.check_open(key)?;
        Ok(self.exports.add(key, entry))
    }

    /// Sets `key` to the single entry `entry`.
    pub fn export_single(&mut self, key: &str, entry: Vec<String>) -> Result<(), GraphError> {
        self.check_open(key)?;
        self.exports.replace(key, entry);
        Ok(())
    }

    /// Marks the target as built. Later exports fail.
    pub fn seal(&mut self) {
        self.exports.sealed = true;
    }

    fn check_open(&self, key: &str) -> Result<(), GraphError> {
        if self.exports.sealed {
            return Err(GraphError::Sealed {
                target: self.name.clone(),
                key: key.to_string(),
            });
        }
        Ok(())
    }
}

/// Targets and their dependency edges.
///
/// An edge points from a target to a target it depends on.
#[derive(Debug, Default)]
pub struct TargetGraph {
    graph: DiGraph<Target, ()>,
    index: HashMap<String, NodeIndex>,
}

impl TargetGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a target.
    pub fn add_target(&mut self, target: Target) -> Result<(), GraphError> {
        if self.index.contains_key(&target.name) {
            return Err(GraphError::DuplicateTarget { name: target.name });
        }
        let name = target.name.clone();
        let node = self.graph.add_node(target);
        self.index.insert(name, node);
        Ok(())
    }

    /// Records that `target` depends on `dependency`.
    pub fn add_dependency(&mut self, target: &str, dependency: &str) -> Result<(), GraphError> {
        let from = self.node(target)?;
        let to = self.node(dependency)?;
        self.graph.update_edge(from, to, ());
        Ok(())
    }

    /// Looks up a target.
    pub fn target(&self, name: &str) -> Option<&Target> {
        self.index.get(name).map(|&n| &self.graph[n])
    }

    /// Looks up a target for modification.
    pub fn target_mut(&mut self, name: &str) -> Option<&mut Target> {
        let node = *self.index.get(name)?;
        Some(&mut self.graph[node])
    }

    /// Number of targets.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns `true` if the graph has no targets.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Every target, each after all of its dependencies.
    pub fn build_order(&self) -> Result<Vec<String>, GraphError> {
        Ok(self
            .leaves_first()?
            .into_iter()
            .map(|n| self.graph[n].name.clone())
            .collect())
    }

    /// Transitive dependencies of `name`, each after its own dependencies.
    /// `name` itself is not included.
    pub fn ordered_deps(&self, name: &str) -> Result<Vec<String>, GraphError> {
        let start = self.node(name)?;
        let mut reachable = Vec::new();
        let mut dfs = Dfs::new(&self.graph, start);
        while let Some(n) = dfs.next(&self.graph) {
            if n != start {
                reachable.push(n);
            }
        }
        Ok(self
            .leaves_first()?
            .into_iter()
            .filter(|n| reachable.contains(n))
            .map(|n| self.graph[n].name.clone())
            .collect())
    }

    fn leaves_first(&self) -> Result<Vec<NodeIndex>, GraphError> {
        let mut order = toposort(&self.graph, None).map_err(|cycle| GraphError::Cycle {
            name: self.graph[cycle.node_id()].name.clone(),
        })?;
        order.reverse();
        Ok(order)
    }

    fn node(&self, name: &str) -> Result<NodeIndex, GraphError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownTarget {
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &str)], names: &[&str]) -> TargetGraph {
        let mut g = TargetGraph::new();
        for name in names {
            g.add_target(Target::new(*name, "mods", "deps")).unwrap();
        }
        for (from, to) in edges {
            g.add_dependency(from, to).unwrap();
        }
        g
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn dependencies_come_first() {
        let g = graph(
            &[("app", "net"), ("app", "core"), ("net", "core")],
            &["app", "net", "core"],
        );
        let order = g.build_order().unwrap();
        assert!(position(&order, "core") < position(&order, "net"));
        assert!(position(&order, "net") < position(&order, "app"));

        assert_eq!(g.ordered_deps("app").unwrap(), ["core", "net"]);
        assert_eq!(g.ordered_deps("net").unwrap(), ["core"]);
        assert!(g.ordered_deps("core").unwrap().is_empty());
    }

    #[test]
    fn cycles_and_unknown_targets_are_errors() {
        let mut g = graph(&[("a", "b")], &["a", "b"]);
        g.add_dependency("b", "a").unwrap();
        assert!(matches!(g.build_order(), Err(GraphError::Cycle { .. })));
        assert_eq!(
            g.add_dependency("a", "zzz"),
            Err(GraphError::UnknownTarget {
                name: "zzz".to_string()
            })
        );
        assert_eq!(
            g.add_target(Target::new("a", "m", "d")),
            Err(GraphError::DuplicateTarget {
                name: "a".to_string()
            })
        );
    }

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn exports_are_append_only_until_sealed() {
        let mut t = Target::new("core", "mods/core", "deps/core");
        let dir = args(&["-fprebuilt-module-path=mods/core"]);
        assert!(t.export("modules.flags", dir.clone()).unwrap());
        assert!(!t.export("modules.flags", dir).unwrap());
        t.export("modules.provides", args(&["core", "mods/core/core.pcm"]))
            .unwrap();
        assert_eq!(t.exports().get("modules.flags").len(), 1);
        assert_eq!(t.exports().get("modules.provides")[0][0], "core");
        assert!(t.exports().get("modules.mtime").is_empty());

        t.seal();
        assert!(t.exports().is_sealed());
        assert_eq!(
            t.export("modules.flags", args(&["-DLATE"])),
            Err(GraphError::Sealed {
                target: "core".to_string(),
                key: "modules.flags".to_string()
            })
        );
    }

    #[test]
    fn flag_groups_are_deduplicated() {
        let mut t = Target::new("core", "m", "d");
        t.add_flag("-O2");
        t.add_public_flag_args(&args(&["-reference", "A=a.ifc"]));
        t.add_public_flag_args(&args(&["-reference", "A=a.ifc"]));
        t.add_flag_args(&args(&["-reference", "B=b.ifc"]));
        t.add_flag("-O2");
        assert_eq!(t.flags, ["-O2", "-reference", "A=a.ifc", "-reference", "B=b.ifc"]);
        assert_eq!(t.public_flags, ["-reference", "A=a.ifc"]);
    }

    #[test]
    fn targets_from_build_paths() {
        let paths = BuildPaths {
            project_root: PathBuf::from("/p"),
            build_dir: PathBuf::from("/p/build"),
            cache_dir: PathBuf::from("/p/build/.build_cache"),
            module_cache_root: PathBuf::from("/p/build/.gens/modules"),
            stl_module_dir: PathBuf::from("/p/build/.gens/stlmodules"),
            record_dir: PathBuf::from("/p/build/.deps"),
        };
        let t = Target::from_paths("app", &paths);
        assert_eq!(t.module_cache_dir, PathBuf::from("/p/build/.gens/modules/app"));
        assert_eq!(t.record_dir, PathBuf::from("/p/build/.deps/app"));
    }
}
