//! DependencyGraph (C12): named nodes with forward/reverse edges,
//! memoized topological sort, and parallel-execution-group extraction.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use grizzly_error::{GrizzlyError, Result};

/// A model's last known run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    /// Never run, or invalidated since its last run.
    Pending,
    /// Currently executing.
    Running,
    /// Completed successfully.
    Done,
    /// Completed with an error.
    Failed,
}

struct Node {
    /// Nodes this one depends on.
    forward: Vec<String>,
    /// Nodes that depend on this one.
    reverse: Vec<String>,
    state: ExecutionState,
    last_executed: Option<i64>,
}

/// Directed dependency graph over named model nodes.
///
/// Every mutation invalidates the memoized topo-sort and the per-node
/// transitive-dependency cache; both are recomputed lazily on next read.
pub struct DependencyGraph {
    nodes: HashMap<String, Node>,
    topo_cache: RefCell<Option<Vec<String>>>,
    transitive_cache: RefCell<HashMap<String, HashSet<String>>>,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraph {
    /// Construct an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            topo_cache: RefCell::new(None),
            transitive_cache: RefCell::new(HashMap::new()),
        }
    }

    fn invalidate(&mut self) {
        self.topo_cache.get_mut().take();
        self.transitive_cache.get_mut().clear();
    }

    fn ensure_node(&mut self, name: &str) {
        self.nodes.entry(name.to_owned()).or_insert_with(|| Node {
            forward: Vec::new(),
            reverse: Vec::new(),
            state: ExecutionState::Pending,
            last_executed: None,
        });
    }

    /// Record that `from` depends on `to`. Creates both nodes if absent
    /// and is a no-op if the edge already exists.
    pub fn add_dependency(&mut self, from: &str, to: &str) {
        self.ensure_node(from);
        self.ensure_node(to);
        if !self.nodes[from].forward.iter().any(|n| n == to) {
            self.nodes.get_mut(from).expect("just ensured").forward.push(to.to_owned());
        }
        if !self.nodes[to].reverse.iter().any(|n| n == from) {
            self.nodes.get_mut(to).expect("just ensured").reverse.push(from.to_owned());
        }
        self.invalidate();
    }

    /// Register a node with no edges, if it does not already exist.
    pub fn add_node(&mut self, name: &str) {
        self.ensure_node(name);
        self.invalidate();
    }

    /// Whether `name` is a known node.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Direct dependencies of `name`.
    #[must_use]
    pub fn dependencies(&self, name: &str) -> &[String] {
        self.nodes.get(name).map_or(&[], |n| &n.forward)
    }

    /// Direct dependents of `name`.
    #[must_use]
    pub fn dependents(&self, name: &str) -> &[String] {
        self.nodes.get(name).map_or(&[], |n| &n.reverse)
    }

    /// Set `name`'s execution state, stamping `last_executed` when it
    /// transitions to `Done` or `Failed`.
    pub fn set_state(&mut self, name: &str, state: ExecutionState, now: i64) {
        if let Some(node) = self.nodes.get_mut(name) {
            node.state = state;
            if matches!(state, ExecutionState::Done | ExecutionState::Failed) {
                node.last_executed = Some(now);
            }
        }
    }

    /// Current execution state of `name`.
    #[must_use]
    pub fn state(&self, name: &str) -> Option<ExecutionState> {
        self.nodes.get(name).map(|n| n.state)
    }

    /// DFS with a recursion-set; `true` iff the graph contains a cycle.
    #[must_use]
    pub fn has_cycles(&self) -> bool {
        let mut visited = HashSet::new();
        let mut in_stack = HashSet::new();
        for name in self.nodes.keys() {
            if !visited.contains(name) && self.dfs_has_cycle(name, &mut visited, &mut in_stack) {
                return true;
            }
        }
        false
    }

    fn dfs_has_cycle(&self, name: &str, visited: &mut HashSet<String>, in_stack: &mut HashSet<String>) -> bool {
        visited.insert(name.to_owned());
        in_stack.insert(name.to_owned());
        for dep in &self.nodes[name].forward {
            if in_stack.contains(dep) {
                return true;
            }
            if !visited.contains(dep) && self.dfs_has_cycle(dep, visited, in_stack) {
                return true;
            }
        }
        in_stack.remove(name);
        false
    }

    /// Every transitive dependency of `name` (not including `name` itself),
    /// memoized per node until the next mutation.
    pub fn transitive_dependencies(&self, name: &str) -> Result<HashSet<String>> {
        if let Some(cached) = self.transitive_cache.borrow().get(name) {
            return Ok(cached.clone());
        }
        let mut out = HashSet::new();
        let mut stack = vec![name.to_owned()];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            for dep in self.dependencies(&current) {
                if seen.insert(dep.clone()) {
                    out.insert(dep.clone());
                    stack.push(dep.clone());
                }
            }
        }
        self.transitive_cache.borrow_mut().insert(name.to_owned(), out.clone());
        Ok(out)
    }

    /// Topological order consistent with edge direction (dependencies
    /// before dependents), memoized until the next mutation. Fails
    /// [`GrizzlyError::CircularDependency`] if the graph has a cycle.
    pub fn topological_sort(&self) -> Result<Vec<String>> {
        if let Some(cached) = self.topo_cache.borrow().as_ref() {
            return Ok(cached.clone());
        }
        // in_degree counts forward edges (number of dependencies still unresolved).
        let mut in_degree: HashMap<&str, usize> =
            self.nodes.iter().map(|(name, node)| (name.as_str(), node.forward.len())).collect();

        let mut queue: Vec<&str> = in_degree.iter().filter(|(_, &deg)| deg == 0).map(|(n, _)| *n).collect();
        queue.sort_unstable();
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut queue_idx = 0;
        while queue_idx < queue.len() {
            let name = queue[queue_idx];
            queue_idx += 1;
            order.push(name.to_owned());
            let mut newly_ready: Vec<&str> = Vec::new();
            for dependent in &self.nodes[name].reverse {
                let deg = in_degree.get_mut(dependent.as_str()).expect("dependent always a node");
                *deg -= 1;
                if *deg == 0 {
                    newly_ready.push(dependent.as_str());
                }
            }
            newly_ready.sort_unstable();
            queue.extend(newly_ready);
        }

        if order.len() != self.nodes.len() {
            return Err(GrizzlyError::CircularDependency(
                self.nodes.keys().find(|n| !order.contains(n)).cloned().unwrap_or_default(),
            ));
        }
        *self.topo_cache.borrow_mut() = Some(order.clone());
        Ok(order)
    }

    /// Repeatedly collect the set of not-yet-executed nodes (restricted to
    /// `scope`, if given) whose dependencies are all already in `executed`.
    /// Fails [`GrizzlyError::CircularDependency`] if a round makes no
    /// progress while nodes remain.
    pub fn parallel_execution_groups(
        &self,
        scope: &HashSet<String>,
        mut executed: HashSet<String>,
    ) -> Result<Vec<Vec<String>>> {
        let mut remaining: HashSet<String> = scope.difference(&executed).cloned().collect();
        let mut groups = Vec::new();
        while !remaining.is_empty() {
            let mut ready: Vec<String> = remaining
                .iter()
                .filter(|name| self.dependencies(name).iter().all(|dep| executed.contains(dep)))
                .cloned()
                .collect();
            if ready.is_empty() {
                let mut stuck: Vec<String> = remaining.into_iter().collect();
                stuck.sort_unstable();
                return Err(GrizzlyError::CircularDependency(stuck.join(", ")));
            }
            ready.sort_unstable();
            for name in &ready {
                remaining.remove(name);
                executed.insert(name.clone());
            }
            groups.push(ready);
        }
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_graph() -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        graph.add_dependency("a", "b");
        graph.add_dependency("b", "c");
        graph
    }

    #[test]
    fn add_dependency_is_idempotent() {
        let mut graph = linear_graph();
        graph.add_dependency("a", "b");
        assert_eq!(graph.dependencies("a"), ["b"]);
    }

    #[test]
    fn topological_sort_respects_edges() {
        let graph = linear_graph();
        let order = graph.topological_sort().unwrap();
        let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
        assert!(pos("c") < pos("b"));
        assert!(pos("b") < pos("a"));
    }

    #[test]
    fn detects_cycles() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency("a", "b");
        graph.add_dependency("b", "a");
        assert!(graph.has_cycles());
        assert!(graph.topological_sort().is_err());
    }

    #[test]
    fn parallel_groups_partition_by_readiness() {
        // A <- B, A <- C, D <- A
        let mut graph = DependencyGraph::new();
        graph.add_dependency("a", "b");
        graph.add_dependency("a", "c");
        graph.add_dependency("d", "a");
        let scope = graph.transitive_dependencies("d").unwrap();
        let scope: HashSet<String> = scope.into_iter().chain(["d".to_owned()]).collect();
        let groups = graph.parallel_execution_groups(&scope, HashSet::new()).unwrap();
        assert_eq!(groups.len(), 3);
        let mut first = groups[0].clone();
        first.sort_unstable();
        assert_eq!(first, vec!["b".to_owned(), "c".to_owned()]);
        assert_eq!(groups[1], vec!["a".to_owned()]);
        assert_eq!(groups[2], vec!["d".to_owned()]);
    }

    #[test]
    fn parallel_groups_fail_on_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency("a", "b");
        graph.add_dependency("b", "a");
        let scope: HashSet<String> = ["a".to_owned(), "b".to_owned()].into_iter().collect();
        let err = graph.parallel_execution_groups(&scope, HashSet::new()).unwrap_err();
        assert!(matches!(err, GrizzlyError::CircularDependency(_)));
    }

    #[test]
    fn transitive_dependencies_follow_the_whole_chain() {
        let graph = linear_graph();
        let deps = graph.transitive_dependencies("a").unwrap();
        assert_eq!(deps, ["b", "c"].into_iter().map(str::to_owned).collect());
    }
}
