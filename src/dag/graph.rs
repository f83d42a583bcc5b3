use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use crate::config::ConfigFile;
use crate::dag::patterns::SourcePatterns;
use crate::dag::task::{Destination, Task};
use crate::engine::TaskName;
use crate::errors::{AssetdagError, Result};
use crate::path_utils::collapse_roots;
use crate::processor::ProcessorRegistry;

/// Incremental constructor for a [`TaskGraph`].
///
/// Dependencies may name tasks that are added later. Every failed
/// [`add_task`](Self::add_task) leaves the builder exactly as it was.
#[derive(Debug, Default)]
pub struct TaskGraphBuilder {
    tasks: Vec<Task>,
    by_name: HashMap<TaskName, usize>,
    /// Edge direction: dependency -> dependent. Also holds nodes for
    /// dependencies that have been referenced but not added yet.
    edges: DiGraph<TaskName, ()>,
    nodes: HashMap<TaskName, NodeIndex>,
}

impl TaskGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Add a task, failing if its name is taken, its destination is already
    /// claimed, or one of its dependency edges would close a cycle.
    pub fn add_task(&mut self, task: Task) -> Result<()> {
        if self.by_name.contains_key(&task.name) {
            return Err(AssetdagError::DuplicateName(task.name));
        }

        if let Some(existing) = self
            .tasks
            .iter()
            .find(|t| t.destination.overlaps(&task.destination))
        {
            return Err(AssetdagError::OverlappingDestination {
                task: task.name.clone(),
                existing: existing.name.clone(),
                destination: task.destination.path().to_path_buf(),
            });
        }

        for dep in &task.depends_on {
            if dep == &task.name {
                return Err(AssetdagError::Cycle {
                    task: task.name.clone(),
                    dependency: dep.clone(),
                });
            }
            // A cycle appears iff `dep` already (transitively) depends on
            // the new task, i.e. there is a path task -> ... -> dep.
            if let (Some(&node), Some(&dep_node)) =
                (self.nodes.get(&task.name), self.nodes.get(dep))
            {
                if has_path_connecting(&self.edges, node, dep_node, None) {
                    return Err(AssetdagError::Cycle {
                        task: task.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let node = self.intern(&task.name);
        for dep in &task.depends_on {
            let dep_node = self.intern(dep);
            self.edges.update_edge(dep_node, node, ());
        }

        debug!(task = %task.name, deps = ?task.depends_on, "added task to graph");
        self.by_name.insert(task.name.clone(), self.tasks.len());
        self.tasks.push(task);
        Ok(())
    }

    fn intern(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(name) {
            return idx;
        }
        let idx = self.edges.add_node(name.to_string());
        self.nodes.insert(name.to_string(), idx);
        idx
    }

    /// Freeze the builder into an immutable graph.
    ///
    /// Fails with `UnknownDependency` if a referenced task was never added.
    pub fn build(self) -> Result<TaskGraph> {
        let n = self.tasks.len();

        let mut deps: Vec<Vec<usize>> = Vec::with_capacity(n);
        for task in &self.tasks {
            let mut indices = Vec::with_capacity(task.depends_on.len());
            for dep in &task.depends_on {
                match self.by_name.get(dep) {
                    Some(&i) => {
                        if !indices.contains(&i) {
                            indices.push(i);
                        }
                    }
                    None => {
                        return Err(AssetdagError::UnknownDependency {
                            task: task.name.clone(),
                            dependency: dep.clone(),
                        });
                    }
                }
            }
            deps.push(indices);
        }

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, ds) in deps.iter().enumerate() {
            for &d in ds {
                dependents[d].push(i);
            }
        }

        // Kahn's algorithm; among ready tasks the earliest declared wins.
        let mut indegree: Vec<usize> = deps.iter().map(|d| d.len()).collect();
        let mut ready: BinaryHeap<Reverse<usize>> = indegree
            .iter()
            .enumerate()
            .filter(|(_, deg)| **deg == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(i)) = ready.pop() {
            order.push(i);
            for &j in &dependents[i] {
                indegree[j] -= 1;
                if indegree[j] == 0 {
                    ready.push(Reverse(j));
                }
            }
        }

        if order.len() != n {
            // add_task rejects cycles, so this only guards against misuse.
            let stuck = (0..n).find(|i| indegree[*i] > 0).unwrap_or(0);
            let task = &self.tasks[stuck];
            return Err(AssetdagError::Cycle {
                task: task.name.clone(),
                dependency: task.depends_on.first().cloned().unwrap_or_default(),
            });
        }

        let mut position = vec![0; n];
        for (pos, &i) in order.iter().enumerate() {
            position[i] = pos;
        }

        let mut depth = vec![0; n];
        for &i in &order {
            depth[i] = deps[i].iter().map(|&d| depth[d] + 1).max().unwrap_or(0);
        }

        Ok(TaskGraph {
            tasks: self.tasks,
            by_name: self.by_name,
            deps,
            dependents,
            order,
            position,
            depth,
        })
    }
}

/// The static set of tasks and their dependency edges.
///
/// Immutable after construction; holds the reverse-dependency index, the
/// topological order (declaration order breaks ties) and each task's depth
/// (length of its longest dependency chain).
#[derive(Debug)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    by_name: HashMap<TaskName, usize>,
    deps: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    order: Vec<usize>,
    position: Vec<usize>,
    depth: Vec<usize>,
}

impl TaskGraph {
    pub fn builder() -> TaskGraphBuilder {
        TaskGraphBuilder::new()
    }

    /// Build the graph from a validated config, resolving processor names
    /// against `registry`.
    pub fn from_config(cfg: &ConfigFile, registry: &ProcessorRegistry) -> Result<Self> {
        let default_use_hash = cfg.default_section().use_hash.unwrap_or(false);
        let mut builder = TaskGraphBuilder::new();

        for tc in cfg.tasks() {
            let processor =
                registry
                    .get(&tc.processor)
                    .ok_or_else(|| AssetdagError::UnknownProcessor {
                        task: tc.name.clone(),
                        processor: tc.processor.clone(),
                    })?;

            let sources = SourcePatterns::compile(
                &tc.name,
                &tc.sources,
                &tc.effective_exclude(cfg.default_section()),
            )?;
            let destination = Destination::new(&tc.destination, tc.destination_kind);

            let mut task = Task::new(
                tc.name.clone(),
                tc.class,
                sources,
                destination,
                tc.processor.clone(),
                processor,
            )
            .with_options(tc.options.clone())
            .incremental(tc.incremental)
            .use_hash(tc.effective_use_hash(default_use_hash));

            for dep in &tc.after {
                task = task.after(dep.clone());
            }

            builder.add_task(task)?;
        }

        builder.build()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.by_name.get(name).map(|&i| &self.tasks[i])
    }

    /// All tasks in declaration order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.name.as_str())
    }

    /// The complete topological order for a clean build.
    pub fn full_order(&self) -> Vec<&Task> {
        self.order.iter().map(|&i| &self.tasks[i]).collect()
    }

    /// Every task whose sources match at least one changed path, plus every
    /// task that transitively depends on one of them, in dependency order.
    ///
    /// An empty change set yields an empty plan.
    pub fn resolve<I, P>(&self, changed: I) -> Vec<&Task>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut seeds = HashSet::new();
        for path in changed {
            let path = path.as_ref();
            for (i, task) in self.tasks.iter().enumerate() {
                if task.sources.matches(path) {
                    seeds.insert(i);
                }
            }
        }
        self.closure(seeds)
    }

    /// The named tasks plus their transitive dependents, in dependency order.
    /// Unknown names are ignored.
    pub fn resolve_names<I, S>(&self, names: I) -> Vec<&Task>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let seeds = names
            .into_iter()
            .filter_map(|n| self.by_name.get(n.as_ref()).copied())
            .collect::<HashSet<_>>();
        self.closure(seeds)
    }

    fn closure(&self, seeds: HashSet<usize>) -> Vec<&Task> {
        let mut marked = vec![false; self.tasks.len()];
        let mut stack: Vec<usize> = seeds.into_iter().collect();

        while let Some(i) = stack.pop() {
            if marked[i] {
                continue;
            }
            marked[i] = true;
            stack.extend(self.dependents[i].iter().copied());
        }

        self.order
            .iter()
            .filter(|&&i| marked[i])
            .map(|&i| &self.tasks[i])
            .collect()
    }

    /// Tasks whose source patterns match `rel_path`, in declaration order.
    pub fn matching_tasks(&self, rel_path: impl AsRef<Path>) -> Vec<&Task> {
        let rel_path = rel_path.as_ref();
        self.tasks
            .iter()
            .filter(|t| t.sources.matches(rel_path))
            .collect()
    }

    pub fn matches_any(&self, rel_path: impl AsRef<Path>) -> bool {
        let rel_path = rel_path.as_ref();
        self.tasks.iter().any(|t| t.sources.matches(rel_path))
    }

    /// Immediate dependencies of a task (the tasks listed in its `after`).
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.by_name
            .get(name)
            .map(|&i| {
                self.deps[i]
                    .iter()
                    .map(|&d| self.tasks[d].name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Immediate dependents of a task (tasks that list this one in `after`).
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.by_name
            .get(name)
            .map(|&i| {
                self.dependents[i]
                    .iter()
                    .map(|&d| self.tasks[d].name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn depth_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).map(|&i| self.depth[i])
    }

    /// Tasks grouped by depth; each level is in topological order.
    pub fn levels(&self) -> Vec<Vec<&Task>> {
        let max_depth = self.depth.iter().copied().max().unwrap_or(0);
        let mut levels: Vec<Vec<&Task>> = vec![Vec::new(); max_depth + 1];
        for &i in &self.order {
            levels[self.depth[i]].push(&self.tasks[i]);
        }
        levels.retain(|l| !l.is_empty());
        levels
    }

    /// Sort task names into topological order, dropping unknown names and
    /// duplicates.
    pub fn order_names<I, S>(&self, names: I) -> Vec<TaskName>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut indices: Vec<usize> = names
            .into_iter()
            .filter_map(|n| self.by_name.get(n.as_ref()).copied())
            .collect();
        indices.sort_by_key(|&i| self.position[i]);
        indices.dedup();
        indices
            .into_iter()
            .map(|i| self.tasks[i].name.clone())
            .collect()
    }

    /// Minimal set of directories (relative to the project root) covering
    /// every task's source patterns.
    pub fn watch_roots(&self) -> Vec<PathBuf> {
        collapse_roots(
            self.tasks
                .iter()
                .flat_map(|t| t.sources.roots().map(|r| r.to_path_buf())),
        )
    }
}
