pub(crate) mod runner;

use std::collections::HashMap;
use std::fmt::Display;

use petgraph::Graph;
use petgraph::graph::NodeIndex;

use crate::config::Category;
use crate::error::GraphError;

pub use runner::{Diagnostics, Run, TaskExecution};

/// Every task the pipeline knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskId {
    Clean,
    Scripts,
    Styles,
    Images,
    Fonts,
    Icons,
    Sprite,
    Modernizr,
}

impl TaskId {
    pub const ALL: [TaskId; 8] = [
        TaskId::Clean,
        TaskId::Scripts,
        TaskId::Styles,
        TaskId::Images,
        TaskId::Fonts,
        TaskId::Icons,
        TaskId::Sprite,
        TaskId::Modernizr,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TaskId::Clean => "clean",
            TaskId::Scripts => "scripts",
            TaskId::Styles => "styles",
            TaskId::Images => "images",
            TaskId::Fonts => "fonts",
            TaskId::Icons => "icons",
            TaskId::Sprite => "sprite",
            TaskId::Modernizr => "modernizr",
        }
    }

    /// The source category a task reads from. `Clean` touches every
    /// destination and reads nothing.
    pub fn category(self) -> Option<Category> {
        match self {
            TaskId::Clean => None,
            TaskId::Scripts | TaskId::Modernizr => Some(Category::Scripts),
            TaskId::Styles => Some(Category::Styles),
            TaskId::Images => Some(Category::Images),
            TaskId::Fonts => Some(Category::Fonts),
            TaskId::Icons | TaskId::Sprite => Some(Category::Icons),
        }
    }

    /// Tasks that must have finished before this one can produce anything
    /// meaningful, no matter how the task was invoked.
    pub fn requires(self) -> &'static [TaskId] {
        match self {
            TaskId::Sprite => &[TaskId::Icons],
            _ => &[],
        }
    }

    /// The task re-run when files of `category` change.
    pub fn for_category(category: Category) -> TaskId {
        match category {
            Category::Styles => TaskId::Styles,
            Category::Scripts => TaskId::Scripts,
            Category::Images => TaskId::Images,
            Category::Icons => TaskId::Icons,
            Category::Fonts => TaskId::Fonts,
        }
    }

    /// The category task followed by every task requiring it.
    pub fn on_change(category: Category) -> Vec<TaskId> {
        let task = Self::for_category(category);
        let mut tasks = vec![task];
        tasks.extend(
            Self::ALL
                .into_iter()
                .filter(|id| id.requires().contains(&task)),
        );
        tasks
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A validated set of tasks and the order constraints between them.
///
/// Edges point from a dependency to the task depending on it. Construction
/// fails when the dependency lists contain a cycle, so a `TaskGraph` can
/// always be scheduled.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    pub(crate) graph: Graph<TaskId, ()>,
    index: HashMap<TaskId, NodeIndex>,
}

impl TaskGraph {
    /// Builds a graph from explicit `task -> dependencies` lists. Tasks only
    /// mentioned as a dependency are added without dependencies of their own.
    pub fn from_dependencies<I, D>(lists: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = (TaskId, D)>,
        D: IntoIterator<Item = TaskId>,
    {
        let mut graph = Graph::new();
        let mut index = HashMap::new();
        let mut edges = Vec::new();

        let mut node = |graph: &mut Graph<TaskId, ()>, id: TaskId| {
            *index.entry(id).or_insert_with(|| graph.add_node(id))
        };

        for (task, dependencies) in lists {
            let target = node(&mut graph, task);
            for dependency in dependencies {
                let source = node(&mut graph, dependency);
                edges.push((source, target));
            }
        }

        for (source, target) in edges {
            graph.update_edge(source, target, ());
        }

        petgraph::algo::toposort(&graph, None)
            .map_err(|cycle| GraphError::Cycle(graph[cycle.node_id()]))?;

        Ok(Self { graph, index })
    }

    /// The full build: clean first, then every asset task, then the feature
    /// detection script once scripts, styles, images and fonts are done.
    pub fn default_build() -> Result<Self, GraphError> {
        use TaskId::*;

        Self::from_dependencies([
            (Clean, vec![]),
            (Scripts, vec![Clean]),
            (Styles, vec![Clean]),
            (Images, vec![Clean]),
            (Fonts, vec![Clean]),
            (Icons, vec![Clean]),
            (Sprite, vec![Icons]),
            (Modernizr, vec![Scripts, Styles, Images, Fonts]),
        ])
    }

    /// A graph running `task` after its prerequisites.
    pub fn single(task: TaskId) -> Result<Self, GraphError> {
        Self::closure([task])
    }

    /// A graph of the given tasks and everything they require.
    pub fn closure(tasks: impl IntoIterator<Item = TaskId>) -> Result<Self, GraphError> {
        let mut stack: Vec<_> = tasks.into_iter().collect();
        let mut lists = Vec::new();

        while let Some(task) = stack.pop() {
            if lists.iter().any(|(id, _)| *id == task) {
                continue;
            }
            let requires = task.requires().to_vec();
            stack.extend(requires.iter().copied());
            lists.push((task, requires));
        }

        Self::from_dependencies(lists)
    }

    /// Keeps only `tasks`, preserving the constraints between the kept ones.
    pub fn restrict(&self, tasks: &[TaskId]) -> Result<Self, GraphError> {
        let lists = tasks
            .iter()
            .filter(|id| self.contains(**id))
            .map(|&id| {
                let deps: Vec<_> = self
                    .dependencies(id)
                    .into_iter()
                    .filter(|dep| tasks.contains(dep))
                    .collect();
                (id, deps)
            })
            .collect::<Vec<_>>();

        Self::from_dependencies(lists)
    }

    pub fn contains(&self, task: TaskId) -> bool {
        self.index.contains_key(&task)
    }

    pub fn tasks(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.graph.node_weights().copied()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Direct dependencies of `task` within this graph.
    pub fn dependencies(&self, task: TaskId) -> Vec<TaskId> {
        let Some(&index) = self.index.get(&task) else {
            return vec![];
        };

        let mut deps: Vec<_> = self
            .graph
            .neighbors_directed(index, petgraph::Direction::Incoming)
            .map(|n| self.graph[n])
            .collect();
        deps.sort();
        deps
    }
}

impl Display for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "graph LR")?;

        for index in self.graph.node_indices() {
            writeln!(f, "    {:?}[\"{}\"]", index.index(), self.graph[index])?;
        }

        for edge in self.graph.raw_edges() {
            writeln!(
                f,
                "    {:?} --> {:?}",
                edge.source().index(),
                edge.target().index()
            )?;
        }

        Ok(())
    }
}
