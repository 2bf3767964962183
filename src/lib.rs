#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

pub mod config;
mod core;
mod engine;
mod error;
pub mod output;
pub mod pipeline;
pub mod task;
mod utils;

use std::time::Instant;

use console::style;

pub use crate::config::{BuildConfig, Category, IconListing, Paths, ServerConfig};
pub use crate::engine::{Diagnostics, Run, TaskExecution, TaskGraph, TaskId};
pub use crate::error::*;
pub use crate::output::{Output, OutputData};
pub use crate::task::{IconSet, Report, TaskContext};
pub use crate::utils::init_logging;

/// A configured asset build: the configuration, the default task graph and
/// the icon listing captured when the graph was built.
///
/// ```rust,no_run
/// use tsumugi::{BuildConfig, Project};
///
/// let project = Project::new(BuildConfig::new(false, false)).unwrap();
/// let run = project.build().unwrap();
/// println!("{}", run.diagnostics.summary());
/// ```
#[derive(Debug)]
pub struct Project {
    config: BuildConfig,
    icons: IconSet,
    graph: TaskGraph,
}

impl Project {
    pub fn new(config: BuildConfig) -> Result<Self, TsumugiError> {
        let graph = TaskGraph::default_build()?;
        let icons = IconSet::capture(&config);

        Ok(Self {
            config,
            icons,
            graph,
        })
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// The default build: clean, then every asset task, then feature
    /// detection.
    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn icons(&self) -> &IconSet {
        &self.icons
    }

    /// Runs the default build once.
    pub fn build(&self) -> Result<Run, TsumugiError> {
        eprintln!(
            "Running {} in {} mode.",
            style("tsumugi").red(),
            style(if self.config.dev { "dev" } else { "build" }).blue()
        );

        Ok(self.execute(&self.graph)?)
    }

    /// Runs a single task together with the tasks it requires.
    pub fn run(&self, task: TaskId) -> Result<Run, TsumugiError> {
        let graph = TaskGraph::single(task)?;
        Ok(self.execute(&graph)?)
    }

    /// Runs an arbitrary graph, stopping at the first failing task.
    pub fn execute(&self, graph: &TaskGraph) -> Result<Run, BuildError> {
        let s = Instant::now();
        let context = TaskContext::new(&self.config, &self.icons);
        let run = engine::runner::run_tasks_parallel(graph, &context)?;

        tracing::info!(
            "{} tasks, {} files {}",
            run.reports.len(),
            run.written().count(),
            crate::utils::as_overhead(s)
        );
        tracing::debug!("timings:\n{}", run.diagnostics.summary());

        Ok(run)
    }

    /// Watches the sources, rebuilding whatever changes, and serves the
    /// project root with live reload. Runs until the process is interrupted.
    #[cfg(feature = "live")]
    pub fn watch(&self) -> Result<(), TsumugiError> {
        eprintln!(
            "Running {} in {} mode.",
            style("tsumugi").red(),
            style("watch").blue()
        );

        engine::runner::watch(&self.config, &self.icons)?;
        Ok(())
    }

    #[cfg(not(feature = "live"))]
    pub fn watch(&self) -> Result<(), TsumugiError> {
        tracing::warn!("built without the `live` feature, not watching");
        Ok(())
    }
}
