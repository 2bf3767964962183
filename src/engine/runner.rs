mod diagnostics;
#[cfg(feature = "server")]
mod http;
#[cfg(feature = "live")]
mod reload;
#[cfg(feature = "live")]
mod watch;

use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError, channel};
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use petgraph::graph::NodeIndex;
use tracing::Level;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::engine::{TaskGraph, TaskId};
use crate::error::BuildError;
use crate::task::{Report, TaskContext};

pub use diagnostics::Diagnostics;
#[cfg(feature = "live")]
pub(crate) use watch::watch;

#[derive(Debug, Clone)]
pub struct TaskExecution {
    pub start: Instant,
    pub duration: Duration,
}

/// Everything a successful run produced.
#[derive(Debug, Default)]
pub struct Run {
    pub reports: BTreeMap<TaskId, Report>,
    pub diagnostics: Diagnostics,
}

impl Run {
    /// Every file written during the run.
    pub fn written(&self) -> impl Iterator<Item = &Utf8PathBuf> {
        self.reports.values().flat_map(|report| report.written.iter())
    }
}

type Message = (NodeIndex, Result<Report, BuildError>, Instant, Duration);

/// Executes the task graph on the rayon thread pool. Tasks start as soon as
/// all of their dependencies have finished, so independent tasks run side by
/// side.
///
/// The scheduler works as follows:
/// 1. The tasks without dependencies are spawned.
/// 2. The calling thread waits on a channel for finished tasks. When it is
///    itself a rayon worker, it runs queued tasks while waiting, so a pool
///    of one thread still makes progress.
/// 3. When a task succeeds, the dependency counts of its dependents are
///    decremented, and every dependent reaching zero is spawned.
/// 4. When a task fails, nothing new is spawned. Tasks already running are
///    allowed to finish and keep their outputs, then the first error is
///    returned.
pub(crate) fn run_tasks_parallel(
    graph: &TaskGraph,
    context: &TaskContext,
) -> Result<Run, BuildError> {
    let graph_ref = &graph.graph;

    let mut dependents: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();
    for edge in graph_ref.raw_edges() {
        dependents
            .entry(edge.source())
            .or_default()
            .push(edge.target());
    }

    let mut dependency_counts: HashMap<NodeIndex, usize> = graph_ref
        .node_indices()
        .map(|i| {
            (
                i,
                graph_ref
                    .neighbors_directed(i, petgraph::Direction::Incoming)
                    .count(),
            )
        })
        .collect();

    let total_tasks = graph_ref.node_count() as u64;
    if total_tasks == 0 {
        return Ok(Run::default());
    }

    let root_span = tracing::span!(Level::INFO, "running_tasks");
    root_span.pb_set_length(total_tasks);
    root_span.pb_set_style(&crate::utils::get_style_root());
    root_span.pb_set_message("Running tasks...");
    let _enter = root_span.enter();

    let mut run = Run::default();
    let mut failure: Option<BuildError> = None;

    let pb_style = crate::utils::get_style_task();

    rayon::in_place_scope(|s| {
        let (sender, receiver) = channel::<Message>();

        let spawn_task = |index: NodeIndex| {
            let id = graph_ref[index];
            let sender = sender.clone();
            let pb_style = pb_style.clone();

            s.spawn(move |_| {
                let span = tracing::span!(Level::INFO, "task", name = id.name());
                span.pb_set_style(&pb_style);
                span.pb_set_message(&format!("Running {id}"));
                let _enter = span.enter();

                let start = Instant::now();

                // A panicking task only loses its own result, every other
                // task works on its own files.
                let result = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    crate::task::execute(id, context)
                })) {
                    Ok(result) => result.map_err(|e| BuildError::Task(id, e)),
                    Err(panic) => {
                        let msg = if let Some(s) = panic.downcast_ref::<&str>() {
                            s.to_string()
                        } else if let Some(s) = panic.downcast_ref::<String>() {
                            s.clone()
                        } else {
                            String::from("unknown payload")
                        };

                        Err(BuildError::Panic(id, msg))
                    }
                };

                // The receiver only goes away once every task is accounted for.
                let _ = sender.send((index, result, start, start.elapsed()));
            });
        };

        let mut in_flight = 0usize;
        for index in graph_ref.node_indices() {
            if dependency_counts[&index] == 0 {
                spawn_task(index);
                in_flight += 1;
            }
        }

        while in_flight > 0 {
            let Some((index, result, start, duration)) = next_message(&receiver) else {
                break;
            };
            in_flight -= 1;

            let id = graph_ref[index];
            root_span.pb_inc(1);

            run.diagnostics
                .execution_times
                .insert(id, TaskExecution { start, duration });

            match result {
                Ok(report) => {
                    tracing::info!(task = %id, files = report.written.len(), "finished in {duration:.2?}");
                    run.reports.insert(id, report);

                    if failure.is_some() {
                        continue;
                    }

                    for &next in dependents.get(&index).into_iter().flatten() {
                        if let Some(count) = dependency_counts.get_mut(&next) {
                            *count -= 1;
                            if *count == 0 {
                                spawn_task(next);
                                in_flight += 1;
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(task = %id, "{e}");
                    failure.get_or_insert(e);
                }
            }
        }
    });

    match failure {
        Some(e) => Err(e),
        None => {
            tracing::info!("Build complete!");
            Ok(run)
        }
    }
}

/// Waits for the next finished task without blocking a rayon worker.
fn next_message(receiver: &Receiver<Message>) -> Option<Message> {
    loop {
        match receiver.try_recv() {
            Ok(message) => return Some(message),
            Err(TryRecvError::Disconnected) => return None,
            Err(TryRecvError::Empty) => {}
        }

        match rayon::yield_now() {
            // not on a worker thread, the pool runs the tasks
            None => return receiver.recv().ok(),
            Some(rayon::Yield::Executed) => {}
            Some(rayon::Yield::Idle) => match receiver.recv_timeout(Duration::from_millis(5)) {
                Ok(message) => return Some(message),
                Err(RecvTimeoutError::Disconnected) => return None,
                Err(RecvTimeoutError::Timeout) => {}
            },
        }
    }
}
