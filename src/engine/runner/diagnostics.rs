use std::collections::HashMap;
use std::fmt::Write;

use crate::engine::{TaskExecution, TaskGraph, TaskId};

/// Timings collected while running a task graph.
#[derive(Debug, Default)]
pub struct Diagnostics {
    /// Execution metrics of every task that ran, failed ones included.
    pub execution_times: HashMap<TaskId, TaskExecution>,
}

impl Diagnostics {
    /// One line per task, in the order the tasks started.
    pub fn summary(&self) -> String {
        let mut tasks: Vec<_> = self.execution_times.iter().collect();
        tasks.sort_by_key(|(_, t)| t.start);

        let mut f = String::new();
        for (id, exec) in tasks {
            let _ = writeln!(f, "{:<10} {:>10.2?}", id.name(), exec.duration);
        }
        f
    }

    /// Renders the task graph as a Mermaid diagram, color-coded by execution
    /// duration.
    ///
    /// * **Green**: Fast
    /// * **Yellow**: Moderate
    /// * **Red**: Slow
    /// * **Grey**: Did not run
    pub fn render_mermaid(&self, graph: &TaskGraph) -> String {
        let mut f = String::new();
        let _ = writeln!(f, "graph LR");

        let secs = self
            .execution_times
            .values()
            .map(|t| t.duration.as_secs_f64());
        let min_time = secs.clone().fold(f64::MAX, f64::min);
        let max_time = secs.fold(f64::MIN, f64::max);

        // all tasks took the same time, or none ran
        let span = if max_time - min_time > f64::EPSILON {
            max_time - min_time
        } else {
            1.0
        };

        for index in graph.graph.node_indices() {
            let id = graph.graph[index];

            let (label, color) = match self.execution_times.get(&id) {
                Some(exec) => {
                    let t = (exec.duration.as_secs_f64() - min_time) / span;
                    let (r, g) = if t < 0.5 {
                        ((510.0 * t) as u8, 255)
                    } else {
                        (255, (510.0 * (1.0 - t)) as u8)
                    };
                    (format!("{:.2?}", exec.duration), format!("#{r:02X}{g:02X}00"))
                }
                None => ("skipped".to_string(), "#D3D3D3".to_string()),
            };

            let _ = writeln!(f, "    {:?}[\"{}\\n{}\"]", index.index(), id, label);
            let _ = writeln!(f, "    style {:?} fill:{}", index.index(), color);
        }

        for edge in graph.graph.raw_edges() {
            let _ = writeln!(
                f,
                "    {:?} --> {:?}",
                edge.source().index(),
                edge.target().index()
            );
        }

        f
    }
}
