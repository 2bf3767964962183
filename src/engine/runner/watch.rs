//! Watch mode is implemented as a three-part system:
//!
//! 1. **File watcher**: Uses the `notify` crate to monitor every source
//!    directory recursively, and the pages at the project root. Events are
//!    debounced, so an editor saving a burst of files triggers a single
//!    rebuild.
//! 2. **WebSocket server**: The [`reload`](super::reload) threads keep
//!    persistent connections with open browser tabs.
//! 3. **Development server**: Serves the project root and injects the
//!    client script into every page, see [`http`](super::http).
//!
//! ## The Loop
//!
//! When a file change is detected:
//! 1. The changed paths are mapped back to their categories. A changed
//!    page at the root needs no task, only a reload.
//! 2. Each affected category re-runs its own task, plus the tasks requiring
//!    it. The rest of the graph is left alone.
//! 3. On success, open pages are told to reload. Stylesheets are swapped in
//!    place, anything else reloads the page. On failure the error is logged,
//!    the terminal bell rings, and the loop waits for the next change.

use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use notify::RecursiveMode;
use notify_debouncer_full::new_debouncer;

use super::reload::{Reload, ReloadServer};
use super::run_tasks_parallel;
use crate::config::{BuildConfig, Category};
use crate::engine::{TaskGraph, TaskId};
use crate::error::WatchError;
use crate::task::{IconSet, TaskContext};

const DEBOUNCE: Duration = Duration::from_millis(250);

/// Watches the sources until the process is interrupted.
pub(crate) fn watch(config: &BuildConfig, icons: &IconSet) -> Result<(), WatchError> {
    let rebuilder = Rebuilder::new(config, icons);
    let reload = ReloadServer::start(config.server.reload_port)?;

    #[cfg(feature = "server")]
    let _thread_http = super::http::start(
        config.root.clone(),
        config.server.port,
        reload.port,
    )?;

    let (tx, rx) = std::sync::mpsc::channel();
    let mut debouncer = new_debouncer(DEBOUNCE, None, tx)?;

    let watched = collapse_watch_paths(rebuilder.dirs.iter().map(|(dir, _)| dir.clone()).collect());
    for path in watched {
        tracing::info!("watching {}", path);
        debouncer.watch(path, RecursiveMode::Recursive)?;
    }
    debouncer.watch(&rebuilder.root, RecursiveMode::NonRecursive)?;

    loop {
        match rx.recv()? {
            Ok(events) => {
                let paths: Vec<_> = events
                    .iter()
                    .flat_map(|de| de.event.paths.iter())
                    .filter_map(|path| Utf8Path::from_path(path))
                    .collect();

                let categories: BTreeSet<_> = paths
                    .iter()
                    .filter_map(|path| rebuilder.category_of(path))
                    .collect();
                let pages = paths.iter().any(|path| rebuilder.is_page(path));

                if categories.is_empty() && !pages {
                    continue;
                }

                tracing::info!("change detected, re-running tasks...");
                let mut reloads = rebuilder.rebuild(&categories);
                if pages {
                    reloads = vec![Reload::Full];
                }

                for reload_msg in reloads {
                    reload.send(reload_msg);
                }
                tracing::info!("rebuild complete, watching for changes...");
            }
            Err(errors) => {
                for e in errors {
                    tracing::error!("watch error: {:?}", e);
                }
            }
        }
    }
}

/// Maps changed paths to categories and re-runs their tasks.
struct Rebuilder<'a> {
    config: &'a BuildConfig,
    icons: &'a IconSet,
    /// Canonical project root, where the pages live.
    root: Utf8PathBuf,
    /// Canonical source directory of every category that has one on disk.
    dirs: Vec<(Utf8PathBuf, Category)>,
}

impl<'a> Rebuilder<'a> {
    fn new(config: &'a BuildConfig, icons: &'a IconSet) -> Self {
        let dirs = Category::ALL
            .into_iter()
            .filter_map(|category| {
                let dir = config.src(category);
                match dir.canonicalize_utf8() {
                    Ok(dir) => Some((dir, category)),
                    Err(_) => {
                        tracing::warn!("not watching {category}, {dir} doesn't exist");
                        None
                    }
                }
            })
            .collect();

        let root = config
            .root
            .canonicalize_utf8()
            .unwrap_or_else(|_| config.root.clone());

        Self {
            config,
            icons,
            root,
            dirs,
        }
    }

    /// An HTML page directly in the project root.
    fn is_page(&self, path: &Utf8Path) -> bool {
        path.parent() == Some(self.root.as_path()) && path.extension() == Some("html")
    }

    /// The category owning `path`. Nested source directories win over the
    /// ones containing them.
    fn category_of(&self, path: &Utf8Path) -> Option<Category> {
        self.dirs
            .iter()
            .filter(|(dir, _)| path.starts_with(dir))
            .max_by_key(|(dir, _)| dir.as_str().len())
            .map(|(_, category)| *category)
    }

    /// Runs the tasks of every category, one after another, and collects
    /// the reloads for the ones that succeeded.
    fn rebuild(&self, categories: &BTreeSet<Category>) -> Vec<Reload> {
        let context = TaskContext::new(self.config, self.icons);
        let mut reloads = BTreeSet::new();

        for &category in categories {
            let run = TaskGraph::closure(TaskId::on_change(category))
                .map_err(anyhow::Error::from)
                .and_then(|graph| run_tasks_parallel(&graph, &context).map_err(anyhow::Error::from));

            match run {
                Ok(run) => match category {
                    Category::Styles => reloads.extend(
                        run.written()
                            .filter(|path| path.extension() == Some("css"))
                            .map(|path| Reload::Css(self.relative(path))),
                    ),
                    _ => {
                        reloads.insert(Reload::Full);
                    }
                },
                Err(e) => {
                    tracing::error!("Error running {category} tasks: {e:#}");
                    crate::utils::beep();
                }
            }
        }

        if reloads.contains(&Reload::Full) {
            return vec![Reload::Full];
        }

        reloads.into_iter().collect()
    }

    fn relative(&self, path: &Utf8Path) -> Utf8PathBuf {
        path.strip_prefix(&self.config.root)
            .unwrap_or(path)
            .to_path_buf()
    }
}

/// Reduces a set of paths to the minimal set of watch roots.
///
/// If we watch `/a` and `/a/b`, we only need to watch `/a` because
/// the watcher is recursive. This function sorts the paths and filters
/// out any path that is a subdirectory of a previously accepted path.
fn collapse_watch_paths(paths: HashSet<Utf8PathBuf>) -> Vec<Utf8PathBuf> {
    let mut paths: Vec<_> = paths.into_iter().collect();
    paths.sort();

    let mut filtered = Vec::new();
    for path in paths {
        if let Some(last) = filtered.last()
            && path.starts_with(last)
        {
            continue;
        }
        filtered.push(path);
    }

    filtered
}
