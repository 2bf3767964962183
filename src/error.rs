#[cfg(feature = "live")]
use std::sync::mpsc::RecvError;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::engine::TaskId;

#[derive(Debug, Error)]
pub enum TsumugiError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Error while building assets.\n{0}")]
    Build(#[from] BuildError),

    #[cfg(feature = "live")]
    #[error("Error while watching for file changes:\n{0}")]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Problems with the task graph itself, detected before anything runs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Cycle detected in task graph at '{0}'")]
    Cycle(TaskId),
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Task '{0}':\n{1}")]
    Task(TaskId, anyhow::Error),

    #[error("Task '{0}' panicked: {1}")]
    Panic(TaskId, String),
}

impl BuildError {
    /// The task which caused the failure, if any.
    pub fn task(&self) -> Option<TaskId> {
        match self {
            BuildError::Io(_) => None,
            BuildError::Task(id, _) | BuildError::Panic(id, _) => Some(*id),
        }
    }
}

#[cfg(feature = "live")]
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Recv(#[from] RecvError),

    #[error("Path is not valid UTF-8: {0}")]
    PathFormat(#[from] camino::FromPathBufError),
}

/// Errors produced while copying files between directories.
#[derive(Debug, Error)]
pub enum CopyError {
    #[error("Source directory '{0}' does not exist")]
    MissingSource(Utf8PathBuf),

    #[error("Couldn't copy '{0}':\n{1}")]
    Io(Utf8PathBuf, std::io::Error),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error("Couldn't compile glob pattern.\n{0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),
}
