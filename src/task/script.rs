use std::fs;
use std::process::{Command, Stdio};

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::config::{BuildConfig, Category};
use crate::task::{Report, TaskContext};

/// Bundling root inside the scripts source directory.
pub const ENTRY: &str = "main.js";

/// Errors that can occur when bundling scripts.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// There is nothing to bundle.
    #[error("Entry file '{0}' does not exist")]
    MissingEntry(Utf8PathBuf),

    /// The bundler binary could not be started.
    #[error("Couldn't run '{0}', is it installed and in PATH?\n{1}")]
    Spawn(String, #[source] std::io::Error),

    /// The bundler returned a non-zero exit code, e.g. on an unresolved
    /// import. Carries the bundler's own diagnostics.
    #[error("Esbuild execution failed:\n{0}")]
    Esbuild(String),

    /// An I/O error occurred while preparing the destination.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bundles `main.js` and everything it imports into a single file.
///
/// **Note:** This task requires the `esbuild` binary (or the one set in
/// [`BuildConfig::esbuild`]) to be available in the system PATH.
pub fn run(ctx: &TaskContext) -> Result<Report, ScriptError> {
    let config = ctx.config;
    let entry = config.src(Category::Scripts).join(ENTRY);
    let outfile = config.dest(Category::Scripts).join(ENTRY);

    if !entry.is_file() {
        return Err(ScriptError::MissingEntry(entry));
    }

    fs::create_dir_all(config.dest(Category::Scripts))?;

    let output = Command::new(&config.esbuild)
        .args(esbuild_args(config, &entry, &outfile))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| ScriptError::Spawn(config.esbuild.clone(), e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ScriptError::Esbuild(stderr.trim().to_string()));
    }

    let map = Utf8PathBuf::from(format!("{outfile}.map"));
    let mut written = vec![outfile];
    if config.sourcemaps && map.is_file() {
        written.push(map);
    }

    Ok(Report::new(written))
}

pub(crate) fn esbuild_args(config: &BuildConfig, entry: &Utf8Path, outfile: &Utf8Path) -> Vec<String> {
    let mut args = vec![
        entry.to_string(),
        "--bundle".to_string(),
        format!("--outfile={outfile}"),
        "--log-level=warning".to_string(),
    ];

    if config.minify() {
        args.push("--minify".to_string());
    }

    if config.sourcemaps {
        args.push("--sourcemap".to_string());
    }

    args
}
