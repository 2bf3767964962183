use std::fs;
use std::time::Instant;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::config::Category;
use crate::task::{Report, TaskContext};

#[derive(Debug, Error)]
#[error("Couldn't remove '{0}':\n{1}")]
pub struct CleanError(Utf8PathBuf, #[source] std::io::Error);

/// Removes every destination directory. Directories which don't exist are
/// skipped, so cleaning twice in a row is fine.
pub fn run(ctx: &TaskContext) -> Result<Report, CleanError> {
    let s = Instant::now();
    let mut removed = Vec::new();

    for category in Category::ALL {
        let dir = ctx.config.dest(category);

        match fs::remove_dir_all(&dir) {
            Ok(()) => removed.push(dir),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(CleanError(dir, e)),
        }
    }

    tracing::info!(
        "Cleaned {} destination directories {}",
        removed.len(),
        crate::utils::as_overhead(s)
    );

    Ok(Report::new(removed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;
    use crate::output::Output;
    use crate::task::IconSet;

    #[test]
    fn test_clean_twice_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let config = BuildConfig::default().with_root(&root);
        let icons = IconSet::Live;
        let ctx = TaskContext::new(&config, &icons);

        Output::text(config.dest(Category::Styles).join("main.css"), "a{}")
            .save()
            .unwrap();
        Output::text(config.dest(Category::Fonts).join("x/y.woff"), "")
            .save()
            .unwrap();
        Output::text(config.src(Category::Styles).join("main.scss"), "")
            .save()
            .unwrap();

        let first = run(&ctx).unwrap();
        assert_eq!(first.written.len(), 2);
        assert!(!config.dest(Category::Styles).exists());
        assert!(!config.dest(Category::Fonts).exists());
        // sources are never touched
        assert!(config.src(Category::Styles).join("main.scss").exists());

        let second = run(&ctx).unwrap();
        assert!(second.written.is_empty());
    }
}
