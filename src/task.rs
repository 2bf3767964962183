//! The build steps themselves.
//!
//! Every task is a plain function over the [`TaskContext`]: it reads files
//! from its source directory, writes files into its destination directory
//! and reports what it wrote.

pub mod clean;
pub mod fonts;
pub mod icons;
#[cfg(feature = "image")]
pub mod image;
pub mod modernizr;
pub mod script;
pub mod sprite;
#[cfg(feature = "grass")]
pub mod styles;

use std::collections::BTreeSet;

use camino::Utf8PathBuf;

use crate::config::{BuildConfig, Category, IconListing};
use crate::engine::TaskId;

/// Icon names the sprite task may use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconSet {
    /// Whatever is on disk when the sprite task runs.
    Live,
    /// Names captured up front.
    Snapshot(BTreeSet<String>),
}

impl IconSet {
    /// Resolves the listing policy of `config`. For a snapshot, this is the
    /// moment the icon sources are enumerated.
    pub fn capture(config: &BuildConfig) -> Self {
        match config.icon_listing {
            IconListing::Live => IconSet::Live,
            IconListing::Snapshot => {
                let names = crate::output::list_flat(&config.src(Category::Icons), "svg")
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|path| path.file_stem().map(str::to_string))
                    .collect();

                IconSet::Snapshot(names)
            }
        }
    }

    pub fn allows(&self, name: &str) -> bool {
        match self {
            IconSet::Live => true,
            IconSet::Snapshot(names) => names.contains(name),
        }
    }
}

/// Everything a task can see while it runs.
#[derive(Debug, Clone, Copy)]
pub struct TaskContext<'a> {
    pub config: &'a BuildConfig,
    pub icons: &'a IconSet,
}

impl<'a> TaskContext<'a> {
    pub fn new(config: &'a BuildConfig, icons: &'a IconSet) -> Self {
        Self { config, icons }
    }
}

/// What a finished task left behind.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Report {
    /// Files written or removed by the task.
    pub written: Vec<Utf8PathBuf>,
}

impl Report {
    pub fn new(written: Vec<Utf8PathBuf>) -> Self {
        Self { written }
    }
}

/// Runs a single task.
pub(crate) fn execute(id: TaskId, ctx: &TaskContext) -> anyhow::Result<Report> {
    let report = match id {
        TaskId::Clean => clean::run(ctx)?,
        TaskId::Scripts => script::run(ctx)?,
        #[cfg(feature = "grass")]
        TaskId::Styles => styles::run(ctx)?,
        #[cfg(not(feature = "grass"))]
        TaskId::Styles => anyhow::bail!("built without the `grass` feature"),
        #[cfg(feature = "image")]
        TaskId::Images => image::run(ctx)?,
        #[cfg(not(feature = "image"))]
        TaskId::Images => anyhow::bail!("built without the `image` feature"),
        TaskId::Fonts => fonts::run(ctx)?,
        TaskId::Icons => icons::run(ctx)?,
        TaskId::Sprite => sprite::run(ctx)?,
        TaskId::Modernizr => modernizr::run(ctx)?,
    };

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Output;

    #[test]
    fn test_snapshot_captures_names_once() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let config = BuildConfig::default()
            .with_root(&root)
            .with_icon_listing(IconListing::Snapshot);

        Output::text(config.src(Category::Icons).join("a.svg"), "<svg/>")
            .save()
            .unwrap();

        let icons = IconSet::capture(&config);

        Output::text(config.src(Category::Icons).join("b.svg"), "<svg/>")
            .save()
            .unwrap();

        assert!(icons.allows("a"));
        assert!(!icons.allows("b"));
        assert!(IconSet::Live.allows("b"));
    }

    #[test]
    fn test_snapshot_of_missing_directory_is_empty() {
        let config = BuildConfig::default()
            .with_root("/definitely/not/here")
            .with_icon_listing(IconListing::Snapshot);

        assert_eq!(IconSet::capture(&config), IconSet::Snapshot(BTreeSet::new()));
    }
}
