//! The immutable build configuration shared by every task.
//!
//! A [`BuildConfig`] is created once when the process starts and is then only
//! ever passed around by reference. Paths are stored relative to the project
//! root and resolved on lookup.

use std::fmt::Display;

use camino::{Utf8Path, Utf8PathBuf};

/// Asset categories, each with its own source and destination directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Styles,
    Scripts,
    Images,
    Icons,
    Fonts,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Styles,
        Category::Scripts,
        Category::Images,
        Category::Icons,
        Category::Fonts,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Category::Styles => "styles",
            Category::Scripts => "scripts",
            Category::Images => "images",
            Category::Icons => "icons",
            Category::Fonts => "fonts",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One directory per [`Category`]. Having a field per category makes it
/// impossible to declare a source without a matching destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub styles: Utf8PathBuf,
    pub scripts: Utf8PathBuf,
    pub images: Utf8PathBuf,
    pub icons: Utf8PathBuf,
    pub fonts: Utf8PathBuf,
}

impl Paths {
    pub fn get(&self, category: Category) -> &Utf8Path {
        match category {
            Category::Styles => &self.styles,
            Category::Scripts => &self.scripts,
            Category::Images => &self.images,
            Category::Icons => &self.icons,
            Category::Fonts => &self.fonts,
        }
    }

    fn sources() -> Self {
        Self {
            styles: "src/scss/".into(),
            scripts: "src/js/".into(),
            images: "src/images/".into(),
            icons: "src/icons/svg/".into(),
            fonts: "src/fonts/".into(),
        }
    }

    fn destinations() -> Self {
        Self {
            styles: "css/".into(),
            scripts: "js/".into(),
            images: "images/".into(),
            icons: "icons/".into(),
            fonts: "fonts/".into(),
        }
    }
}

/// How the sprite task finds the icons it should combine.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum IconListing {
    /// Re-evaluate the icon glob every time the sprite task runs.
    #[default]
    Live,
    /// Capture the icon names once, when the task graph is built. Icons added
    /// afterwards are left out of the sprite until the process restarts.
    Snapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    /// HTTP port of the preview server.
    pub port: u16,
    /// Preferred WebSocket port for reload notifications.
    pub reload_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            reload_port: 1337,
        }
    }
}

/// Build configuration, see the module docs.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Development mode: unminified output, source maps, preview server.
    pub dev: bool,
    /// Emit source maps. Always on in development mode.
    pub sourcemaps: bool,
    /// Project root every other path is relative to.
    pub root: Utf8PathBuf,
    pub src: Paths,
    pub dest: Paths,
    /// Browserslist queries used for vendor prefixing.
    pub browsers: Vec<String>,
    /// Bundler binary used by the script task.
    pub esbuild: String,
    pub icon_listing: IconListing,
    /// Edge length of a glyph without its own `viewBox`.
    pub glyph_size: u32,
    pub server: ServerConfig,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            dev: false,
            sourcemaps: false,
            root: Utf8PathBuf::from("."),
            src: Paths::sources(),
            dest: Paths::destinations(),
            browsers: vec!["last 1 version".into()],
            esbuild: "esbuild".into(),
            icon_listing: IconListing::default(),
            glyph_size: 32,
            server: ServerConfig::default(),
        }
    }
}

impl BuildConfig {
    pub fn new(dev: bool, sourcemaps: bool) -> Self {
        Self {
            dev,
            sourcemaps: sourcemaps || dev,
            ..Self::default()
        }
    }

    pub fn with_root(mut self, root: impl Into<Utf8PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_browsers(mut self, browsers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.browsers = browsers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_esbuild(mut self, binary: impl Into<String>) -> Self {
        self.esbuild = binary.into();
        self
    }

    pub fn with_icon_listing(mut self, listing: IconListing) -> Self {
        self.icon_listing = listing;
        self
    }

    pub fn with_server(mut self, server: ServerConfig) -> Self {
        self.server = server;
        self
    }

    /// Source directory of a category, resolved against the root.
    pub fn src(&self, category: Category) -> Utf8PathBuf {
        self.root.join(self.src.get(category))
    }

    /// Destination directory of a category, resolved against the root.
    pub fn dest(&self, category: Category) -> Utf8PathBuf {
        self.root.join(self.dest.get(category))
    }

    /// Should outputs be minified.
    pub fn minify(&self) -> bool {
        !self.dev
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_mode_forces_sourcemaps() {
        assert!(BuildConfig::new(true, false).sourcemaps);
        assert!(BuildConfig::new(false, true).sourcemaps);
        assert!(!BuildConfig::new(false, false).sourcemaps);
    }

    #[test]
    fn every_category_has_both_directories() {
        let config = BuildConfig::default().with_root("/project");

        for category in Category::ALL {
            assert!(config.src(category).starts_with("/project/src"));
            assert!(!config.dest(category).starts_with("/project/src"));
        }

        assert_eq!(config.src(Category::Icons), "/project/src/icons/svg");
        assert_eq!(config.dest(Category::Styles), "/project/css");
    }
}
