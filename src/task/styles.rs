use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use parcel_sourcemap::SourceMap;
use thiserror::Error;

use crate::config::{BuildConfig, Category};
use crate::error::CopyError;
use crate::output::Output;
use crate::pipeline::{Artifact, Pipeline, Step};
use crate::task::{Report, TaskContext};

/// Errors that can occur when compiling stylesheets.
#[derive(Debug, Error)]
pub enum StyleError {
    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sources(#[from] CopyError),

    /// A Sass compilation error occurred.
    #[error("Sass compilation error: {0}")]
    Sass(#[from] Box<grass::Error>),

    /// The browser targets could not be resolved.
    #[error("Invalid browser query {0:?}: {1}")]
    Browsers(Vec<String>, String),

    /// The compiled CSS was rejected by the prefixer.
    #[error("CSS error in {0}: {1}")]
    Css(Utf8PathBuf, String),

    #[error("Source map error: {0}")]
    SourceMap(String),
}

/// Compiles every entry stylesheet. Files starting with `_` are partials and
/// only reachable through `@use` or `@import`.
pub fn run(ctx: &TaskContext) -> anyhow::Result<Report> {
    let config = ctx.config;
    let src = config.src(Category::Styles);
    let dst = config.dest(Category::Styles);

    let pipeline = pipeline(config, &src)?;
    let mut outputs = Vec::new();

    for path in crate::output::list_flat(&src, "scss")? {
        let Some(stem) = path.file_stem() else {
            continue;
        };
        if stem.starts_with('_') {
            continue;
        }

        let input = Artifact::new(&path, fs::read(&path).map_err(StyleError::Io)?);
        let result = pipeline.run(input)?;

        let name = format!("{stem}.css");
        let mut css = String::from_utf8(result.bytes)?;

        if let Some(map) = result.map {
            let map_name = format!("{name}.map");
            css.push_str(&format!("\n/*# sourceMappingURL={map_name} */\n"));
            outputs.push(Output::text(dst.join(map_name), map));
        }

        outputs.push(Output::text(dst.join(name), css));
    }

    let written = crate::output::save_all(&outputs).map_err(StyleError::Io)?;
    Ok(Report::new(written))
}

/// Sass first, then prefixing and minification.
pub(crate) fn pipeline(config: &BuildConfig, load_path: &Utf8Path) -> Result<Pipeline, StyleError> {
    Ok(Pipeline::new()
        .then(CompileSass {
            load_path: load_path.to_path_buf(),
        })
        .then(Prefix {
            targets: targets(&config.browsers)?,
            minify: config.minify(),
            source_map: config.sourcemaps,
        }))
}

fn targets(queries: &[String]) -> Result<Targets, StyleError> {
    let browsers = Browsers::from_browserslist(queries)
        .map_err(|e| StyleError::Browsers(queries.to_vec(), e.to_string()))?;

    Ok(Targets {
        browsers,
        ..Targets::default()
    })
}

struct CompileSass {
    load_path: Utf8PathBuf,
}

impl Step for CompileSass {
    fn name(&self) -> &'static str {
        "sass"
    }

    fn apply(&self, input: Artifact) -> anyhow::Result<Artifact> {
        let options = grass::Options::default()
            .style(grass::OutputStyle::Expanded)
            .load_path(&self.load_path);

        let css = grass::from_string(input.text()?.to_string(), &options).map_err(StyleError::Sass)?;

        Ok(Artifact {
            bytes: css.into_bytes(),
            ..input
        })
    }
}

struct Prefix {
    targets: Targets,
    minify: bool,
    source_map: bool,
}

impl Step for Prefix {
    fn name(&self) -> &'static str {
        "prefix"
    }

    fn apply(&self, input: Artifact) -> anyhow::Result<Artifact> {
        // The input is Sass output, so maps point at the compiled CSS.
        let filename = input
            .source
            .file_stem()
            .map_or_else(|| "style.css".to_string(), |stem| format!("{stem}.css"));
        let code = input.text()?;
        let fail = |e: String| StyleError::Css(input.source.clone(), e);

        let mut map = if self.source_map {
            let mut map = SourceMap::new("/");
            map.add_source(&filename);
            map.set_source_content(0, code)
                .map_err(|e| StyleError::SourceMap(format!("{e:?}")))?;
            Some(map)
        } else {
            None
        };

        let (css, map) = {
            let mut sheet = StyleSheet::parse(
                code,
                ParserOptions {
                    filename,
                    ..ParserOptions::default()
                },
            )
            .map_err(|e| fail(e.to_string()))?;

            sheet
                .minify(MinifyOptions {
                    targets: self.targets.clone(),
                    ..MinifyOptions::default()
                })
                .map_err(|e| fail(e.to_string()))?;

            let result = sheet
                .to_css(PrinterOptions {
                    minify: self.minify,
                    source_map: map.as_mut(),
                    targets: self.targets.clone(),
                    ..PrinterOptions::default()
                })
                .map_err(|e| fail(e.to_string()))?;

            let json = match map.as_mut() {
                Some(map) => Some(
                    map.to_json(None)
                        .map_err(|e| StyleError::SourceMap(format!("{e:?}")))?,
                ),
                None => None,
            };

            (result.code, json)
        };

        Ok(Artifact {
            source: input.source,
            bytes: css.into_bytes(),
            map,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::IconSet;

    fn scratch(dev: bool) -> (tempfile::TempDir, BuildConfig) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        (dir, BuildConfig::new(dev, false).with_root(root))
    }

    fn put(config: &BuildConfig, name: &str, text: &str) {
        Output::text(config.src(Category::Styles).join(name), text)
            .save()
            .unwrap();
    }

    fn read(config: &BuildConfig, name: &str) -> String {
        fs::read_to_string(config.dest(Category::Styles).join(name)).unwrap()
    }

    #[test]
    fn test_entries_compile_and_partials_are_skipped() {
        let (_guard, config) = scratch(false);
        put(&config, "_vars.scss", "$accent: #ff0000;");
        put(&config, "main.scss", "@import 'vars';\n.a { .b { color: $accent; } }");
        let icons = IconSet::Live;

        let report = run(&TaskContext::new(&config, &icons)).unwrap();

        assert_eq!(report.written, vec![config.dest(Category::Styles).join("main.css")]);
        let css = read(&config, "main.css");
        assert!(css.contains(".a .b{color:red}"), "{css}");
        assert!(!config.dest(Category::Styles).join("_vars.css").exists());
    }

    #[test]
    fn test_vendor_prefix_for_targets() {
        let (_guard, config) = scratch(false);
        let config = config.with_browsers(["safari 13"]);
        put(&config, "main.scss", ".glass { backdrop-filter: blur(4px); }");
        let icons = IconSet::Live;

        run(&TaskContext::new(&config, &icons)).unwrap();

        let css = read(&config, "main.css");
        assert!(css.contains("-webkit-backdrop-filter"), "{css}");
    }

    #[test]
    fn test_dev_mode_writes_source_map_and_keeps_whitespace() {
        let (_guard, config) = scratch(true);
        put(&config, "main.scss", ".a { color: blue; }");
        let icons = IconSet::Live;

        let report = run(&TaskContext::new(&config, &icons)).unwrap();

        assert_eq!(report.written.len(), 2);
        let css = read(&config, "main.css");
        assert!(css.contains("sourceMappingURL=main.css.map"));
        assert!(css.contains("color: #00f") || css.contains("color: blue"), "{css}");

        let map: serde_json::Value = serde_json::from_str(&read(&config, "main.css.map")).unwrap();
        assert_eq!(map["version"], 3);
    }

    #[test]
    fn test_source_map_names_the_compiled_css() {
        let (_guard, config) = scratch(true);
        put(&config, "main.scss", "$c: red; .a { .b { color: $c; } }");
        let icons = IconSet::Live;

        run(&TaskContext::new(&config, &icons)).unwrap();

        let map: serde_json::Value = serde_json::from_str(&read(&config, "main.css.map")).unwrap();
        assert_eq!(map["sources"], serde_json::json!(["main.css"]));

        let content = map["sourcesContent"][0].as_str().unwrap();
        assert!(content.contains(".a .b"), "{content}");
        assert!(!content.contains("$c"));
    }

    #[test]
    fn test_sass_error_writes_nothing() {
        let (_guard, config) = scratch(false);
        put(&config, "main.scss", ".a { color: $missing; }");
        let icons = IconSet::Live;

        let err = run(&TaskContext::new(&config, &icons)).unwrap_err();
        assert!(err.to_string().contains("sass failed"), "{err:#}");
        assert!(!config.dest(Category::Styles).join("main.css").exists());
    }
}
