//! First stage of the icon pipeline: every source SVG is cleaned up and
//! written on its own. The [`sprite`](super::sprite) stage combines the
//! results.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use xml::attribute::Attribute;
use xml::reader::{self, EventReader, ParserConfig};
use xml::writer::{self, EmitterConfig, EventWriter};

use crate::config::Category;
use crate::output::Output;
use crate::pipeline::{Artifact, Pipeline, Step};
use crate::task::sprite::SPRITE;
use crate::task::{Report, TaskContext};

/// Attributes removed from the outermost `<svg>`, so icons scale with CSS.
const STRIPPED: [&str; 2] = ["width", "height"];

#[derive(Debug, Error)]
pub enum IconError {
    #[error("IO error on '{0}': {1}")]
    Io(Utf8PathBuf, #[source] std::io::Error),

    #[error("Malformed SVG: {0}")]
    Read(#[from] reader::Error),

    #[error("Couldn't write SVG: {0}")]
    Write(#[from] writer::Error),

    #[error("Expected an <svg> root element, found <{0}>")]
    Root(String),
}

pub fn run(ctx: &TaskContext) -> anyhow::Result<Report> {
    let src = ctx.config.src(Category::Icons);
    let dst = ctx.config.dest(Category::Icons);

    let files = crate::output::list_flat(&src, "svg")?;
    fs::create_dir_all(&dst).map_err(|e| IconError::Io(dst.clone(), e))?;
    remove_stale(&files, &dst)?;

    let pipeline = pipeline();
    let mut outputs = Vec::with_capacity(files.len());

    for file in files {
        let bytes = fs::read(&file).map_err(|e| IconError::Io(file.clone(), e))?;
        let result = pipeline.run(Artifact::new(&file, bytes))?;

        let name = file.file_name().unwrap_or("icon.svg");
        outputs.push(Output::binary(dst.join(name), result.bytes));
    }

    let written = crate::output::save_all(&outputs).map_err(|e| IconError::Io(dst.clone(), e))?;
    tracing::debug!("optimized {} icons", written.len());

    Ok(Report::new(written))
}

/// Deletes optimized icons whose source is gone, so the sprite stage never
/// picks them up again.
fn remove_stale(sources: &[Utf8PathBuf], dst: &Utf8Path) -> anyhow::Result<()> {
    let names: HashSet<&str> = sources.iter().filter_map(|path| path.file_name()).collect();

    for path in crate::output::list_flat(dst, "svg")? {
        let Some(name) = path.file_name() else {
            continue;
        };
        if name == SPRITE || names.contains(name) {
            continue;
        }

        fs::remove_file(&path).map_err(|e| IconError::Io(path.clone(), e))?;
        tracing::debug!("removed {path}, its source is gone");
    }

    Ok(())
}

fn pipeline() -> Pipeline {
    Pipeline::new().then(StripSize).then(Indent)
}

pub(crate) fn parser() -> ParserConfig {
    ParserConfig::new()
        .trim_whitespace(true)
        .ignore_comments(true)
}

pub(crate) fn emitter() -> EmitterConfig {
    EmitterConfig::new()
        .perform_indent(true)
        .write_document_declaration(false)
}

/// Runs `bytes` back through the XML writer, dropping the prolog, comments
/// and whitespace. Attributes in `strip` are removed from the root element.
fn rewrite(bytes: &[u8], config: EmitterConfig, strip: &[&str]) -> Result<Vec<u8>, IconError> {
    let mut writer = EventWriter::new_with_config(Vec::new(), config);
    let mut depth = 0usize;

    for event in EventReader::new_with_config(bytes, parser()) {
        let event = event?;

        match &event {
            reader::XmlEvent::StartElement {
                name,
                attributes,
                namespace,
            } => {
                if depth == 0 && name.local_name != "svg" {
                    return Err(IconError::Root(name.local_name.clone()));
                }

                let attributes: Vec<Attribute> = attributes
                    .iter()
                    .filter(|attr| depth > 0 || !strip.contains(&attr.name.local_name.as_str()))
                    .map(|attr| attr.borrow())
                    .collect();

                writer.write(writer::XmlEvent::StartElement {
                    name: name.borrow(),
                    attributes: Cow::Owned(attributes),
                    namespace: Cow::Borrowed(namespace),
                })?;
                depth += 1;
            }
            reader::XmlEvent::EndElement { .. } => {
                depth = depth.saturating_sub(1);
                writer.write(writer::XmlEvent::end_element())?;
            }
            reader::XmlEvent::StartDocument { .. }
            | reader::XmlEvent::Whitespace(_)
            | reader::XmlEvent::Comment(_) => {}
            other => {
                if let Some(event) = other.as_writer_event() {
                    writer.write(event)?;
                }
            }
        }
    }

    Ok(writer.into_inner())
}

/// Removes the fixed size of the outermost `<svg>`.
struct StripSize;

impl Step for StripSize {
    fn name(&self) -> &'static str {
        "strip-size"
    }

    fn apply(&self, input: Artifact) -> anyhow::Result<Artifact> {
        let config = EmitterConfig::new().write_document_declaration(false);
        let bytes = rewrite(&input.bytes, config, &STRIPPED)?;
        Ok(Artifact { bytes, ..input })
    }
}

/// Pretty-prints the markup, one element per line.
struct Indent;

impl Step for Indent {
    fn name(&self) -> &'static str {
        "indent"
    }

    fn apply(&self, input: Artifact) -> anyhow::Result<Artifact> {
        let mut bytes = rewrite(&input.bytes, emitter(), &[])?;
        bytes.push(b'\n');
        Ok(Artifact { bytes, ..input })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;
    use crate::task::IconSet;

    fn optimize(svg: &str) -> String {
        let result = pipeline().run(Artifact::new("icon.svg", svg)).unwrap();
        String::from_utf8(result.bytes).unwrap()
    }

    const ICON: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!-- exported -->
<svg xmlns="http://www.w3.org/2000/svg" width="24" height="24" viewBox="0 0 24 24"><g><rect width="10" height="10"/><path d="M0 0h24"/></g></svg>"#;

    #[test]
    fn test_root_size_is_stripped() {
        let out = optimize(ICON);
        let root = out.lines().next().unwrap();

        assert!(root.starts_with("<svg"), "{out}");
        assert!(root.contains(r#"viewBox="0 0 24 24""#));
        assert!(!root.contains("width="));
        assert!(!root.contains("height="));
        assert!(!out.contains("<?xml"));
        assert!(!out.contains("exported"));
    }

    #[test]
    fn test_nested_elements_keep_their_attributes() {
        let out = optimize(ICON);

        assert!(out.contains(r#"<rect width="10" height="10" />"#), "{out}");
        assert!(out.contains(r#"<path d="M0 0h24" />"#));
        // one element per line, children indented below their parent
        assert!(out.lines().any(|line| line.starts_with("  <g>")));
        assert!(out.lines().any(|line| line.starts_with("    <rect")));
    }

    #[test]
    fn test_non_svg_root_is_rejected() {
        let err = rewrite(b"<html><body/></html>", emitter(), &STRIPPED).unwrap_err();
        assert!(matches!(err, IconError::Root(name) if name == "html"));
    }

    #[test]
    fn test_run_writes_each_icon() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let config = BuildConfig::default().with_root(root);
        let icons = IconSet::Live;

        Output::text(config.src(Category::Icons).join("close.svg"), ICON)
            .save()
            .unwrap();
        Output::text(config.src(Category::Icons).join("notes.txt"), "skip")
            .save()
            .unwrap();

        let report = run(&TaskContext::new(&config, &icons)).unwrap();

        let target = config.dest(Category::Icons).join("close.svg");
        assert_eq!(report.written, vec![target.clone()]);
        assert!(fs::read_to_string(target).unwrap().ends_with("</svg>\n"));
    }
}
