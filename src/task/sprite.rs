//! Second stage of the icon pipeline: the optimized icons are combined into a
//! single `sprite.svg` of `<symbol>` elements, referenced from markup with
//! `<use href="sprite.svg#icon-name"/>`.

use std::borrow::Cow;
use std::fs;

use serde::Serialize;
use xml::attribute::Attribute;
use xml::name::Name;
use xml::reader::{self, EventReader};
use xml::writer::{self, EventWriter};

use crate::config::Category;
use crate::output::Output;
use crate::task::icons::{self, IconError};
use crate::task::{Report, TaskContext};

const SVG_NS: &str = "http://www.w3.org/2000/svg";

pub const SPRITE: &str = "sprite.svg";
pub const INDEX: &str = "sprite.json";

/// One entry of `sprite.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Glyph {
    pub id: String,
    pub view_box: String,
}

pub fn run(ctx: &TaskContext) -> anyhow::Result<Report> {
    let dir = ctx.config.dest(Category::Icons);
    let fallback = format!("0 0 {0} {0}", ctx.config.glyph_size);

    let files: Vec<_> = crate::output::list_flat(&dir, "svg")?
        .into_iter()
        .filter(|path| path.file_name() != Some(SPRITE))
        .filter(|path| path.file_stem().is_some_and(|stem| ctx.icons.allows(stem)))
        .collect();

    let mut writer = EventWriter::new_with_config(Vec::new(), icons::emitter());
    writer
        .write(writer::XmlEvent::start_element("svg").default_ns(SVG_NS))
        .map_err(IconError::from)?;

    let mut glyphs = Vec::with_capacity(files.len());

    for file in &files {
        let Some(stem) = file.file_stem() else {
            continue;
        };

        let bytes = fs::read(file).map_err(|e| IconError::Io(file.clone(), e))?;
        let id = format!("icon-{stem}");
        let view_box = append_symbol(&mut writer, &bytes, &id, &fallback)
            .map_err(|e| anyhow::Error::new(e).context(format!("while adding {file}")))?;

        glyphs.push(Glyph { id, view_box });
    }

    writer
        .write(writer::XmlEvent::end_element())
        .map_err(IconError::from)?;

    let mut svg = writer.into_inner();
    svg.push(b'\n');

    let outputs = [
        Output::binary(dir.join(SPRITE), svg),
        Output::text(dir.join(INDEX), serde_json::to_string_pretty(&glyphs)?),
    ];

    let written = crate::output::save_all(&outputs).map_err(|e| IconError::Io(dir.clone(), e))?;
    tracing::debug!("sprite holds {} icons", glyphs.len());

    Ok(Report::new(written))
}

/// Writes the icon in `bytes` as a `<symbol>`, returning the view box it got.
fn append_symbol(
    writer: &mut EventWriter<Vec<u8>>,
    bytes: &[u8],
    id: &str,
    fallback: &str,
) -> Result<String, IconError> {
    let mut depth = 0usize;
    let mut view_box = fallback.to_string();

    for event in EventReader::new_with_config(bytes, icons::parser()) {
        let event = event?;

        match &event {
            reader::XmlEvent::StartElement {
                name,
                attributes,
                namespace,
            } if depth == 0 => {
                if name.local_name != "svg" {
                    return Err(IconError::Root(name.local_name.clone()));
                }

                if let Some(attr) = attributes.iter().find(|a| a.name.local_name == "viewBox") {
                    view_box = attr.value.clone();
                }

                let attributes = vec![
                    Attribute::new(Name::local("id"), id),
                    Attribute::new(Name::local("viewBox"), &view_box),
                ];

                writer.write(writer::XmlEvent::StartElement {
                    name: Name::local("symbol"),
                    attributes: Cow::Owned(attributes),
                    namespace: Cow::Borrowed(namespace),
                })?;
                depth += 1;
            }
            reader::XmlEvent::StartElement { .. } => {
                if let Some(event) = event.as_writer_event() {
                    writer.write(event)?;
                }
                depth += 1;
            }
            reader::XmlEvent::EndElement { .. } => {
                depth = depth.saturating_sub(1);
                writer.write(writer::XmlEvent::end_element())?;
            }
            reader::XmlEvent::StartDocument { .. }
            | reader::XmlEvent::EndDocument
            | reader::XmlEvent::Whitespace(_)
            | reader::XmlEvent::Comment(_) => {}
            other => {
                if let Some(event) = other.as_writer_event() {
                    writer.write(event)?;
                }
            }
        }
    }

    Ok(view_box)
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;
    use crate::config::{BuildConfig, IconListing};
    use crate::engine::TaskId;
    use crate::task::IconSet;

    fn read_index(path: &Utf8PathBuf) -> Vec<String> {
        let glyphs: Vec<serde_json::Value> =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        glyphs
            .iter()
            .map(|glyph| glyph["id"].as_str().unwrap().to_string())
            .collect()
    }

    const SQUARE: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 16 16"><rect width="16" height="16"/></svg>"#;
    const BARE: &str = r#"<svg xmlns="http://www.w3.org/2000/svg"><circle r="4"/></svg>"#;

    fn scratch(listing: IconListing) -> (tempfile::TempDir, BuildConfig) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let config = BuildConfig::default()
            .with_root(root)
            .with_icon_listing(listing);
        (dir, config)
    }

    fn add_icon(config: &BuildConfig, name: &str, svg: &str) {
        Output::text(config.src(Category::Icons).join(format!("{name}.svg")), svg)
            .save()
            .unwrap();
    }

    /// Both icon stages, as the watcher runs them.
    fn rebuild(config: &BuildConfig, icons: &IconSet) -> Vec<String> {
        let ctx = TaskContext::new(config, icons);
        crate::task::execute(TaskId::Icons, &ctx).unwrap();
        crate::task::execute(TaskId::Sprite, &ctx).unwrap();
        read_index(&config.dest(Category::Icons).join(INDEX))
    }

    #[test]
    fn test_symbols_and_view_boxes() {
        let (_guard, config) = scratch(IconListing::Live);
        add_icon(&config, "square", SQUARE);
        add_icon(&config, "dot", BARE);
        let icons = IconSet::capture(&config);

        let ids = rebuild(&config, &icons);
        assert_eq!(ids, vec!["icon-dot", "icon-square"]);

        let sprite = fs::read_to_string(config.dest(Category::Icons).join(SPRITE)).unwrap();
        assert!(sprite.starts_with(r#"<svg xmlns="http://www.w3.org/2000/svg">"#), "{sprite}");
        assert!(sprite.contains(r#"<symbol id="icon-square" viewBox="0 0 16 16">"#));
        assert!(sprite.contains(r#"<symbol id="icon-dot" viewBox="0 0 32 32">"#));
        assert!(sprite.contains("<circle r=\"4\" />"));
        assert_eq!(sprite.matches("<symbol").count(), 2);
    }

    #[test]
    fn test_snapshot_misses_icons_added_later() {
        let (_guard, config) = scratch(IconListing::Snapshot);
        add_icon(&config, "a", SQUARE);
        add_icon(&config, "b", SQUARE);
        let icons = IconSet::capture(&config);
        assert_eq!(rebuild(&config, &icons).len(), 2);

        add_icon(&config, "c", SQUARE);
        assert_eq!(rebuild(&config, &icons), vec!["icon-a", "icon-b"]);
    }

    #[test]
    fn test_live_listing_picks_up_new_icons() {
        let (_guard, config) = scratch(IconListing::Live);
        add_icon(&config, "a", SQUARE);
        add_icon(&config, "b", SQUARE);
        let icons = IconSet::capture(&config);
        assert_eq!(rebuild(&config, &icons).len(), 2);

        add_icon(&config, "c", SQUARE);
        assert_eq!(rebuild(&config, &icons), vec!["icon-a", "icon-b", "icon-c"]);
    }

    #[test]
    fn test_sprite_is_not_its_own_input() {
        let (_guard, config) = scratch(IconListing::Live);
        add_icon(&config, "a", SQUARE);
        let icons = IconSet::capture(&config);

        rebuild(&config, &icons);
        assert_eq!(rebuild(&config, &icons), vec!["icon-a"]);
    }

    #[test]
    fn test_deleted_icons_leave_the_sprite() {
        let (_guard, config) = scratch(IconListing::Live);
        add_icon(&config, "a", SQUARE);
        add_icon(&config, "b", SQUARE);
        let icons = IconSet::capture(&config);
        assert_eq!(rebuild(&config, &icons).len(), 2);

        fs::remove_file(config.src(Category::Icons).join("b.svg")).unwrap();
        assert_eq!(rebuild(&config, &icons), vec!["icon-a"]);

        let sprite = fs::read_to_string(config.dest(Category::Icons).join(SPRITE)).unwrap();
        assert_eq!(sprite.matches("<symbol").count(), 1);
        assert!(!config.dest(Category::Icons).join("b.svg").exists());
    }

    #[test]
    fn test_missing_icon_stage_fails() {
        let (_guard, config) = scratch(IconListing::Live);
        let icons = IconSet::Live;

        assert!(run(&TaskContext::new(&config, &icons)).is_err());
    }
}
