//! Generates a small feature detection script.
//!
//! The script always carries a baseline: the HTML5 element shim, class names
//! on `<html>` for every result, and the tests most stylesheets depend on.
//! On top of that come the tests referenced as `Modernizr.<name>` anywhere in
//! the script sources.

use std::collections::BTreeSet;
use std::fs;
use std::sync::LazyLock;

use camino::Utf8PathBuf;
use regex::Regex;
use thiserror::Error;

use crate::config::Category;
use crate::error::CopyError;
use crate::output::Output;
use crate::task::{Report, TaskContext};

pub const OUTPUT: &str = "modernizr.js";

/// Tests included even when no script mentions them.
const BASELINE: [&str; 5] = [
    "flexbox",
    "classlist",
    "inlinesvg",
    "cssanimations",
    "csstransitions",
];

/// Tests never emitted, even when referenced.
const EXCLUDED: [&str; 1] = ["hidden"];

/// Elements registered by the shim so old engines style them.
const HTML5_ELEMENTS: &str = "abbr article aside audio bdi canvas data datalist details dialog \
    figcaption figure footer header main mark meter nav output picture progress section summary \
    template time video";

static RE_USAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bModernizr\.([A-Za-z][A-Za-z0-9]*)").expect("valid pattern"));

/// A known feature test: its name and a JS expression evaluating to a
/// boolean. `el` is the document element, `style` its style declaration.
struct Test {
    name: &'static str,
    expr: &'static str,
}

const CATALOG: &[Test] = &[
    Test {
        name: "classlist",
        expr: "'classList'in el",
    },
    Test {
        name: "cssanimations",
        expr: "'animationName'in style||'webkitAnimationName'in style",
    },
    Test {
        name: "csstransforms",
        expr: "'transform'in style||'webkitTransform'in style",
    },
    Test {
        name: "csstransitions",
        expr: "'transitionProperty'in style||'webkitTransitionProperty'in style",
    },
    Test {
        name: "flexbox",
        expr: "'flexBasis'in style||'webkitFlexBasis'in style",
    },
    Test {
        name: "flexwrap",
        expr: "'flexWrap'in style||'webkitFlexWrap'in style",
    },
    Test {
        name: "hidden",
        expr: "'hidden'in document.createElement('a')",
    },
    Test {
        name: "inlinesvg",
        expr: "(function(){var d=document.createElement('div');d.innerHTML='<svg/>';\
               return(d.firstChild&&d.firstChild.namespaceURI)==='http://www.w3.org/2000/svg'})()",
    },
    Test {
        name: "localstorage",
        expr: "(function(){try{localStorage.setItem('mod','mod');localStorage.removeItem('mod');\
               return true}catch(e){return false}})()",
    },
    Test {
        name: "svg",
        expr: "!!document.createElementNS&&\
               !!document.createElementNS('http://www.w3.org/2000/svg','svg').createSVGRect",
    },
    Test {
        name: "touchevents",
        expr: "'ontouchstart'in window",
    },
];

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("Couldn't read '{0}':\n{1}")]
    Read(Utf8PathBuf, #[source] std::io::Error),

    #[error("Couldn't write '{0}':\n{1}")]
    Write(Utf8PathBuf, #[source] std::io::Error),

    #[error(transparent)]
    Sources(#[from] CopyError),
}

pub fn run(ctx: &TaskContext) -> Result<Report, FeatureError> {
    let src = ctx.config.src(Category::Scripts);
    let target = ctx.config.dest(Category::Scripts).join(OUTPUT);

    let mut used = BTreeSet::new();
    for path in crate::output::list_flat(&src, "js")? {
        let text = fs::read_to_string(&path).map_err(|e| FeatureError::Read(path.clone(), e))?;
        used.extend(references(&text));
    }

    let tests = select(&used);
    tracing::debug!("feature tests: {}", tests.join(", "));

    let output = Output::text(&target, render(&tests));
    output
        .save()
        .map_err(|e| FeatureError::Write(target.clone(), e))?;

    Ok(Report::new(vec![target]))
}

/// Names accessed as `Modernizr.<name>` in a script.
fn references(text: &str) -> BTreeSet<String> {
    RE_USAGE
        .captures_iter(text)
        .map(|c| c[1].to_ascii_lowercase())
        .collect()
}

/// Baseline plus referenced tests, restricted to the catalog, sorted.
fn select(used: &BTreeSet<String>) -> Vec<&'static str> {
    for name in used {
        if !CATALOG.iter().any(|test| test.name == name.as_str()) {
            tracing::warn!("unknown feature test Modernizr.{name}, skipping");
        }
    }

    CATALOG
        .iter()
        .map(|test| test.name)
        .filter(|name| BASELINE.contains(name) || used.contains(*name))
        .filter(|name| !EXCLUDED.contains(name))
        .collect()
}

/// The minified script: a banner line naming the tests, then the whole
/// library on a single line.
fn render(tests: &[&str]) -> String {
    let entries = tests
        .iter()
        .filter_map(|name| CATALOG.iter().find(|test| test.name == *name))
        .map(|test| format!("{}:function(){{return {}}}", test.name, test.expr))
        .collect::<Vec<_>>()
        .join(",");

    let statements = [
        ";(function(window,document){".to_string(),
        "var el=document.documentElement,style=el.style,Modernizr={};".to_string(),
        format!("var tags='{HTML5_ELEMENTS}'.split(' ');"),
        "for(var i=0;i<tags.length;i++)document.createElement(tags[i]);".to_string(),
        format!("var tests={{{entries}}};"),
        "var classes=[];".to_string(),
        "for(var name in tests){".to_string(),
        "Modernizr[name]=!!tests[name]();".to_string(),
        "classes.push((Modernizr[name]?'':'no-')+name);".to_string(),
        "}".to_string(),
        "el.className=el.className.replace(/(^|\\s)no-js(\\s|$)/,'$1js$2');".to_string(),
        "el.className+=(el.className?' ':'')+classes.join(' ');".to_string(),
        "window.Modernizr=Modernizr;".to_string(),
        "})(window,document);".to_string(),
    ];

    format!("/*! modernizr | {} */\n{}\n", tests.join(" "), statements.concat())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;
    use crate::task::IconSet;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_references_are_found() {
        let text = "if (Modernizr.touchevents && !window.Modernizr.svg) {}\nModernizr.on('x');";
        assert_eq!(references(text), set(&["on", "svg", "touchevents"]));
    }

    #[test]
    fn test_selection_keeps_baseline_and_drops_hidden() {
        let tests = select(&set(&["touchevents", "hidden", "nonsense"]));

        assert_eq!(
            tests,
            vec![
                "classlist",
                "cssanimations",
                "csstransitions",
                "flexbox",
                "inlinesvg",
                "touchevents"
            ]
        );
    }

    #[test]
    fn test_output_is_minified() {
        let tests = select(&BTreeSet::from(["touchevents".to_string()]));
        let js = render(&tests);
        let lines: Vec<_> = js.lines().collect();

        assert_eq!(lines.len(), 2, "{js}");
        assert!(lines[0].starts_with("/*! modernizr | classlist"));
        assert!(!lines.iter().any(|line| line.trim_start().starts_with("// ")));
        assert!(lines[1].contains("touchevents:function(){return 'ontouchstart'in window}"));
        assert!(lines[1].ends_with("})(window,document);"));
    }

    #[test]
    fn test_run_writes_script() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let config = BuildConfig::default().with_root(root);
        let icons = IconSet::Live;

        Output::text(
            config.src(Category::Scripts).join("main.js"),
            "document.body.dataset.touch = Modernizr.touchevents;",
        )
        .save()
        .unwrap();

        let report = run(&TaskContext::new(&config, &icons)).unwrap();

        let target = config.dest(Category::Scripts).join(OUTPUT);
        assert_eq!(report.written, vec![target.clone()]);

        let js = fs::read_to_string(target).unwrap();
        assert!(js.contains("touchevents:function"));
        assert!(js.contains("flexbox:function"));
        assert!(!js.contains("hidden:function"));
        assert!(js.contains("window.Modernizr=Modernizr;"));
    }

    #[test]
    fn test_missing_sources_fail() {
        let config = BuildConfig::default().with_root("/definitely/not/here");
        let icons = IconSet::Live;

        let err = run(&TaskContext::new(&config, &icons)).unwrap_err();
        assert!(matches!(err, FeatureError::Sources(CopyError::MissingSource(_))));
    }
}
