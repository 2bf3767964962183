use crate::config::Category;
use crate::error::CopyError;
use crate::task::{Report, TaskContext};

/// Copies the fonts verbatim.
pub fn run(ctx: &TaskContext) -> Result<Report, CopyError> {
    let src = ctx.config.src(Category::Fonts);
    let dst = ctx.config.dest(Category::Fonts);

    let copied = crate::output::copy_tree(&src, &dst)?;
    tracing::debug!("copied {} fonts", copied.len());

    Ok(Report::new(copied))
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;
    use crate::config::BuildConfig;
    use crate::output::Output;
    use crate::task::IconSet;

    #[test]
    fn test_fonts_are_copied_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let config = BuildConfig::default().with_root(&root);
        let icons = IconSet::Live;

        let bytes = vec![0x77, 0x4f, 0x46, 0x32, 0x00, 0xff];
        Output::binary(config.src(Category::Fonts).join("sans/regular.woff2"), bytes.clone())
            .save()
            .unwrap();

        let report = run(&TaskContext::new(&config, &icons)).unwrap();
        let target = config.dest(Category::Fonts).join("sans/regular.woff2");

        assert_eq!(report.written, vec![target.clone()]);
        assert_eq!(std::fs::read(target).unwrap(), bytes);
    }

    #[test]
    fn test_missing_fonts_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let config = BuildConfig::default().with_root(&root);
        let icons = IconSet::Live;

        let err = run(&TaskContext::new(&config, &icons)).unwrap_err();
        assert!(matches!(err, CopyError::MissingSource(_)));
    }
}
