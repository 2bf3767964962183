//! Utilities for working with output files.
//!
//! This module contains the [`Output`] struct, which represents a single file
//! produced by a task, and the helpers tasks share for walking source
//! directories.

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::CopyError;

/// The content of an [`Output`] file.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum OutputData {
    /// Text content (UTF-8).
    Utf8(String),
    /// Binary content (raw bytes).
    Binary(Vec<u8>),
}

impl AsRef<[u8]> for OutputData {
    fn as_ref(&self) -> &[u8] {
        match self {
            OutputData::Utf8(s) => s.as_bytes(),
            OutputData::Binary(b) => b.as_slice(),
        }
    }
}

/// Represents a single file to be written into a destination directory.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct Output {
    /// The full destination path of the file.
    pub path: Utf8PathBuf,
    /// The content of the file to be written.
    pub data: OutputData,
}

impl Output {
    pub fn text(path: impl Into<Utf8PathBuf>, data: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            data: OutputData::Utf8(data.into()),
        }
    }

    pub fn binary(path: impl Into<Utf8PathBuf>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            data: OutputData::Binary(data.into()),
        }
    }

    /// Writes the file, creating any missing parent directories.
    pub fn save(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&self.path, &self.data)
    }
}

/// Saves all outputs, returning the paths that were written.
pub(crate) fn save_all(outputs: &[Output]) -> io::Result<Vec<Utf8PathBuf>> {
    let mut written = Vec::with_capacity(outputs.len());

    for output in outputs {
        output.save()?;
        written.push(output.path.clone());
    }

    Ok(written)
}

/// Lists every regular file below `dir`, sorted. A missing directory is an
/// error, because every caller needs its sources to exist.
pub(crate) fn list_files(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, CopyError> {
    if !dir.is_dir() {
        return Err(CopyError::MissingSource(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    walk(dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn walk(dir: &Utf8Path, acc: &mut Vec<Utf8PathBuf>) -> Result<(), CopyError> {
    let entries = fs::read_dir(dir).map_err(|e| CopyError::Io(dir.to_path_buf(), e))?;

    for entry in entries {
        let entry = entry.map_err(|e| CopyError::Io(dir.to_path_buf(), e))?;
        let path = Utf8PathBuf::try_from(entry.path())?;
        let filetype = entry
            .file_type()
            .map_err(|e| CopyError::Io(path.clone(), e))?;

        if filetype.is_dir() {
            walk(&path, acc)?;
        } else if filetype.is_file() {
            acc.push(path);
        }
    }

    Ok(())
}

/// Lists files directly inside `dir` with the given extension, sorted.
pub(crate) fn list_flat(dir: &Utf8Path, extension: &str) -> Result<Vec<Utf8PathBuf>, CopyError> {
    if !dir.is_dir() {
        return Err(CopyError::MissingSource(dir.to_path_buf()));
    }

    let pattern = format!("{}/*.{extension}", escaped(dir));
    let mut files = Vec::new();

    for entry in glob::glob(&pattern)? {
        let path = Utf8PathBuf::try_from(entry?)?;
        if path.is_file() {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

fn escaped(dir: &Utf8Path) -> String {
    glob::Pattern::escape(dir.as_str().trim_end_matches('/'))
}

/// Copies every file below `src` into `dst`, keeping relative paths.
pub(crate) fn copy_tree(src: &Utf8Path, dst: &Utf8Path) -> Result<Vec<Utf8PathBuf>, CopyError> {
    let mut copied = Vec::new();

    for file in list_files(src)? {
        let target = rebase(&file, src, dst);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| CopyError::Io(parent.to_path_buf(), e))?;
        }

        fs::copy(&file, &target).map_err(|e| CopyError::Io(file.clone(), e))?;
        copied.push(target);
    }

    Ok(copied)
}

/// Moves `path` from below `from` to the same relative location below `to`.
pub(crate) fn rebase(path: &Utf8Path, from: &Utf8Path, to: &Utf8Path) -> Utf8PathBuf {
    match path.strip_prefix(from) {
        Ok(relative) => to.join(relative),
        Err(_) => to.join(path.file_name().unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        (dir, root)
    }

    #[test]
    fn test_rebase() {
        assert_eq!(
            rebase(
                Utf8Path::new("src/fonts/a/b.woff2"),
                Utf8Path::new("src/fonts"),
                Utf8Path::new("fonts")
            ),
            Utf8Path::new("fonts/a/b.woff2")
        );
    }

    #[test]
    fn test_copy_tree_preserves_layout() {
        let (_guard, root) = scratch();
        let src = root.join("src");

        Output::text(src.join("a.txt"), "a").save().unwrap();
        Output::binary(src.join("nested/deep/b.bin"), vec![0u8, 1, 2])
            .save()
            .unwrap();

        let copied = copy_tree(&src, &root.join("out")).unwrap();

        assert_eq!(copied.len(), 2);
        assert_eq!(fs::read(root.join("out/a.txt")).unwrap(), b"a");
        assert_eq!(
            fs::read(root.join("out/nested/deep/b.bin")).unwrap(),
            vec![0u8, 1, 2]
        );
    }

    #[test]
    fn test_missing_source_is_an_error() {
        let (_guard, root) = scratch();
        let err = list_files(&root.join("nope")).unwrap_err();
        assert!(matches!(err, CopyError::MissingSource(_)));
    }

    #[test]
    fn test_list_flat_ignores_nested() {
        let (_guard, root) = scratch();
        Output::text(root.join("a.scss"), "").save().unwrap();
        Output::text(root.join("partials/b.scss"), "").save().unwrap();
        Output::text(root.join("c.css"), "").save().unwrap();

        let files = list_flat(&root, "scss").unwrap();
        assert_eq!(files, vec![root.join("a.scss")]);
    }
}
