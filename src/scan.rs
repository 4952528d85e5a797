//! Input traversal: turn the paths given on the command line into the
//! worklist of image files.
//!
//! ```text
//! photo.JPG          → taken as is
//! shoot/             → files directly inside, sorted by name
//! shoot/ --recursive → every file below, depth-first, sorted per directory
//! ```
//!
//! Files whose extension is not a supported container are not errors; they
//! come back in [`ScanResult::skipped`] so the caller can print a notice.
//! A path that does not exist at all means the job itself is wrong, and is
//! returned as a [`ScanError`].

use crate::imaging::ContainerFormat;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{0}")]
    Walk(#[from] walkdir::Error),
}

/// Worklist in traversal order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub images: Vec<PathBuf>,
    /// Files found but not recognized as images.
    pub skipped: Vec<PathBuf>,
}

/// Expand `paths` into image files, in the order given.
pub fn collect_images(paths: &[PathBuf], recursive: bool) -> Result<ScanResult, ScanError> {
    let mut result = ScanResult::default();

    for path in paths {
        let meta = fs::metadata(path).map_err(|source| ScanError::Io {
            path: path.clone(),
            source,
        })?;

        let files = if !meta.is_dir() {
            vec![path.clone()]
        } else if recursive {
            walk(path)?
        } else {
            list_dir(path)?
        };

        for file in files {
            if is_image(&file) {
                result.images.push(file);
            } else {
                result.skipped.push(file);
            }
        }
    }

    Ok(result)
}

fn walk(root: &Path) -> Result<Vec<PathBuf>, ScanError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn list_dir(dir: &Path) -> Result<Vec<PathBuf>, ScanError> {
    let io_err = |source| ScanError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if !entry.file_type().map_err(io_err)?.is_dir() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Extension check only; contents are not sniffed until decode.
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(ContainerFormat::from_type)
        .is_some()
}
