//! Candidate file collection.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Directories to always skip at any depth (dependency/VCS directories).
const ALWAYS_SKIP_DIRS: &[&str] = &["node_modules", "vendor", ".git", ".svn", ".hg"];

/// Directories to skip only at the root level (build output directories).
const ROOT_ONLY_SKIP_DIRS: &[&str] = &["build", "dist", "target", "out"];

/// Collect every file under `root` whose extension equals `extension`.
///
/// The result is sorted so repeated runs visit files in the same order.
pub fn collect_source_files(root: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(Error::validation_invalid_argument(
            "path",
            format!("Not a directory: {}", root.display()),
        ));
    }

    let mut files = Vec::new();
    walk_recursive(root, root, extension, &mut files);
    files.sort();
    Ok(files)
}

fn walk_recursive(dir: &Path, root: &Path, extension: &str, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        log_status!("files", "Cannot read directory {}", dir.display());
        return;
    };

    let is_root = dir == root;

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if ALWAYS_SKIP_DIRS.contains(&name.as_str()) {
                continue;
            }
            if is_root && ROOT_ONLY_SKIP_DIRS.contains(&name.as_str()) {
                continue;
            }
            walk_recursive(&path, root, extension, files);
        } else if path.extension().and_then(|e| e.to_str()) == Some(extension) {
            files.push(path);
        }
    }
}

/// Path relative to `root` for display, falling back to the full path.
pub fn relative_display(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}
