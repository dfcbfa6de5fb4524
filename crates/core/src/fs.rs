//! Path and directory-listing collaborator
//!
//! Watch workers never touch `std::fs` for enumeration directly; they go
//! through [`FileSystem`] so registration logic can be exercised against
//! any tree.

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Path resolution and one-level directory listing
pub trait FileSystem: Send + Sync {
    /// Resolve `path` to a canonical absolute path
    ///
    /// Must succeed for paths that do not exist (yet), so that callers can
    /// compare them against already-registered roots.
    fn normalize(&self, path: &Path) -> io::Result<PathBuf>;

    /// Absolute path of `name` inside `dir`
    fn join(&self, dir: &Path, name: &OsStr) -> PathBuf {
        dir.join(name)
    }

    /// Names of the immediate subdirectories of `dir`, sorted
    fn list_subdirs(&self, dir: &Path) -> io::Result<Vec<OsString>>;

    /// Names of the immediate regular files of `dir`, sorted
    fn list_files(&self, dir: &Path) -> io::Result<Vec<OsString>>;

    /// Whether `path` currently is a directory (symlinks are not followed)
    fn is_dir(&self, path: &Path) -> bool;
}

/// [`FileSystem`] backed by the local disk
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl LocalFs {
    fn list(&self, dir: &Path, want_dirs: bool) -> io::Result<Vec<OsString>> {
        if !std::fs::metadata(dir)?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{} is not a directory", dir.display()),
            ));
        }

        let mut names = Vec::new();

        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        {
            let entry = entry.map_err(io::Error::from)?;
            let file_type = entry.file_type();
            let keep = if want_dirs {
                file_type.is_dir()
            } else {
                file_type.is_file()
            };
            if keep {
                names.push(entry.file_name().to_os_string());
            }
        }

        Ok(names)
    }
}

impl FileSystem for LocalFs {
    fn normalize(&self, path: &Path) -> io::Result<PathBuf> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        let cleaned = lexical_clean(&absolute);

        // Canonicalize the longest existing ancestor, then re-append the rest
        let mut existing = cleaned.as_path();
        let mut missing: Vec<&OsStr> = Vec::new();
        loop {
            if let Ok(mut canonical) = existing.canonicalize() {
                for name in missing.iter().rev() {
                    canonical.push(name);
                }
                return Ok(canonical);
            }
            match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    missing.push(name);
                    existing = parent;
                }
                _ => return Ok(cleaned.clone()),
            }
        }
    }

    fn list_subdirs(&self, dir: &Path) -> io::Result<Vec<OsString>> {
        self.list(dir, true)
    }

    fn list_files(&self, dir: &Path) -> io::Result<Vec<OsString>> {
        self.list(dir, false)
    }

    fn is_dir(&self, path: &Path) -> bool {
        std::fs::symlink_metadata(path)
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
    }
}

/// Remove `.` and `..` components without touching the disk
pub fn lexical_clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => cleaned.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root
                cleaned.pop();
            }
            Component::Normal(name) => cleaned.push(name),
        }
    }
    cleaned
}
