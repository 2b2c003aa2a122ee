//! Directory walk grouping `.go` files into a package tree.

use crate::imports::assumed_name;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Error)]
pub enum FileSetError {
    #[error("{} is not a directory", path.display())]
    NotADirectory { path: PathBuf },
    #[error("walking {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// A directory in the tree. It is a package when it has files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageNode {
    pub import_path: String,
    /// Assumed package name; the `package` clause is only known after parsing.
    pub short_name: String,
    pub dir: PathBuf,
    /// Sorted by file name.
    pub files: Vec<PathBuf>,
    /// Sorted by short name.
    pub children: Vec<PackageNode>,
}

impl PackageNode {
    pub fn is_package(&self) -> bool {
        !self.files.is_empty()
    }

    /// Package nodes, parents before children.
    pub fn packages(&self) -> Vec<&PackageNode> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.is_package() {
                out.push(node);
            }
            stack.extend(node.children.iter().rev());
        }
        out
    }

    pub fn find(&self, import_path: &str) -> Option<&PackageNode> {
        if self.import_path == import_path {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(import_path))
    }
}

/// Walks a project rooted at `root` whose module path is `import_root`.
///
/// Skips `_test.go` files, `vendor` and `testdata` directories, and any
/// file or directory whose name starts with `.` or `_`. Symlinks are
/// followed; loops are skipped.
pub fn build_file_set(root: &Path, import_root: &str) -> Result<PackageNode, FileSetError> {
    if !root.is_dir() {
        return Err(FileSetError::NotADirectory {
            path: root.to_path_buf(),
        });
    }

    let mut by_dir: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored(e, true));

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) if e.loop_ancestor().is_some() => {
                warn!(path = ?e.path(), "skipping symlink loop");
                continue;
            }
            Err(e) => {
                return Err(FileSetError::Walk {
                    path: e.path().unwrap_or(root).to_path_buf(),
                    source: e,
                })
            }
        };
        if !is_go_file(&entry) {
            continue;
        }
        let rel = entry
            .path()
            .parent()
            .and_then(|p| p.strip_prefix(root).ok())
            .unwrap_or(Path::new(""))
            .to_path_buf();
        by_dir.entry(rel).or_default().push(entry.into_path());
    }

    debug!(root = %root.display(), packages = by_dir.len(), "file set built");
    Ok(build_node(root, import_root, Path::new(""), &mut by_dir))
}

/// `.go` files directly in `dir`, sorted by name.
pub fn list_go_files(dir: &Path) -> Result<Vec<PathBuf>, FileSetError> {
    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .follow_links(true)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(|e| FileSetError::Walk {
            path: dir.to_path_buf(),
            source: e,
        })?;
        if is_go_file(&entry) && !is_ignored(&entry, false) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn build_node(
    root: &Path,
    import_root: &str,
    rel: &Path,
    by_dir: &mut BTreeMap<PathBuf, Vec<PathBuf>>,
) -> PackageNode {
    let import_path = rel
        .components()
        .fold(import_root.to_owned(), |mut acc, c| {
            acc.push('/');
            acc.push_str(&c.as_os_str().to_string_lossy());
            acc
        });

    let files = by_dir.remove(rel).unwrap_or_default();

    let mut child_names: Vec<PathBuf> = by_dir
        .keys()
        .filter_map(|k| k.strip_prefix(rel).ok())
        .filter_map(|rest| rest.components().next())
        .map(|c| rel.join(c.as_os_str()))
        .collect();
    child_names.dedup();

    let mut children: Vec<PackageNode> = child_names
        .iter()
        .map(|child| build_node(root, import_root, child, by_dir))
        .collect();
    children.sort_by(|a, b| {
        a.short_name
            .cmp(&b.short_name)
            .then_with(|| a.dir.cmp(&b.dir))
    });

    PackageNode {
        short_name: assumed_name(&import_path),
        import_path,
        dir: if rel.as_os_str().is_empty() {
            root.to_path_buf()
        } else {
            root.join(rel)
        },
        files,
        children,
    }
}

fn is_go_file(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    entry.file_type().is_file() && name.ends_with(".go") && !name.ends_with("_test.go")
}

fn is_ignored(entry: &DirEntry, skip_vendor: bool) -> bool {
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') || name.starts_with('_') {
        return true;
    }
    entry.file_type().is_dir() && (name == "testdata" || (skip_vendor && name == "vendor"))
}
