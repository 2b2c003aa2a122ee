//! Import path to on-disk package directory.

use crate::config::Config;
use crate::manifest::{Module, Replacement, Require};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, trace};

const VENDOR_MANIFEST: &str = "vendor/modules.txt";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocateError {
    #[error("package {import_path} not found{}", searched.as_ref().map(|p| format!(" (looked in {})", p.display())).unwrap_or_default())]
    NotFound {
        import_path: String,
        searched: Option<PathBuf>,
    },
}

/// Where a package lives and which module provides it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub dir: PathBuf,
    pub module: String,
}

#[derive(Debug, Clone)]
pub struct Locator {
    root: PathBuf,
    module: Module,
    mod_cache: Option<PathBuf>,
    goroot: Option<PathBuf>,
    vendored: bool,
}

impl Locator {
    pub fn new(root: &Path, module: &Module, config: &Config) -> Self {
        let vendored = root.join(VENDOR_MANIFEST).is_file();
        if vendored {
            debug!(root = %root.display(), "using vendor directory");
        }
        Self {
            root: root.to_path_buf(),
            module: module.clone(),
            mod_cache: config.mod_cache.clone(),
            goroot: config.goroot.clone(),
            vendored,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Finds the directory of `import_path`.
    ///
    /// Looks in the project's own module, then `GOROOT` for a standard
    /// library path no require claims, then `vendor/`, then the longest
    /// matching require (replacement or module cache).
    pub fn locate_package(&self, import_path: &str) -> Result<Located, LocateError> {
        let (dir, module) = self.candidate(import_path)?;
        trace!(import_path, dir = %dir.display(), "candidate directory");
        if dir.is_dir() {
            Ok(Located { dir, module })
        } else {
            Err(LocateError::NotFound {
                import_path: import_path.to_owned(),
                searched: Some(dir),
            })
        }
    }

    fn candidate(&self, import_path: &str) -> Result<(PathBuf, String), LocateError> {
        if self.module.owns(import_path) {
            let rest = &import_path[self.module.name.len()..];
            return Ok((join_slash(&self.root, rest), self.module.name.clone()));
        }

        let require = self.module.require_for(import_path);

        // the standard library is never vendored
        if require.is_none() && is_std_path(import_path) {
            if let Some(goroot) = &self.goroot {
                return Ok((join_slash(&goroot.join("src"), import_path), "std".to_owned()));
            }
        } else if self.vendored {
            let module = require.map_or_else(|| import_path.to_owned(), |r| r.name.clone());
            return Ok((join_slash(&self.root.join("vendor"), import_path), module));
        } else if let Some(req) = require {
            if let Some(module_dir) = self.module_dir(req) {
                let rest = &import_path[req.name.len()..];
                return Ok((join_slash(&module_dir, rest), req.name.clone()));
            }
        }

        Err(LocateError::NotFound {
            import_path: import_path.to_owned(),
            searched: None,
        })
    }

    /// Root directory of a required module, honoring its replacement.
    pub fn module_dir(&self, req: &Require) -> Option<PathBuf> {
        match &req.replace {
            Some(Replacement::Path { path }) => {
                let p = Path::new(path);
                Some(if p.is_absolute() {
                    normalize(p)
                } else {
                    normalize(&self.root.join(p))
                })
            }
            Some(Replacement::Module { name, version }) => {
                Some(cache_dir(self.mod_cache.as_deref()?, name, version))
            }
            None => Some(cache_dir(self.mod_cache.as_deref()?, &req.name, &req.version)),
        }
    }
}

/// Standard library paths have no dot in their first element.
pub fn is_std_path(import_path: &str) -> bool {
    let first = import_path.split('/').next().unwrap_or("");
    !first.is_empty() && !first.contains('.')
}

/// Splits a trailing `/vN` (N >= 2) major-version element off a module path.
pub fn split_major_version(name: &str) -> (&str, Option<&str>) {
    if let Some((base, last)) = name.rsplit_once('/') {
        if let Some(digits) = last.strip_prefix('v') {
            let valid = !digits.is_empty()
                && digits.bytes().all(|b| b.is_ascii_digit())
                && !digits.starts_with('0')
                && digits != "1";
            if valid {
                return (base, Some(last));
            }
        }
    }
    (name, None)
}

/// Module cache case encoding: `A` becomes `!a`.
pub fn escape_path(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_uppercase() {
            out.push('!');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// `<cache>/<name>@<version>`, or `<cache>/<base>/vN@<version>` for a
/// major-version suffixed name.
pub fn cache_dir(cache: &Path, name: &str, version: &str) -> PathBuf {
    let version = escape_path(version);
    match split_major_version(name) {
        (base, Some(major)) => {
            join_slash(cache, &escape_path(base)).join(format!("{major}@{version}"))
        }
        (base, None) => join_slash(cache, &format!("{}@{version}", escape_path(base))),
    }
}

fn join_slash(base: &Path, rel: &str) -> PathBuf {
    rel.split('/')
        .filter(|s| !s.is_empty())
        .fold(base.to_path_buf(), |p, s| p.join(s))
}

/// Lexically removes `.` and `..` components.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
