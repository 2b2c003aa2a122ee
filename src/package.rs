//! Parsed packages and the store that loads them on demand.

use crate::annotations::{self, Annotations};
use crate::fileset::{list_go_files, FileSetError};
use crate::imports::{ImportError, ImportTable};
use crate::locator::{LocateError, Locator};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use svcgen_syntax::ast::{AstArena, CommentGroupId, FuncDeclId, TypeSpec};
use svcgen_syntax::walk::Visitor;
use svcgen_syntax::{parse_source, LineIndex, ParsedFile};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}:{line}:{col}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: u32,
        col: u32,
        message: String,
    },
    #[error("{}:{}", path.display(), source)]
    Import {
        path: PathBuf,
        #[source]
        source: ImportError,
    },
    #[error("no Go files for {import_path} in {}", dir.display())]
    NoGoFiles { import_path: String, dir: PathBuf },
    #[error(transparent)]
    FileSet(#[from] FileSetError),
}

/// Why [`PackageStore::load`] could not produce a package.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Locate(#[from] LocateError),
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// One source file with its imports.
#[derive(Debug)]
pub struct GoFile {
    pub path: PathBuf,
    pub parsed: ParsedFile,
    pub imports: ImportTable,
}

/// A type declaration: the file it lives in and its spec.
#[derive(Debug, Clone, Copy)]
pub struct TypeDecl {
    pub file: usize,
    pub spec: TypeSpec,
}

#[derive(Debug, Clone, Copy)]
pub struct FuncRef {
    pub file: usize,
    pub id: FuncDeclId,
}

#[derive(Debug)]
pub struct Package {
    pub import_path: String,
    /// From the `package` clause.
    pub name: String,
    pub dir: PathBuf,
    /// Module that provides the package.
    pub module: String,
    /// Sorted by file name.
    pub files: Vec<GoFile>,
    pub types: HashMap<String, TypeDecl>,
    /// Top-level functions in file and source order.
    pub funcs: Vec<FuncRef>,
}

impl Package {
    pub fn type_decl(&self, name: &str) -> Option<TypeDecl> {
        self.types.get(name).copied()
    }

    /// Package doc annotations of all files, later files winning.
    pub fn doc_annotations(&self) -> Annotations {
        let mut merged = Annotations::new();
        for f in &self.files {
            merged.merge(&annotations::extract(&f.parsed.doc_text(f.parsed.file.doc)));
        }
        merged
    }

    pub fn file_path(&self, file: usize) -> &Path {
        self.files.get(file).map_or(self.dir.as_path(), |f| f.path.as_path())
    }
}

/// Collects top-level type specs and functions of one file.
struct DeclIndexer<'p> {
    file: usize,
    parsed: &'p ParsedFile,
    types: &'p mut HashMap<String, TypeDecl>,
    funcs: &'p mut Vec<FuncRef>,
}

impl<'ast> Visitor<'ast> for DeclIndexer<'_> {
    fn visit_type_spec(&mut self, _a: &'ast AstArena, spec: &'ast TypeSpec) {
        let name = self.parsed.sym(spec.name);
        if name == "_" {
            return;
        }
        self.types.insert(
            name.to_owned(),
            TypeDecl {
                file: self.file,
                spec: *spec,
            },
        );
    }

    fn visit_func_decl(&mut self, _a: &'ast AstArena, id: FuncDeclId) {
        self.funcs.push(FuncRef { file: self.file, id });
    }

    // Comments are read through the declarations that own them.
    fn visit_comment_group(&mut self, _a: &'ast AstArena, _id: CommentGroupId) {}
}

/// Reads and parses `files` as package `import_path`.
///
/// Files excluded by a `//go:build ignore` constraint are skipped, as are
/// files whose `package` clause disagrees with the majority.
pub fn load_package(
    import_path: &str,
    dir: &Path,
    module: &str,
    files: &[PathBuf],
) -> Result<Package, LoadError> {
    let mut parsed = Vec::with_capacity(files.len());
    for path in files {
        let src = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;
        if build_ignored(&src) {
            debug!(file = %path.display(), "skipping file with `ignore` build constraint");
            continue;
        }
        let file = parse_file(path, &src)?;
        let imports = ImportTable::from_file(&file).map_err(|source| LoadError::Import {
            path: path.clone(),
            source,
        })?;
        parsed.push(GoFile {
            path: path.clone(),
            parsed: file,
            imports,
        });
    }

    let Some(name) = majority_name(&parsed) else {
        return Err(LoadError::NoGoFiles {
            import_path: import_path.to_owned(),
            dir: dir.to_path_buf(),
        });
    };
    parsed.retain(|f| {
        let keep = f.parsed.package_name() == name;
        if !keep {
            debug!(
                file = %f.path.display(),
                package = f.parsed.package_name(),
                expected = %name,
                "skipping file from another package"
            );
        }
        keep
    });

    let mut types = HashMap::new();
    let mut funcs = Vec::new();
    for (i, f) in parsed.iter().enumerate() {
        let mut indexer = DeclIndexer {
            file: i,
            parsed: &f.parsed,
            types: &mut types,
            funcs: &mut funcs,
        };
        indexer.visit_source_file(&f.parsed.arena, &f.parsed.file);
    }

    trace!(import_path, files = parsed.len(), types = types.len(), "package loaded");
    Ok(Package {
        import_path: import_path.to_owned(),
        name,
        dir: dir.to_path_buf(),
        module: module.to_owned(),
        files: parsed,
        types,
        funcs,
    })
}

fn parse_file(path: &Path, src: &str) -> Result<ParsedFile, LoadError> {
    parse_source(src).map_err(|failure| {
        let (offset, message) = failure
            .diags
            .first()
            .map_or((0, "parse failed".to_owned()), |d| (d.span.start, d.message.clone()));
        let pos = LineIndex::new(src).line_col(offset);
        LoadError::Parse {
            path: path.to_path_buf(),
            line: pos.line,
            col: pos.col,
            message,
        }
    })
}

fn majority_name(files: &[GoFile]) -> Option<String> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for f in files {
        let name = f.parsed.package_name();
        match counts.iter_mut().find(|(n, _)| *n == name) {
            Some((_, c)) => *c += 1,
            None => counts.push((name, 1)),
        }
    }
    // first-seen wins ties
    let mut best: Option<(&str, usize)> = None;
    for (n, c) in counts {
        if best.map_or(true, |(_, bc)| c > bc) {
            best = Some((n, c));
        }
    }
    best.map(|(n, _)| n.to_owned())
}

/// True for a `//go:build` line before the package clause naming `ignore`.
fn build_ignored(src: &str) -> bool {
    for line in src.lines() {
        let line = line.trim();
        if line.starts_with("package ") {
            return false;
        }
        let expr = line
            .strip_prefix("//go:build ")
            .or_else(|| line.strip_prefix("// +build "));
        if let Some(expr) = expr {
            let ignore = expr
                .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '!'))
                .any(|t| t == "ignore");
            if ignore {
                return true;
            }
        }
    }
    false
}

/// Packages by import path, loaded on first use.
#[derive(Debug)]
pub struct PackageStore {
    locator: Locator,
    loaded: HashMap<String, Rc<Package>>,
}

impl PackageStore {
    pub fn new(locator: Locator) -> Self {
        Self {
            locator,
            loaded: HashMap::new(),
        }
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Registers an already loaded package, replacing any previous one.
    pub fn insert(&mut self, pkg: Package) -> Rc<Package> {
        let pkg = Rc::new(pkg);
        self.loaded.insert(pkg.import_path.clone(), Rc::clone(&pkg));
        pkg
    }

    pub fn get(&self, import_path: &str) -> Option<Rc<Package>> {
        self.loaded.get(import_path).cloned()
    }

    /// The package at `import_path`, located and parsed if not yet loaded.
    pub fn load(&mut self, import_path: &str) -> Result<Rc<Package>, StoreError> {
        if let Some(pkg) = self.loaded.get(import_path) {
            return Ok(Rc::clone(pkg));
        }
        let located = self.locator.locate_package(import_path)?;
        debug!(import_path, dir = %located.dir.display(), "loading dependency package");
        let files = list_go_files(&located.dir).map_err(LoadError::from)?;
        let pkg = load_package(import_path, &located.dir, &located.module, &files)?;
        Ok(self.insert(pkg))
    }

    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, src: &str) -> PathBuf {
        let p = dir.join(name);
        fs::write(&p, src).unwrap();
        p
    }

    #[test]
    fn indexes_types_and_funcs() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(
            dir.path(),
            "a.go",
            "// @service users\npackage users\n\ntype User struct{ ID string }\n\nfunc F() {}\n",
        );
        let b = write(
            dir.path(),
            "b.go",
            "// @title Users\npackage users\n\ntype (\n\tID string\n\tAlias = User\n)\n\nfunc (u User) M() {}\nfunc G() {}\n",
        );
        let pkg = load_package("m/users", dir.path(), "m", &[a, b]).unwrap();
        assert_eq!(pkg.name, "users");
        assert_eq!(pkg.files.len(), 2);

        let mut names: Vec<_> = pkg.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        assert_eq!(names, ["Alias", "ID", "User"]);
        assert_eq!(pkg.type_decl("ID").map(|d| d.file), Some(1));
        assert!(pkg.type_decl("Alias").is_some_and(|d| d.spec.alias));
        assert_eq!(pkg.funcs.len(), 3);

        let ann = pkg.doc_annotations();
        assert_eq!(ann.get_raw("service"), Some("users"));
        assert_eq!(ann.get_raw("title"), Some("Users"));
    }

    #[test]
    fn skips_ignored_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.go", "package p\n");
        let b = write(dir.path(), "b.go", "package p\n");
        let gen = write(dir.path(), "gen.go", "//go:build ignore\n\npackage main\n");
        let doc = write(dir.path(), "z.go", "package other\n");
        let pkg = load_package("m/p", dir.path(), "m", &[a, b, gen, doc]).unwrap();
        assert_eq!(pkg.name, "p");
        assert_eq!(pkg.files.len(), 2);
    }

    #[test]
    fn parse_errors_carry_position() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "bad.go", "package p\n\ntype T struct {\n\tX int\n");
        match load_package("m/p", dir.path(), "m", &[a]) {
            Err(LoadError::Parse { path, line, .. }) => {
                assert!(path.ends_with("bad.go"));
                assert!(line >= 4);
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn empty_package() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_package("m/p", dir.path(), "m", &[]).unwrap_err();
        assert!(matches!(err, LoadError::NoGoFiles { .. }));
        assert!(build_ignored("// +build ignore\n\npackage x"));
        assert!(!build_ignored("//go:build !ignore_me\npackage x"));
        assert!(!build_ignored("package x\n//go:build ignore"));
    }
}
