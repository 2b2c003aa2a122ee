//! Per-file import table.

use svcgen_syntax::ast::{GenDeclKind, ImportName, Spec};
use svcgen_syntax::walk::Visitor;
use svcgen_syntax::{ast, ParsedFile};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("line {line}: invalid import path {raw}")]
pub struct ImportError {
    pub line: u32,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportAlias {
    None,
    Named(String),
    /// `_`: imported for side effects, never referenced.
    Blank,
    /// `.`: names merged into the file scope.
    Dot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub path: String,
    /// Assumed package name, derived from the path.
    pub short_name: String,
    pub alias: ImportAlias,
    pub line: u32,
}

impl Import {
    /// Name the file refers to this import by, if any.
    pub fn local_name(&self) -> Option<&str> {
        match &self.alias {
            ImportAlias::None => Some(&self.short_name),
            ImportAlias::Named(n) => Some(n),
            ImportAlias::Blank | ImportAlias::Dot => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportTable {
    imports: Vec<Import>,
}

impl ImportTable {
    pub fn from_file(file: &ParsedFile) -> Result<Self, ImportError> {
        let mut collect = CollectImports {
            file,
            imports: Vec::new(),
            error: None,
        };
        collect.visit_source_file(&file.arena, &file.file);
        match collect.error {
            Some(e) => Err(e),
            None => Ok(Self {
                imports: collect.imports,
            }),
        }
    }

    /// Import referred to as `name`; blank and dot imports never match.
    pub fn find(&self, name: &str) -> Option<&Import> {
        self.imports.iter().find(|i| i.local_name() == Some(name))
    }

    pub fn dot_import(&self) -> Option<&Import> {
        self.imports.iter().find(|i| i.alias == ImportAlias::Dot)
    }

    /// Unaliased imports whose assumed name is not `name`; one of them may
    /// still declare `package name`.
    pub fn unaliased_except(&self, name: &str) -> impl Iterator<Item = &Import> + '_ {
        let name = name.to_owned();
        self.imports
            .iter()
            .filter(move |i| i.alias == ImportAlias::None && i.short_name != name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Import> {
        self.imports.iter()
    }

    pub fn len(&self) -> usize {
        self.imports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.imports.is_empty()
    }
}

struct CollectImports<'f> {
    file: &'f ParsedFile,
    imports: Vec<Import>,
    error: Option<ImportError>,
}

impl<'ast> Visitor<'ast> for CollectImports<'_> {
    fn visit_decl(&mut self, a: &'ast ast::AstArena, id: ast::DeclId) {
        // imports precede every other declaration
        if let ast::Decl::Gen(g) = &a.decls[id] {
            if g.kind == GenDeclKind::Import {
                for spec in a.specs_list(g.specs) {
                    if let Spec::Import(s) = spec {
                        self.visit_import_spec(a, s);
                    }
                }
            }
        }
    }

    fn visit_func_decl(&mut self, _a: &'ast ast::AstArena, _id: ast::FuncDeclId) {}

    fn visit_comment_group(&mut self, _a: &'ast ast::AstArena, _id: ast::CommentGroupId) {}

    fn visit_import_spec(&mut self, _a: &'ast ast::AstArena, spec: &'ast ast::ImportSpec) {
        let line = self.file.lines.line(spec.path.raw.start);
        let path = match self.file.string_value(spec.path) {
            Ok(p) if !p.is_empty() => p,
            _ => {
                self.error.get_or_insert(ImportError {
                    line,
                    raw: self.file.text(spec.path.raw).to_owned(),
                });
                return;
            }
        };
        let alias = match spec.name {
            None => ImportAlias::None,
            Some(ImportName::Blank(_)) => ImportAlias::Blank,
            Some(ImportName::Dot(_)) => ImportAlias::Dot,
            Some(ImportName::Name(sym, _)) => ImportAlias::Named(self.file.sym(sym).to_owned()),
        };
        self.imports.push(Import {
            short_name: assumed_name(&path),
            path,
            alias,
            line,
        });
    }
}

/// Package name an import path is assumed to declare.
///
/// `github.com/x/y/v2` is `y`, `gopkg.in/yaml.v3` is `yaml` and
/// `github.com/go-redis/redis` is `redis`.
pub fn assumed_name(path: &str) -> String {
    let mut segs = path.rsplit('/');
    let mut base = segs.next().unwrap_or(path);
    if is_major_version(base) {
        if let Some(prev) = segs.next() {
            base = prev;
        }
    }
    if let Some((head, tail)) = base.rsplit_once('.') {
        if is_major_version(tail) {
            base = head;
        }
    }
    let base = base.rsplit('-').next().unwrap_or(base);
    base.chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

fn is_major_version(seg: &str) -> bool {
    seg.strip_prefix('v')
        .is_some_and(|d| !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use svcgen_syntax::parse_source;

    #[test]
    fn assumed_names() {
        assert_eq!(assumed_name("net/http"), "http");
        assert_eq!(assumed_name("github.com/x/y/v2"), "y");
        assert_eq!(assumed_name("gopkg.in/yaml.v3"), "yaml");
        assert_eq!(assumed_name("github.com/go-redis/redis"), "redis");
        assert_eq!(assumed_name("github.com/mattn/go-sqlite3"), "sqlite3");
        assert_eq!(assumed_name("foo"), "foo");
        assert_eq!(assumed_name("v2"), "v2");
    }

    #[test]
    fn table_from_file() {
        let src = r#"package p

import (
	"fmt"
	rt "github.com/svcgen/rt"
	_ "embed"
	. "strings"
	"gopkg.in/yaml.v3"
)

import "time"

func f() {}
"#;
        let file = parse_source(src).unwrap();
        let t = ImportTable::from_file(&file).unwrap();
        assert_eq!(t.len(), 6);
        assert_eq!(t.find("fmt").map(|i| i.path.as_str()), Some("fmt"));
        assert_eq!(t.find("rt").map(|i| i.line), Some(5));
        assert_eq!(t.find("yaml").map(|i| i.path.as_str()), Some("gopkg.in/yaml.v3"));
        assert_eq!(t.find("time").map(|i| i.line), Some(11));
        assert!(t.find("_").is_none());
        assert!(t.find("embed").is_none());
        assert!(t.find("strings").is_none());
        assert_eq!(t.dot_import().map(|i| i.path.as_str()), Some("strings"));
        let others: Vec<_> = t.unaliased_except("fmt").map(|i| i.path.as_str()).collect();
        assert_eq!(others, ["gopkg.in/yaml.v3", "time"]);
    }

    #[test]
    fn empty_path_is_an_error() {
        let file = parse_source("package p\nimport \"\"\n").unwrap();
        let err = ImportTable::from_file(&file).unwrap_err();
        assert_eq!(err.line, 2);
    }
}
