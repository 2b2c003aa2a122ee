//! `go.mod` reader.
//!
//! Covers the directives the resolver needs: `module`, `go`, `toolchain`,
//! `require` and `replace`. `exclude`, `retract`, `godebug`, `tool` and
//! `ignore` are accepted and ignored.

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const MANIFEST_FILE: &str = "go.mod";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("no {MANIFEST_FILE} in {}", dir.display())]
    Missing { dir: PathBuf },
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}:{line}: {message}", path.display())]
    Syntax {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("{}: module name is empty", path.display())]
    EmptyModule { path: PathBuf },
}

/// Target of a `replace` directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Replacement {
    /// Local directory, as written (may be relative to the module root).
    Path { path: String },
    /// Another module at a version.
    Module { name: String, version: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Replace {
    pub old: String,
    /// Only this version of `old` is replaced when set.
    pub old_version: Option<String>,
    pub new: Replacement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Require {
    pub name: String,
    pub version: String,
    pub indirect: bool,
    /// The applicable `replace`, if any.
    pub replace: Option<Replacement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Module {
    pub name: String,
    pub go_version: Option<String>,
    pub toolchain: Option<String>,
    pub requires: Vec<Require>,
    pub replaces: Vec<Replace>,
}

impl Module {
    /// Longest require whose name is a path prefix of `import_path`.
    pub fn require_for(&self, import_path: &str) -> Option<&Require> {
        self.requires
            .iter()
            .filter(|r| path_has_prefix(import_path, &r.name))
            .max_by_key(|r| r.name.len())
    }

    /// True when `import_path` lies inside this module.
    pub fn owns(&self, import_path: &str) -> bool {
        path_has_prefix(import_path, &self.name)
    }
}

/// `a/b/c` has prefix `a/b`, not `a/bc`.
pub fn path_has_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// A replace target is a directory when it is written as a path.
pub fn is_local_path(target: &str) -> bool {
    target == "."
        || target == ".."
        || target.starts_with("./")
        || target.starts_with("../")
        || target.starts_with('/')
        || target.starts_with(".\\")
        || target.starts_with("..\\")
}

/// Reads `<dir>/go.mod`.
pub fn read_manifest(dir: &Path) -> Result<Module, ManifestError> {
    let path = dir.join(MANIFEST_FILE);
    let src = match std::fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ManifestError::Missing {
                dir: dir.to_path_buf(),
            });
        }
        Err(source) => return Err(ManifestError::Io { path, source }),
    };
    parse_manifest(&src, &path)
}

// =============================================================================
// Line tokenizer
// =============================================================================

struct Line<'a> {
    no: usize,
    tokens: Vec<&'a str>,
    comment: Option<&'a str>,
}

fn tokenize(no: usize, line: &str) -> Result<Line<'_>, String> {
    let mut tokens = Vec::new();
    let mut comment = None;
    let mut rest = line;

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        if let Some(c) = rest.strip_prefix("//") {
            comment = Some(c.trim());
            break;
        }
        let quote = rest.as_bytes()[0];
        if quote == b'"' || quote == b'`' {
            let end = rest[1..]
                .find(quote as char)
                .ok_or_else(|| "unterminated quoted string".to_owned())?;
            // keep quotes; unquoted below
            tokens.push(&rest[..end + 2]);
            rest = &rest[end + 2..];
            continue;
        }
        if rest.starts_with("=>") {
            tokens.push("=>");
            rest = &rest[2..];
            continue;
        }
        if rest.starts_with('(') || rest.starts_with(')') {
            tokens.push(&rest[..1]);
            rest = &rest[1..];
            continue;
        }
        let end = rest
            .find(|c: char| c.is_whitespace() || c == '(' || c == ')')
            .unwrap_or(rest.len());
        let end = match rest[..end].find("//") {
            Some(i) if i > 0 => i,
            _ => end,
        };
        let end = match rest[..end].find("=>") {
            Some(i) if i > 0 => i,
            _ => end,
        };
        tokens.push(&rest[..end]);
        rest = &rest[end..];
    }

    Ok(Line {
        no,
        tokens,
        comment,
    })
}

fn unquote_token(tok: &str) -> Result<String, String> {
    if tok.starts_with('"') || tok.starts_with('`') {
        svcgen_syntax::literal::unquote(tok).map_err(|e| format!("bad quoted string {tok}: {e}"))
    } else {
        Ok(tok.to_owned())
    }
}

// =============================================================================
// Directive parsing
// =============================================================================

#[derive(Default)]
struct Builder {
    module: Option<String>,
    go_version: Option<String>,
    toolchain: Option<String>,
    requires: Vec<Require>,
    replaces: Vec<Replace>,
}

impl Builder {
    fn directive(&mut self, verb: &str, args: &[&str], comment: Option<&str>) -> Result<(), String> {
        match verb {
            "module" => {
                let [name] = args else {
                    return Err("usage: module module/path".into());
                };
                if self.module.is_some() {
                    return Err("repeated module directive".into());
                }
                self.module = Some(unquote_token(name)?);
            }
            "go" => {
                let [v] = args else {
                    return Err("usage: go 1.23".into());
                };
                self.go_version = Some(unquote_token(v)?);
            }
            "toolchain" => {
                let [v] = args else {
                    return Err("usage: toolchain go1.23.0".into());
                };
                self.toolchain = Some(unquote_token(v)?);
            }
            "require" => {
                let [name, version] = args else {
                    return Err("usage: require module/path v1.2.3".into());
                };
                let indirect = comment.is_some_and(|c| {
                    c == "indirect" || c.starts_with("indirect;")
                });
                self.requires.push(Require {
                    name: unquote_token(name)?,
                    version: unquote_token(version)?,
                    indirect,
                    replace: None,
                });
            }
            "replace" => self.replace(args)?,
            "exclude" | "retract" | "godebug" | "tool" | "ignore" => {}
            other => return Err(format!("unknown directive: {other}")),
        }
        Ok(())
    }

    fn replace(&mut self, args: &[&str]) -> Result<(), String> {
        let arrow = args
            .iter()
            .position(|t| *t == "=>")
            .ok_or_else(|| "usage: replace module/path [v1.2.3] => other [v1.2.3]".to_owned())?;
        let (lhs, rhs) = (&args[..arrow], &args[arrow + 1..]);

        let (old, old_version) = match lhs {
            [old] => (unquote_token(old)?, None),
            [old, v] => (unquote_token(old)?, Some(unquote_token(v)?)),
            _ => return Err("replace: expected module path and optional version before =>".into()),
        };
        let new = match rhs {
            [target] => {
                let target = unquote_token(target)?;
                if !is_local_path(&target) {
                    return Err(format!(
                        "replace: module replacement {target} must have a version"
                    ));
                }
                Replacement::Path { path: target }
            }
            [name, version] => {
                let name = unquote_token(name)?;
                if is_local_path(&name) {
                    return Err("replace: directory replacement cannot have a version".into());
                }
                Replacement::Module {
                    name,
                    version: unquote_token(version)?,
                }
            }
            _ => return Err("replace: expected target and optional version after =>".into()),
        };

        self.replaces.push(Replace {
            old,
            old_version,
            new,
        });
        Ok(())
    }

    fn finish(mut self, path: &Path) -> Result<Module, ManifestError> {
        let name = self.module.take().unwrap_or_default();
        if name.trim().is_empty() {
            return Err(ManifestError::EmptyModule {
                path: path.to_path_buf(),
            });
        }

        for req in &mut self.requires {
            // A version-specific replace beats a blanket one.
            let hit = self
                .replaces
                .iter()
                .filter(|r| r.old == req.name)
                .filter(|r| r.old_version.as_ref().map_or(true, |v| *v == req.version))
                .max_by_key(|r| r.old_version.is_some());
            if let Some(r) = hit {
                debug!(module = %req.name, replacement = ?r.new, "require is replaced");
                req.replace = Some(r.new.clone());
            }
        }

        Ok(Module {
            name,
            go_version: self.go_version,
            toolchain: self.toolchain,
            requires: self.requires,
            replaces: self.replaces,
        })
    }
}

/// Parses manifest text; `path` is only used in errors.
pub fn parse_manifest(src: &str, path: &Path) -> Result<Module, ManifestError> {
    let syntax = |line: usize, message: String| ManifestError::Syntax {
        path: path.to_path_buf(),
        line,
        message,
    };

    let mut b = Builder::default();
    let mut block: Option<(String, usize)> = None;

    for (i, raw) in src.lines().enumerate() {
        let line = tokenize(i + 1, raw).map_err(|m| syntax(i + 1, m))?;
        let comment = line.comment;

        let open_verb = block.as_ref().map(|(verb, _)| verb.clone());
        match (open_verb.as_deref(), line.tokens.as_slice()) {
            (_, []) => {}
            (Some(_), [")"]) => block = None,
            (Some(verb), args) => b
                .directive(verb, args, comment)
                .map_err(|m| syntax(line.no, m))?,
            (None, [verb, "("]) => block = Some(((*verb).to_owned(), line.no)),
            (None, [verb, "(", ")"]) => debug!(directive = *verb, "empty block"),
            (None, [verb, args @ ..]) => b
                .directive(verb, args, comment)
                .map_err(|m| syntax(line.no, m))?,
        }
    }

    if let Some((verb, start)) = block {
        return Err(syntax(start, format!("unterminated {verb} block")));
    }

    b.finish(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(src: &str) -> Result<Module, ManifestError> {
        parse_manifest(src, Path::new("go.mod"))
    }

    #[test]
    fn full_manifest() {
        let m = parse(
            r#"
// leading comment
module "example.com/app"

go 1.22
toolchain go1.22.3

require github.com/a/b v1.0.0

require (
    github.com/c/d/v2 v2.3.4 // indirect
    gopkg.in/yaml.v3 v3.0.1
    foo v1.2.3
)

replace foo => ../local/foo
replace github.com/a/b v1.0.0 => github.com/fork/b v1.0.1

exclude github.com/x/y v0.1.0
retract [v0.0.1, v0.0.3]
"#,
        )
        .unwrap();

        assert_eq!(m.name, "example.com/app");
        assert_eq!(m.go_version.as_deref(), Some("1.22"));
        assert_eq!(m.toolchain.as_deref(), Some("go1.22.3"));
        assert_eq!(m.requires.len(), 4);
        assert!(m.requires[1].indirect);
        assert!(!m.requires[2].indirect);
        assert_eq!(
            m.requires[3].replace,
            Some(Replacement::Path {
                path: "../local/foo".into()
            })
        );
        assert_eq!(
            m.requires[0].replace,
            Some(Replacement::Module {
                name: "github.com/fork/b".into(),
                version: "v1.0.1".into()
            })
        );
        assert_eq!(m.replaces.len(), 2);
    }

    #[test]
    fn version_specific_replace_only_matches_its_version() {
        let m = parse(
            "module m\nrequire x v1.0.0\nreplace x v0.9.0 => ./old\n",
        )
        .unwrap();
        assert_eq!(m.requires[0].replace, None);
    }

    #[test]
    fn require_lookup_is_longest_path_prefix() {
        let m = parse("module m\nrequire (\n a/b v1.0.0\n a/b/c v1.0.0\n a/bc v1.0.0\n)\n").unwrap();
        assert_eq!(m.require_for("a/b/c/d").map(|r| r.name.as_str()), Some("a/b/c"));
        assert_eq!(m.require_for("a/b/x").map(|r| r.name.as_str()), Some("a/b"));
        assert_eq!(m.require_for("a/bcd"), None);
        assert!(m.owns("m/sub"));
        assert!(m.owns("m"));
        assert!(!m.owns("mx"));
    }

    #[test]
    fn errors_carry_line_numbers() {
        match parse("module m\n\nrequire x\n") {
            Err(ManifestError::Syntax { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected: {other:?}"),
        }
        match parse("module m\nrequire (\n x v1\n") {
            Err(ManifestError::Syntax { line, message, .. }) => {
                assert_eq!(line, 2);
                assert!(message.contains("unterminated"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            parse("module m\nreplace x => y\n"),
            Err(ManifestError::Syntax { line: 2, .. })
        ));
        assert!(matches!(parse("go 1.21\n"), Err(ManifestError::EmptyModule { .. })));
        assert!(matches!(parse("module \"\"\n"), Err(ManifestError::EmptyModule { .. })));
    }
}
