//! Discovery of `@fn` functions and their signatures.

use crate::annotations::{self, AnnotationName, Annotations};
use crate::cache::StructCache;
use crate::config::Mode;
use crate::package::{FuncRef, Package, PackageStore};
use crate::resolver::{ResolveError, Resolver};
use crate::types::{Type, WellKnown};
use crate::wellknown::Registry;
use serde::Serialize;
use std::path::PathBuf;
use std::rc::Rc;
use svcgen_syntax::ast::{self, AstArena, FieldList, Results, TypeId};
use svcgen_syntax::ParsedFile;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("{}: function {function}: {reason}", file.display())]
    MalformedFn {
        file: PathBuf,
        function: String,
        reason: String,
    },
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Carried parameter or result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FnField {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub ty: Type,
}

/// An `@fn` function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Function {
    /// The package's `@service`; empty when the package has none.
    pub service: String,
    pub name: String,
    pub package: String,
    pub file: PathBuf,
    pub line: u32,
    pub param: Option<FnField>,
    pub result: Option<FnField>,
    pub annotations: Annotations,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub doc: String,
}

impl Function {
    /// `service.name`
    pub fn key(&self) -> String {
        format!("{}.{}", self.service, self.name)
    }
}

/// One parameter or result after splitting `a, b T` into two.
struct Slot {
    name: Option<String>,
    ty: TypeId,
    variadic: bool,
}

pub struct Scanner<'a> {
    resolver: Resolver<'a>,
    mode: Mode,
}

impl<'a> Scanner<'a> {
    pub fn new(
        registry: &'a Registry,
        store: &'a mut PackageStore,
        cache: &'a mut StructCache,
        mode: Mode,
    ) -> Self {
        Self {
            resolver: Resolver::new(registry, store, cache),
            mode,
        }
    }

    pub fn scan_package(&mut self, pkg: &Rc<Package>) -> Result<Vec<Function>, ScanError> {
        let mut out = Vec::new();
        for file in 0..pkg.files.len() {
            out.extend(self.scan_functions(pkg, file)?);
        }
        Ok(out)
    }

    /// `@fn` functions declared in one file of `pkg`, in source order.
    pub fn scan_functions(
        &mut self,
        pkg: &Rc<Package>,
        file: usize,
    ) -> Result<Vec<Function>, ScanError> {
        let service = pkg
            .doc_annotations()
            .get(AnnotationName::Service)
            .unwrap_or_default()
            .to_owned();
        let mut out = Vec::new();

        for &func in pkg.funcs.iter().filter(|f| f.file == file) {
            let parsed = &pkg.files[file].parsed;
            let decl = parsed.arena.funcs[func.id];
            let doc = parsed.doc_text(decl.doc);
            let annotations = annotations::extract(&doc);
            if !annotations.contains(AnnotationName::Fn) {
                continue;
            }

            let cp = self.resolver.checkpoint();
            match self.build(pkg, func, &service, annotations, doc) {
                Ok(f) => {
                    debug!(function = %f.name, package = %pkg.import_path, "found @fn");
                    out.push(f);
                }
                Err(ScanError::Resolve(e))
                    if self.mode == Mode::Permissive && e.is_recoverable() =>
                {
                    warn!(
                        function = parsed.ident(decl.name),
                        package = %pkg.import_path,
                        error = %e,
                        "dropping function"
                    );
                    self.resolver.rollback(cp);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    fn build(
        &mut self,
        pkg: &Rc<Package>,
        func: FuncRef,
        service: &str,
        annotations: Annotations,
        doc: String,
    ) -> Result<Function, ScanError> {
        let file = func.file;
        let parsed = &pkg.files[file].parsed;
        let decl = parsed.arena.funcs[func.id];
        let name = parsed.ident(decl.name).to_owned();
        let malformed = |reason: String| ScanError::MalformedFn {
            file: pkg.file_path(file).to_path_buf(),
            function: name.clone(),
            reason,
        };

        if decl.recv.is_some() {
            return Err(malformed("methods cannot be annotated @fn".into()));
        }
        if decl.type_params.is_some() {
            return Err(malformed("type parameters are not supported".into()));
        }

        let sig = parsed.arena.signatures[decl.signature];
        let params = slots(parsed, sig.params);
        if params.iter().any(|p| p.variadic) {
            return Err(malformed("variadic parameters are not supported".into()));
        }
        if !(1..=2).contains(&params.len()) {
            return Err(malformed(format!(
                "expected 1 or 2 parameters, found {}",
                params.len()
            )));
        }
        let results = match sig.results {
            None => Vec::new(),
            Some(Results::Type(ty)) => vec![Slot {
                name: None,
                ty,
                variadic: false,
            }],
            Some(Results::Params(list)) => slots(parsed, list),
        };
        if !(1..=2).contains(&results.len()) {
            return Err(malformed(format!(
                "expected 1 or 2 results, found {}",
                results.len()
            )));
        }

        // Only named types fill a slot; checked before anything resolves.
        let arena = &parsed.arena;
        if !is_named(arena, params[0].ty, false) {
            return Err(malformed(format!(
                "first parameter must be the framework context, found {}",
                type_text(parsed, params[0].ty)
            )));
        }
        if let Some(p) = params.get(1) {
            if !is_named(arena, p.ty, true) {
                return Err(malformed(format!(
                    "parameter must be a struct or a pointer to one, found {}",
                    type_text(parsed, p.ty)
                )));
            }
        }
        if results.len() == 2 && !is_named(arena, results[0].ty, true) {
            return Err(malformed(format!(
                "result must be a struct or a pointer to one, found {}",
                type_text(parsed, results[0].ty)
            )));
        }
        let last = &results[results.len() - 1];
        if !is_named(arena, last.ty, false) {
            return Err(malformed(format!(
                "last result must be the framework error, found {}",
                type_text(parsed, last.ty)
            )));
        }

        let ctx = self.resolver.resolve_type(pkg, file, params[0].ty)?;
        if !ctx.is_well_known(WellKnown::Context) {
            return Err(malformed(format!(
                "first parameter must be the framework context, found {ctx}"
            )));
        }

        let param = match params.get(1) {
            Some(p) => {
                let ty = self.resolver.resolve_type(pkg, file, p.ty)?;
                if !is_carried(&ty) {
                    return Err(malformed(format!(
                        "parameter must be a struct or a pointer to one, found {ty}"
                    )));
                }
                Some(FnField {
                    name: p.name.clone(),
                    ty,
                })
            }
            None => None,
        };

        let result = if results.len() == 2 {
            let r = &results[0];
            let ty = self.resolver.resolve_type(pkg, file, r.ty)?;
            if !is_carried(&ty) {
                return Err(malformed(format!(
                    "result must be a struct or a pointer to one, found {ty}"
                )));
            }
            Some(FnField {
                name: r.name.clone(),
                ty,
            })
        } else {
            None
        };

        let err = self.resolver.resolve_type(pkg, file, last.ty)?;
        if !err.is_well_known(WellKnown::Error) {
            return Err(malformed(format!(
                "last result must be the framework error, found {err}"
            )));
        }

        Ok(Function {
            service: service.to_owned(),
            name,
            package: pkg.import_path.clone(),
            file: pkg.file_path(file).to_path_buf(),
            line: parsed.lines.line(decl.func_pos.start),
            param,
            result,
            annotations,
            doc,
        })
    }
}

/// A struct, a pointer to one, or the framework's empty value.
fn is_carried(ty: &Type) -> bool {
    let inner = match ty {
        Type::Pointer { elem } => elem.as_ref(),
        other => other,
    };
    matches!(inner, Type::Struct { .. }) || inner.is_well_known(WellKnown::Empty)
}

/// `T` or `pkg.T`, and with `pointer` also `*T` or `*pkg.T`.
fn is_named(arena: &AstArena, mut ty: TypeId, mut pointer: bool) -> bool {
    loop {
        match arena.types[ty] {
            ast::Type::Paren { typ } => ty = typ,
            ast::Type::Pointer { elem, .. } if pointer => {
                pointer = false;
                ty = elem;
            }
            ast::Type::Named { args, .. } => return args.is_empty(),
            _ => return false,
        }
    }
}

fn type_text(parsed: &ParsedFile, ty: TypeId) -> &str {
    parsed.text(parsed.arena.types.span(ty))
}

fn slots(parsed: &ParsedFile, list: FieldList) -> Vec<Slot> {
    let mut out = Vec::new();
    for &fid in parsed.arena.fields_list(list.fields) {
        let field = parsed.arena.fields[fid];
        let variadic = field.ellipsis_pos.is_some();
        let names = parsed.arena.ident_names(field.names);
        if names.is_empty() {
            out.push(Slot {
                name: None,
                ty: field.typ,
                variadic,
            });
        }
        for &n in names {
            let name = parsed.ident(n);
            out.push(Slot {
                name: (name != "_").then(|| name.to_owned()),
                ty: field.typ,
                variadic,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::locator::Locator;
    use crate::manifest::parse_manifest;
    use crate::types::Builtin;
    use std::fs;
    use std::path::Path;

    const RT: &str = "github.com/svcgen/rt";

    fn scan(src: &str, mode: Mode) -> (Result<Vec<Function>, ScanError>, StructCache) {
        let dir = tempfile::tempdir().unwrap();
        let svc = dir.path().join("svc");
        fs::create_dir_all(&svc).unwrap();
        fs::write(svc.join("svc.go"), src).unwrap();
        let module = parse_manifest("module m\n", Path::new("go.mod")).unwrap();
        let mut store = PackageStore::new(Locator::new(dir.path(), &module, &Config::default()));
        let mut cache = StructCache::new();
        let registry = Registry::default();
        let pkg = store.load("m/svc").unwrap();
        let result = Scanner::new(&registry, &mut store, &mut cache, mode).scan_package(&pkg);
        (result, cache)
    }

    fn source(body: &str) -> String {
        format!(
            "// @service svc\npackage svc\n\nimport \"{RT}\"\n\ntype In struct{{ Name string }}\ntype Out struct{{ N int }}\n\n{body}"
        )
    }

    #[test]
    fn finds_annotated_functions() {
        let src = source(
            "// Hello greets.\n// @fn hello\n// @internal\nfunc Hello(ctx rt.Context, in In) (out *Out, err rt.Error) { return nil, nil }\n\n// Plain is not exposed.\nfunc Plain() {}\n\n// @fn ping\nfunc Ping(rt.Context) error { return nil }\n",
        );
        let (fns, cache) = scan(&src, Mode::Strict);
        let fns = fns.unwrap();
        assert_eq!(fns.len(), 2);

        let hello = &fns[0];
        assert_eq!(hello.key(), "svc.Hello");
        assert_eq!(hello.line, 12);
        assert_eq!(hello.param.as_ref().unwrap().name.as_deref(), Some("in"));
        assert_eq!(hello.param.as_ref().unwrap().ty, Type::struct_ref("m/svc.In"));
        assert_eq!(
            hello.result.as_ref().unwrap().ty,
            Type::pointer(Type::struct_ref("m/svc.Out"))
        );
        assert!(hello.annotations.flag(AnnotationName::Internal));
        assert_eq!(hello.annotations.get(AnnotationName::Fn), Some("hello"));

        let ping = &fns[1];
        assert!(ping.param.is_none());
        assert!(ping.result.is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn empty_is_a_valid_carried_value() {
        let src = source("// @fn e\nfunc E(ctx rt.Context, _ *rt.Empty) (rt.Empty, error) { return rt.Empty{}, nil }\n");
        let fns = scan(&src, Mode::Strict).0.unwrap();
        assert_eq!(
            fns[0].param.as_ref().unwrap().ty,
            Type::pointer(Type::well_known(WellKnown::Empty))
        );
        assert_eq!(fns[0].param.as_ref().unwrap().name, None);
    }

    fn malformed(body: &str) -> String {
        match scan(&source(body), Mode::Permissive).0 {
            Err(ScanError::MalformedFn { function, reason, file }) => {
                assert!(file.ends_with("svc/svc.go"));
                assert_eq!(function, "F");
                reason
            }
            other => panic!("expected MalformedFn, got {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_shapes() {
        assert!(malformed("// @fn f\nfunc F(ctx rt.Context, m map[string]int) error { return nil }\n")
            .contains("map[string]int"));
        assert!(malformed("// @fn f\nfunc F(in In) error { return nil }\n")
            .contains("framework context"));
        assert!(malformed("// @fn f\nfunc F() error { return nil }\n").contains("parameters"));
        assert!(malformed("// @fn f\nfunc F(ctx rt.Context, a, b In) error { return nil }\n")
            .contains("found 3"));
        assert!(malformed("// @fn f\nfunc F(ctx rt.Context) {}\n").contains("results"));
        assert!(malformed("// @fn f\nfunc F(ctx rt.Context) (Out, In) { return Out{}, In{} }\n")
            .contains("framework error"));
        assert!(malformed("// @fn f\nfunc F(ctx rt.Context, in ...In) error { return nil }\n")
            .contains("variadic"));
        assert!(malformed("// @fn f\nfunc F[T any](ctx rt.Context) error { return nil }\n")
            .contains("type parameters"));
        assert!(malformed("// @fn f\nfunc (In) F(ctx rt.Context) error { return nil }\n")
            .contains("methods"));
        assert!(malformed("// @fn f\nfunc F(ctx rt.Context) (int, error) { return 0, nil }\n")
            .contains(&Builtin::Int.to_string()));
    }

    #[test]
    fn unsupported_signature_types_are_malformed_in_either_mode() {
        let bodies = [
            ("// @fn f\nfunc F(ctx rt.Context, c chan int) error { return nil }\n", "chan int"),
            ("// @fn f\nfunc F(ctx rt.Context, cb func()) error { return nil }\n", "func()"),
            ("// @fn f\nfunc F(ctx rt.Context) (*[]Out, error) { return nil, nil }\n", "*[]Out"),
            ("// @fn f\nfunc F(ctx chan int) error { return nil }\n", "chan int"),
        ];
        for (body, shown) in bodies {
            assert!(malformed(body).contains(shown), "{body}");
            assert!(
                matches!(
                    scan(&source(body), Mode::Strict).0,
                    Err(ScanError::MalformedFn { .. })
                ),
                "{body}"
            );
        }
    }

    #[test]
    fn permissive_drops_unresolvable_functions() {
        let body = "type Bad struct{ C chan int }\n\n// @fn a\nfunc A(ctx rt.Context, in Bad) error { return nil }\n\n// @fn b\nfunc B(ctx rt.Context, in In) error { return nil }\n";
        let (fns, cache) = scan(&source(body), Mode::Permissive);
        let fns = fns.unwrap();
        assert_eq!(fns.len(), 1);
        assert_eq!(fns[0].name, "B");
        assert!(!cache.contains("m/svc.Bad"));

        let (strict, _) = scan(&source(body), Mode::Strict);
        assert!(matches!(
            strict,
            Err(ScanError::Resolve(ResolveError::Unsupported { .. }))
        ));
    }
}
