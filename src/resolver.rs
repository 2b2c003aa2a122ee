//! Syntactic type expressions to the normalized [`Type`] graph.
//!
//! Named struct types are interned in a [`StructCache`] under their
//! canonical key. The key is reserved with an in-progress marker before the
//! fields are resolved, so self and mutual references terminate.

use crate::annotations::{self, Annotations};
use crate::cache::{Checkpoint, Slot, StructCache};
use crate::package::{LoadError, Package, PackageStore, StoreError, TypeDecl};
use crate::tags::Tags;
use crate::types::{canonical_key, is_exported, Builtin, Field, Struct, Type, WellKnown};
use crate::wellknown::Registry;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;
use svcgen_syntax::ast::{self, FieldId, ListRef, Span, TypeId};
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Bound on `type A B` chains followed while looking for a struct literal.
const MAX_ALIAS_HOPS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: PathBuf,
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.col)
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{at}: unresolved type {name}: {reason}")]
    Unresolved {
        at: Location,
        name: String,
        reason: String,
    },
    #[error("{at}: unsupported type: {what}")]
    Unsupported { at: Location, what: String },
    #[error("{at}: dot import of {path:?} is not supported")]
    UnsupportedImport { at: Location, path: String },
    #[error("{at}: map key must be a builtin type, found {found}")]
    UnsupportedKey { at: Location, found: String },
    #[error("{at}: {key} is embedded while it is still being resolved")]
    CyclicInitialization { at: Location, key: String },
    #[error(transparent)]
    Load(#[from] LoadError),
}

impl ResolveError {
    /// Whether a permissive run may drop the offending function and go on.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Load(_))
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            Self::Unresolved { at, .. }
            | Self::Unsupported { at, .. }
            | Self::UnsupportedImport { at, .. }
            | Self::UnsupportedKey { at, .. }
            | Self::CyclicInitialization { at, .. } => Some(at),
            Self::Load(_) => None,
        }
    }
}

/// Where the fields of a struct are declared; may differ from the
/// package declaring the name when the name is an alias or defined type.
struct StructSource {
    pkg: Rc<Package>,
    file: usize,
    fields: ListRef<FieldId>,
}

pub struct Resolver<'a> {
    registry: &'a Registry,
    store: &'a mut PackageStore,
    cache: &'a mut StructCache,
    /// Non-struct declarations being expanded; catches `type A []A`.
    expanding: Vec<String>,
    /// Structs whose fields are being produced through embedding, outermost
    /// first; a key embedding one of these embeds itself.
    embedding: Vec<String>,
}

impl<'a> Resolver<'a> {
    pub fn new(
        registry: &'a Registry,
        store: &'a mut PackageStore,
        cache: &'a mut StructCache,
    ) -> Self {
        Self {
            registry,
            store,
            cache,
            expanding: Vec::new(),
            embedding: Vec::new(),
        }
    }

    pub fn cache(&self) -> &StructCache {
        &*self.cache
    }

    pub fn checkpoint(&self) -> Checkpoint {
        self.cache.checkpoint()
    }

    /// Forgets every struct interned since `cp`.
    pub fn rollback(&mut self, cp: Checkpoint) {
        self.cache.rollback(cp);
    }

    /// Resolves type expression `ty` written in `file` of `pkg`.
    pub fn resolve_type(
        &mut self,
        pkg: &Rc<Package>,
        file: usize,
        ty: TypeId,
    ) -> Result<Type, ResolveError> {
        let parsed = &pkg.files[file].parsed;
        let span = parsed.arena.types.span(ty);
        let at = location(pkg, file, span);

        match parsed.arena.types[ty] {
            ast::Type::Paren { typ } => self.resolve_type(pkg, file, typ),
            ast::Type::Pointer { elem, .. } => Ok(Type::pointer(self.resolve_type(pkg, file, elem)?)),
            ast::Type::Slice { elem } | ast::Type::Array { elem, .. } => {
                Ok(Type::array(self.resolve_type(pkg, file, elem)?))
            }
            ast::Type::Map { key, val } => {
                let cp = self.cache.checkpoint();
                let key = match self.resolve_type(pkg, file, key)? {
                    Type::Builtin { name } => name,
                    other => {
                        self.cache.rollback(cp);
                        return Err(ResolveError::UnsupportedKey {
                            at,
                            found: other.to_string(),
                        });
                    }
                };
                Ok(Type::Map {
                    key,
                    value: Box::new(self.resolve_type(pkg, file, val)?),
                })
            }
            ast::Type::Chan { .. } => Err(ResolveError::Unsupported {
                at,
                what: format!("channel type {}", parsed.text(span)),
            }),
            ast::Type::Func { .. } => Err(ResolveError::Unsupported {
                at,
                what: format!("function type {}", parsed.text(span)),
            }),
            ast::Type::Interface { elems, .. } => {
                if elems.is_empty() {
                    Ok(Type::well_known(WellKnown::Any))
                } else {
                    Err(ResolveError::Unsupported {
                        at,
                        what: "non-empty interface".to_owned(),
                    })
                }
            }
            ast::Type::Struct { .. } => Err(ResolveError::Unresolved {
                at,
                name: "struct{...}".to_owned(),
                reason: "anonymous structs have no canonical name".to_owned(),
            }),
            ast::Type::Bad(_) => Err(ResolveError::Unresolved {
                at,
                name: parsed.text(span).to_owned(),
                reason: "malformed type expression".to_owned(),
            }),
            ast::Type::Named { pkg: qual, name, args } => {
                if !args.is_empty() {
                    return Err(ResolveError::Unsupported {
                        at,
                        what: format!("generic instantiation {}", parsed.text(span)),
                    });
                }
                let name = parsed.ident(name).to_owned();
                match qual {
                    None => self.resolve_local(pkg, file, &name, at),
                    Some(q) => {
                        let q = parsed.ident(q).to_owned();
                        self.resolve_qualified(pkg, file, &q, &name, at)
                    }
                }
            }
        }
    }

    /// Resolves the type declared as `name` in `pkg`.
    pub fn resolve_named(&mut self, pkg: &Rc<Package>, name: &str) -> Result<Type, ResolveError> {
        let at = match pkg.type_decl(name) {
            Some(d) => location(pkg, d.file, d.spec.name_pos),
            None => Location {
                file: pkg.dir.clone(),
                line: 0,
                col: 0,
            },
        };
        self.resolve_decl(pkg, name, at)
    }

    fn resolve_local(
        &mut self,
        pkg: &Rc<Package>,
        file: usize,
        name: &str,
        at: Location,
    ) -> Result<Type, ResolveError> {
        if pkg.types.contains_key(name) {
            return self.resolve_decl(pkg, name, at);
        }
        if let Some(b) = Builtin::from_ident(name) {
            return Ok(Type::builtin(b));
        }
        match name {
            "error" => return Ok(Type::well_known(WellKnown::Error)),
            "any" => return Ok(Type::well_known(WellKnown::Any)),
            "uintptr" | "comparable" => {
                return Err(ResolveError::Unsupported {
                    at,
                    what: format!("predeclared type {name}"),
                })
            }
            _ => {}
        }
        if let Some(dot) = pkg.files[file].imports.dot_import() {
            return Err(ResolveError::UnsupportedImport {
                at,
                path: dot.path.clone(),
            });
        }
        Err(ResolveError::Unresolved {
            at,
            name: name.to_owned(),
            reason: format!("not declared in package {}", pkg.import_path),
        })
    }

    fn resolve_qualified(
        &mut self,
        pkg: &Rc<Package>,
        file: usize,
        qualifier: &str,
        name: &str,
        at: Location,
    ) -> Result<Type, ResolveError> {
        let path = self.import_path(pkg, file, qualifier, &at)?;
        if let Some(wk) = self.registry.lookup(&path, name) {
            return Ok(Type::well_known(wk));
        }
        let target = self.load(&path, name, &at)?;
        if !target.types.contains_key(name) {
            return Err(ResolveError::Unresolved {
                at,
                name: format!("{qualifier}.{name}"),
                reason: format!("not declared in package {path}"),
            });
        }
        self.resolve_decl(&target, name, at)
    }

    /// Import path a qualifier refers to in `file`.
    ///
    /// Falls back to loading unaliased imports whose assumed name differs
    /// and comparing their `package` clause.
    fn import_path(
        &mut self,
        pkg: &Rc<Package>,
        file: usize,
        qualifier: &str,
        at: &Location,
    ) -> Result<String, ResolveError> {
        let imports = &pkg.files[file].imports;
        if let Some(i) = imports.find(qualifier) {
            return Ok(i.path.clone());
        }
        let candidates: Vec<String> = imports
            .unaliased_except(qualifier)
            .map(|i| i.path.clone())
            .collect();
        for path in candidates {
            match self.store.load(&path) {
                Ok(p) if p.name == qualifier => {
                    debug!(qualifier, path = %path, "import matched by package clause");
                    return Ok(path);
                }
                Ok(_) => {}
                Err(e) => trace!(path = %path, error = %e, "import candidate not loadable"),
            }
        }
        Err(ResolveError::Unresolved {
            at: at.clone(),
            name: qualifier.to_owned(),
            reason: "no import provides this package name".to_owned(),
        })
    }

    fn load(&mut self, path: &str, name: &str, at: &Location) -> Result<Rc<Package>, ResolveError> {
        match self.store.load(path) {
            Ok(p) => Ok(p),
            Err(StoreError::Locate(e)) => Err(ResolveError::Unresolved {
                at: at.clone(),
                name: format!("{path}.{name}"),
                reason: e.to_string(),
            }),
            Err(StoreError::Load(e @ LoadError::NoGoFiles { .. })) => {
                Err(ResolveError::Unresolved {
                    at: at.clone(),
                    name: format!("{path}.{name}"),
                    reason: e.to_string(),
                })
            }
            Err(StoreError::Load(e)) => Err(ResolveError::Load(e)),
        }
    }

    fn resolve_decl(
        &mut self,
        pkg: &Rc<Package>,
        name: &str,
        at: Location,
    ) -> Result<Type, ResolveError> {
        let key = canonical_key(&pkg.import_path, name);
        if self.cache.contains(&key) {
            return Ok(Type::struct_ref(key));
        }
        let Some(decl) = pkg.type_decl(name) else {
            return Err(ResolveError::Unresolved {
                at,
                name: key,
                reason: "no such type declaration".to_owned(),
            });
        };
        if decl.spec.type_params.is_some() {
            return Err(ResolveError::Unsupported {
                at,
                what: format!("generic type {key}"),
            });
        }

        if let Some(src) = self.struct_source(pkg, decl.file, decl.spec.typ, &at)? {
            self.resolve_struct(&key, pkg, name, decl, src)?;
            return Ok(Type::struct_ref(key));
        }

        if self.expanding.contains(&key) {
            return Err(ResolveError::Unsupported {
                at,
                what: format!("recursive type {key}"),
            });
        }
        self.expanding.push(key);
        let out = self.resolve_type(pkg, decl.file, decl.spec.typ);
        self.expanding.pop();
        out
    }

    /// Follows named types until a struct literal or anything else.
    fn struct_source(
        &mut self,
        pkg: &Rc<Package>,
        file: usize,
        ty: TypeId,
        at: &Location,
    ) -> Result<Option<StructSource>, ResolveError> {
        let mut cur_pkg = Rc::clone(pkg);
        let mut cur_file = file;
        let mut cur = ty;

        for _ in 0..MAX_ALIAS_HOPS {
            let parsed = &cur_pkg.files[cur_file].parsed;
            let node = parsed.arena.types[cur];
            match node {
                ast::Type::Struct { fields, .. } => {
                    return Ok(Some(StructSource {
                        pkg: cur_pkg,
                        file: cur_file,
                        fields,
                    }))
                }
                ast::Type::Paren { typ } => cur = typ,
                ast::Type::Named {
                    pkg: None,
                    name,
                    args,
                } if args.is_empty() => match cur_pkg.type_decl(parsed.ident(name)) {
                    Some(d) if d.spec.type_params.is_none() => {
                        cur_file = d.file;
                        cur = d.spec.typ;
                    }
                    _ => return Ok(None),
                },
                ast::Type::Named {
                    pkg: Some(q),
                    name,
                    args,
                } if args.is_empty() => {
                    let q = parsed.ident(q).to_owned();
                    let name = parsed.ident(name).to_owned();
                    let path = self.import_path(&cur_pkg, cur_file, &q, at)?;
                    if self.registry.lookup(&path, &name).is_some() {
                        return Ok(None);
                    }
                    let target = self.load(&path, &name, at)?;
                    match target.type_decl(&name) {
                        Some(d) if d.spec.type_params.is_none() => {
                            cur_pkg = target;
                            cur_file = d.file;
                            cur = d.spec.typ;
                        }
                        _ => return Ok(None),
                    }
                }
                _ => return Ok(None),
            }
        }
        Ok(None)
    }

    fn resolve_struct(
        &mut self,
        key: &str,
        decl_pkg: &Rc<Package>,
        name: &str,
        decl: TypeDecl,
        src: StructSource,
    ) -> Result<(), ResolveError> {
        let cp = self.cache.begin(key);
        let outer = std::mem::replace(&mut self.embedding, vec![key.to_owned()]);
        let fields = self.struct_fields(&src);
        self.embedding = outer;
        match fields {
            Ok(fields) => {
                let doc = decl_pkg.files[decl.file].parsed.doc_text(decl.spec.doc);
                self.cache.finish(
                    key,
                    Struct {
                        package: decl_pkg.import_path.clone(),
                        name: name.to_owned(),
                        fields,
                        annotations: annotations::extract(&doc),
                        exported: is_exported(name),
                        doc,
                    },
                );
                trace!(key, "struct resolved");
                Ok(())
            }
            Err(e) => {
                self.cache.rollback(cp);
                Err(e)
            }
        }
    }

    fn struct_fields(&mut self, src: &StructSource) -> Result<Vec<Field>, ResolveError> {
        let pkg = &src.pkg;
        let file = src.file;
        let parsed = &pkg.files[file].parsed;
        let mut out: Vec<Field> = Vec::new();

        for &fid in parsed.arena.fields_list(src.fields) {
            let field = parsed.arena.fields[fid];
            let at = location(pkg, file, parsed.arena.fields.span(fid));

            let tags = match field.tag {
                Some(lit) => match parsed.string_value(lit) {
                    Ok(raw) => Tags::parse(&raw),
                    Err(e) => {
                        warn!(at = %at, error = ?e, "ignoring malformed struct tag");
                        Tags::default()
                    }
                },
                None => Tags::default(),
            };
            if tags.json_skip() {
                continue;
            }

            let mut doc = parsed.doc_text(field.doc);
            doc.push_str(&parsed.doc_text(field.comment));
            let annotations = annotations::extract(&doc);

            if field.is_embed {
                let embedded = Embedded {
                    ty: field.typ,
                    tags,
                    annotations,
                    doc,
                    at,
                };
                self.embed(pkg, file, embedded, &mut out)?;
                continue;
            }

            let ty = self.resolve_type(pkg, file, field.typ)?;
            for &n in parsed.arena.ident_names(field.names) {
                let name = parsed.ident(n);
                if name == "_" {
                    continue;
                }
                push_field(
                    &mut out,
                    Field {
                        name: name.to_owned(),
                        json_name: tags.json_name().unwrap_or(name).to_owned(),
                        ty: ty.clone(),
                        tags: tags.clone(),
                        annotations: annotations.clone(),
                        exported: is_exported(name),
                        doc: doc.clone(),
                    },
                );
            }
        }
        Ok(out)
    }

    /// Embedded field: a struct has its fields inlined; a tagged embed or a
    /// non-struct type becomes a field named after the type.
    fn embed(
        &mut self,
        pkg: &Rc<Package>,
        file: usize,
        e: Embedded,
        out: &mut Vec<Field>,
    ) -> Result<(), ResolveError> {
        let parsed = &pkg.files[file].parsed;
        let (inner, pointer) = strip_pointer(&parsed.arena, e.ty);
        let type_name = match parsed.arena.types[inner] {
            ast::Type::Named { name, .. } => parsed.ident(name).to_owned(),
            _ => parsed.text(parsed.arena.types.span(inner)).to_owned(),
        };

        let named = |ty: Type, e: Embedded| Field {
            json_name: e.tags.json_name().unwrap_or(&type_name).to_owned(),
            name: type_name.clone(),
            ty,
            exported: is_exported(&type_name),
            tags: e.tags,
            annotations: e.annotations,
            doc: e.doc,
        };

        if e.tags.json_name().is_some() {
            let ty = self.resolve_type(pkg, file, e.ty)?;
            push_field(out, named(ty, e));
            return Ok(());
        }

        match self.resolve_type(pkg, file, inner)? {
            Type::Struct { key } => {
                if self.embedding.contains(&key) {
                    return Err(ResolveError::CyclicInitialization { at: e.at, key });
                }
                let resolved = match self.cache.slot(&key) {
                    Some(Slot::Resolved(s)) => Some(s.fields.clone()),
                    _ => None,
                };
                let fields = match resolved {
                    Some(fields) => fields,
                    None => self.inline_in_progress(&key, &e.at)?,
                };
                for f in fields {
                    push_field(out, f);
                }
                Ok(())
            }
            ty => {
                let ty = if pointer { Type::pointer(ty) } else { ty };
                push_field(out, named(ty, e));
                Ok(())
            }
        }
    }

    /// Fields of a struct that is still being resolved further up, reached
    /// through a pointer, slice or map and now embedded. Its declaration is
    /// walked again.
    fn inline_in_progress(
        &mut self,
        key: &str,
        at: &Location,
    ) -> Result<Vec<Field>, ResolveError> {
        let decl = key.rsplit_once('.').and_then(|(path, name)| {
            let pkg = self.store.get(path)?;
            let decl = pkg.type_decl(name)?;
            Some((pkg, decl))
        });
        let Some((pkg, decl)) = decl else {
            return Err(ResolveError::CyclicInitialization {
                at: at.clone(),
                key: key.to_owned(),
            });
        };
        let Some(src) = self.struct_source(&pkg, decl.file, decl.spec.typ, at)? else {
            return Err(ResolveError::CyclicInitialization {
                at: at.clone(),
                key: key.to_owned(),
            });
        };

        trace!(key, "inlining a struct that is still being resolved");
        self.embedding.push(key.to_owned());
        let fields = self.struct_fields(&src);
        self.embedding.pop();
        fields
    }
}

struct Embedded {
    ty: TypeId,
    tags: Tags,
    annotations: Annotations,
    doc: String,
    at: Location,
}

/// Later fields replace earlier ones with the same Go name, in place.
fn push_field(out: &mut Vec<Field>, field: Field) {
    match out.iter().position(|f| f.name == field.name) {
        Some(i) => {
            debug!(field = %field.name, "field replaces an earlier one with the same name");
            out[i] = field;
        }
        None => out.push(field),
    }
}

/// `*T` and `(*T)` to `T`; one level only.
fn strip_pointer(arena: &ast::AstArena, mut ty: TypeId) -> (TypeId, bool) {
    let mut pointer = false;
    loop {
        match arena.types[ty] {
            ast::Type::Paren { typ } => ty = typ,
            ast::Type::Pointer { elem, .. } if !pointer => {
                pointer = true;
                ty = elem;
            }
            _ => return (ty, pointer),
        }
    }
}

pub(crate) fn location(pkg: &Package, file: usize, span: Span) -> Location {
    let pos = pkg.files[file].parsed.line_col(span.start);
    Location {
        file: pkg.file_path(file).to_path_buf(),
        line: pos.line,
        col: pos.col,
    }
}
