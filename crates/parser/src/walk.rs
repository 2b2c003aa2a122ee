use crate::ast::*;

// Core traits
pub trait Walk<'ast> {
    fn walk<V: Visitor<'ast> + ?Sized>(&self, a: &'ast AstArena, v: &mut V);
}

/// Read-only traversal of a parsed file.
///
/// Every hook defaults to walking its children; override the ones you care
/// about and call the default body (`x.walk(a, self)`) to keep descending.
pub trait Visitor<'ast> {
    #[inline(always)]
    fn visit_source_file(&mut self, a: &'ast AstArena, f: &'ast SourceFile) {
        f.walk(a, self);
    }

    #[inline(always)]
    fn visit_decl(&mut self, a: &'ast AstArena, id: DeclId) {
        a.decls[id].walk(a, self);
    }

    #[inline(always)]
    fn visit_import_spec(&mut self, _a: &'ast AstArena, _spec: &'ast ImportSpec) {}

    #[inline(always)]
    fn visit_type_spec(&mut self, a: &'ast AstArena, spec: &'ast TypeSpec) {
        spec.type_params.walk(a, self);
        spec.typ.walk(a, self);
    }

    #[inline(always)]
    fn visit_func_decl(&mut self, a: &'ast AstArena, id: FuncDeclId) {
        a.funcs[id].walk(a, self);
    }

    #[inline(always)]
    fn visit_type(&mut self, a: &'ast AstArena, id: TypeId) {
        a.types[id].walk(a, self);
    }

    #[inline(always)]
    fn visit_field(&mut self, a: &'ast AstArena, id: FieldId) {
        a.fields[id].walk(a, self);
    }

    #[inline(always)]
    fn visit_signature(&mut self, a: &'ast AstArena, id: SignatureId) {
        a.signatures[id].walk(a, self);
    }

    #[inline(always)]
    fn visit_type_params(&mut self, a: &'ast AstArena, id: TypeParamsId) {
        a.type_params[id].walk(a, self);
    }

    #[inline(always)]
    fn visit_type_param_decl(&mut self, a: &'ast AstArena, id: TypeParamDeclId) {
        a.type_param_decls[id].walk(a, self);
    }

    #[inline(always)]
    fn visit_comment_group(&mut self, a: &'ast AstArena, id: CommentGroupId) {
        a.comment_groups[id].walk(a, self);
    }
}

macro_rules! impl_walk_for_ids {
    ($($id:ty => $visit:ident),* $(,)?) => {
        $(
            impl<'ast> Walk<'ast> for $id {
                #[inline(always)]
                fn walk<V: Visitor<'ast> + ?Sized>(&self, a: &'ast AstArena, v: &mut V) {
                    v.$visit(a, *self);
                }
            }
        )*
    };
}

impl_walk_for_ids! {
    DeclId => visit_decl,
    FuncDeclId => visit_func_decl,
    TypeId => visit_type,
    FieldId => visit_field,
    SignatureId => visit_signature,
    TypeParamsId => visit_type_params,
    TypeParamDeclId => visit_type_param_decl,
    CommentGroupId => visit_comment_group,
}

pub trait ListSlice<T> {
    fn slice(&self, r: ListRef<T>) -> &[T];
}

impl<'ast, T> Walk<'ast> for ListRef<T>
where
    AstArena: ListSlice<T>,
    T: Walk<'ast> + 'ast,
{
    #[inline(always)]
    fn walk<V: Visitor<'ast> + ?Sized>(&self, a: &'ast AstArena, v: &mut V) {
        for item in a.slice(*self) {
            item.walk(a, v);
        }
    }
}

macro_rules! impl_list_slice {
    ($($t:ty => $getter:ident),* $(,)?) => {
        $(
            impl ListSlice<$t> for AstArena {
                #[inline(always)]
                fn slice(&self, r: ListRef<$t>) -> &[$t] {
                    self.$getter(r)
                }
            }
        )*
    };
}

impl_list_slice! {
    TypeId => types_list,
    FieldId => fields_list,
    Spec => specs_list,
    TopLevelDecl => top_decls,
    TypeTerm => type_terms,
    InterfaceElem => interface_elems,
    IdentName => ident_names,
    TypeParamDeclId => type_param_decl_ids,
    CommentId => comment_ids,
    CommentGroupId => comment_group_ids,
}

// Specs are dispatched from `GenDecl` so hooks receive arena borrows.
impl<'ast> Walk<'ast> for ImportSpec {
    #[inline(always)]
    fn walk<V: Visitor<'ast> + ?Sized>(&self, _: &'ast AstArena, _: &mut V) {}
}

impl<'ast> Walk<'ast> for TypeSpec {
    #[inline(always)]
    fn walk<V: Visitor<'ast> + ?Sized>(&self, a: &'ast AstArena, v: &mut V) {
        self.type_params.walk(a, v);
        self.typ.walk(a, v);
    }
}

impl<'ast> Walk<'ast> for GenDecl {
    #[inline(always)]
    fn walk<V: Visitor<'ast> + ?Sized>(&self, a: &'ast AstArena, v: &mut V) {
        for spec in a.specs_list(self.specs) {
            match spec {
                Spec::Import(s) => v.visit_import_spec(a, s),
                Spec::Type(s) => v.visit_type_spec(a, s),
                Spec::Value(s) => s.walk(a, v),
            }
        }
    }
}

// Utilities
impl<'ast, T: Walk<'ast>> Walk<'ast> for Option<T> {
    #[inline(always)]
    fn walk<V: Visitor<'ast> + ?Sized>(&self, a: &'ast AstArena, v: &mut V) {
        if let Some(x) = self {
            x.walk(a, v);
        }
    }
}

// Leaves
macro_rules! impl_walk_noop {
    ($($ty:ty),* $(,)?) => {
        $(
            impl<'ast> Walk<'ast> for $ty {
                #[inline(always)]
                fn walk<V: Visitor<'ast> + ?Sized>(&self, _: &'ast AstArena, _: &mut V) {}
            }
        )*
    };
}

impl_walk_noop! {
    Span,
    Symbol,
    StringLit,
    bool,
    GenDeclKind,
    ChanDir,
    CommentKind,
    CommentId,
}
