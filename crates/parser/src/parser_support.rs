use crate::ast::{self, Span};

/// One comma-separated entry of a parameter list, before grouping.
///
/// Go cannot tell `(a, b int)` from `(a, b)` until the list ends: a lone
/// identifier is a name if any later entry carries a type, otherwise it is
/// itself a type.
#[derive(Clone, Debug)]
pub struct ParamDecl {
    pub names: Vec<ast::IdentName>,
    pub ellipsis_pos: Option<Span>,
    pub typ: Option<ast::TypeId>,
    pub span: Span,
}

pub fn resolve_param_list(
    arena: &mut ast::AstArena,
    params: Vec<ParamDecl>,
) -> Vec<ast::FieldId> {
    // Names are all present or all absent; one `name Type` entry decides.
    let named = params
        .iter()
        .any(|p| p.typ.is_some() && !p.names.is_empty());

    let mut out = Vec::new();
    if !named {
        for param in params {
            let (typ, span) = match param.typ {
                Some(typ) => (typ, param.span),
                None => match param.names.first() {
                    Some(&name) => (named_type_from_ident(arena, name), name.pos),
                    None => continue,
                },
            };
            out.push(alloc_param(arena, ast::ListRef::EMPTY, param.ellipsis_pos, typ, span));
        }
        return out;
    }

    let mut pending_names: Vec<ast::IdentName> = Vec::new();
    let mut pending_start: Option<u32> = None;

    for param in params {
        match param.typ {
            Some(typ) => {
                let mut names = std::mem::take(&mut pending_names);
                names.extend(param.names);
                let names_ref = arena.list_ident_names(names);
                let span = Span {
                    start: pending_start.take().unwrap_or(param.span.start),
                    end: param.span.end,
                };
                out.push(alloc_param(arena, names_ref, param.ellipsis_pos, typ, span));
            }
            None => {
                if pending_names.is_empty() {
                    pending_start = Some(param.span.start);
                }
                pending_names.extend(param.names);
            }
        }
    }

    // `(a, b)` after a named entry is malformed Go; keep the names as types.
    for name in pending_names {
        let typ = named_type_from_ident(arena, name);
        out.push(alloc_param(arena, ast::ListRef::EMPTY, None, typ, name.pos));
    }

    out
}

fn alloc_param(
    arena: &mut ast::AstArena,
    names: ast::ListRef<ast::IdentName>,
    ellipsis_pos: Option<Span>,
    typ: ast::TypeId,
    span: Span,
) -> ast::FieldId {
    let field = ast::Field {
        names,
        ellipsis_pos,
        typ,
        tag: None,
        is_embed: false,
        doc: None,
        comment: None,
    };
    arena.fields.alloc(field, span)
}

pub fn named_type_from_ident(arena: &mut ast::AstArena, name: ast::IdentName) -> ast::TypeId {
    arena.types.alloc(
        ast::Type::Named {
            pkg: None,
            name,
            args: ast::ListRef::EMPTY,
        },
        name.pos,
    )
}
