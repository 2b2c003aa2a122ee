//! Declaration-level recursive-descent parser.
//!
//! Consumes the semicolon-inserted token stream from [`Lexer`] and builds the
//! arena AST. Function bodies and value expressions are skipped by matching
//! brackets; everything that describes a type is parsed in full.

use crate::ast::*;
use crate::error::{Diag, ParseFailure};
use crate::lexer::{Lexer, RawComment, Tok};
use crate::literal::{self, UnquoteError};
use crate::parser_support::{self, ParamDecl};
use crate::pos::{LineCol, LineIndex};
use std::collections::HashMap;

type Spanned<'src> = (usize, Tok<'src>, usize);

const MAX_TYPE_DEPTH: u32 = 512;

/// Parses one Go source file.
///
/// Any lexical or syntax error fails the parse; the failure still carries
/// the recovered tree.
pub fn parse_source(src: &str) -> Result<ParsedFile, ParseFailure> {
    let mut lexer = Lexer::new(src);
    let toks: Vec<Spanned<'_>> = lexer.by_ref().collect();
    let comments = lexer.take_comments();
    let mut diags = lexer.take_diags();

    let mut p = Parser::new(src, toks);
    p.group_comments(&comments);
    let file = p.parse_file();
    diags.extend(p.diags);

    let parsed = ParsedFile {
        source: src.to_owned(),
        arena: p.arena,
        interner: p.interner,
        file,
        lines: p.lines,
    };

    if diags.is_empty() {
        Ok(parsed)
    } else {
        diags.sort_by_key(|d| d.span.start);
        Err(ParseFailure {
            partial: Some(Box::new(parsed)),
            diags,
        })
    }
}

// =============================================================================
// Parsed file
// =============================================================================

/// A parsed source file and everything needed to read it back.
#[derive(Debug)]
pub struct ParsedFile {
    pub source: String,
    pub arena: AstArena,
    pub interner: Interner,
    pub file: SourceFile,
    pub lines: LineIndex,
}

impl ParsedFile {
    #[inline]
    pub fn text(&self, span: Span) -> &str {
        self.source.get(span.range()).unwrap_or("")
    }

    #[inline]
    pub fn sym(&self, sym: Symbol) -> &str {
        self.interner.resolve(sym)
    }

    #[inline]
    pub fn ident(&self, name: IdentName) -> &str {
        self.interner.resolve(name.sym)
    }

    #[inline]
    pub fn package_name(&self) -> &str {
        self.ident(self.file.name)
    }

    #[inline]
    pub fn line_col(&self, offset: u32) -> LineCol {
        self.lines.line_col(offset)
    }

    #[inline]
    pub fn top_decls(&self) -> &[TopLevelDecl] {
        self.arena.top_decls(self.file.decls)
    }

    /// Value of a string literal.
    pub fn string_value(&self, lit: StringLit) -> Result<String, UnquoteError> {
        literal::unquote(self.text(lit.raw))
    }

    /// Text of an optional doc group; empty when absent.
    pub fn doc_text(&self, group: Option<CommentGroupId>) -> String {
        group.map(|g| self.comment_text(g)).unwrap_or_default()
    }

    /// Text of a comment group with comment markers removed.
    ///
    /// Follows `go/ast.CommentGroup.Text`: one space after `//` is dropped,
    /// tool directives such as `//go:build` are omitted, trailing blanks on
    /// each line are trimmed, leading and trailing blank lines are removed
    /// and runs of blank lines collapse to one. Non-empty output ends with
    /// a newline.
    pub fn comment_text(&self, group: CommentGroupId) -> String {
        let g = self.arena.comment_groups[group];
        let mut lines: Vec<&str> = Vec::new();

        for &cid in self.arena.comment_ids(g.comments) {
            let raw = self.text(self.arena.comments.span(cid));
            let body = raw.get(2..).unwrap_or("");
            match self.arena.comments[cid].kind {
                CommentKind::Line => {
                    if is_directive(body) {
                        continue;
                    }
                    lines.push(body.strip_prefix(' ').unwrap_or(body));
                }
                CommentKind::Block => {
                    let body = body.strip_suffix("*/").unwrap_or(body);
                    lines.extend(body.split('\n'));
                }
            }
        }

        let mut out = String::new();
        let mut pending_blank = false;
        for line in lines.into_iter().map(str::trim_end) {
            if line.is_empty() {
                pending_blank = !out.is_empty();
                continue;
            }
            if pending_blank {
                out.push('\n');
                pending_blank = false;
            }
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

fn is_directive(body: &str) -> bool {
    if ["line ", "extern ", "export "]
        .iter()
        .any(|p| body.starts_with(p))
    {
        return true;
    }
    // `//[a-z0-9]+:[a-z0-9]`, e.g. `//go:build`
    let b = body.as_bytes();
    let word = b
        .iter()
        .take_while(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .count();
    word > 0
        && b.get(word) == Some(&b':')
        && b
            .get(word + 1)
            .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

// =============================================================================
// Parser state
// =============================================================================

struct LeadGroup {
    id: CommentGroupId,
    end_line: u32,
}

struct Parser<'src> {
    toks: Vec<Spanned<'src>>,
    pos: usize,
    src_len: usize,
    lines: LineIndex,
    arena: AstArena,
    interner: Interner,
    diags: Vec<Diag>,
    groups: Vec<CommentGroupId>,
    /// Keyed by the index of the token following the group.
    lead: HashMap<u32, LeadGroup>,
    /// Keyed by the index of the token following the group; the group starts
    /// on the line where the previous token ends.
    trailing: HashMap<u32, CommentGroupId>,
    depth: u32,
}

#[inline]
fn is_decl_keyword(t: Tok<'_>) -> bool {
    matches!(
        t,
        Tok::KwFunc | Tok::KwType | Tok::KwVar | Tok::KwConst | Tok::KwImport
    )
}

#[inline]
fn starts_type(t: Tok<'_>) -> bool {
    matches!(
        t,
        Tok::Ident(_)
            | Tok::Star
            | Tok::LBrack
            | Tok::LParen
            | Tok::Arrow
            | Tok::KwMap
            | Tok::KwChan
            | Tok::KwFunc
            | Tok::KwStruct
            | Tok::KwInterface
    )
}

#[inline]
fn opens(t: Tok<'_>) -> bool {
    matches!(t, Tok::LParen | Tok::LBrack | Tok::LBrace)
}

#[inline]
fn closes(t: Tok<'_>) -> bool {
    matches!(t, Tok::RParen | Tok::RBrack | Tok::RBrace)
}

impl<'src> Parser<'src> {
    fn new(src: &'src str, toks: Vec<Spanned<'src>>) -> Self {
        Self {
            toks,
            pos: 0,
            src_len: src.len(),
            lines: LineIndex::new(src),
            arena: AstArena::new(),
            interner: Interner::new(),
            diags: Vec::new(),
            groups: Vec::new(),
            lead: HashMap::new(),
            trailing: HashMap::new(),
            depth: 0,
        }
    }

    // -------------------------------------------------------------------------
    // Token access
    // -------------------------------------------------------------------------

    #[inline]
    fn peek(&self) -> Option<Tok<'src>> {
        self.peek_n(0)
    }

    #[inline]
    fn peek_n(&self, n: usize) -> Option<Tok<'src>> {
        self.toks.get(self.pos + n).map(|t| t.1)
    }

    #[inline]
    fn span_at(&self, idx: usize) -> Span {
        match self.toks.get(idx) {
            Some(&(s, _, e)) => Span::new(s, e),
            None => Span::empty_at(self.src_len),
        }
    }

    #[inline]
    fn here(&self) -> Span {
        self.span_at(self.pos)
    }

    #[inline]
    fn prev_end(&self) -> u32 {
        match self.pos.checked_sub(1).and_then(|i| self.toks.get(i)) {
            Some(&(_, _, e)) => Span::empty_at(e).end,
            None => 0,
        }
    }

    #[inline]
    fn span_from(&self, start: Span) -> Span {
        Span {
            start: start.start,
            end: self.prev_end().max(start.start),
        }
    }

    #[inline]
    fn bump(&mut self) -> Span {
        let sp = self.here();
        if self.pos < self.toks.len() {
            self.pos += 1;
        }
        sp
    }

    #[inline]
    fn eat(&mut self, t: Tok<'_>) -> Option<Span> {
        if self.peek() == Some(t) {
            Some(self.bump())
        } else {
            None
        }
    }

    fn error_here(&mut self, expected: &str) {
        let found = match self.peek() {
            Some(Tok::Semi) if self.here().is_empty() => "newline".to_owned(),
            Some(t) => format!("`{t}`"),
            None => "end of file".to_owned(),
        };
        let span = self.here();
        self.diags
            .push(Diag::parse(span, format!("expected {expected}, found {found}")));
    }

    fn expect(&mut self, t: Tok<'_>, what: &str) -> Option<Span> {
        let got = self.eat(t);
        if got.is_none() {
            self.error_here(what);
        }
        got
    }

    fn expect_ident(&mut self, what: &str) -> IdentName {
        match self.peek() {
            Some(Tok::Ident(name)) => {
                let pos = self.bump();
                IdentName {
                    sym: self.interner.intern(name),
                    pos,
                }
            }
            _ => {
                self.error_here(what);
                IdentName {
                    sym: self.interner.intern("_"),
                    pos: Span::empty_at(self.here().start as usize),
                }
            }
        }
    }

    /// Statement terminator; optional before a closing bracket or at EOF.
    fn expect_semi(&mut self) -> bool {
        match self.peek() {
            Some(Tok::Semi) => {
                self.bump();
                true
            }
            None | Some(Tok::RParen) | Some(Tok::RBrace) => true,
            Some(_) => {
                self.error_here("`;` or newline");
                false
            }
        }
    }

    /// Skips a bracketed run starting at the current opener, closer included.
    fn skip_balanced(&mut self) -> Span {
        let start = self.here();
        let mut depth = 0usize;
        while let Some(t) = self.peek() {
            self.bump();
            if opens(t) {
                depth += 1;
            } else if closes(t) {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    break;
                }
            }
        }
        if depth > 0 {
            self.diags
                .push(Diag::parse(start, "unbalanced brackets at end of file"));
        }
        self.span_from(start)
    }

    /// Skips until `;` or an unmatched closer at bracket depth zero.
    fn skip_to_terminator(&mut self) -> Span {
        let start = self.here();
        let mut depth = 0usize;
        while let Some(t) = self.peek() {
            if depth == 0 && (t == Tok::Semi || closes(t)) {
                break;
            }
            if opens(t) {
                depth += 1;
            } else if closes(t) {
                depth -= 1;
            }
            self.bump();
        }
        self.span_from(start)
    }

    fn sync_top_level(&mut self) {
        let before = self.pos;
        let mut depth = 0usize;
        while let Some(t) = self.peek() {
            if depth == 0 && is_decl_keyword(t) && self.pos > before {
                break;
            }
            if opens(t) {
                depth += 1;
            } else if closes(t) {
                depth = depth.saturating_sub(1);
            }
            self.bump();
        }
    }

    /// Index of the token after the bracket run starting at `idx`.
    fn after_balanced(&self, idx: usize) -> Option<Tok<'src>> {
        let mut depth = 0usize;
        let mut i = idx;
        while let Some(&(_, t, _)) = self.toks.get(i) {
            i += 1;
            if opens(t) {
                depth += 1;
            } else if closes(t) {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return self.toks.get(i).map(|t| t.1);
                }
            }
        }
        None
    }

    // -------------------------------------------------------------------------
    // Comments
    // -------------------------------------------------------------------------

    fn tok_end_line(&self, idx: u32) -> Option<u32> {
        self.toks
            .get(idx as usize)
            .map(|&(_, _, e)| self.lines.line(e.saturating_sub(1) as u32))
    }

    fn group_comments(&mut self, comments: &[RawComment]) {
        let mut i = 0;
        while i < comments.len() {
            let first = comments[i];
            let start_line = self.lines.line(first.span.start);
            let is_trailing = first.next_tok > 0
                && self.tok_end_line(first.next_tok - 1) == Some(start_line);

            let mut end_line = self.lines.span_lines(first.span).1;
            let mut j = i + 1;
            while let Some(c) = comments.get(j) {
                if c.next_tok != first.next_tok {
                    break;
                }
                let line = self.lines.line(c.span.start);
                let adjacent = if is_trailing {
                    line == end_line
                } else {
                    line <= end_line + 1
                };
                if !adjacent {
                    break;
                }
                end_line = self.lines.span_lines(c.span).1;
                j += 1;
            }

            let members = &comments[i..j];
            let ids: Vec<CommentId> = members
                .iter()
                .map(|c| self.arena.comments.alloc(Comment { kind: c.kind }, c.span))
                .collect();
            let span = first.span.to(members[members.len() - 1].span);
            let list = self.arena.list_comment_ids(ids);
            let id = self
                .arena
                .comment_groups
                .alloc(CommentGroup { comments: list }, span);
            self.groups.push(id);

            if is_trailing {
                self.trailing.entry(first.next_tok).or_insert(id);
            } else {
                self.lead.insert(first.next_tok, LeadGroup { id, end_line });
            }
            i = j;
        }
    }

    /// Group ending on the line right above token `idx`.
    fn lead_comment(&self, idx: usize) -> Option<CommentGroupId> {
        let g = self.lead.get(&(idx as u32))?;
        let line = self.lines.line(self.span_at(idx).start);
        (g.end_line + 1 == line).then_some(g.id)
    }

    /// Group on the same line right after token `idx`.
    fn line_comment(&self, idx: usize) -> Option<CommentGroupId> {
        self.trailing.get(&(idx as u32 + 1)).copied()
    }

    // -------------------------------------------------------------------------
    // File and declarations
    // -------------------------------------------------------------------------

    fn parse_file(&mut self) -> SourceFile {
        let doc = self.lead_comment(self.pos);
        let package_pos = self
            .expect(Tok::KwPackage, "`package`")
            .unwrap_or_else(|| self.here());
        let name = self.expect_ident("package name");
        if !self.expect_semi() {
            self.sync_top_level();
        }

        let mut decls = Vec::new();
        while let Some(t) = self.peek() {
            let decl = match t {
                Tok::Semi => {
                    self.bump();
                    continue;
                }
                Tok::KwImport => TopLevelDecl::Decl(self.parse_gen_decl(GenDeclKind::Import)),
                Tok::KwConst => TopLevelDecl::Decl(self.parse_gen_decl(GenDeclKind::Const)),
                Tok::KwVar => TopLevelDecl::Decl(self.parse_gen_decl(GenDeclKind::Var)),
                Tok::KwType => TopLevelDecl::Decl(self.parse_gen_decl(GenDeclKind::Type)),
                Tok::KwFunc => TopLevelDecl::Func(self.parse_func_decl()),
                _ => {
                    self.error_here("declaration");
                    let start = self.here();
                    self.sync_top_level();
                    let span = self.span_from(start);
                    TopLevelDecl::Decl(self.arena.decls.alloc(Decl::Bad, span))
                }
            };
            decls.push(decl);
        }

        let decls = self.arena.list_top_decls(decls);
        let comments = self.arena.list_comment_group_ids(self.groups.clone());
        SourceFile {
            package_pos,
            name,
            decls,
            comments,
            doc,
        }
    }

    fn end_decl(&mut self) {
        if !self.expect_semi() {
            self.sync_top_level();
        }
    }

    fn parse_gen_decl(&mut self, kind: GenDeclKind) -> DeclId {
        let doc = self.lead_comment(self.pos);
        let kw_pos = self.bump();

        let mut specs = Vec::new();
        let mut l_paren = None;
        let mut r_paren = None;

        if let Some(open) = self.eat(Tok::LParen) {
            l_paren = Some(open);
            loop {
                match self.peek() {
                    None | Some(Tok::RParen) => break,
                    Some(Tok::Semi) => {
                        self.bump();
                        continue;
                    }
                    Some(_) => {}
                }
                let before = self.pos;
                let spec_doc = self.lead_comment(self.pos);
                if let Some(spec) = self.parse_spec(kind, spec_doc) {
                    specs.push(spec);
                }
                if !self.expect_semi() {
                    self.skip_to_terminator();
                }
                if self.pos == before {
                    self.bump();
                }
            }
            r_paren = self.expect(Tok::RParen, "`)`");
        } else if let Some(spec) = self.parse_spec(kind, doc) {
            specs.push(spec);
        }

        self.end_decl();

        let span = self.span_from(kw_pos);
        let specs = self.arena.list_specs(specs);
        self.arena.decls.alloc(
            Decl::Gen(GenDecl {
                doc,
                kw_pos,
                kind,
                l_paren,
                specs,
                r_paren,
            }),
            span,
        )
    }

    fn parse_spec(&mut self, kind: GenDeclKind, doc: Option<CommentGroupId>) -> Option<Spec> {
        match kind {
            GenDeclKind::Import => self.parse_import_spec(doc).map(Spec::Import),
            GenDeclKind::Const | GenDeclKind::Var => {
                Some(Spec::Value(self.parse_value_spec(doc)))
            }
            GenDeclKind::Type => Some(Spec::Type(self.parse_type_spec(doc))),
        }
    }

    fn parse_import_spec(&mut self, doc: Option<CommentGroupId>) -> Option<ImportSpec> {
        let name = match self.peek() {
            Some(Tok::Dot) => Some(ImportName::Dot(self.bump())),
            Some(Tok::Ident("_")) => Some(ImportName::Blank(self.bump())),
            Some(Tok::Ident(n)) => {
                let sym = self.interner.intern(n);
                Some(ImportName::Name(sym, self.bump()))
            }
            _ => None,
        };
        match self.peek() {
            Some(t) if t.is_string() => Some(ImportSpec {
                doc,
                name,
                path: StringLit { raw: self.bump() },
            }),
            _ => {
                self.error_here("import path");
                self.skip_to_terminator();
                None
            }
        }
    }

    fn parse_ident_list(&mut self, what: &str) -> ListRef<IdentName> {
        let mut names = vec![self.expect_ident(what)];
        while self.peek() == Some(Tok::Comma) && matches!(self.peek_n(1), Some(Tok::Ident(_))) {
            self.bump();
            names.push(self.expect_ident(what));
        }
        self.arena.list_ident_names(names)
    }

    fn parse_value_spec(&mut self, doc: Option<CommentGroupId>) -> ValueSpec {
        let names = self.parse_ident_list("identifier");
        let typ = match self.peek() {
            Some(t) if starts_type(t) => Some(self.parse_type()),
            _ => None,
        };
        let values = self.eat(Tok::Assign).map(|_| self.skip_to_terminator());
        ValueSpec {
            doc,
            names,
            typ,
            values,
        }
    }

    fn looks_like_type_params(&self) -> bool {
        matches!(self.peek_n(1), Some(Tok::Ident(_)))
            && matches!(
                self.peek_n(2),
                Some(
                    Tok::Ident(_)
                        | Tok::Comma
                        | Tok::Tilde
                        | Tok::LBrack
                        | Tok::KwInterface
                        | Tok::KwMap
                        | Tok::KwChan
                        | Tok::KwFunc
                        | Tok::KwStruct
                )
            )
    }

    fn parse_type_spec(&mut self, doc: Option<CommentGroupId>) -> TypeSpec {
        let name = self.expect_ident("type name");
        let type_params = if self.peek() == Some(Tok::LBrack) && self.looks_like_type_params() {
            Some(self.parse_type_params())
        } else {
            None
        };
        let assign_pos = self.eat(Tok::Assign);
        let typ = self.parse_type();
        TypeSpec {
            doc,
            name: name.sym,
            name_pos: name.pos,
            type_params,
            assign_pos,
            typ,
            alias: assign_pos.is_some(),
        }
    }

    fn parse_type_params(&mut self) -> TypeParamsId {
        let l_brack = self.bump();
        let mut decls = Vec::new();
        while matches!(self.peek(), Some(Tok::Ident(_))) {
            let start = self.here();
            let mut names = vec![self.expect_ident("type parameter")];
            while self.eat(Tok::Comma).is_some() {
                names.push(self.expect_ident("type parameter"));
            }
            let names = self.arena.list_ident_names(names);
            let constraint = self.parse_union();
            let span = self.span_from(start);
            decls.push(
                self.arena
                    .type_param_decls
                    .alloc(TypeParamDecl { names, constraint }, span),
            );
            if self.eat(Tok::Comma).is_none() {
                break;
            }
        }
        let r_brack = self
            .expect(Tok::RBrack, "`]`")
            .unwrap_or_else(|| self.here());
        let params = self.arena.list_type_param_decl_ids(decls);
        self.arena.type_params.alloc(
            TypeParams {
                l_brack,
                params,
                r_brack,
            },
            l_brack.to(r_brack),
        )
    }

    fn parse_union(&mut self) -> ListRef<TypeTerm> {
        let mut terms = Vec::new();
        loop {
            let term = match self.eat(Tok::Tilde) {
                Some(tilde_pos) => TypeTerm::Tilde {
                    tilde_pos,
                    typ: self.parse_type(),
                },
                None => TypeTerm::Type {
                    typ: self.parse_type(),
                },
            };
            terms.push(term);
            if self.eat(Tok::Pipe).is_none() {
                break;
            }
        }
        self.arena.list_type_terms(terms)
    }

    fn parse_func_decl(&mut self) -> FuncDeclId {
        let doc = self.lead_comment(self.pos);
        let func_pos = self.bump();
        let recv = if self.peek() == Some(Tok::LParen) {
            Some(self.parse_params())
        } else {
            None
        };
        let name = self.expect_ident("function name");
        let type_params = if self.peek() == Some(Tok::LBrack) {
            Some(self.parse_type_params())
        } else {
            None
        };
        let signature = self.parse_signature();
        let body = if self.peek() == Some(Tok::LBrace) {
            Some(self.skip_balanced())
        } else {
            None
        };
        let span = self.span_from(func_pos);
        self.end_decl();

        self.arena.funcs.alloc(
            FuncDecl {
                doc,
                func_pos,
                recv,
                name,
                type_params,
                signature,
                body,
            },
            span,
        )
    }

    // -------------------------------------------------------------------------
    // Signatures
    // -------------------------------------------------------------------------

    fn parse_signature(&mut self) -> SignatureId {
        let start = self.here();
        let params = self.parse_params();
        let results = match self.peek() {
            Some(Tok::LParen) => Some(Results::Params(self.parse_params())),
            Some(t) if starts_type(t) => Some(Results::Type(self.parse_type())),
            _ => None,
        };
        let span = self.span_from(start);
        self.arena
            .signatures
            .alloc(Signature { params, results }, span)
    }

    fn parse_params(&mut self) -> FieldList {
        let open = self
            .expect(Tok::LParen, "`(`")
            .unwrap_or_else(|| self.here());
        let mut entries = Vec::new();
        while !matches!(self.peek(), None | Some(Tok::RParen)) {
            let before = self.pos;
            entries.push(self.parse_param_entry());
            if self.pos == before {
                self.error_here("parameter");
                self.bump();
            }
            if self.eat(Tok::Comma).is_none() {
                break;
            }
        }
        let close = self
            .expect(Tok::RParen, "`)`")
            .unwrap_or_else(|| self.here());
        let fields = parser_support::resolve_param_list(&mut self.arena, entries);
        let fields = self.arena.list_fields(fields);
        FieldList {
            open,
            fields,
            close,
        }
    }

    fn parse_param_entry(&mut self) -> ParamDecl {
        let start = self.here();
        let (names, ellipsis_pos, typ) = match (self.peek(), self.peek_n(1)) {
            (Some(Tok::Ellipsis), _) => {
                let e = self.bump();
                (Vec::new(), Some(e), Some(self.parse_type()))
            }
            (Some(Tok::Ident(_)), Some(Tok::Comma | Tok::RParen)) => {
                (vec![self.expect_ident("parameter")], None, None)
            }
            (Some(Tok::Ident(_)), Some(Tok::Ellipsis)) => {
                let name = self.expect_ident("parameter");
                let e = self.bump();
                (vec![name], Some(e), Some(self.parse_type()))
            }
            (Some(Tok::Ident(_)), Some(t)) if t != Tok::Dot && starts_type(t) => {
                let name = self.expect_ident("parameter");
                (vec![name], None, Some(self.parse_type()))
            }
            _ => (Vec::new(), None, Some(self.parse_type())),
        };
        ParamDecl {
            names,
            ellipsis_pos,
            typ,
            span: self.span_from(start),
        }
    }

    // -------------------------------------------------------------------------
    // Types
    // -------------------------------------------------------------------------

    fn parse_type(&mut self) -> TypeId {
        if self.depth >= MAX_TYPE_DEPTH {
            let span = self.here();
            self.diags.push(Diag::parse(span, "type nested too deeply"));
            return self.arena.types.alloc(Type::Bad(span), span);
        }
        self.depth += 1;
        let id = self.parse_type_inner();
        self.depth -= 1;
        id
    }

    fn parse_type_inner(&mut self) -> TypeId {
        let start = self.here();
        let typ = match self.peek() {
            Some(Tok::Ident(_)) => return self.parse_named_type(),
            Some(Tok::Star) => {
                let star_pos = self.bump();
                Type::Pointer {
                    star_pos,
                    elem: self.parse_type(),
                }
            }
            Some(Tok::LBrack) => {
                if self.peek_n(1) == Some(Tok::RBrack) {
                    self.bump();
                    self.bump();
                    Type::Slice {
                        elem: self.parse_type(),
                    }
                } else {
                    let len = self.skip_balanced();
                    Type::Array {
                        len,
                        elem: self.parse_type(),
                    }
                }
            }
            Some(Tok::KwMap) => {
                self.bump();
                self.expect(Tok::LBrack, "`[`");
                let key = self.parse_type();
                self.expect(Tok::RBrack, "`]`");
                Type::Map {
                    key,
                    val: self.parse_type(),
                }
            }
            Some(Tok::KwChan) => {
                self.bump();
                let dir = match self.eat(Tok::Arrow) {
                    Some(_) => ChanDir::Send,
                    None => ChanDir::Both,
                };
                Type::Chan {
                    dir,
                    elem: self.parse_type(),
                }
            }
            Some(Tok::Arrow) => {
                self.bump();
                self.expect(Tok::KwChan, "`chan`");
                Type::Chan {
                    dir: ChanDir::Recv,
                    elem: self.parse_type(),
                }
            }
            Some(Tok::KwFunc) => {
                self.bump();
                Type::Func {
                    sig: self.parse_signature(),
                }
            }
            Some(Tok::KwStruct) => self.parse_struct_type(),
            Some(Tok::KwInterface) => self.parse_interface_type(),
            Some(Tok::LParen) => {
                self.bump();
                let typ = self.parse_type();
                self.expect(Tok::RParen, "`)`");
                Type::Paren { typ }
            }
            _ => {
                self.error_here("type");
                Type::Bad(start)
            }
        };
        let span = self.span_from(start);
        self.arena.types.alloc(typ, span)
    }

    fn parse_named_type(&mut self) -> TypeId {
        let start = self.here();
        let first = self.expect_ident("type name");
        let (pkg, name) = if self.peek() == Some(Tok::Dot) {
            self.bump();
            (Some(first), self.expect_ident("type name"))
        } else {
            (None, first)
        };

        let args = if self.peek() == Some(Tok::LBrack) {
            self.bump();
            let mut args = Vec::new();
            while !matches!(self.peek(), None | Some(Tok::RBrack)) {
                args.push(self.parse_type());
                if self.eat(Tok::Comma).is_none() {
                    break;
                }
            }
            self.expect(Tok::RBrack, "`]`");
            self.arena.list_types(args)
        } else {
            ListRef::EMPTY
        };

        let span = self.span_from(start);
        self.arena
            .types
            .alloc(Type::Named { pkg, name, args }, span)
    }

    fn is_embedded_field(&self) -> bool {
        match (self.peek(), self.peek_n(1)) {
            (Some(Tok::Star), _) => true,
            (Some(Tok::Ident(_)), None) => true,
            (Some(Tok::Ident(_)), Some(t)) => match t {
                Tok::Dot | Tok::Semi | Tok::RBrace => true,
                t if t.is_string() => true,
                // `List[T]` vs `Arr [N]T`: look past the brackets.
                Tok::LBrack => matches!(
                    self.after_balanced(self.pos + 1),
                    None | Some(Tok::Semi | Tok::RBrace | Tok::StringLit(_) | Tok::RawStringLit(_))
                ),
                _ => false,
            },
            _ => false,
        }
    }

    fn parse_struct_type(&mut self) -> Type {
        self.bump();
        let l_brace = self
            .expect(Tok::LBrace, "`{`")
            .unwrap_or_else(|| self.here());
        let mut fields = Vec::new();

        loop {
            match self.peek() {
                None | Some(Tok::RBrace) => break,
                Some(Tok::Semi) => {
                    self.bump();
                    continue;
                }
                Some(_) => {}
            }
            let before = self.pos;
            fields.push(self.parse_struct_field());
            match self.peek() {
                Some(Tok::Semi) => {
                    self.bump();
                }
                Some(Tok::RBrace) | None => {}
                Some(_) => {
                    self.error_here("`;` or `}` after field");
                    self.skip_to_terminator();
                }
            }
            if self.pos == before {
                self.bump();
            }
        }

        let r_brace = self
            .expect(Tok::RBrace, "`}`")
            .unwrap_or_else(|| self.here());
        Type::Struct {
            l_brace,
            fields: self.arena.list_fields(fields),
            r_brace,
        }
    }

    fn parse_struct_field(&mut self) -> FieldId {
        let start = self.here();
        let doc = self.lead_comment(self.pos);
        let is_embed = self.is_embedded_field();

        let (names, typ) = if is_embed {
            (ListRef::EMPTY, self.parse_type())
        } else {
            let names = self.parse_ident_list("field name");
            (names, self.parse_type())
        };

        let tag = match self.peek() {
            Some(t) if t.is_string() => Some(StringLit { raw: self.bump() }),
            _ => None,
        };
        let comment = self.pos.checked_sub(1).and_then(|i| self.line_comment(i));

        let span = self.span_from(start);
        self.arena.fields.alloc(
            Field {
                names,
                ellipsis_pos: None,
                typ,
                tag,
                is_embed,
                doc,
                comment,
            },
            span,
        )
    }

    fn parse_interface_type(&mut self) -> Type {
        self.bump();
        let l_brace = self
            .expect(Tok::LBrace, "`{`")
            .unwrap_or_else(|| self.here());
        let mut elems = Vec::new();

        loop {
            match self.peek() {
                None | Some(Tok::RBrace) => break,
                Some(Tok::Semi) => {
                    self.bump();
                    continue;
                }
                Some(_) => {}
            }
            let before = self.pos;
            let elem = match (self.peek(), self.peek_n(1)) {
                (Some(Tok::Ident(_)), Some(Tok::LParen)) => {
                    let name = self.expect_ident("method name");
                    InterfaceElem::Method {
                        name,
                        sig: self.parse_signature(),
                    }
                }
                _ => InterfaceElem::Union {
                    terms: self.parse_union(),
                },
            };
            elems.push(elem);
            if !matches!(self.peek(), Some(Tok::RBrace) | None) && !self.expect_semi() {
                self.skip_to_terminator();
            }
            if self.pos == before {
                self.bump();
            }
        }

        let r_brace = self
            .expect(Tok::RBrace, "`}`")
            .unwrap_or_else(|| self.here());
        Type::Interface {
            l_brace,
            elems: self.arena.list_interface_elems(elems),
            r_brace,
        }
    }
}
