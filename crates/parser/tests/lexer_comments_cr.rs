use svcgen_syntax::error::Diag;
use svcgen_syntax::lexer::{CommentKind, Lexer, Tok};

fn lex_all(input: &str) -> (Vec<(usize, Tok<'_>, usize)>, Vec<Diag>) {
    let mut lx = Lexer::new(input);
    let mut toks = Vec::new();
    for t in lx.by_ref() {
        toks.push(t);
    }
    let diags = lx.take_diags();
    (toks, diags)
}

#[inline]
fn is_injected_eof_semi(input: &str, s: usize, t: &Tok<'_>, e: usize) -> bool {
    matches!(t, Tok::Semi) && s == e && s == input.len()
}

// Drops only the `;` injected at EOF.
fn strip_eof_semi<'src>(
    toks: &[(usize, Tok<'src>, usize)],
    input: &str,
) -> Vec<(usize, Tok<'src>, usize)> {
    toks.iter()
        .filter(|&(s, t, e)| !is_injected_eof_semi(input, *s, t, *e))
        .cloned()
        .collect()
}

fn kinds_no_eof_semi(toks: &[(usize, Tok<'_>, usize)], input: &str) -> Vec<&'static str> {
    toks.iter()
        .filter(|(s, t, e)| !is_injected_eof_semi(input, *s, t, *e))
        .map(|(_, t, _)| match t {
            Tok::Ident(_) => "Ident",
            Tok::Number(_) => "Number",
            Tok::RuneLit(_) => "RuneLit",
            Tok::StringLit(_) => "StringLit",
            Tok::RawStringLit(_) => "RawStringLit",

            Tok::KwBreak => "KwBreak",
            Tok::KwContinue => "KwContinue",
            Tok::KwFallthrough => "KwFallthrough",
            Tok::KwReturn => "KwReturn",
            Tok::KwIf => "KwIf",

            Tok::Semi => "Semi",
            Tok::LBrace => "LBrace",
            Tok::RBrace => "RBrace",
            Tok::LParen => "LParen",
            Tok::RParen => "RParen",
            Tok::Dot => "Dot",

            Tok::Error => "Error",

            _ => "Other",
        })
        .collect()
}

#[test]
fn block_comment_with_cr_does_not_error() {
    let (_toks, diags) = lex_all("/*\r*/");
    assert!(diags.is_empty(), "{diags:?}");
}

#[test]
fn block_comment_with_crlf_does_not_error() {
    let (_toks, diags) = lex_all("/*\r\n*/");
    assert!(diags.is_empty(), "{diags:?}");
}

#[test]
fn block_comment_unterminated_is_error() {
    let (toks, diags) = lex_all("/*\r");
    assert!(!diags.is_empty(), "expected diag");
    assert!(
        toks.iter().any(|(_, t, _)| matches!(t, Tok::Error)),
        "toks={toks:?}"
    );
}

#[test]
fn semicolon_is_inserted_at_newline_inside_block_comment_lf() {
    let src = "foo/*\n*/bar";
    let (toks, diags) = lex_all(src);
    assert!(diags.is_empty(), "{diags:?}");
    assert_eq!(
        kinds_no_eof_semi(&toks, src),
        ["Ident", "Semi", "Ident"],
        "toks={toks:?}"
    );
}

#[test]
fn semicolon_is_inserted_at_newline_inside_block_comment_cr() {
    let src = "foo/*\r*/bar";
    let (toks, diags) = lex_all(src);
    assert!(diags.is_empty(), "{diags:?}");
    assert_eq!(
        kinds_no_eof_semi(&toks, src),
        ["Ident", "Semi", "Ident"],
        "toks={toks:?}"
    );
}

#[test]
fn semicolon_is_inserted_at_newline_inside_block_comment_crlf() {
    let src = "foo/*\r\n*/bar";
    let (toks, diags) = lex_all(src);
    assert!(diags.is_empty(), "{diags:?}");
    assert_eq!(
        kinds_no_eof_semi(&toks, src),
        ["Ident", "Semi", "Ident"],
        "toks={toks:?}"
    );
}

#[test]
fn no_semicolon_insertion_if_prev_token_cannot_insert() {
    let src = "if/*\n*/x";
    let (toks, diags) = lex_all(src);
    assert!(diags.is_empty(), "{diags:?}");

    let ks = kinds_no_eof_semi(&toks, src);
    assert_eq!(ks, ["KwIf", "Ident"], "toks={toks:?}");
}

#[test]
fn line_comment_crlf_triggers_newline_token_and_semi_insertion() {
    let src = "foo//c\r\nbar";
    let (toks, diags) = lex_all(src);
    assert!(diags.is_empty(), "{diags:?}");
    assert_eq!(
        kinds_no_eof_semi(&toks, src),
        ["Ident", "Semi", "Ident"],
        "toks={toks:?}"
    );
}

// go.dev/issue/11151: '\r' inside block comments.
#[test]
fn block_comment_issue11151_family_variants_do_not_error() {
    for src in [
        "/**\r/*/x",
        "/**\r\r/*/x",
        "/*\r/*/x",
        "/*\r*/x",
        "/*\r\r\r\r*/x",
    ] {
        let (toks, diags) = lex_all(src);
        assert!(
            diags.is_empty(),
            "src={src:?} diags={diags:?} toks={toks:?}"
        );

        let toks2 = strip_eof_semi(&toks, src);

        assert!(
            matches!(toks2.last().map(|x| &x.1), Some(Tok::Ident("x"))),
            "src={src:?} toks={toks:?}"
        );
    }
}

#[test]
fn comments_are_kept_in_the_side_table() {
    let src = "// doc\n// more\ntype T int // trailing\n/* block */";
    let mut lx = Lexer::new(src);
    let toks: Vec<_> = lx.by_ref().collect();
    let comments = lx.take_comments();

    let texts: Vec<_> = comments
        .iter()
        .map(|c| &src[c.span.start as usize..c.span.end as usize])
        .collect();
    assert_eq!(texts, ["// doc", "// more", "// trailing", "/* block */"]);
    assert_eq!(
        comments.iter().map(|c| c.kind).collect::<Vec<_>>(),
        [
            CommentKind::Line,
            CommentKind::Line,
            CommentKind::Line,
            CommentKind::Block
        ]
    );

    // Both doc lines precede `type`; the trailing one follows `int`.
    assert_eq!(comments[0].next_tok, 0);
    assert_eq!(comments[1].next_tok, 0);
    assert_eq!(comments[2].next_tok, 3);
    assert!(matches!(toks[3].1, Tok::Semi));
}
