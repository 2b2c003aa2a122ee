#![no_main]

use libfuzzer_sys::fuzz_target;
use svcgen::annotations;
use svcgen::imports::ImportTable;
use svcgen_syntax::ast::TopLevelDecl;
use svcgen_syntax::parse_source;

fuzz_target!(|data: &[u8]| {
    let Ok(src) = std::str::from_utf8(data) else {
        return;
    };
    let parsed = match parse_source(src) {
        Ok(f) => f,
        Err(failure) => match failure.partial {
            Some(partial) => *partial,
            None => return,
        },
    };

    let _ = ImportTable::from_file(&parsed);
    let doc = parsed.doc_text(parsed.file.doc);
    let _ = annotations::extract(&doc);
    for d in parsed.top_decls() {
        if let TopLevelDecl::Func(id) = *d {
            let func = parsed.arena.funcs[id];
            let _ = parsed.doc_text(func.doc);
            let pos = parsed.line_col(func.name.pos.start);
            assert!(pos.line >= 1 && pos.col >= 1);
        }
    }
});
