use svcgen::imports::ImportTable;
use svcgen_syntax::parse_source;
use walkdir::WalkDir;

/// Parses every `.go` file under `$SVCGEN_GO_CORPUS` (a `GOROOT/src`, say).
#[test]
fn parses_go_corpus_if_configured() {
    let Some(root) = std::env::var_os("SVCGEN_GO_CORPUS") else {
        eprintln!("SVCGEN_GO_CORPUS not set; skipping corpus test");
        return;
    };

    let mut total = 0usize;
    for entry in WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("go")
        {
            continue;
        }
        // testdata holds deliberately broken sources.
        if path.components().any(|c| c.as_os_str() == "testdata") {
            continue;
        }
        let Ok(src) = std::fs::read_to_string(path) else {
            continue;
        };

        total += 1;
        match parse_source(&src) {
            Ok(parsed) => {
                if let Err(e) = ImportTable::from_file(&parsed) {
                    panic!("{}: bad import: {e}", path.display());
                }
            }
            Err(f) => {
                eprintln!("FAILED: {}", path.display());
                for d in f.diags.iter().take(8) {
                    eprintln!("  {:?} {:?}: {}", d.kind, d.span, d.message);
                }
                panic!("Go corpus parse failed after {total} files");
            }
        }
    }

    eprintln!("Parsed {total} Go files successfully.");
}
