//! End-to-end runs over throwaway projects.

use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use svcgen::resolver::ResolveError;
use svcgen::scanner::ScanError;
use svcgen::service::ServiceError;
use svcgen::{Config, Controller, Error, Mode, Model, Type};

struct Project {
    dir: tempfile::TempDir,
}

impl Project {
    fn new(files: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        for (rel, src) in files {
            let p = dir.path().join(rel);
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(p, src).unwrap();
        }
        Self { dir }
    }

    fn root(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }
}

fn config() -> Config {
    Config::default().with_mod_cache("/nonexistent/svcgen/modcache")
}

fn run_at(root: &Path, config: Config) -> Result<Model, Error> {
    Controller::new(config).run(root)
}

fn run(p: &Project) -> Result<Model, Error> {
    run_at(&p.root(), config())
}

fn field_names(model: &Model, key: &str) -> Vec<String> {
    model.structs[key].fields.iter().map(|f| f.name.clone()).collect()
}

const GO_MOD: &str = "module m/mod\n\ngo 1.22\n";

#[test]
fn s1_simple_fn() {
    let p = Project::new(&[
        ("go.mod", GO_MOD),
        (
            "svc/svc.go",
            r#"// Package svc says hello.
//
// @service svc
// @title Greeter
package svc

import "github.com/svcgen/rt"

// Hello greets.
// @fn hello
func Hello(ctx rt.Context, in HelloIn) (out *HelloOut, err rt.Error) {
	return nil, nil
}

type HelloIn struct {
	Name string `json:"name"`
}

type HelloOut struct {
	Greeting string `json:"greeting"`
}
"#,
        ),
    ]);
    let model = run(&p).unwrap();

    assert_eq!(model.module, "m/mod");
    assert_eq!(model.go_version.as_deref(), Some("1.22"));
    assert_eq!(model.services.len(), 1);
    let svc = &model.services[0];
    assert_eq!(svc.name, "svc");
    assert_eq!(svc.package, "m/mod/svc");
    assert_eq!(svc.title.as_deref(), Some("Greeter"));
    assert_eq!(svc.fns.len(), 1);
    assert_eq!(svc.components, ["m/mod/svc.HelloIn", "m/mod/svc.HelloOut"]);

    let hello = &model.fns["svc.Hello"];
    assert_eq!(hello.name, "Hello");
    assert_eq!(hello.doc, "Hello greets.\n@fn hello\n");
    assert_eq!(
        hello.param.as_ref().unwrap().ty,
        Type::struct_ref("m/mod/svc.HelloIn")
    );
    assert_eq!(
        hello.result.as_ref().unwrap().ty,
        Type::pointer(Type::struct_ref("m/mod/svc.HelloOut"))
    );

    let json = model.to_json_pretty().unwrap();
    assert!(json.contains("\"m/mod/svc.HelloIn\""), "{json}");
}

#[test]
fn s2_cross_package_reference_is_interned() {
    let p = Project::new(&[
        ("go.mod", GO_MOD),
        ("a/a.go", "package a\n\ntype User struct{ ID string }\n"),
        (
            "svc/svc.go",
            r#"// @service svc
package svc

import (
	"github.com/svcgen/rt"
	"m/mod/a"
)

type Wrap struct {
	Owner  a.User
	Others []*a.User
}

// @fn get
func Get(ctx rt.Context, in a.User) (*Wrap, error) { return nil, nil }

// @fn put
func Put(ctx rt.Context, in *a.User) error { return nil }
"#,
        ),
    ]);
    let model = run(&p).unwrap();

    let keys: Vec<_> = model.structs.keys().cloned().collect();
    assert_eq!(keys, ["m/mod/a.User", "m/mod/svc.Wrap"]);
    assert_eq!(
        model.fns["svc.Get"].param.as_ref().unwrap().ty,
        Type::struct_ref("m/mod/a.User")
    );
    assert_eq!(
        model.fns["svc.Put"].param.as_ref().unwrap().ty,
        Type::pointer(Type::struct_ref("m/mod/a.User"))
    );
    let wrap = &model.structs["m/mod/svc.Wrap"];
    assert_eq!(wrap.fields[0].ty, Type::struct_ref("m/mod/a.User"));
    assert_eq!(
        wrap.fields[1].ty,
        Type::array(Type::pointer(Type::struct_ref("m/mod/a.User")))
    );
    assert_eq!(model.services[0].components, keys);
}

#[test]
fn s3_cycles_terminate() {
    let p = Project::new(&[
        ("go.mod", GO_MOD),
        (
            "svc/svc.go",
            r#"// @service svc
package svc

import "github.com/svcgen/rt"

type Node struct {
	Next *Node
	V    int
}

type A struct{ B *B }
type B struct{ As []A }

// @fn walk
func Walk(ctx rt.Context, in *Node) (*A, error) { return nil, nil }
"#,
        ),
    ]);
    let model = run(&p).unwrap();

    let node = &model.structs["m/mod/svc.Node"];
    assert_eq!(node.fields[0].name, "Next");
    assert_eq!(
        node.fields[0].ty,
        Type::pointer(Type::struct_ref("m/mod/svc.Node"))
    );
    assert_eq!(model.structs.len(), 3);
    assert_eq!(
        model.structs["m/mod/svc.B"].fields[0].ty,
        Type::array(Type::struct_ref("m/mod/svc.A"))
    );
}

#[test]
fn s4_embedding_across_packages() {
    let p = Project::new(&[
        ("go.mod", GO_MOD),
        ("x/x.go", "package x\n\ntype Base struct{ ID string }\ntype Extra struct{ B1 int }\n"),
        (
            "y/y.go",
            r#"// @service items
package y

import (
	"github.com/svcgen/rt"
	"m/mod/x"
)

type Item struct {
	x.Base
	Name string
}

type S struct {
	A
	X int
	*x.Extra
}

type A struct {
	A1 string
	A2 string
}

// @fn get
func Get(ctx rt.Context, in Item) (S, error) { return S{}, nil }
"#,
        ),
    ]);
    let model = run(&p).unwrap();

    assert_eq!(field_names(&model, "m/mod/y.Item"), ["ID", "Name"]);
    assert_eq!(field_names(&model, "m/mod/y.S"), ["A1", "A2", "X", "B1"]);
    assert!(model.structs.contains_key("m/mod/x.Base"));
}

#[test]
fn s5_dependency_on_replaced_module() {
    let p = Project::new(&[
        (
            "proj/go.mod",
            "module m/mod\n\nrequire foo v1.2.3\n\nreplace foo => ../local/foo\n",
        ),
        (
            "proj/svc/svc.go",
            r#"// @service svc
package svc

import (
	"foo"
	"github.com/svcgen/rt"
)

// @fn f
func F(ctx rt.Context, in foo.T) error { return nil }
"#,
        ),
        ("local/foo/go.mod", "module foo\n"),
        ("local/foo/foo.go", "package foo\n\ntype T struct{ V string }\n"),
    ]);
    let model = run_at(&p.path("proj"), config()).unwrap();

    assert_eq!(
        model.fns["svc.F"].param.as_ref().unwrap().ty,
        Type::struct_ref("foo.T")
    );
    let t = &model.structs["foo.T"];
    assert_eq!(t.package, "foo");
    assert_eq!(t.fields[0].name, "V");
}

#[test]
fn s6_malformed_fn_is_rejected() {
    let p = Project::new(&[
        ("go.mod", GO_MOD),
        (
            "svc/svc.go",
            r#"// @service svc
package svc

import "github.com/svcgen/rt"

// @fn count
func Count(ctx rt.Context, in map[string]int) error { return nil }
"#,
        ),
    ]);
    for mode in [Mode::Strict, Mode::Permissive] {
        let err = run_at(&p.root(), config().with_mode(mode)).unwrap_err();
        match err {
            Error::Scan {
                package,
                source: ScanError::MalformedFn { file, function, .. },
            } => {
                assert_eq!(package, "m/mod/svc");
                assert_eq!(function, "Count");
                assert!(file.ends_with("svc/svc.go"), "{}", file.display());
            }
            other => panic!("expected MalformedFn, got {other:?}"),
        }
    }
}

#[test]
fn embedded_ancestor_resolves_from_either_end() {
    let types = "type A struct{ Kids []*B }\n\ntype B struct {\n\tA\n\tX int\n}\n";
    for carried in ["A", "B"] {
        let src = format!(
            "// @service svc\npackage svc\n\nimport \"github.com/svcgen/rt\"\n\n{types}\n// @fn f\nfunc F(ctx rt.Context, in {carried}) error {{ return nil }}\n"
        );
        let p = Project::new(&[("go.mod", GO_MOD), ("svc/svc.go", &src)]);
        let model = run(&p).unwrap();

        let keys: Vec<_> = model.structs.keys().cloned().collect();
        assert_eq!(keys, ["m/mod/svc.A", "m/mod/svc.B"], "in {carried}");
        assert_eq!(field_names(&model, "m/mod/svc.B"), ["Kids", "X"]);
    }
}

#[test]
fn unsupported_parameter_types_fail_permissive_runs() {
    let p = Project::new(&[
        ("go.mod", GO_MOD),
        (
            "svc/svc.go",
            r#"// @service svc
package svc

import "github.com/svcgen/rt"

// @fn stream
func Stream(ctx rt.Context, c chan int) error { return nil }
"#,
        ),
    ]);
    for mode in [Mode::Strict, Mode::Permissive] {
        match run_at(&p.root(), config().with_mode(mode)).unwrap_err() {
            Error::Scan {
                source: ScanError::MalformedFn { function, reason, .. },
                ..
            } => {
                assert_eq!(function, "Stream");
                assert!(reason.contains("chan int"), "{reason}");
            }
            other => panic!("expected MalformedFn, got {other:?}"),
        }
    }
}

#[test]
fn dependencies_come_from_the_module_cache() {
    let p = Project::new(&[
        (
            "proj/go.mod",
            "module m/mod\n\nrequire (\n\tgithub.com/X/y/v2 v2.1.0\n\ta.io/old v1.0.0\n)\n\nreplace a.io/old => a.io/new v1.5.0\n",
        ),
        (
            "proj/svc/svc.go",
            r#"// @service svc
package svc

import (
	"a.io/old/p"
	"github.com/X/y/v2/types"
	"github.com/svcgen/rt"
)

type In struct {
	T types.T
	P *p.P
}

// @fn f
func F(ctx rt.Context, in In) error { return nil }
"#,
        ),
        (
            "cache/github.com/!x/y/v2@v2.1.0/types/t.go",
            "package types\n\ntype T struct{ N int }\n",
        ),
        (
            "cache/a.io/new@v1.5.0/p/p.go",
            "package p\n\ntype P struct{ S string }\n",
        ),
        // Must not be used: the require is replaced.
        (
            "cache/a.io/old@v1.0.0/p/p.go",
            "package p\n\ntype P struct{ Old bool }\n",
        ),
    ]);
    let mut controller = Controller::new(Config::default().with_mod_cache(p.path("cache")));
    let model = controller.run(&p.path("proj")).unwrap();

    let keys: Vec<_> = model.structs.keys().cloned().collect();
    assert_eq!(
        keys,
        ["a.io/old/p.P", "github.com/X/y/v2/types.T", "m/mod/svc.In"]
    );
    assert_eq!(field_names(&model, "a.io/old/p.P"), ["S"]);
    assert_eq!(field_names(&model, "github.com/X/y/v2/types.T"), ["N"]);

    let store = controller.packages().unwrap();
    let renamed = store.get("a.io/old/p").unwrap();
    assert_eq!(renamed.module, "a.io/old");
    assert!(renamed.dir.ends_with("a.io/new@v1.5.0/p"));
    let versioned = store.get("github.com/X/y/v2/types").unwrap();
    assert!(versioned.dir.ends_with("github.com/!x/y/v2@v2.1.0/types"));
}

#[test]
fn vendored_dependencies_and_goroot() {
    let p = Project::new(&[
        (
            "proj/go.mod",
            "module m/mod\n\nrequire example.com/lib v1.0.0\n",
        ),
        (
            "proj/vendor/modules.txt",
            "# example.com/lib v1.0.0\n## explicit\nexample.com/lib/x\n",
        ),
        (
            "proj/vendor/example.com/lib/x/x.go",
            "package x\n\ntype X struct{ V string }\n",
        ),
        (
            "proj/svc/svc.go",
            r#"// @service svc
package svc

import (
	"net/url"

	"example.com/lib/x"
	"github.com/svcgen/rt"
)

type In struct {
	X    x.X
	User url.Userinfo
}

// @fn f
func F(ctx rt.Context, in In) error { return nil }
"#,
        ),
        (
            "goroot/src/net/url/url.go",
            "package url\n\ntype Userinfo struct{ Username string }\n",
        ),
    ]);
    let cfg = config().with_goroot(p.path("goroot"));
    let mut controller = Controller::new(cfg);
    let model = controller.run(&p.path("proj")).unwrap();

    // vendor/ is not part of the project's own packages
    assert_eq!(model.services.len(), 1);
    let in_ = &model.structs["m/mod/svc.In"];
    assert_eq!(in_.fields[0].ty, Type::struct_ref("example.com/lib/x.X"));
    assert_eq!(in_.fields[1].ty, Type::struct_ref("net/url.Userinfo"));

    let store = controller.packages().unwrap();
    assert_eq!(store.get("example.com/lib/x").unwrap().module, "example.com/lib");
    let std = store.get("net/url").unwrap();
    assert_eq!(std.module, "std");
    assert!(std.dir.starts_with(p.path("goroot")));
}

#[test]
fn well_known_references_never_load_packages() {
    let p = Project::new(&[
        ("go.mod", GO_MOD),
        (
            "svc/svc.go",
            r#"// @service svc
package svc

import (
	"encoding/json"
	"time"

	"github.com/svcgen/rt"
	rtjson "github.com/svcgen/rt/json"
)

type In struct {
	At   time.Time
	Raw  json.RawMessage
	Obj  rtjson.Object
	Tags map[string]any
}

// @fn f
func F(ctx rt.Context, in In) (rt.Empty, error) { return rt.Empty{}, nil }
"#,
        ),
    ]);
    let mut controller = Controller::new(config());
    let model = controller.run(&p.root()).unwrap();

    // Only the project package; nothing was located for the imports.
    assert_eq!(controller.packages().unwrap().len(), 1);
    let fields: Vec<_> = model.structs["m/mod/svc.In"]
        .fields
        .iter()
        .map(|f| f.ty.clone())
        .collect();
    assert!(matches!(fields[0], Type::WellKnown { .. }));
    assert!(matches!(fields[1], Type::WellKnown { .. }));
    assert!(matches!(fields[2], Type::WellKnown { .. }));
    assert!(matches!(fields[3], Type::Map { .. }));
}

#[test]
fn tests_and_hidden_paths_are_invisible() {
    let p = Project::new(&[
        ("go.mod", GO_MOD),
        (
            "svc/svc.go",
            "// @service svc\npackage svc\n\nimport \"github.com/svcgen/rt\"\n\n// @fn f\nfunc F(ctx rt.Context) error { return nil }\n",
        ),
        // Would be malformed, and unparsable.
        (
            "svc/svc_test.go",
            "package svc\n\n// @fn broken\nfunc Broken(x map[int]int) {\n",
        ),
        // Would lack a service.
        (
            ".hidden/h.go",
            "package h\n\nimport \"github.com/svcgen/rt\"\n\n// @fn h\nfunc H(ctx rt.Context) error { return nil }\n",
        ),
        ("svc/.cache/c.go", "package c\n\nfunc {\n"),
        ("testdata/t.go", "not go at all"),
    ]);
    let model = run(&p).unwrap();
    assert_eq!(model.fns.keys().collect::<Vec<_>>(), ["svc.F"]);
}

#[test]
fn excluded_fields_are_never_resolved() {
    let p = Project::new(&[
        ("go.mod", GO_MOD),
        (
            "svc/svc.go",
            r#"// @service svc
package svc

import (
	"github.com/svcgen/rt"
	"example.com/missing"
)

type In struct {
	Secret missing.Thing `json:"-"`
	Name   string        `json:"name,omitempty" validate:"required"`
}

// @fn f
func F(ctx rt.Context, in In) error { return nil }
"#,
        ),
    ]);
    let model = run(&p).unwrap();
    let in_ = &model.structs["m/mod/svc.In"];
    assert_eq!(in_.fields.len(), 1);
    let name = &in_.fields[0];
    assert_eq!(name.json_name, "name");
    assert_eq!(name.tags.json_options(), ["omitempty"]);
    assert_eq!(name.tags.get("validate"), Some(&["required".to_owned()][..]));
}

#[test]
fn unresolved_types_abort_strict_runs_and_drop_fns_in_permissive_ones() {
    let p = Project::new(&[
        ("go.mod", GO_MOD),
        (
            "svc/svc.go",
            r#"// @service svc
package svc

import (
	"github.com/svcgen/rt"
	"example.com/missing"
)

type Bad struct {
	Inner Partial
	T     missing.Thing
}

type Partial struct{ N int }

// @fn bad
func BadFn(ctx rt.Context, in Bad) error { return nil }

// @fn good
func GoodFn(ctx rt.Context) error { return nil }
"#,
        ),
    ]);

    let err = run(&p).unwrap_err();
    assert!(
        matches!(
            err,
            Error::Scan {
                source: ScanError::Resolve(ResolveError::Unresolved { .. }),
                ..
            }
        ),
        "{err:?}"
    );

    let model = run_at(&p.root(), config().with_mode(Mode::Permissive)).unwrap();
    assert_eq!(model.fns.keys().collect::<Vec<_>>(), ["svc.GoodFn"]);
    // Nothing half-resolved is left behind by the dropped function.
    assert!(model.structs.is_empty(), "{:?}", model.structs.keys());
}

#[test]
fn services_need_exactly_one_package() {
    let fn_src = |svc: &str, pkg: &str| {
        format!(
            "// @service {svc}\npackage {pkg}\n\nimport \"github.com/svcgen/rt\"\n\n// @fn f\nfunc F(ctx rt.Context) error {{ return nil }}\n"
        )
    };
    let a = fn_src("same", "a");
    let b = fn_src("same", "b");
    let p = Project::new(&[("go.mod", GO_MOD), ("a/a.go", &a), ("b/b.go", &b)]);
    match run(&p).unwrap_err() {
        Error::Service(ServiceError::DuplicateService {
            name,
            first,
            second,
        }) => {
            assert_eq!(name, "same");
            assert_eq!(first, "m/mod/a");
            assert_eq!(second, "m/mod/b");
        }
        other => panic!("expected DuplicateService, got {other:?}"),
    }

    let p = Project::new(&[
        ("go.mod", GO_MOD),
        (
            "c/c.go",
            "package c\n\nimport \"github.com/svcgen/rt\"\n\n// @fn f\nfunc F(ctx rt.Context) error { return nil }\n",
        ),
    ]);
    assert!(matches!(
        run(&p).unwrap_err(),
        Error::Service(ServiceError::MissingService { package }) if package == "m/mod/c"
    ));
}

#[test]
fn services_and_fns_are_sorted() {
    let svc = |name: &str, pkg: &str| {
        format!(
            "// @service {name}\npackage {pkg}\n\nimport \"github.com/svcgen/rt\"\n\n// @fn z\nfunc Zeta(ctx rt.Context) error {{ return nil }}\n\n// @fn a\nfunc Alpha(ctx rt.Context) error {{ return nil }}\n"
        )
    };
    let one = svc("zoo", "one");
    let two = svc("ant", "two");
    let p = Project::new(&[("go.mod", GO_MOD), ("one/x.go", &one), ("two/x.go", &two)]);
    let model = run(&p).unwrap();

    let names: Vec<_> = model.services.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["ant", "zoo"]);
    let fns: Vec<_> = model.services[0].fns.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(fns, ["Alpha", "Zeta"]);
    assert_eq!(
        model.fns.keys().collect::<Vec<_>>(),
        ["ant.Alpha", "ant.Zeta", "zoo.Alpha", "zoo.Zeta"]
    );
}

#[test]
fn missing_manifest_is_fatal() {
    let p = Project::new(&[("svc/svc.go", "package svc\n")]);
    assert!(matches!(run(&p).unwrap_err(), Error::Manifest(_)));
}

#[test]
fn runs_start_from_scratch() {
    let p = Project::new(&[
        ("go.mod", GO_MOD),
        (
            "svc/svc.go",
            "// @service svc\npackage svc\n\nimport \"github.com/svcgen/rt\"\n\ntype In struct{ A int }\n\n// @fn f\nfunc F(ctx rt.Context, in In) error { return nil }\n",
        ),
    ]);
    let mut controller = Controller::new(config());
    let first = controller.run(&p.root()).unwrap();

    fs::write(
        p.path("svc/svc.go"),
        "// @service svc\npackage svc\n\nimport \"github.com/svcgen/rt\"\n\ntype In struct{ B string }\n\n// @fn f\nfunc F(ctx rt.Context, in In) error { return nil }\n",
    )
    .unwrap();
    let second = controller.run(&p.root()).unwrap();

    assert_eq!(field_names(&first, "m/mod/svc.In"), ["A"]);
    assert_eq!(field_names(&second, "m/mod/svc.In"), ["B"]);
    assert_eq!(controller.structs().len(), 1);
}
