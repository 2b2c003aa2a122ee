//! Annotated-function discovery and type resolution for Go service projects.
//!
//! - `go.mod` is read, packages are located on disk (own module, `vendor/`,
//!   replacements, module cache, `GOROOT`) and parsed with `svcgen-syntax`.
//! - Functions documented with `@fn` are validated and their carried
//!   parameter and result are resolved into a [`Type`] graph whose structs
//!   are interned by canonical key.
//! - Functions are grouped into services by their package's `@service`.
//!
//! ```no_run
//! use svcgen::{Config, Controller};
//!
//! let mut controller = Controller::new(Config::from_env()?);
//! let model = controller.run(std::path::Path::new("/src/project"))?;
//! println!("{}", model.to_json_pretty()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod annotations;
pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod fileset;
pub mod imports;
pub mod locator;
pub mod manifest;
pub mod package;
pub mod resolver;
pub mod scanner;
pub mod service;
pub mod tags;
pub mod types;
pub mod wellknown;

// Re-exports for convenience
pub use annotations::{AnnotationName, Annotations};
pub use config::{Config, Mode};
pub use controller::{Controller, Model};
pub use error::{Error, Result};
pub use scanner::{FnField, Function};
pub use service::Service;
pub use types::{Builtin, Field, Struct, Type, WellKnown};
