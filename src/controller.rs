//! Runs the whole pipeline over one project.

use crate::cache::StructCache;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fileset::build_file_set;
use crate::locator::Locator;
use crate::manifest::read_manifest;
use crate::package::{load_package, Package, PackageStore};
use crate::scanner::{Function, Scanner};
use crate::service::{aggregate, Service};
use crate::types::Struct;
use crate::wellknown::Registry;
use indexmap::IndexMap;
use serde::Serialize;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, info, info_span};

/// Result of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Model {
    pub module: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub go_version: Option<String>,
    pub services: Vec<Service>,
    /// By canonical key, sorted.
    pub structs: IndexMap<String, Struct>,
    /// By `service.name`, sorted.
    pub fns: IndexMap<String, Function>,
}

impl Model {
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name == name)
    }
}

/// Owns the caches of a run. Each [`Controller::run`] starts from scratch.
#[derive(Debug)]
pub struct Controller {
    config: Config,
    registry: Registry,
    packages: Option<PackageStore>,
    structs: StructCache,
}

impl Controller {
    pub fn new(config: Config) -> Self {
        let registry = Registry::new(&config.framework);
        Self {
            config,
            registry,
            packages: None,
            structs: StructCache::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Packages loaded by the last run, project and dependencies alike.
    pub fn packages(&self) -> Option<&PackageStore> {
        self.packages.as_ref()
    }

    pub fn structs(&self) -> &StructCache {
        &self.structs
    }

    pub fn run(&mut self, project_dir: &Path) -> Result<Model> {
        let span = info_span!("run", project = %project_dir.display());
        let _enter = span.enter();

        self.structs.clear();
        self.packages = None;

        let module = read_manifest(project_dir)?;
        info!(module = %module.name, requires = module.requires.len(), "manifest read");

        let locator = Locator::new(project_dir, &module, &self.config);
        let mut store = PackageStore::new(locator);

        let tree = build_file_set(project_dir, &module.name)?;
        let mut packages: Vec<Rc<Package>> = Vec::new();
        for node in tree.packages() {
            let pkg = load_package(&node.import_path, &node.dir, &module.name, &node.files)
                .map_err(|source| Error::Load {
                    package: node.import_path.clone(),
                    source,
                })?;
            debug!(package = %pkg.import_path, files = pkg.files.len(), "project package loaded");
            packages.push(store.insert(pkg));
        }

        let mut fns = Vec::new();
        {
            let mut scanner =
                Scanner::new(&self.registry, &mut store, &mut self.structs, self.config.mode);
            for pkg in &packages {
                let found = scanner.scan_package(pkg).map_err(|source| Error::Scan {
                    package: pkg.import_path.clone(),
                    source,
                })?;
                fns.extend(found);
            }
        }

        let services = aggregate(fns, &packages, &self.structs)?;

        let mut structs: IndexMap<String, Struct> = self
            .structs
            .iter()
            .map(|(k, s)| (k.to_owned(), s.clone()))
            .collect();
        structs.sort_keys();

        let mut by_key: IndexMap<String, Function> = services
            .iter()
            .flat_map(|s| s.fns.iter())
            .map(|f| (f.key(), f.clone()))
            .collect();
        by_key.sort_keys();

        info!(
            services = services.len(),
            fns = by_key.len(),
            structs = structs.len(),
            packages = store.len(),
            "run complete"
        );
        self.packages = Some(store);

        Ok(Model {
            module: module.name,
            go_version: module.go_version,
            services,
            structs,
            fns: by_key,
        })
    }
}

