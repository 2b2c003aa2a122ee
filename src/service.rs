//! Grouping of functions into services.

use crate::annotations::{AnnotationName, Annotations};
use crate::cache::StructCache;
use crate::package::Package;
use crate::scanner::Function;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("package {package} declares @fn functions but has no @service annotation")]
    MissingService { package: String },
    #[error("service {name:?} is declared by both {first} and {second}")]
    DuplicateService {
        name: String,
        first: String,
        second: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Service {
    pub name: String,
    pub package: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms: Option<String>,
    pub internal: bool,
    /// Merged package doc annotations.
    pub annotations: Annotations,
    /// Canonical keys of every struct reachable from the functions, sorted.
    pub components: Vec<String>,
    /// Sorted by name.
    pub fns: Vec<Function>,
}

/// Builds one service per package with functions, sorted by name.
pub fn aggregate(
    fns: Vec<Function>,
    packages: &[Rc<Package>],
    cache: &StructCache,
) -> Result<Vec<Service>, ServiceError> {
    let mut by_package: IndexMap<String, Vec<Function>> = IndexMap::new();
    for f in fns {
        by_package.entry(f.package.clone()).or_default().push(f);
    }

    let mut seen: HashMap<String, String> = HashMap::new();
    let mut services = Vec::with_capacity(by_package.len());

    for (package, mut fns) in by_package {
        let annotations = packages
            .iter()
            .find(|p| p.import_path == package)
            .map(|p| p.doc_annotations())
            .unwrap_or_default();
        let name = match annotations.get(AnnotationName::Service) {
            Some(n) if !n.is_empty() => n.to_owned(),
            _ => return Err(ServiceError::MissingService { package }),
        };
        if let Some(first) = seen.insert(name.clone(), package.clone()) {
            return Err(ServiceError::DuplicateService {
                name,
                first,
                second: package,
            });
        }

        fns.sort_by(|a, b| a.name.cmp(&b.name));
        let text = |a: AnnotationName| annotations.get(a).map(str::to_owned);
        services.push(Service {
            title: text(AnnotationName::Title),
            description: text(AnnotationName::Description),
            terms: text(AnnotationName::Terms),
            internal: annotations.flag(AnnotationName::Internal),
            components: components(&fns, cache),
            name,
            package,
            annotations: annotations.clone(),
            fns,
        });
    }

    services.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(services)
}

/// Struct keys reachable from the carried types of `fns`.
pub fn components(fns: &[Function], cache: &StructCache) -> Vec<String> {
    let mut queue: VecDeque<&str> = VecDeque::new();
    for f in fns {
        for field in f.param.iter().chain(f.result.iter()) {
            field.ty.for_each_struct(&mut |k| queue.push_back(k));
        }
    }

    let mut seen: BTreeSet<&str> = BTreeSet::new();
    while let Some(key) = queue.pop_front() {
        if !seen.insert(key) {
            continue;
        }
        if let Some(s) = cache.get(key) {
            for field in &s.fields {
                field.ty.for_each_struct(&mut |k| queue.push_back(k));
            }
        }
    }
    seen.into_iter().map(str::to_owned).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::FnField;
    use crate::tags::Tags;
    use crate::types::{Field, Struct, Type};
    use std::path::PathBuf;

    fn func(package: &str, name: &str, param: Option<&str>) -> Function {
        Function {
            service: String::new(),
            name: name.into(),
            package: package.into(),
            file: PathBuf::from("x.go"),
            line: 1,
            param: param.map(|k| FnField {
                name: Some("in".into()),
                ty: Type::pointer(Type::struct_ref(k)),
            }),
            result: None,
            annotations: Annotations::new(),
            doc: String::new(),
        }
    }

    fn strukt(cache: &mut StructCache, key: &str, refs: &[&str]) {
        let (package, name) = key.rsplit_once('.').unwrap();
        cache.begin(key);
        cache.finish(
            key,
            Struct {
                package: package.into(),
                name: name.into(),
                fields: refs
                    .iter()
                    .enumerate()
                    .map(|(i, r)| Field {
                        name: format!("F{i}"),
                        json_name: format!("F{i}"),
                        ty: Type::array(Type::struct_ref(*r)),
                        tags: Tags::default(),
                        annotations: Annotations::new(),
                        exported: true,
                        doc: String::new(),
                    })
                    .collect(),
                annotations: Annotations::new(),
                exported: true,
                doc: String::new(),
            },
        );
    }

    #[test]
    fn components_follow_fields_through_cycles() {
        let mut cache = StructCache::new();
        strukt(&mut cache, "p.B", &["p.C"]);
        strukt(&mut cache, "p.C", &["p.B"]);
        strukt(&mut cache, "p.A", &["p.B"]);
        strukt(&mut cache, "p.Unused", &[]);
        let fns = vec![func("p", "F", Some("p.A"))];
        assert_eq!(components(&fns, &cache), ["p.A", "p.B", "p.C"]);
    }

    #[test]
    fn functions_without_packages_need_a_service() {
        let err = aggregate(vec![func("m/x", "F", None)], &[], &StructCache::new()).unwrap_err();
        assert_eq!(
            err,
            ServiceError::MissingService {
                package: "m/x".into()
            }
        );
    }

    #[test]
    fn no_functions_no_services() {
        assert!(aggregate(Vec::new(), &[], &StructCache::new()).unwrap().is_empty());
    }
}
