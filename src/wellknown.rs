//! Registry of fully-qualified names resolved to [`WellKnown`] leaves.

use crate::types::WellKnown;
use std::collections::HashMap;

/// Framework module used when none is configured.
pub const DEFAULT_FRAMEWORK: &str = "github.com/svcgen/rt";

#[derive(Debug, Clone)]
pub struct Registry {
    framework: String,
    /// Package path to its (type name, well-known) entries.
    by_package: HashMap<String, Vec<(&'static str, WellKnown)>>,
}

impl Registry {
    pub fn new(framework: &str) -> Self {
        let framework = framework.trim_end_matches('/').to_owned();
        let json = format!("{framework}/json");
        let entries = [
            (framework.clone(), "Context", WellKnown::Context),
            (framework.clone(), "Empty", WellKnown::Empty),
            (framework.clone(), "Error", WellKnown::Error),
            (json.clone(), "RawMessage", WellKnown::RawMessage),
            (json.clone(), "Object", WellKnown::JsonObject),
            (json.clone(), "Array", WellKnown::JsonArray),
            (json.clone(), "Date", WellKnown::JsonDate),
            (json, "Time", WellKnown::JsonTime),
            ("time".to_owned(), "Time", WellKnown::Time),
            ("encoding/json".to_owned(), "RawMessage", WellKnown::StdRawMessage),
        ];
        let mut by_package: HashMap<String, Vec<(&'static str, WellKnown)>> = HashMap::new();
        for (pkg, name, wk) in entries {
            by_package.entry(pkg).or_default().push((name, wk));
        }
        Self {
            framework,
            by_package,
        }
    }

    pub fn framework(&self) -> &str {
        &self.framework
    }

    pub fn lookup(&self, package: &str, name: &str) -> Option<WellKnown> {
        self.by_package
            .get(package)?
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, wk)| *wk)
    }

    /// Fully-qualified name of a registry entry; `None` for syntactic ones.
    pub fn qualified_name(&self, wk: WellKnown) -> Option<String> {
        self.by_package.iter().find_map(|(pkg, entries)| {
            entries
                .iter()
                .find(|(_, v)| *v == wk)
                .map(|(n, _)| format!("{pkg}.{n}"))
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_FRAMEWORK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_framework_entries() {
        let r = Registry::default();
        assert_eq!(r.lookup(DEFAULT_FRAMEWORK, "Context"), Some(WellKnown::Context));
        assert_eq!(
            r.lookup("github.com/svcgen/rt/json", "Object"),
            Some(WellKnown::JsonObject)
        );
        assert_eq!(r.lookup("time", "Time"), Some(WellKnown::Time));
        assert_eq!(r.lookup("time", "Duration"), None);
        assert_eq!(
            r.lookup("encoding/json", "RawMessage"),
            Some(WellKnown::StdRawMessage)
        );
    }

    #[test]
    fn custom_framework() {
        let r = Registry::new("example.com/fw/");
        assert_eq!(r.framework(), "example.com/fw");
        assert_eq!(r.lookup("example.com/fw", "Error"), Some(WellKnown::Error));
        assert_eq!(r.lookup(DEFAULT_FRAMEWORK, "Error"), None);
        assert_eq!(
            r.qualified_name(WellKnown::JsonDate).as_deref(),
            Some("example.com/fw/json.Date")
        );
        assert_eq!(r.qualified_name(WellKnown::Any), None);
    }
}
