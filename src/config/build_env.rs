use std::collections::HashMap;

/// An immutable snapshot of the build pod's environment. It's captured once when the build
/// starts and then passed by reference to everything that needs to look up a value, so that
/// resolution never depends on ad hoc reads of the process environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildEnv {
    values: HashMap<String, String>,
}

impl BuildEnv {
    /// Captures the current process environment
    pub fn from_process() -> BuildEnv {
        BuildEnv::from_pairs(std::env::vars())
    }

    pub fn from_pairs<K, V, I>(pairs: I) -> BuildEnv
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        BuildEnv { values }
    }

    /// Returns a copy of this snapshot with the given value added or replaced
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> BuildEnv {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Returns the value if it is set. Empty values are treated the same as unset ones.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn get_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get(name).unwrap_or(default)
    }

    /// Returns true only for the values `true`, `enabled`, `yes` and `1`, ignoring case
    pub fn is_true(&self, name: &str) -> bool {
        self.get(name).map(parse_truthy).unwrap_or(false)
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

pub(crate) fn parse_truthy(value: &str) -> bool {
    parse_bool(value) == Some(true)
}

/// `None` for anything that isn't one of the recognized true or false spellings
pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "enabled" | "yes" | "1" => Some(true),
        "false" | "disabled" | "no" | "0" => Some(false),
        _ => None,
    }
}
