//! Cascading overrides. Almost every effective value in a build is looked up from several places
//! in a fixed order, and the first one that's set wins. The sources are described as data so the
//! origin of each resolved value can be reported back to the user.
use crate::config::BuildEnv;
use crate::inputs::{get_variable, EnvironmentVariable, Scope};

use std::fmt::{self, Display};

/// One place a value may come from
#[derive(Debug, Clone, PartialEq)]
pub enum Source<'a> {
    /// A variable of the build pod's environment
    BuildEnv(String),
    /// A variable from the Lagoon API, visible only if it has one of the given scopes
    Variable { name: String, scopes: &'a [Scope] },
    /// A fixed value, along with a description of where it came from
    Literal { value: String, origin: String },
}

impl<'a> Source<'a> {
    pub fn build_env(name: impl Into<String>) -> Self {
        Source::BuildEnv(name.into())
    }

    pub fn variable(name: impl Into<String>, scopes: &'a [Scope]) -> Self {
        Source::Variable {
            name: name.into(),
            scopes,
        }
    }

    pub fn literal(value: impl Into<String>, origin: impl Into<String>) -> Self {
        Source::Literal {
            value: value.into(),
            origin: origin.into(),
        }
    }
}

impl<'a> Display for Source<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Source::BuildEnv(name) => write!(f, "build variable {}", name),
            Source::Variable { name, scopes } => {
                let scopes: Vec<String> = scopes.iter().map(Scope::to_string).collect();
                write!(f, "lagoon variable {} (scope {})", name, scopes.join("|"))
            }
            Source::Literal { origin, .. } => f.write_str(origin),
        }
    }
}

/// A resolved value and a human readable description of the source that supplied it
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub value: String,
    pub origin: String,
}

impl Resolved {
    pub fn as_str(&self) -> &str {
        self.value.as_str()
    }
}

/// Looks values up from the build environment and the merged Lagoon variables
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    env: &'a BuildEnv,
    variables: &'a [EnvironmentVariable],
}

impl<'a> Resolver<'a> {
    pub fn new(env: &'a BuildEnv, variables: &'a [EnvironmentVariable]) -> Resolver<'a> {
        Resolver { env, variables }
    }

    pub fn env(&self) -> &'a BuildEnv {
        self.env
    }

    pub fn variables(&self) -> &'a [EnvironmentVariable] {
        self.variables
    }

    /// Returns the value of the first source that is set to a non-empty value
    pub fn resolve(&self, sources: &[Source<'_>]) -> Option<Resolved> {
        sources.iter().find_map(|source| {
            self.lookup(source).map(|value| Resolved {
                value: value.to_owned(),
                origin: source.to_string(),
            })
        })
    }

    /// Returns a description of every source that was consulted, for use in error messages
    pub fn describe(sources: &[Source<'_>]) -> String {
        let described: Vec<String> = sources.iter().map(Source::to_string).collect();
        described.join(", ")
    }

    /// Shorthand for looking up a single Lagoon variable
    pub fn variable(&self, name: &str, scopes: &[Scope]) -> Option<&'a str> {
        get_variable(self.variables, name, scopes).map(|var| var.value.as_str())
    }

    fn lookup<'s>(&self, source: &'s Source<'_>) -> Option<&'s str>
    where
        'a: 's,
    {
        match source {
            Source::BuildEnv(name) => self.env.get(name),
            Source::Variable { name, scopes } => self.variable(name, scopes),
            Source::Literal { value, .. } => Some(value.as_str()).filter(|v| !v.is_empty()),
        }
    }
}
