//! Project and environment variables as they are delivered by the Lagoon API
use std::fmt::{self, Display};

/// Where a variable is made available. Unknown scopes are preserved as `Other` so that a newer
/// API never breaks a build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Scope {
    Global,
    Build,
    Runtime,
    InternalSystem,
    ContainerRegistry,
    Other(String),
}

impl From<String> for Scope {
    fn from(value: String) -> Scope {
        match value.as_str() {
            "global" => Scope::Global,
            "build" => Scope::Build,
            "runtime" => Scope::Runtime,
            "internal_system" => Scope::InternalSystem,
            "container_registry" => Scope::ContainerRegistry,
            _ => Scope::Other(value),
        }
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> String {
        scope.to_string()
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Scope::Global => "global",
            Scope::Build => "build",
            Scope::Runtime => "runtime",
            Scope::InternalSystem => "internal_system",
            Scope::ContainerRegistry => "container_registry",
            Scope::Other(other) => other.as_str(),
        };
        f.write_str(name)
    }
}

/// The scopes whose variables are visible while the build is running
pub static BUILD_SCOPES: &[Scope] = &[Scope::Build, Scope::Global];

/// The scopes that may carry container registry credentials
pub static REGISTRY_SCOPES: &[Scope] = &[Scope::ContainerRegistry, Scope::Global];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
    pub scope: Scope,
}

impl EnvironmentVariable {
    pub fn new(name: impl Into<String>, value: impl Into<String>, scope: Scope) -> Self {
        EnvironmentVariable {
            name: name.into(),
            value: value.into(),
            scope,
        }
    }
}

/// Merges project and environment variables into a single list. Order follows first appearance
/// of each name, and a later variable with the same name replaces the value and scope of an
/// earlier one, so environment variables shadow project variables.
pub fn merge_variables(
    project: &[EnvironmentVariable],
    environment: &[EnvironmentVariable],
) -> Vec<EnvironmentVariable> {
    let mut merged: Vec<EnvironmentVariable> = Vec::with_capacity(project.len() + environment.len());
    for var in project.iter().chain(environment.iter()) {
        match merged.iter_mut().find(|existing| existing.name == var.name) {
            Some(existing) => {
                existing.value = var.value.clone();
                existing.scope = var.scope.clone();
            }
            None => merged.push(var.clone()),
        }
    }
    merged
}

/// Returns the variable with the given name if its scope is one of `scopes`. Variables with an
/// empty value are treated as unset.
pub fn get_variable<'a>(
    variables: &'a [EnvironmentVariable],
    name: &str,
    scopes: &[Scope],
) -> Option<&'a EnvironmentVariable> {
    variables
        .iter()
        .find(|var| var.name == name && scopes.contains(&var.scope) && !var.value.is_empty())
}

#[cfg(test)]
mod test {
    use super::*;

    fn var(name: &str, value: &str, scope: Scope) -> EnvironmentVariable {
        EnvironmentVariable::new(name, value, scope)
    }

    #[test]
    fn environment_variables_shadow_project_variables() {
        let project = vec![
            var("A", "project-a", Scope::Global),
            var("B", "project-b", Scope::Build),
        ];
        let environment = vec![
            var("B", "env-b", Scope::Runtime),
            var("C", "env-c", Scope::Global),
        ];
        let merged = merge_variables(&project, &environment);
        assert_eq!(
            vec![
                var("A", "project-a", Scope::Global),
                var("B", "env-b", Scope::Runtime),
                var("C", "env-c", Scope::Global),
            ],
            merged
        );
    }

    #[test]
    fn merging_a_list_with_itself_is_idempotent() {
        let vars = vec![
            var("A", "1", Scope::Global),
            var("B", "2", Scope::Build),
            var("C", "3", Scope::ContainerRegistry),
        ];
        assert_eq!(vars, merge_variables(&vars, &vars));
        let merged = merge_variables(&vars, &[]);
        assert_eq!(merged, merge_variables(&merged, &merged));
    }

    #[test]
    fn get_variable_respects_scopes() {
        let vars = vec![
            var("RUNTIME_ONLY", "x", Scope::Runtime),
            var("BUILD", "y", Scope::Build),
            var("EMPTY", "", Scope::Build),
        ];
        assert!(get_variable(&vars, "RUNTIME_ONLY", BUILD_SCOPES).is_none());
        assert_eq!("y", get_variable(&vars, "BUILD", BUILD_SCOPES).unwrap().value);
        assert!(get_variable(&vars, "EMPTY", BUILD_SCOPES).is_none());
    }

    #[test]
    fn scopes_are_deserialized_from_api_strings() {
        let vars: Vec<EnvironmentVariable> = serde_json::from_str(
            r#"[
                {"name": "A", "value": "1", "scope": "internal_system"},
                {"name": "B", "value": "2", "scope": "something_new"}
            ]"#,
        )
        .expect("failed to parse variables");
        assert_eq!(Scope::InternalSystem, vars[0].scope);
        assert_eq!(Scope::Other("something_new".to_owned()), vars[1].scope);
        assert_eq!("internal_system", vars[0].scope.to_string());
    }
}
