use crate::generator::precedence::{Resolver, Source};
use crate::generator::ConfigError;
use crate::inputs::{LagoonYaml, RegistryConfig, REGISTRY_SCOPES};

/// Credentials for a private container registry, along with where each of them came from
#[derive(Clone, PartialEq, Serialize)]
pub struct ContainerRegistry {
    pub name: String,
    pub url: Option<String>,
    pub username: String,
    pub password: String,
    pub username_origin: String,
    pub password_origin: String,
}

impl std::fmt::Debug for ContainerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("ContainerRegistry")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("username_origin", &self.username_origin)
            .field("password_origin", &self.password_origin)
            .finish()
    }
}

/// The name of a registry as it appears in variable names, e.g. `my-registry` becomes `MY_REGISTRY`
fn variable_fragment(name: &str) -> String {
    name.to_ascii_uppercase().replace('-', "_")
}

/// The sources for one credential field: an API variable specific to the registry, then a
/// variable named by the value in `.lagoon.yml`, then the literal value from `.lagoon.yml`
fn credential_sources<'a>(name: &str, field: &str, yaml_value: Option<&str>) -> Vec<Source<'a>> {
    let mut sources = vec![Source::variable(
        format!("REGISTRY_{}_{}", variable_fragment(name), field),
        REGISTRY_SCOPES,
    )];
    if let Some(value) = yaml_value {
        sources.push(Source::variable(value, REGISTRY_SCOPES));
        sources.push(Source::literal(
            value,
            format!(".lagoon.yml container-registries.{}", name),
        ));
    }
    sources
}

fn resolve_registry(
    resolver: &Resolver<'_>,
    name: &str,
    config: &RegistryConfig,
) -> Result<ContainerRegistry, ConfigError> {
    let resolve_field = |field: &'static str, yaml_value: Option<&str>| {
        let sources = credential_sources(name, field, yaml_value);
        resolver
            .resolve(&sources)
            .ok_or_else(|| ConfigError::RegistryCredentials {
                registry: name.to_owned(),
                field,
                searched: Resolver::describe(&sources),
            })
    };
    let username = resolve_field("USERNAME", config.username.as_deref())?;
    let password = resolve_field("PASSWORD", config.password.as_deref())?;
    log::debug!(
        "container registry {} uses username from {} and password from {}",
        name,
        username.origin,
        password.origin
    );
    Ok(ContainerRegistry {
        name: name.to_owned(),
        url: config.url.clone(),
        username: username.value,
        password: password.value,
        username_origin: username.origin,
        password_origin: password.origin,
    })
}

pub fn resolve_registries(
    resolver: &Resolver<'_>,
    yaml: &LagoonYaml,
) -> Result<Vec<ContainerRegistry>, ConfigError> {
    yaml.container_registries
        .iter()
        .map(|(name, config)| resolve_registry(resolver, name, config))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::BuildEnv;
    use crate::inputs::{EnvironmentVariable, Scope};

    fn yaml() -> LagoonYaml {
        serde_yaml::from_str(
            r#"
container-registries:
  my-registry:
    username: myuser
    password: MY_REGISTRY_PASSWORD
    url: registry.example.com
"#,
        )
        .unwrap()
    }

    #[test]
    fn api_override_beats_named_variable_and_literal() {
        let env = BuildEnv::default();
        let vars = vec![
            EnvironmentVariable::new("REGISTRY_MY_REGISTRY_USERNAME", "apiuser", Scope::ContainerRegistry),
            EnvironmentVariable::new("MY_REGISTRY_PASSWORD", "s3cret", Scope::ContainerRegistry),
        ];
        let registries = resolve_registries(&Resolver::new(&env, &vars), &yaml()).unwrap();
        assert_eq!(1, registries.len());
        let registry = &registries[0];
        assert_eq!("apiuser", registry.username);
        assert_eq!(
            "lagoon variable REGISTRY_MY_REGISTRY_USERNAME (scope container_registry|global)",
            registry.username_origin
        );
        assert_eq!("s3cret", registry.password);
        assert_eq!(
            "lagoon variable MY_REGISTRY_PASSWORD (scope container_registry|global)",
            registry.password_origin
        );
        assert!(!format!("{:?}", registry).contains("s3cret"));
    }

    #[test]
    fn literal_yaml_value_is_the_last_resort() {
        let env = BuildEnv::default();
        let vars = Vec::new();
        let registries = resolve_registries(&Resolver::new(&env, &vars), &yaml()).unwrap();
        assert_eq!("myuser", registries[0].username);
        assert_eq!("MY_REGISTRY_PASSWORD", registries[0].password);
        assert_eq!(
            ".lagoon.yml container-registries.my-registry",
            registries[0].password_origin
        );
    }

    #[test]
    fn missing_credentials_report_where_they_were_looked_for() {
        let env = BuildEnv::default();
        let vars = Vec::new();
        let yaml: LagoonYaml = serde_yaml::from_str(
            "container-registries:\n  other:\n    username: someone\n",
        )
        .unwrap();
        let err = resolve_registries(&Resolver::new(&env, &vars), &yaml).unwrap_err();
        match err {
            ConfigError::RegistryCredentials { registry, field, searched } => {
                assert_eq!("other", registry);
                assert_eq!("PASSWORD", field);
                assert!(searched.contains("REGISTRY_OTHER_PASSWORD"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
