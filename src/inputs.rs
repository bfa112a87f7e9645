//! Loading of the documents a build starts from: the compose file, `.lagoon.yml` (with its
//! optional override), and the project and environment variables from the API.
mod compose;
mod lagoon_yaml;
mod variables;

pub use self::compose::{ComposeFile, ComposeService, ComposeVolume, Labels};
pub use self::lagoon_yaml::{
    merge_yaml, AutogenerateConfig, BackupRetentionConfig, BackupScheduleConfig, CronjobConfig,
    EnvironmentConfig, FastlyConfig, LagoonYaml, ProductionRoutes, RegistryConfig, RetentionConfig,
    RouteConfig, RouteEntry, RouteSet, ServiceRoutes,
};
pub use self::variables::{
    get_variable, merge_variables, EnvironmentVariable, Scope, BUILD_SCOPES, REGISTRY_SCOPES,
};

use crate::config::BuildEnv;

use anyhow::{anyhow, Context};
use serde_yaml::Value;

use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_LAGOON_YML: &str = ".lagoon.yml";
pub const DEFAULT_COMPOSE_YML: &str = "docker-compose.yml";

/// The parsed inputs of a single build
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildInputs {
    pub lagoon_yaml: LagoonYaml,
    pub compose: ComposeFile,
    pub project_variables: Vec<EnvironmentVariable>,
    pub environment_variables: Vec<EnvironmentVariable>,
    /// Resolved image references keyed by compose service name
    pub images: HashMap<String, String>,
}

impl BuildInputs {
    /// Parses all inputs from their source text. The `.lagoon.yml` override is taken from the
    /// build environment, either inline as `LAGOON_YAML_OVERRIDE` or from the variable that
    /// `LAGOON_YAML_OVERRIDE_VARIABLE` names.
    pub fn from_sources(
        lagoon_yml: &str,
        compose_yml: &str,
        project_variables_json: &str,
        environment_variables_json: &str,
        env: &BuildEnv,
    ) -> anyhow::Result<BuildInputs> {
        let lagoon_yaml = parse_lagoon_yml(lagoon_yml, env)?;
        let compose: ComposeFile =
            serde_yaml::from_str(compose_yml).context("invalid docker-compose file")?;
        let project_variables = parse_variables(project_variables_json)
            .context("invalid project variables")?;
        let environment_variables = parse_variables(environment_variables_json)
            .context("invalid environment variables")?;
        Ok(BuildInputs {
            lagoon_yaml,
            compose,
            project_variables,
            environment_variables,
            images: HashMap::new(),
        })
    }

    /// Reads `.lagoon.yml` and the compose file it points to from a checked out repository.
    /// Variables come from `LAGOON_PROJECT_VARIABLES` and `LAGOON_ENVIRONMENT_VARIABLES`.
    pub fn from_directory(dir: &Path, env: &BuildEnv) -> anyhow::Result<BuildInputs> {
        let lagoon_path = dir.join(DEFAULT_LAGOON_YML);
        let lagoon_yml = std::fs::read_to_string(&lagoon_path)
            .with_context(|| format!("failed to read {}", lagoon_path.display()))?;

        let compose_name = parse_lagoon_yml(&lagoon_yml, env)?
            .docker_compose_yaml
            .unwrap_or_else(|| DEFAULT_COMPOSE_YML.to_owned());
        let compose_path = dir.join(compose_name);
        let compose_yml = std::fs::read_to_string(&compose_path)
            .with_context(|| format!("failed to read {}", compose_path.display()))?;

        BuildInputs::from_sources(
            &lagoon_yml,
            &compose_yml,
            env.get_or("LAGOON_PROJECT_VARIABLES", "[]"),
            env.get_or("LAGOON_ENVIRONMENT_VARIABLES", "[]"),
            env,
        )
    }

    pub fn with_image(mut self, service: impl Into<String>, image: impl Into<String>) -> Self {
        self.images.insert(service.into(), image.into());
        self
    }
}

fn parse_variables(json: &str) -> anyhow::Result<Vec<EnvironmentVariable>> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(json)?)
}

fn parse_lagoon_yml(lagoon_yml: &str, env: &BuildEnv) -> anyhow::Result<LagoonYaml> {
    let mut document: Value = serde_yaml::from_str(lagoon_yml).context("invalid .lagoon.yml")?;
    if document.is_null() {
        document = Value::Mapping(Default::default());
    }

    if let Some(overlay) = load_override(env)? {
        let project_key = Value::String(env.get_or("PROJECT", "").to_owned());
        // override files may hold documents for several projects, keyed by project name
        let overlay = match overlay {
            Value::Mapping(mut map) if map.contains_key(&project_key) => {
                map.remove(&project_key).unwrap_or(Value::Null)
            }
            other => other,
        };
        log::debug!("Applying .lagoon.yml override");
        merge_yaml(&mut document, overlay);
    }

    serde_yaml::from_value(document).context("invalid .lagoon.yml")
}

fn load_override(env: &BuildEnv) -> anyhow::Result<Option<Value>> {
    let encoded = match env.get("LAGOON_YAML_OVERRIDE") {
        Some(inline) => inline,
        None => match env.get("LAGOON_YAML_OVERRIDE_VARIABLE") {
            Some(var_name) => env.get(var_name).ok_or_else(|| {
                anyhow!(
                    "LAGOON_YAML_OVERRIDE_VARIABLE names '{}', which is not set",
                    var_name
                )
            })?,
            None => return Ok(None),
        },
    };
    let decoded = base64::decode(encoded.trim()).context("invalid base64 in .lagoon.yml override")?;
    let overlay: Value =
        serde_yaml::from_slice(&decoded).context("invalid yaml in .lagoon.yml override")?;
    Ok(Some(overlay))
}

#[cfg(test)]
mod test {
    use super::*;

    const LAGOON_YML: &str = r#"
docker-compose-yaml: docker-compose.yml
environments:
  main:
    types:
      mariadb: mariadb-single
"#;

    const COMPOSE_YML: &str = r#"
services:
  mariadb:
    image: uselagoon/mariadb-10.6-drupal
    labels:
      lagoon.type: mariadb
"#;

    #[test]
    fn inputs_without_override_are_parsed() {
        let env = BuildEnv::default().with("PROJECT", "example");
        let inputs = BuildInputs::from_sources(
            LAGOON_YML,
            COMPOSE_YML,
            r#"[{"name": "A", "value": "1", "scope": "build"}]"#,
            "",
            &env,
        )
        .expect("failed to load inputs");
        assert_eq!(1, inputs.compose.services.len());
        assert_eq!(1, inputs.project_variables.len());
        assert!(inputs.environment_variables.is_empty());
        assert_eq!(
            "mariadb-single",
            inputs.lagoon_yaml.environment("main").unwrap().types["mariadb"]
        );
    }

    #[test]
    fn project_keyed_override_is_applied() {
        let overlay = r#"
example:
  environments:
    main:
      types:
        mariadb: mariadb-dbaas
other-project:
  environments:
    main:
      types:
        mariadb: none
"#;
        let env = BuildEnv::default()
            .with("PROJECT", "example")
            .with("LAGOON_YAML_OVERRIDE_VARIABLE", "MY_OVERRIDE")
            .with("MY_OVERRIDE", base64::encode(overlay));
        let inputs = BuildInputs::from_sources(LAGOON_YML, COMPOSE_YML, "[]", "[]", &env)
            .expect("failed to load inputs");
        assert_eq!(
            "mariadb-dbaas",
            inputs.lagoon_yaml.environment("main").unwrap().types["mariadb"]
        );
    }

    #[test]
    fn invalid_override_is_an_error() {
        let env = BuildEnv::default().with("LAGOON_YAML_OVERRIDE", "not base64!");
        let err = BuildInputs::from_sources(LAGOON_YML, COMPOSE_YML, "[]", "[]", &env)
            .expect_err("expected an error");
        assert!(format!("{:#}", err).contains("base64"));
    }
}
