//! Assembly of the `BuildValues` for one environment build. Every resolver here reads the build
//! environment through an explicit `BuildEnv` snapshot and the Lagoon variables through a
//! `Resolver`, so the whole model is a pure function of its inputs plus the answers of the DBaaS
//! provider.
pub mod backups;
pub mod crontab;
pub mod cronjobs;
pub mod dbaas;
pub mod flags;
pub mod precedence;
pub mod registries;
pub mod routes;
pub mod service_types;
pub mod services;

use self::backups::{resolve_backups, BackupConfiguration, BackupContext};
use self::dbaas::{DbaasFallback, DbaasProvider, RetryPolicy};
use self::flags::FeatureFlags;
use self::precedence::Resolver;
use self::registries::{resolve_registries, ContainerRegistry};
use self::routes::{resolve_routes, RouteContext, RouteV2};
use self::services::{
    resolve_custom_volumes, resolve_services, CustomVolume, ServiceContext, ServiceValues,
};
use crate::config::BuildEnv;
use crate::inputs::{merge_variables, BuildInputs, EnvironmentVariable};
use crate::naming::make_safe;

use std::fmt::{self, Display};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildType {
    Branch,
    Promote,
    PullRequest,
}

impl FromStr for BuildType {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<BuildType, ConfigError> {
        match value {
            "branch" => Ok(BuildType::Branch),
            "promote" => Ok(BuildType::Promote),
            "pullrequest" => Ok(BuildType::PullRequest),
            other => Err(ConfigError::InvalidValue {
                field: "BUILD_TYPE".to_owned(),
                value: other.to_owned(),
                reason: "must be one of branch, promote or pullrequest".to_owned(),
            }),
        }
    }
}

impl Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            BuildType::Branch => "branch",
            BuildType::Promote => "promote",
            BuildType::PullRequest => "pullrequest",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentType {
    Production,
    Development,
}

impl FromStr for EnvironmentType {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<EnvironmentType, ConfigError> {
        match value {
            "production" => Ok(EnvironmentType::Production),
            "development" => Ok(EnvironmentType::Development),
            other => Err(ConfigError::InvalidValue {
                field: "ENVIRONMENT_TYPE".to_owned(),
                value: other.to_owned(),
                reason: "must be either production or development".to_owned(),
            }),
        }
    }
}

impl Display for EnvironmentType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EnvironmentType::Production => f.write_str("production"),
            EnvironmentType::Development => f.write_str("development"),
        }
    }
}

/// A fatal problem with the configuration of a build. These are surfaced to the user verbatim,
/// so every variant names the field or service at fault.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    MissingRequired(&'static str),
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
    MissingServiceType {
        service: String,
    },
    UnknownServiceType {
        service: String,
        service_type: String,
    },
    InvalidQuantity {
        service: String,
        value: String,
    },
    MissingPersistentPath {
        service: String,
        service_type: String,
    },
    MissingLinkedService {
        service: String,
        service_type: String,
        container: &'static str,
    },
    DbaasUnavailable {
        service: String,
        reason: String,
    },
    InvalidCron {
        schedule: String,
        reason: String,
    },
    DuplicateCronjob {
        service: String,
        name: String,
    },
    InvalidCronjobTimeout {
        name: String,
        timeout: String,
    },
    CronjobTimeoutTooLong {
        name: String,
        timeout: String,
    },
    InvalidRoute {
        domain: String,
        reason: String,
    },
    InvalidRoutesJson(String),
    InvalidRouteQuota(String),
    RouteQuotaExceeded {
        count: usize,
        quota: i64,
    },
    InvalidRetention {
        value: String,
        origin: String,
    },
    RegistryCredentials {
        registry: String,
        field: &'static str,
        searched: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(name) => {
                write!(f, "required build variable {} is not set", name)
            }
            ConfigError::InvalidValue {
                field,
                value,
                reason,
            } => write!(f, "invalid value '{}' for {}: {}", value, field, reason),
            ConfigError::MissingServiceType { service } => write!(
                f,
                "service {} has no lagoon.type label and no type override",
                service
            ),
            ConfigError::UnknownServiceType {
                service,
                service_type,
            } => write!(f, "service {} has unsupported type '{}'", service, service_type),
            ConfigError::InvalidQuantity { service, value } => write!(
                f,
                "invalid persistent volume size '{}' for {}",
                value, service
            ),
            ConfigError::MissingPersistentPath {
                service,
                service_type,
            } => write!(
                f,
                "service {} of type {} has no valid mount path for its persistent volume, set the lagoon.persistent label",
                service, service_type
            ),
            ConfigError::MissingLinkedService {
                service,
                service_type,
                container,
            } => write!(
                f,
                "service {} of type {} needs a linked '{}' service with the same lagoon.name",
                service, service_type, container
            ),
            ConfigError::DbaasUnavailable { service, reason } => write!(
                f,
                "service {} requires a DBaaS provider: {}",
                service, reason
            ),
            ConfigError::InvalidCron { schedule, reason } => {
                write!(f, "invalid cron schedule '{}': {}", schedule, reason)
            }
            ConfigError::DuplicateCronjob { service, name } => write!(
                f,
                "cronjob '{}' is defined more than once for service {}",
                name, service
            ),
            ConfigError::InvalidCronjobTimeout { name, timeout } => {
                write!(f, "cronjob '{}' has invalid timeout '{}'", name, timeout)
            }
            ConfigError::CronjobTimeoutTooLong { name, timeout } => write!(
                f,
                "cronjob '{}' has timeout '{}', which is longer than 24h",
                name, timeout
            ),
            ConfigError::InvalidRoute { domain, reason } => {
                write!(f, "invalid route '{}': {}", domain, reason)
            }
            ConfigError::InvalidRoutesJson(reason) => {
                write!(f, "invalid LAGOON_ROUTES_JSON: {}", reason)
            }
            ConfigError::InvalidRouteQuota(value) => write!(f, "invalid ROUTE_QUOTA '{}'", value),
            ConfigError::RouteQuotaExceeded { count, quota } => write!(
                f,
                "environment has {} routes, which exceeds the route quota of {}",
                count, quota
            ),
            ConfigError::InvalidRetention { value, origin } => write!(
                f,
                "invalid backup retention '{}' from {}, expected hourly:daily:weekly:monthly",
                value, origin
            ),
            ConfigError::RegistryCredentials {
                registry,
                field,
                searched,
            } => write!(
                f,
                "no {} found for container registry {}, looked in: {}",
                field.to_ascii_lowercase(),
                registry,
                searched
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Per invocation settings that aren't part of the build model itself
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratorOptions {
    pub dbaas_fallback: DbaasFallback,
    pub dbaas_retry: RetryPolicy,
    pub debug: bool,
}

impl GeneratorOptions {
    pub fn from_env(env: &BuildEnv) -> Result<GeneratorOptions, ConfigError> {
        let dbaas_fallback = match env.get("LAGOON_DBAAS_FALLBACK") {
            None | Some("single") => DbaasFallback::Single,
            Some("fail") => DbaasFallback::Fail,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    field: "LAGOON_DBAAS_FALLBACK".to_owned(),
                    value: other.to_owned(),
                    reason: "must be either single or fail".to_owned(),
                })
            }
        };
        Ok(GeneratorOptions {
            dbaas_fallback,
            dbaas_retry: RetryPolicy::default(),
            debug: env.is_true("LAGOON_BUILD_DEBUG"),
        })
    }
}

/// The fully resolved model of one environment build
#[derive(Debug, Clone, PartialEq)]
pub struct BuildValues {
    pub project: String,
    pub environment: String,
    pub namespace: String,
    pub branch: Option<String>,
    pub pr_number: Option<String>,
    pub pr_head_branch: Option<String>,
    pub pr_base_branch: Option<String>,
    pub build_type: BuildType,
    pub environment_type: EnvironmentType,
    pub active_environment: Option<String>,
    pub standby_environment: Option<String>,
    pub variables: Vec<EnvironmentVariable>,
    pub services: Vec<ServiceValues>,
    pub routes: Vec<RouteV2>,
    pub autogenerated_routes: Vec<RouteV2>,
    pub backup: BackupConfiguration,
    pub container_registries: Vec<ContainerRegistry>,
    pub feature_flags: FeatureFlags,
    pub custom_volumes: Vec<CustomVolume>,
}

impl BuildValues {
    pub fn service(&self, name: &str) -> Option<&ServiceValues> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn is_active(&self) -> bool {
        self.active_environment.as_deref() == Some(self.environment.as_str())
    }

    pub fn is_standby(&self) -> bool {
        self.standby_environment.as_deref() == Some(self.environment.as_str())
    }
}

fn required<'a>(env: &'a BuildEnv, name: &'static str) -> Result<&'a str, ConfigError> {
    env.get(name).ok_or(ConfigError::MissingRequired(name))
}

fn optional(env: &BuildEnv, name: &str) -> Option<String> {
    env.get(name).map(str::to_owned)
}

/// The autogenerated route pattern, either given directly or built from the router url suffix
fn router_pattern(env: &BuildEnv) -> Option<String> {
    env.get("ROUTER_URL_PATTERN")
        .map(str::to_owned)
        .or_else(|| {
            env.get("ROUTER_URL")
                .map(|suffix| format!("${{service}}-${{environment}}-${{project}}.{}", suffix))
        })
}

pub async fn generate_build_values(
    inputs: &BuildInputs,
    env: &BuildEnv,
    options: &GeneratorOptions,
    dbaas: &dyn DbaasProvider,
) -> Result<BuildValues, ConfigError> {
    let project = required(env, "PROJECT")?;
    let environment = required(env, "ENVIRONMENT")?;
    let build_type: BuildType = required(env, "BUILD_TYPE")?.parse()?;
    let environment_type: EnvironmentType = required(env, "ENVIRONMENT_TYPE")?.parse()?;
    let namespace = env
        .get("NAMESPACE")
        .map(str::to_owned)
        .unwrap_or_else(|| make_safe(&format!("{}-{}", project, environment)));
    log::info!(
        "generating {} build values for {} environment {} of project {} in namespace {}",
        build_type,
        environment_type,
        environment,
        project,
        namespace
    );

    let variables = merge_variables(&inputs.project_variables, &inputs.environment_variables);
    let resolver = Resolver::new(env, &variables);
    let feature_flags = FeatureFlags::resolve(&resolver);
    log::debug!("resolved feature flags: {:?}", feature_flags);

    let service_ctx = ServiceContext {
        resolver,
        yaml: &inputs.lagoon_yaml,
        environment,
        namespace: &namespace,
        environment_type,
        flags: &feature_flags,
        images: &inputs.images,
        options,
    };
    let services = resolve_services(&service_ctx, &inputs.compose, dbaas).await?;

    let active_environment = optional(env, "ACTIVE_ENVIRONMENT");
    let standby_environment = optional(env, "STANDBY_ENVIRONMENT");
    let pattern = router_pattern(env);
    let route_ctx = RouteContext {
        project,
        environment,
        build_type,
        router_pattern: pattern.as_deref(),
        active_environment: active_environment.as_deref(),
        standby_environment: standby_environment.as_deref(),
    };
    // the lagoon.autogeneratedroute label is already folded into `autogenerated_routes`
    let autogen_services: Vec<&str> = services
        .iter()
        .filter(|service| service.autogenerated_routes)
        .map(|service| service.override_name.as_str())
        .collect();
    let resolved_routes =
        resolve_routes(&resolver, &inputs.lagoon_yaml, &route_ctx, &autogen_services)?;

    let backup_ctx = BackupContext {
        project,
        namespace: &namespace,
        build_type,
        environment_type,
        custom_backup_config: feature_flags.custom_backup_config,
    };
    let backup = resolve_backups(&resolver, &inputs.lagoon_yaml, &backup_ctx)?;
    let container_registries = resolve_registries(&resolver, &inputs.lagoon_yaml)?;
    let custom_volumes = resolve_custom_volumes(&inputs.compose)?;

    Ok(BuildValues {
        project: project.to_owned(),
        environment: environment.to_owned(),
        branch: optional(env, "BRANCH"),
        pr_number: optional(env, "PR_NUMBER"),
        pr_head_branch: optional(env, "PR_HEAD_BRANCH"),
        pr_base_branch: optional(env, "PR_BASE_BRANCH"),
        namespace,
        build_type,
        environment_type,
        active_environment,
        standby_environment,
        services,
        routes: resolved_routes.routes,
        autogenerated_routes: resolved_routes.autogenerated,
        backup,
        container_registries,
        feature_flags,
        custom_volumes,
        variables,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::generator::dbaas::{Availability, DbaasError};
    use crate::generator::service_types::DbaasFamily;
    use async_trait::async_trait;

    struct NoDbaas;

    #[async_trait]
    impl DbaasProvider for NoDbaas {
        async fn health(&self) -> Availability {
            Availability::Unavailable
        }
        async fn environment_exists(&self, _: DbaasFamily, _: &str) -> Result<bool, DbaasError> {
            Ok(false)
        }
    }

    fn inputs() -> BuildInputs {
        BuildInputs::from_sources(
            r#"
docker-compose-yaml: docker-compose.yml
environments:
  main:
    routes:
      - nginx:
          - example.com
    cronjobs:
      - name: drush cron
        schedule: "M * * * *"
        command: drush cron
        service: cli
"#,
            r#"
services:
  cli:
    labels:
      lagoon.type: cli
  nginx:
    labels:
      lagoon.type: nginx
  mariadb:
    labels:
      lagoon.type: mariadb
"#,
            r#"[{"name": "LAGOON_BACKUP_PROD_SCHEDULE", "value": "M 1 * * *", "scope": "build"}]"#,
            "[]",
            &BuildEnv::default(),
        )
        .unwrap()
    }

    fn env() -> BuildEnv {
        BuildEnv::from_pairs(vec![
            ("PROJECT", "example"),
            ("ENVIRONMENT", "main"),
            ("BUILD_TYPE", "branch"),
            ("ENVIRONMENT_TYPE", "production"),
            ("ROUTER_URL", "ex.lagoon.sh"),
        ])
    }

    fn generate(inputs: &BuildInputs, env: &BuildEnv) -> Result<BuildValues, ConfigError> {
        let options = GeneratorOptions {
            dbaas_retry: RetryPolicy {
                max_attempts: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(generate_build_values(inputs, env, &options, &NoDbaas))
    }

    #[test]
    fn build_values_are_assembled() {
        let values = generate(&inputs(), &env()).unwrap();
        assert_eq!("example-main", values.namespace);
        assert_eq!(BuildType::Branch, values.build_type);
        assert_eq!(EnvironmentType::Production, values.environment_type);

        let types: Vec<&str> = values.services.iter().map(|s| s.service_type.as_str()).collect();
        assert_eq!(vec!["cli", "nginx", "mariadb-single"], types);

        assert_eq!(1, values.routes.len());
        assert_eq!("example.com", values.routes[0].domain);
        assert_eq!(1, values.autogenerated_routes.len());
        assert_eq!(
            "nginx-main-example.ex.lagoon.sh",
            values.autogenerated_routes[0].domain
        );

        let cli = values.service("cli").unwrap();
        assert_eq!(1, cli.in_pod_cronjobs.len() + cli.native_cronjobs.len());
    }

    #[test]
    fn autogenerated_route_label_removes_the_route() {
        let inputs = BuildInputs::from_sources(
            "docker-compose-yaml: docker-compose.yml\n",
            r#"
services:
  nginx:
    labels:
      lagoon.type: nginx
      lagoon.autogeneratedroute: "false"
  node:
    labels:
      lagoon.type: node
"#,
            "[]",
            "[]",
            &BuildEnv::default(),
        )
        .unwrap();
        let values = generate(&inputs, &env()).unwrap();
        let domains: Vec<&str> = values
            .autogenerated_routes
            .iter()
            .map(|r| r.domain.as_str())
            .collect();
        assert_eq!(vec!["node-main-example.ex.lagoon.sh"], domains);
    }

    #[test]
    fn backup_schedule_comes_from_api_variable_on_production() {
        let values = generate(&inputs(), &env()).unwrap();
        let expected = crontab::convert_crontab("example-main", "M 1 * * *").unwrap();
        assert_eq!(expected, values.backup.backup_schedule);
        assert!(values.backup.backup_schedule.ends_with(" 1 * * *"));
    }

    #[test]
    fn missing_required_variables_are_named() {
        let env = BuildEnv::from_pairs(vec![("PROJECT", "example")]);
        assert_eq!(
            ConfigError::MissingRequired("ENVIRONMENT"),
            generate(&inputs(), &env).unwrap_err()
        );
    }

    #[test]
    fn invalid_build_type_is_rejected() {
        let env = env().with("BUILD_TYPE", "nightly");
        match generate(&inputs(), &env) {
            Err(ConfigError::InvalidValue { field, value, .. }) => {
                assert_eq!("BUILD_TYPE", field);
                assert_eq!("nightly", value);
            }
            other => panic!("expected InvalidValue, got: {:?}", other),
        }
    }

    #[test]
    fn namespace_may_be_given_explicitly() {
        let env = env().with("NAMESPACE", "custom-ns");
        assert_eq!("custom-ns", generate(&inputs(), &env).unwrap().namespace);
    }

    #[test]
    fn strict_fallback_is_read_from_the_environment() {
        let env = BuildEnv::default().with("LAGOON_DBAAS_FALLBACK", "fail");
        let options = GeneratorOptions::from_env(&env).unwrap();
        assert_eq!(DbaasFallback::Fail, options.dbaas_fallback);

        let env = BuildEnv::default().with("LAGOON_DBAAS_FALLBACK", "maybe");
        assert!(GeneratorOptions::from_env(&env).is_err());
    }
}
