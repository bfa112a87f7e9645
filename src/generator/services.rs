//! Resolution of compose services into `ServiceValues`
use crate::generator::cronjobs::{resolve_cronjobs, CronjobValues};
use crate::generator::dbaas::{check_health, Availability, DbaasFallback, DbaasProvider};
use crate::generator::flags::{feature_flag, FeatureFlags, SpotMode};
use crate::generator::precedence::Resolver;
use crate::generator::service_types::{self, DbaasFamily, ServiceType, NONE_TYPE};
use crate::generator::{ConfigError, EnvironmentType, GeneratorOptions};
use crate::inputs::{ComposeFile, ComposeService, LagoonYaml, BUILD_SCOPES};

use lazy_static::lazy_static;
use regex::Regex;

use std::collections::HashMap;

pub const LABEL_TYPE: &str = "lagoon.type";
pub const LABEL_NAME: &str = "lagoon.name";
pub const LABEL_PERSISTENT: &str = "lagoon.persistent";
pub const LABEL_PERSISTENT_NAME: &str = "lagoon.persistent.name";
pub const LABEL_PERSISTENT_SIZE: &str = "lagoon.persistent.size";
pub const LABEL_AUTOGENERATED_ROUTE: &str = "lagoon.autogeneratedroute";
pub const LABEL_DBAAS_ENVIRONMENT: &str = "lagoon.dbaas.environment";

lazy_static! {
    static ref QUANTITY: Regex =
        Regex::new(r"^[0-9]+(\.[0-9]+)?(Ki|Mi|Gi|Ti|Pi|Ei|k|M|G|T|P|E)?$").unwrap();
}

/// Returns true if the value is a valid Kubernetes resource quantity, like `5Gi` or `500M`
pub fn is_valid_quantity(value: &str) -> bool {
    QUANTITY.is_match(value)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistentVolume {
    pub name: String,
    pub path: String,
    pub size: String,
}

/// The secondary container of a service, supplied by another compose service with the same
/// `lagoon.name`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkedService {
    pub name: String,
    pub service_type: String,
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceValues {
    /// The compose service name
    pub name: String,
    /// The name used for Kubernetes objects, from the `lagoon.name` label or the compose name
    pub override_name: String,
    pub service_type: String,
    pub image: String,
    pub persistent: Option<PersistentVolume>,
    pub is_dbaas: bool,
    pub is_single: bool,
    pub dbaas_environment: Option<String>,
    pub use_spot_instances: bool,
    pub force_spot_instances: bool,
    pub cronjob_use_spot_instances: bool,
    pub cronjob_force_spot_instances: bool,
    pub replicas: Option<u32>,
    pub in_pod_cronjobs: Vec<CronjobValues>,
    pub native_cronjobs: Vec<CronjobValues>,
    /// Whether the service type and labels allow autogenerated routes for this service
    pub autogenerated_routes: bool,
    pub linked_service: Option<LinkedService>,
}

impl ServiceValues {
    pub fn catalogue_entry(&self) -> Option<&'static ServiceType> {
        service_types::lookup(&self.service_type)
    }
}

/// A volume declared at the top level of the compose file with `lagoon.type: persistent`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomVolume {
    pub name: String,
    pub size: String,
}

/// Everything about the environment that service resolution depends on
#[derive(Debug, Clone, Copy)]
pub struct ServiceContext<'a> {
    pub resolver: Resolver<'a>,
    pub yaml: &'a LagoonYaml,
    pub environment: &'a str,
    pub namespace: &'a str,
    pub environment_type: EnvironmentType,
    pub flags: &'a FeatureFlags,
    pub images: &'a HashMap<String, String>,
    pub options: &'a GeneratorOptions,
}

/// Resolves every service of the compose file, in order, and links secondary containers
pub async fn resolve_services(
    ctx: &ServiceContext<'_>,
    compose: &ComposeFile,
    dbaas: &dyn DbaasProvider,
) -> Result<Vec<ServiceValues>, ConfigError> {
    let mut resolved = Vec::with_capacity(compose.services.len());
    for (name, service) in compose.services.iter() {
        match resolve_service(ctx, name, service, dbaas).await? {
            Some(values) => resolved.push(values),
            None => log::info!("service {} has type '{}' and will not be deployed", name, NONE_TYPE),
        }
    }
    link_services(resolved)
}

pub async fn resolve_service(
    ctx: &ServiceContext<'_>,
    name: &str,
    service: &ComposeService,
    dbaas: &dyn DbaasProvider,
) -> Result<Option<ServiceValues>, ConfigError> {
    let override_name = service
        .labels
        .get(LABEL_NAME)
        .unwrap_or(name)
        .to_owned();

    let nominal_type = match resolve_nominal_type(ctx, name, &override_name, service)? {
        Some(service_type) => service_type,
        None => return Ok(None),
    };

    let (service_type, dbaas_environment) = match DbaasFamily::for_type(&nominal_type) {
        Some(family) => resolve_dbaas(ctx, family, name, &override_name, service, dbaas).await?,
        None => (nominal_type, None),
    };

    let catalogue = service_types::lookup(&service_type).ok_or_else(|| {
        ConfigError::UnknownServiceType {
            service: name.to_owned(),
            service_type: service_type.clone(),
        }
    })?;

    let persistent = resolve_persistence(name, &override_name, &service_type, catalogue, service)?;

    let cronjobs = ctx
        .yaml
        .environment(ctx.environment)
        .map(|env| env.cronjobs.as_slice())
        .unwrap_or(&[]);
    let (in_pod_cronjobs, native_cronjobs) = resolve_cronjobs(ctx.namespace, name, cronjobs)?;

    let spot = resolve_spot(ctx, &service_type);
    let replicas = if spot.use_spot && ctx.environment_type == EnvironmentType::Production {
        Some(2)
    } else {
        None
    };

    let autogenerated_routes = catalogue.autogenerated_routes
        && service.labels.get_bool(LABEL_AUTOGENERATED_ROUTE) != Some(false);

    let image = ctx
        .images
        .get(name)
        .cloned()
        .or_else(|| service.image.clone())
        .unwrap_or_default();

    Ok(Some(ServiceValues {
        name: name.to_owned(),
        override_name,
        is_dbaas: service_type.ends_with("-dbaas"),
        is_single: service_type.ends_with("-single"),
        service_type,
        image,
        persistent,
        dbaas_environment,
        use_spot_instances: spot.use_spot,
        force_spot_instances: spot.force_spot,
        cronjob_use_spot_instances: spot.cronjob_use_spot,
        cronjob_force_spot_instances: spot.cronjob_force_spot,
        replicas,
        in_pod_cronjobs,
        native_cronjobs,
        autogenerated_routes,
        linked_service: None,
    }))
}

/// Looks up an entry of a `name:value,name:value` list
fn csv_lookup<'a>(csv: &'a str, key: &str) -> Option<&'a str> {
    csv.split(',')
        .filter_map(|entry| {
            let mut parts = entry.trim().splitn(2, ':');
            Some((parts.next()?, parts.next()?))
        })
        .find(|(name, _)| *name == key)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

/// Returns `None` if the service should not be deployed
fn resolve_nominal_type(
    ctx: &ServiceContext<'_>,
    name: &str,
    override_name: &str,
    service: &ComposeService,
) -> Result<Option<String>, ConfigError> {
    let mut service_type = service.labels.get(LABEL_TYPE).map(str::to_owned);

    if let Some(env_type) = ctx
        .yaml
        .environment(ctx.environment)
        .and_then(|env| env.types.get(name))
    {
        log::debug!("service {} type overridden by .lagoon.yml to {}", name, env_type);
        service_type = Some(env_type.clone());
    }

    let mut service_type = service_type.map(|t| service_types::remap_legacy(&t).to_owned());

    if let Some(api_type) = ctx
        .resolver
        .variable("LAGOON_SERVICE_TYPES", BUILD_SCOPES)
        .and_then(|csv| csv_lookup(csv, override_name))
    {
        log::debug!("service {} type overridden by LAGOON_SERVICE_TYPES to {}", name, api_type);
        service_type = Some(api_type.to_owned());
    }

    match service_type {
        Some(t) if t == NONE_TYPE => Ok(None),
        Some(t) => Ok(Some(t)),
        None => Err(ConfigError::MissingServiceType {
            service: name.to_owned(),
        }),
    }
}

async fn resolve_dbaas(
    ctx: &ServiceContext<'_>,
    family: DbaasFamily,
    name: &str,
    override_name: &str,
    service: &ComposeService,
    provider: &dyn DbaasProvider,
) -> Result<(String, Option<String>), ConfigError> {
    let fallback = |reason: String| -> Result<(String, Option<String>), ConfigError> {
        if ctx.options.dbaas_fallback == DbaasFallback::Fail {
            return Err(ConfigError::DbaasUnavailable {
                service: name.to_owned(),
                reason,
            });
        }
        log::warn!(
            "service {} can't use a DBaaS provider, falling back to {}",
            name,
            family.single_type()
        );
        if ctx.options.debug {
            log::debug!("DBaaS fallback for service {}: {}", name, reason);
        }
        Ok((family.single_type(), None))
    };

    match check_health(provider, &ctx.options.dbaas_retry).await {
        Availability::Available => {}
        other => return fallback(format!("DBaaS provider health check returned {:?}", other)),
    }

    let environment = ctx
        .resolver
        .variable("LAGOON_DBAAS_ENVIRONMENT_TYPES", BUILD_SCOPES)
        .and_then(|csv| csv_lookup(csv, override_name))
        .or_else(|| service.labels.get(LABEL_DBAAS_ENVIRONMENT))
        .map(str::to_owned)
        .unwrap_or_else(|| ctx.environment_type.to_string());

    match provider.environment_exists(family, &environment).await {
        Ok(true) => {
            log::debug!(
                "service {} will use the {} DBaaS environment '{}'",
                name,
                family.provider(),
                environment
            );
            Ok((family.dbaas_type(), Some(environment)))
        }
        Ok(false) => fallback(format!(
            "the {} DBaaS provider has no environment named '{}'",
            family.provider(),
            environment
        )),
        Err(err) => fallback(err.to_string()),
    }
}

fn resolve_persistence(
    name: &str,
    override_name: &str,
    service_type: &str,
    catalogue: &ServiceType,
    service: &ComposeService,
) -> Result<Option<PersistentVolume>, ConfigError> {
    let defaults = match catalogue.persistent.as_ref() {
        Some(defaults) => defaults,
        None => return Ok(None),
    };
    let labels = &service.labels;

    let path = labels.get(LABEL_PERSISTENT).unwrap_or(defaults.path);
    if path.is_empty() {
        return Err(ConfigError::MissingPersistentPath {
            service: name.to_owned(),
            service_type: service_type.to_owned(),
        });
    }
    let size = labels.get(LABEL_PERSISTENT_SIZE).unwrap_or(defaults.size);
    if !is_valid_quantity(size) {
        return Err(ConfigError::InvalidQuantity {
            service: name.to_owned(),
            value: size.to_owned(),
        });
    }
    let volume_name = labels.get(LABEL_PERSISTENT_NAME).unwrap_or(override_name);

    Ok(Some(PersistentVolume {
        name: volume_name.to_owned(),
        path: path.to_owned(),
        size: size.to_owned(),
    }))
}

#[derive(Debug, Default, PartialEq)]
struct SpotSettings {
    use_spot: bool,
    force_spot: bool,
    cronjob_use_spot: bool,
    cronjob_force_spot: bool,
}

/// Spot instances are used for the service types an administrator has listed for the
/// environment type, when the spot feature flag for that environment type is enabled
fn resolve_spot(ctx: &ServiceContext<'_>, service_type: &str) -> SpotSettings {
    let (mode, env_key) = match ctx.environment_type {
        EnvironmentType::Production => (ctx.flags.spot_instance_production, "PRODUCTION"),
        EnvironmentType::Development => (ctx.flags.spot_instance_development, "DEVELOPMENT"),
    };
    if mode == SpotMode::Disabled {
        return SpotSettings::default();
    }
    let listed = |key: String| {
        feature_flag(&ctx.resolver, &key, "")
            .map(|types| types.value.split(',').any(|t| t.trim() == service_type))
            .unwrap_or(false)
    };
    let use_spot = listed(format!("SPOT_INSTANCE_{}_TYPES", env_key));
    let cronjob_use_spot = listed(format!("SPOT_INSTANCE_{}_CRONJOB_TYPES", env_key));
    SpotSettings {
        use_spot,
        force_spot: use_spot && mode == SpotMode::Force,
        cronjob_use_spot,
        cronjob_force_spot: cronjob_use_spot && mode == SpotMode::Force,
    }
}

/// Merges services that share an override name into one, with the service whose compose name
/// equals the override name as the primary. Fails if a type that needs a secondary container
/// ends up without one.
fn link_services(services: Vec<ServiceValues>) -> Result<Vec<ServiceValues>, ConfigError> {
    let mut linked: Vec<ServiceValues> = Vec::with_capacity(services.len());
    for service in services {
        let existing_idx = linked
            .iter()
            .position(|s| s.override_name == service.override_name && s.name != service.name);
        let idx = match existing_idx {
            Some(idx) => idx,
            None => {
                linked.push(service);
                continue;
            }
        };
        if linked[idx].linked_service.is_some() {
            return Err(ConfigError::InvalidValue {
                field: LABEL_NAME.to_owned(),
                value: service.override_name,
                reason: "more than two services share this name".to_owned(),
            });
        }
        let (mut primary, secondary) = if service.name == service.override_name {
            (service, linked.remove(idx))
        } else {
            (linked.remove(idx), service)
        };
        log::debug!(
            "linking service {} into {} as its secondary container",
            secondary.name,
            primary.name
        );
        primary.in_pod_cronjobs.extend(secondary.in_pod_cronjobs);
        primary.native_cronjobs.extend(secondary.native_cronjobs);
        primary.linked_service = Some(LinkedService {
            name: secondary.name,
            service_type: secondary.service_type,
            image: secondary.image,
        });
        linked.insert(idx, primary);
    }

    for service in linked.iter() {
        let secondary = service
            .catalogue_entry()
            .and_then(|catalogue| catalogue.secondary_container);
        if let (Some(container), None) = (secondary, service.linked_service.as_ref()) {
            return Err(ConfigError::MissingLinkedService {
                service: service.name.clone(),
                service_type: service.service_type.clone(),
                container,
            });
        }
    }
    Ok(linked)
}

/// Volumes declared at the top level of the compose file with `lagoon.type: persistent`
pub fn resolve_custom_volumes(compose: &ComposeFile) -> Result<Vec<CustomVolume>, ConfigError> {
    let mut volumes = Vec::new();
    for (name, volume) in compose.volumes.iter() {
        let volume = match volume {
            Some(volume) if volume.labels.get(LABEL_TYPE) == Some("persistent") => volume,
            _ => continue,
        };
        let size = volume
            .labels
            .get(LABEL_PERSISTENT_SIZE)
            .unwrap_or(service_types::DEFAULT_PERSISTENT_SIZE);
        if !is_valid_quantity(size) {
            return Err(ConfigError::InvalidQuantity {
                service: name.clone(),
                value: size.to_owned(),
            });
        }
        volumes.push(CustomVolume {
            name: format!("custom-{}", name),
            size: size.to_owned(),
        });
    }
    Ok(volumes)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::BuildEnv;
    use crate::generator::dbaas::DbaasError;
    use crate::inputs::{EnvironmentVariable, Scope};
    use async_trait::async_trait;

    struct StaticDbaas {
        health: Availability,
        environments: Vec<&'static str>,
    }

    #[async_trait]
    impl DbaasProvider for StaticDbaas {
        async fn health(&self) -> Availability {
            self.health
        }
        async fn environment_exists(
            &self,
            _: DbaasFamily,
            environment: &str,
        ) -> Result<bool, DbaasError> {
            Ok(self.environments.contains(&environment))
        }
    }

    fn available() -> StaticDbaas {
        StaticDbaas {
            health: Availability::Available,
            environments: vec!["production", "development"],
        }
    }

    struct Fixture {
        env: BuildEnv,
        vars: Vec<EnvironmentVariable>,
        yaml: LagoonYaml,
        flags: FeatureFlags,
        images: HashMap<String, String>,
        options: GeneratorOptions,
        environment_type: EnvironmentType,
    }

    impl Fixture {
        fn new() -> Fixture {
            Fixture {
                env: BuildEnv::default(),
                vars: Vec::new(),
                yaml: LagoonYaml::default(),
                flags: FeatureFlags::default(),
                images: HashMap::new(),
                options: GeneratorOptions {
                    dbaas_retry: crate::generator::dbaas::RetryPolicy {
                        max_attempts: 1,
                        ..Default::default()
                    },
                    ..Default::default()
                },
                environment_type: EnvironmentType::Production,
            }
        }

        fn resolve(&self, compose: &str, dbaas: &dyn DbaasProvider) -> Result<Vec<ServiceValues>, ConfigError> {
            let compose: ComposeFile = serde_yaml::from_str(compose).expect("invalid compose file");
            let ctx = ServiceContext {
                resolver: Resolver::new(&self.env, &self.vars),
                yaml: &self.yaml,
                environment: "main",
                namespace: "example-main",
                environment_type: self.environment_type,
                flags: &self.flags,
                images: &self.images,
                options: &self.options,
            };
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap()
                .block_on(resolve_services(&ctx, &compose, dbaas))
        }
    }

    const NGINX_PHP: &str = r#"
services:
  cli:
    labels:
      lagoon.type: cli-persistent
      lagoon.persistent.name: nginx
  nginx:
    labels:
      lagoon.type: nginx-php-persistent
  php:
    labels:
      lagoon.type: nginx-php-persistent
      lagoon.name: nginx
  mariadb:
    labels:
      lagoon.type: mariadb
"#;

    #[test]
    fn catalogue_defaults_are_used_without_overrides() {
        let fixture = Fixture::new();
        let services = fixture.resolve(NGINX_PHP, &available()).unwrap();
        let names: Vec<&str> = services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(vec!["cli", "nginx", "mariadb"], names);

        let nginx = &services[1];
        assert_eq!("nginx-php-persistent", nginx.service_type);
        assert_eq!(
            Some(PersistentVolume {
                name: "nginx".to_owned(),
                path: "/app/docroot/sites/default/files/".to_owned(),
                size: "5Gi".to_owned(),
            }),
            nginx.persistent
        );
        let linked = nginx.linked_service.as_ref().expect("php should be linked");
        assert_eq!("php", linked.name);
        assert!(nginx.autogenerated_routes);

        let cli = &services[0];
        assert_eq!("nginx", cli.persistent.as_ref().unwrap().name);
        assert!(!cli.autogenerated_routes);
    }

    #[test]
    fn dbaas_is_used_when_available() {
        let fixture = Fixture::new();
        let services = fixture.resolve(NGINX_PHP, &available()).unwrap();
        let mariadb = &services[2];
        assert_eq!("mariadb-dbaas", mariadb.service_type);
        assert!(mariadb.is_dbaas);
        assert_eq!(Some("production".to_owned()), mariadb.dbaas_environment);
        assert_eq!(None, mariadb.persistent);
    }

    #[test]
    fn dbaas_falls_back_to_single() {
        let fixture = Fixture::new();
        let unhealthy = StaticDbaas {
            health: Availability::Unavailable,
            environments: vec!["production"],
        };
        let services = fixture.resolve(NGINX_PHP, &unhealthy).unwrap();
        let mariadb = &services[2];
        assert_eq!("mariadb-single", mariadb.service_type);
        assert!(mariadb.is_single);
        assert_eq!("/var/lib/mysql", mariadb.persistent.as_ref().unwrap().path);

        let missing_environment = StaticDbaas {
            health: Availability::Available,
            environments: vec!["development"],
        };
        let services = fixture.resolve(NGINX_PHP, &missing_environment).unwrap();
        assert_eq!("mariadb-single", services[2].service_type);
    }

    #[test]
    fn strict_dbaas_policy_fails_the_build() {
        let mut fixture = Fixture::new();
        fixture.options.dbaas_fallback = DbaasFallback::Fail;
        let unhealthy = StaticDbaas {
            health: Availability::Indeterminate,
            environments: vec![],
        };
        match fixture.resolve(NGINX_PHP, &unhealthy) {
            Err(ConfigError::DbaasUnavailable { service, .. }) => assert_eq!("mariadb", service),
            other => panic!("expected DbaasUnavailable, got: {:?}", other),
        }
    }

    #[test]
    fn dbaas_environment_comes_from_api_before_label() {
        let mut fixture = Fixture::new();
        fixture.vars.push(EnvironmentVariable::new(
            "LAGOON_DBAAS_ENVIRONMENT_TYPES",
            "mariadb:custom-api",
            Scope::Build,
        ));
        let dbaas = StaticDbaas {
            health: Availability::Available,
            environments: vec!["custom-api", "custom-label"],
        };
        let compose = r#"
services:
  mariadb:
    labels:
      lagoon.type: mariadb-dbaas
      lagoon.dbaas.environment: custom-label
"#;
        let services = fixture.resolve(compose, &dbaas).unwrap();
        assert_eq!(Some("custom-api".to_owned()), services[0].dbaas_environment);

        fixture.vars.clear();
        let services = fixture.resolve(compose, &dbaas).unwrap();
        assert_eq!(Some("custom-label".to_owned()), services[0].dbaas_environment);
    }

    #[test]
    fn type_overrides_are_applied_in_order() {
        let mut fixture = Fixture::new();
        fixture.yaml = serde_yaml::from_str(
            r#"
environments:
  main:
    types:
      db: mariadb-shared
      redis: redis-persistent
"#,
        )
        .unwrap();
        fixture.vars.push(EnvironmentVariable::new(
            "LAGOON_SERVICE_TYPES",
            "redis:none,worker:worker",
            Scope::Build,
        ));
        let compose = r#"
services:
  db:
    labels:
      lagoon.type: mariadb
  redis:
    labels:
      lagoon.type: redis
  worker:
    labels:
      lagoon.type: basic
"#;
        let services = fixture.resolve(compose, &available()).unwrap();
        let types: Vec<&str> = services.iter().map(|s| s.service_type.as_str()).collect();
        assert_eq!(vec!["mariadb-dbaas", "worker"], types);
    }

    #[test]
    fn basic_persistent_without_a_path_is_an_error() {
        let fixture = Fixture::new();
        let compose = r#"
services:
  node:
    labels:
      lagoon.type: basic-persistent
"#;
        let err = fixture.resolve(compose, &available()).unwrap_err();
        assert_eq!(
            ConfigError::MissingPersistentPath {
                service: "node".to_owned(),
                service_type: "basic-persistent".to_owned(),
            },
            err
        );
        assert!(err.to_string().contains("no valid mount path"));
    }

    #[test]
    fn invalid_persistent_size_is_an_error() {
        let fixture = Fixture::new();
        let compose = r#"
services:
  node:
    labels:
      lagoon.type: basic-persistent
      lagoon.persistent: /files
      lagoon.persistent.size: lots
"#;
        match fixture.resolve(compose, &available()) {
            Err(ConfigError::InvalidQuantity { value, .. }) => assert_eq!("lots", value),
            other => panic!("expected InvalidQuantity, got: {:?}", other),
        }
    }

    #[test]
    fn missing_secondary_container_is_an_error() {
        let fixture = Fixture::new();
        let compose = r#"
services:
  nginx:
    labels:
      lagoon.type: nginx-php
"#;
        match fixture.resolve(compose, &available()) {
            Err(ConfigError::MissingLinkedService { container, .. }) => assert_eq!("php", container),
            other => panic!("expected MissingLinkedService, got: {:?}", other),
        }
    }

    #[test]
    fn listed_types_use_spot_instances() {
        let mut fixture = Fixture::new();
        fixture.flags.spot_instance_production = SpotMode::Force;
        fixture.env = BuildEnv::default()
            .with("ADMIN_LAGOON_FEATURE_FLAG_SPOT_INSTANCE_PRODUCTION_TYPES", "nginx,node")
            .with("ADMIN_LAGOON_FEATURE_FLAG_SPOT_INSTANCE_PRODUCTION_CRONJOB_TYPES", "cli");
        let compose = r#"
services:
  node:
    labels:
      lagoon.type: node
  cli:
    labels:
      lagoon.type: cli
"#;
        let services = fixture.resolve(compose, &available()).unwrap();
        let node = &services[0];
        assert!(node.use_spot_instances);
        assert!(node.force_spot_instances);
        assert_eq!(Some(2), node.replicas);
        assert!(!node.cronjob_use_spot_instances);

        let cli = &services[1];
        assert!(!cli.use_spot_instances);
        assert!(cli.cronjob_use_spot_instances);
        assert_eq!(None, cli.replicas);
    }

    #[test]
    fn autogenerated_route_label_disables_routes() {
        let fixture = Fixture::new();
        let compose = r#"
services:
  node:
    labels:
      lagoon.type: node
      lagoon.autogeneratedroute: "false"
"#;
        let services = fixture.resolve(compose, &available()).unwrap();
        assert!(!services[0].autogenerated_routes);
    }

    #[test]
    fn custom_volumes_are_prefixed() {
        let compose: ComposeFile = serde_yaml::from_str(
            r#"
volumes:
  files:
    labels:
      lagoon.type: persistent
      lagoon.persistent.size: 10Gi
  cache:
    labels:
      lagoon.type: none
"#,
        )
        .unwrap();
        let volumes = resolve_custom_volumes(&compose).unwrap();
        assert_eq!(
            vec![CustomVolume {
                name: "custom-files".to_owned(),
                size: "10Gi".to_owned()
            }],
            volumes
        );
    }

    #[test]
    fn quantities_are_validated() {
        assert!(is_valid_quantity("5Gi"));
        assert!(is_valid_quantity("500M"));
        assert!(is_valid_quantity("1.5Gi"));
        assert!(!is_valid_quantity("5 Gi"));
        assert!(!is_valid_quantity("Gi"));
    }
}
