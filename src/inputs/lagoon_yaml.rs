//! The project manifest, `.lagoon.yml`
use indexmap::IndexMap;
use serde_yaml::Value;

use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LagoonYaml {
    #[serde(rename = "docker-compose-yaml")]
    pub docker_compose_yaml: Option<String>,
    pub environment_variables: EnvironmentVariablesConfig,
    pub routes: RoutesConfig,
    pub production_routes: Option<ProductionRoutes>,
    #[serde(rename = "backup-retention")]
    pub backup_retention: BackupRetentionConfig,
    #[serde(rename = "backup-schedule")]
    pub backup_schedule: BackupScheduleConfig,
    #[serde(rename = "container-registries")]
    pub container_registries: IndexMap<String, RegistryConfig>,
    pub environments: HashMap<String, EnvironmentConfig>,
}

impl LagoonYaml {
    pub fn environment(&self, name: &str) -> Option<&EnvironmentConfig> {
        self.environments.get(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EnvironmentVariablesConfig {
    pub git_sha: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RoutesConfig {
    pub autogenerate: AutogenerateConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AutogenerateConfig {
    pub enabled: Option<bool>,
    #[serde(rename = "allowPullrequests")]
    pub allow_pullrequests: Option<bool>,
    pub insecure: Option<String>,
    pub prefixes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProductionRoutes {
    pub active: Option<RouteSet>,
    pub standby: Option<RouteSet>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RouteSet {
    pub routes: Vec<ServiceRoutes>,
}

/// One entry of a `routes` list: a map of compose service name to the domains it serves
pub type ServiceRoutes = IndexMap<String, Vec<RouteEntry>>;

/// A route is either just a domain, or a domain with its own configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RouteEntry {
    Domain(String),
    Configured(IndexMap<String, RouteConfig>),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    #[serde(rename = "tls-acme", deserialize_with = "bool_or_string")]
    pub tls_acme: Option<bool>,
    pub insecure: Option<String>,
    pub hsts: Option<String>,
    #[serde(rename = "monitoring-path")]
    pub monitoring_path: Option<String>,
    pub annotations: BTreeMap<String, String>,
    pub fastly: Option<FastlyConfig>,
    #[serde(rename = "alternativenames")]
    pub alternative_names: Vec<String>,
}

/// Accepts a boolean either bare (`true`) or quoted (`'true'`)
fn bool_or_string<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        String(String),
    }

    let value = <Option<BoolOrString> as serde::Deserialize>::deserialize(deserializer)?;
    Ok(value.map(|v| match v {
        BoolOrString::Bool(b) => b,
        BoolOrString::String(s) => crate::config::parse_truthy(&s),
    }))
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FastlyConfig {
    #[serde(rename = "service-id")]
    pub service_id: Option<String>,
    pub watch: bool,
    #[serde(rename = "api-secret-name")]
    pub api_secret_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackupRetentionConfig {
    pub production: Option<RetentionConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub hourly: Option<u32>,
    pub daily: Option<u32>,
    pub weekly: Option<u32>,
    pub monthly: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackupScheduleConfig {
    pub production: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub routes: Vec<ServiceRoutes>,
    pub types: HashMap<String, String>,
    pub cronjobs: Vec<CronjobConfig>,
    #[serde(rename = "autogenerateRoutes")]
    pub autogenerate_routes: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CronjobConfig {
    pub name: String,
    pub service: String,
    pub schedule: String,
    pub command: String,
    #[serde(default)]
    pub timeout: Option<String>,
}

/// Deep merges `overlay` onto `base`. Mappings are merged key by key, and anything else in the
/// overlay (scalars and sequences) replaces the value in `base`.
pub fn merge_yaml(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_yaml(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
