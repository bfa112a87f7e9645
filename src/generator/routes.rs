//! Route resolution. Routes come from three places in `.lagoon.yml` (the environment's own
//! routes, the active/standby production routes, and autogenerated routes for every eligible
//! service), and may be replaced or extended by routes supplied through the Lagoon API.
use crate::generator::precedence::Resolver;
use crate::generator::{BuildType, ConfigError};
use crate::inputs::{
    FastlyConfig, LagoonYaml, RouteConfig, RouteEntry, ServiceRoutes, BUILD_SCOPES,
};
use crate::naming::{make_safe, short_hash, truncate_with_hash, MAX_DNS_LABEL_LENGTH};

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::str::FromStr;

/// Autogenerated domains longer than this are shortened
pub const MAX_AUTOGENERATED_DOMAIN_LENGTH: usize = 53;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsecurePolicy {
    Allow,
    Redirect,
    None,
}

impl FromStr for InsecurePolicy {
    type Err = String;
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "allow" => Ok(InsecurePolicy::Allow),
            "redirect" => Ok(InsecurePolicy::Redirect),
            "none" => Ok(InsecurePolicy::None),
            _ => Err(format!("'{}' is not one of Allow, Redirect or None", value)),
        }
    }
}

impl Display for InsecurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let value = match self {
            InsecurePolicy::Allow => "Allow",
            InsecurePolicy::Redirect => "Redirect",
            InsecurePolicy::None => "None",
        };
        f.write_str(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fastly {
    #[serde(rename = "service-id")]
    pub service_id: String,
    #[serde(default)]
    pub watch: bool,
    #[serde(rename = "api-secret-name", default)]
    pub api_secret_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteV2 {
    pub domain: String,
    pub service: String,
    pub tls_acme: bool,
    pub insecure: InsecurePolicy,
    pub hsts: Option<String>,
    pub monitoring_path: String,
    pub annotations: BTreeMap<String, String>,
    pub fastly: Option<Fastly>,
    pub alternative_names: Vec<String>,
    /// Set on active/standby routes, which move between environments on a switch
    pub migrate: bool,
    pub autogenerated: bool,
}

impl RouteV2 {
    /// A route with every field set to its default
    pub fn new(domain: impl Into<String>, service: impl Into<String>) -> RouteV2 {
        RouteV2 {
            domain: domain.into(),
            service: service.into(),
            tls_acme: true,
            insecure: InsecurePolicy::Redirect,
            hsts: None,
            monitoring_path: "/".to_owned(),
            annotations: BTreeMap::new(),
            fastly: None,
            alternative_names: Vec::new(),
            migrate: false,
            autogenerated: false,
        }
    }
}

/// Inputs to route resolution that come from the build environment
#[derive(Debug, Clone, PartialEq)]
pub struct RouteContext<'a> {
    pub project: &'a str,
    pub environment: &'a str,
    pub build_type: BuildType,
    pub router_pattern: Option<&'a str>,
    pub active_environment: Option<&'a str>,
    pub standby_environment: Option<&'a str>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedRoutes {
    pub routes: Vec<RouteV2>,
    pub autogenerated: Vec<RouteV2>,
}

pub fn resolve_routes(
    resolver: &Resolver<'_>,
    yaml: &LagoonYaml,
    ctx: &RouteContext<'_>,
    autogen_services: &[&str],
) -> Result<ResolvedRoutes, ConfigError> {
    let fastly = FastlyOverrides::resolve(resolver)?;

    let mut routes = Vec::new();
    if let Some(env_config) = yaml.environment(ctx.environment) {
        append_routes(&mut routes, generate_routes(&env_config.routes, &fastly, false)?);
    }
    if let Some(production_routes) = yaml.production_routes.as_ref() {
        let active = production_routes
            .active
            .as_ref()
            .filter(|_| ctx.active_environment == Some(ctx.environment));
        let standby = production_routes
            .standby
            .as_ref()
            .filter(|_| ctx.standby_environment == Some(ctx.environment));
        for set in active.into_iter().chain(standby) {
            append_routes(&mut routes, generate_routes(&set.routes, &fastly, true)?);
        }
    }

    if let Some(api_routes) = api_routes(resolver)? {
        routes = merge_api_routes(routes, api_routes, &fastly)?;
    }
    enforce_quota(resolver, &routes)?;

    let autogenerated = autogenerated_routes(resolver, yaml, ctx, autogen_services)?;
    Ok(ResolvedRoutes {
        routes,
        autogenerated,
    })
}

/// Appends routes, replacing any existing route with the same domain
fn append_routes(routes: &mut Vec<RouteV2>, new_routes: Vec<RouteV2>) {
    for route in new_routes {
        match routes.iter_mut().find(|r| r.domain == route.domain) {
            Some(existing) => *existing = route,
            None => routes.push(route),
        }
    }
}

/// Turns the `routes` of an environment (or an active/standby set) into routes
pub fn generate_routes(
    declared: &[ServiceRoutes],
    fastly: &FastlyOverrides,
    migrate: bool,
) -> Result<Vec<RouteV2>, ConfigError> {
    let mut routes = Vec::new();
    for service_routes in declared {
        for (service, entries) in service_routes {
            for entry in entries {
                let entry_routes = match entry {
                    RouteEntry::Domain(domain) => {
                        let mut route = RouteV2::new(domain.as_str(), service.as_str());
                        route.fastly = fastly.for_domain(domain, None);
                        vec![route]
                    }
                    RouteEntry::Configured(configured) => configured
                        .iter()
                        .map(|(domain, config)| configured_route(domain, service, config, fastly))
                        .collect::<Result<Vec<_>, _>>()?,
                };
                for mut route in entry_routes {
                    route.migrate = migrate;
                    append_routes(&mut routes, vec![route]);
                }
            }
        }
    }
    Ok(routes)
}

fn configured_route(
    domain: &str,
    service: &str,
    config: &RouteConfig,
    fastly: &FastlyOverrides,
) -> Result<RouteV2, ConfigError> {
    let mut route = RouteV2::new(domain, service);
    if let Some(tls_acme) = config.tls_acme {
        route.tls_acme = tls_acme;
    }
    if let Some(insecure) = config.insecure.as_deref() {
        route.insecure = parse_insecure(domain, insecure)?;
    }
    route.hsts = config.hsts.clone().filter(|h| !h.is_empty());
    if let Some(path) = config.monitoring_path.as_deref().filter(|p| !p.is_empty()) {
        route.monitoring_path = path.to_owned();
    }
    route.annotations = config.annotations.clone();
    route.alternative_names = config.alternative_names.clone();
    route.fastly = fastly.for_domain(domain, config.fastly.as_ref());
    Ok(route)
}

fn parse_insecure(domain: &str, value: &str) -> Result<InsecurePolicy, ConfigError> {
    value.parse().map_err(|reason| ConfigError::InvalidRoute {
        domain: domain.to_owned(),
        reason,
    })
}

/// Fastly service ids that were supplied through Lagoon variables. A per domain entry in
/// `LAGOON_FASTLY_SERVICE_IDS` wins over the global `LAGOON_FASTLY_SERVICE_ID`, and both win over
/// the configuration in `.lagoon.yml`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FastlyOverrides {
    global: Option<Fastly>,
    per_domain: BTreeMap<String, Fastly>,
}

impl FastlyOverrides {
    pub fn resolve(resolver: &Resolver<'_>) -> Result<FastlyOverrides, ConfigError> {
        let global = match resolver.variable("LAGOON_FASTLY_SERVICE_ID", BUILD_SCOPES) {
            Some(value) => Some(parse_fastly_value("LAGOON_FASTLY_SERVICE_ID", value)?),
            None => None,
        };
        let mut per_domain = BTreeMap::new();
        if let Some(value) = resolver.variable("LAGOON_FASTLY_SERVICE_IDS", BUILD_SCOPES) {
            for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
                let idx = entry.find(':').ok_or_else(|| invalid_fastly(entry))?;
                let domain = &entry[..idx];
                let fastly = parse_fastly_value("LAGOON_FASTLY_SERVICE_IDS", &entry[(idx + 1)..])?;
                per_domain.insert(domain.to_owned(), fastly);
            }
        }
        Ok(FastlyOverrides { global, per_domain })
    }

    pub fn for_domain(&self, domain: &str, yaml: Option<&FastlyConfig>) -> Option<Fastly> {
        if let Some(fastly) = self.per_domain.get(domain) {
            return Some(fastly.clone());
        }
        if let Some(fastly) = self.global.as_ref() {
            return Some(fastly.clone());
        }
        yaml.and_then(|config| {
            config.service_id.as_ref().map(|service_id| Fastly {
                service_id: service_id.clone(),
                watch: config.watch,
                api_secret_name: config.api_secret_name.clone(),
            })
        })
    }
}

fn invalid_fastly(value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: "fastly service id".to_owned(),
        value: value.to_owned(),
        reason: "expected SERVICE_ID:WATCH[:SECRET]".to_owned(),
    }
}

/// Parses `SERVICE_ID:WATCH[:SECRET]`
fn parse_fastly_value(field: &str, value: &str) -> Result<Fastly, ConfigError> {
    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 || parts[0].is_empty() {
        return Err(ConfigError::InvalidValue {
            field: field.to_owned(),
            value: value.to_owned(),
            reason: "expected SERVICE_ID:WATCH[:SECRET]".to_owned(),
        });
    }
    Ok(Fastly {
        service_id: parts[0].to_owned(),
        watch: crate::config::parse_truthy(parts[1]),
        api_secret_name: parts.get(2).map(|s| s.to_string()).filter(|s| !s.is_empty()),
    })
}

/// A route supplied through `LAGOON_ROUTES_JSON`. Every field but the domain is optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiRoute {
    pub domain: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(rename = "tls-acme", default)]
    pub tls_acme: Option<bool>,
    #[serde(default)]
    pub insecure: Option<String>,
    #[serde(default)]
    pub hsts: Option<String>,
    #[serde(rename = "monitoring-path", default)]
    pub monitoring_path: Option<String>,
    #[serde(default)]
    pub annotations: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub fastly: Option<Fastly>,
    #[serde(rename = "alternativenames", default)]
    pub alternative_names: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ApiRoutes {
    #[serde(default)]
    routes: Vec<ApiRoute>,
}

fn api_routes(resolver: &Resolver<'_>) -> Result<Option<Vec<ApiRoute>>, ConfigError> {
    let encoded = match resolver.variable("LAGOON_ROUTES_JSON", BUILD_SCOPES) {
        Some(encoded) => encoded,
        None => return Ok(None),
    };
    let decoded = base64::decode(encoded.trim())
        .map_err(|e| ConfigError::InvalidRoutesJson(e.to_string()))?;
    let parsed: ApiRoutes = serde_json::from_slice(&decoded)
        .map_err(|e| ConfigError::InvalidRoutesJson(e.to_string()))?;
    Ok(Some(parsed.routes))
}

/// Merges API routes into the generated routes. An API route replaces the generated route with
/// the same domain, with any unset field taking its default value. API routes that don't match a
/// generated route are appended. A route without its own fastly block picks up the Fastly
/// overrides for its domain.
pub fn merge_api_routes(
    generated: Vec<RouteV2>,
    api_routes: Vec<ApiRoute>,
    fastly: &FastlyOverrides,
) -> Result<Vec<RouteV2>, ConfigError> {
    let mut merged = generated;
    for api_route in api_routes {
        let existing_idx = merged.iter().position(|r| r.domain == api_route.domain);
        let service = match (api_route.service.as_ref(), existing_idx) {
            (Some(service), _) => service.clone(),
            (None, Some(idx)) => merged[idx].service.clone(),
            (None, None) => {
                return Err(ConfigError::InvalidRoute {
                    domain: api_route.domain,
                    reason: "routes from the api must name a service".to_owned(),
                })
            }
        };
        let mut route = RouteV2::new(api_route.domain.as_str(), service);
        if let Some(tls_acme) = api_route.tls_acme {
            route.tls_acme = tls_acme;
        }
        if let Some(insecure) = api_route.insecure.as_deref() {
            route.insecure = parse_insecure(&api_route.domain, insecure)?;
        }
        route.hsts = api_route.hsts.filter(|h| !h.is_empty());
        if let Some(path) = api_route.monitoring_path.filter(|p| !p.is_empty()) {
            route.monitoring_path = path;
        }
        route.annotations = api_route.annotations.unwrap_or_default();
        let domain = &api_route.domain;
        route.fastly = api_route
            .fastly
            .or_else(|| fastly.for_domain(domain, None));
        route.alternative_names = api_route.alternative_names.unwrap_or_default();

        match existing_idx {
            Some(idx) => {
                route.migrate = merged[idx].migrate;
                merged[idx] = route;
            }
            None => merged.push(route),
        }
    }
    Ok(merged)
}

/// Fails if there are more custom routes than `ROUTE_QUOTA` allows. A quota of -1 is unlimited.
fn enforce_quota(resolver: &Resolver<'_>, routes: &[RouteV2]) -> Result<(), ConfigError> {
    let raw = resolver.env().get_or("ROUTE_QUOTA", "-1");
    let quota: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidRouteQuota(raw.to_owned()))?;
    if quota < -1 {
        return Err(ConfigError::InvalidRouteQuota(raw.to_owned()));
    }
    if quota >= 0 && routes.len() as i64 > quota {
        return Err(ConfigError::RouteQuotaExceeded {
            count: routes.len(),
            quota,
        });
    }
    Ok(())
}

fn autogenerated_enabled(
    resolver: &Resolver<'_>,
    yaml: &LagoonYaml,
    ctx: &RouteContext<'_>,
) -> bool {
    if resolver
        .variable("LAGOON_AUTOGENERATED_ROUTES_DISABLED", BUILD_SCOPES)
        .map(crate::config::parse_truthy)
        .unwrap_or(false)
    {
        log::debug!("autogenerated routes are disabled by LAGOON_AUTOGENERATED_ROUTES_DISABLED");
        return false;
    }
    let autogenerate = &yaml.routes.autogenerate;
    let project_enabled = autogenerate.enabled.unwrap_or(true);
    let environment_enabled = yaml
        .environment(ctx.environment)
        .and_then(|env| env.autogenerate_routes)
        .unwrap_or(true);
    let pullrequest_enabled =
        ctx.build_type != BuildType::PullRequest || autogenerate.allow_pullrequests.unwrap_or(true);
    project_enabled && environment_enabled && pullrequest_enabled
}

fn autogenerated_routes(
    resolver: &Resolver<'_>,
    yaml: &LagoonYaml,
    ctx: &RouteContext<'_>,
    autogen_services: &[&str],
) -> Result<Vec<RouteV2>, ConfigError> {
    let pattern = match ctx.router_pattern {
        Some(pattern) => pattern,
        None => {
            log::debug!("no router pattern is configured, so no routes will be autogenerated");
            return Ok(Vec::new());
        }
    };
    if !autogenerated_enabled(resolver, yaml, ctx) {
        return Ok(Vec::new());
    }
    let insecure = match yaml.routes.autogenerate.insecure.as_deref() {
        Some(value) => parse_insecure("autogenerated routes", value)?,
        None => InsecurePolicy::Allow,
    };

    let mut routes = Vec::new();
    for service in autogen_services {
        let domain = autogenerated_domain(pattern, service, ctx.environment, ctx.project);
        let mut route = RouteV2::new(domain.domain.as_str(), *service);
        route.insecure = insecure;
        route.autogenerated = true;
        route.alternative_names = domain.alternative_names.clone();
        routes.push(route);

        for prefix in yaml.routes.autogenerate.prefixes.iter() {
            let mut prefixed = RouteV2::new(
                format!("{}.{}", prefix, domain.domain),
                *service,
            );
            prefixed.insecure = insecure;
            prefixed.autogenerated = true;
            routes.push(prefixed);
        }
    }
    Ok(routes)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutogeneratedDomain {
    pub domain: String,
    pub alternative_names: Vec<String>,
}

/// Substitutes `${service}`, `${environment}` and `${project}` in the router pattern. Domains
/// longer than 53 characters are replaced by `<service>-<hash>.<rest of the domain>`, keeping the
/// long form as an alternative name, and any DNS label longer than 63 characters is shortened.
pub fn autogenerated_domain(
    pattern: &str,
    service: &str,
    environment: &str,
    project: &str,
) -> AutogeneratedDomain {
    let environment = make_safe(environment);
    let substituted = pattern
        .replace("${service}", service)
        .replace("${environment}", &environment)
        .replace("${project}", project);
    let hash = short_hash(&format!("{}-{}", project, environment));

    if substituted.len() <= MAX_AUTOGENERATED_DOMAIN_LENGTH {
        return AutogeneratedDomain {
            domain: shorten_labels(&substituted, &hash),
            alternative_names: Vec::new(),
        };
    }
    let suffix = substituted
        .find('.')
        .map(|idx| &substituted[(idx + 1)..])
        .unwrap_or("");
    let short = if suffix.is_empty() {
        format!("{}-{}", service, hash)
    } else {
        format!("{}-{}.{}", service, hash, suffix)
    };
    AutogeneratedDomain {
        domain: shorten_labels(&short, &hash),
        alternative_names: vec![shorten_labels(&substituted, &hash)],
    }
}

fn shorten_labels(domain: &str, hash: &str) -> String {
    let labels: Vec<String> = domain
        .split('.')
        .map(|label| truncate_with_hash(label, MAX_DNS_LABEL_LENGTH, 54, hash))
        .collect();
    labels.join(".")
}
