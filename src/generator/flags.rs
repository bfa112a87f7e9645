//! Feature flags. A flag `X` is resolved, in order, from `ADMIN_LAGOON_FEATURE_FLAG_X` and
//! `LAGOON_FEATURE_FLAG_FORCE_X` in the build environment, the `LAGOON_FEATURE_FLAG_X` Lagoon
//! variable, `LAGOON_FEATURE_FLAG_DEFAULT_X` in the build environment, and finally a compiled in
//! default.
use crate::config::parse_truthy;
use crate::generator::precedence::{Resolved, Resolver, Source};
use crate::inputs::BUILD_SCOPES;

pub const SPOT_INSTANCE_PRODUCTION: &str = "SPOT_INSTANCE_PRODUCTION";
pub const SPOT_INSTANCE_DEVELOPMENT: &str = "SPOT_INSTANCE_DEVELOPMENT";
pub const ROOTLESS_WORKLOAD: &str = "ROOTLESS_WORKLOAD";
pub const ISOLATION_NETWORK_POLICY: &str = "ISOLATION_NETWORK_POLICY";
pub const IMAGECACHE_REGISTRY: &str = "IMAGECACHE_REGISTRY";
pub const CUSTOM_BACKUP_CONFIG: &str = "CUSTOM_BACKUP_CONFIG";

pub fn flag_sources<'a>(key: &str, default: &str) -> Vec<Source<'a>> {
    vec![
        Source::build_env(format!("ADMIN_LAGOON_FEATURE_FLAG_{}", key)),
        Source::build_env(format!("LAGOON_FEATURE_FLAG_FORCE_{}", key)),
        Source::variable(format!("LAGOON_FEATURE_FLAG_{}", key), BUILD_SCOPES),
        Source::build_env(format!("LAGOON_FEATURE_FLAG_DEFAULT_{}", key)),
        Source::literal(default, "compiled default"),
    ]
}

/// Resolves a feature flag. The result is `None` only if nothing is set and the default is empty.
pub fn feature_flag(resolver: &Resolver<'_>, key: &str, default: &str) -> Option<Resolved> {
    resolver.resolve(&flag_sources(key, default))
}

/// Resolves a feature flag as a toggle. `enabled`, `true`, `yes` and `1` all mean on.
pub fn flag_enabled(resolver: &Resolver<'_>, key: &str, default: bool) -> bool {
    let default = if default { "enabled" } else { "disabled" };
    feature_flag(resolver, key, default)
        .map(|resolved| parse_truthy(&resolved.value))
        .unwrap_or(false)
}

/// How spot instances should be used for one environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotMode {
    Disabled,
    /// Workloads tolerate spot nodes but may be scheduled anywhere
    Enabled,
    /// Workloads are required to run on spot nodes
    Force,
}

impl Default for SpotMode {
    fn default() -> Self {
        SpotMode::Disabled
    }
}

impl SpotMode {
    pub fn is_enabled(self) -> bool {
        self != SpotMode::Disabled
    }
}

pub fn spot_mode(resolver: &Resolver<'_>, key: &str) -> SpotMode {
    match feature_flag(resolver, key, "disabled") {
        Some(resolved) if resolved.value.eq_ignore_ascii_case("force") => SpotMode::Force,
        Some(resolved) if parse_truthy(&resolved.value) => SpotMode::Enabled,
        _ => SpotMode::Disabled,
    }
}

/// The toggles derived from feature flags that the templates need
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureFlags {
    pub spot_instance_production: SpotMode,
    pub spot_instance_development: SpotMode,
    pub rootless_workload: bool,
    pub isolation_network_policy: bool,
    pub image_cache: Option<String>,
    pub custom_backup_config: bool,
}

impl FeatureFlags {
    pub fn resolve(resolver: &Resolver<'_>) -> FeatureFlags {
        let image_cache = feature_flag(resolver, IMAGECACHE_REGISTRY, "")
            .map(|resolved| resolved.value.trim_end_matches('/').to_owned())
            .filter(|registry| !registry.is_empty());
        FeatureFlags {
            spot_instance_production: spot_mode(resolver, SPOT_INSTANCE_PRODUCTION),
            spot_instance_development: spot_mode(resolver, SPOT_INSTANCE_DEVELOPMENT),
            rootless_workload: flag_enabled(resolver, ROOTLESS_WORKLOAD, false),
            isolation_network_policy: flag_enabled(resolver, ISOLATION_NETWORK_POLICY, false),
            image_cache,
            custom_backup_config: flag_enabled(resolver, CUSTOM_BACKUP_CONFIG, true),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::BuildEnv;
    use crate::inputs::{EnvironmentVariable, Scope};

    #[test]
    fn admin_flag_beats_everything() {
        let env = BuildEnv::default()
            .with("ADMIN_LAGOON_FEATURE_FLAG_ROOTLESS_WORKLOAD", "disabled")
            .with("LAGOON_FEATURE_FLAG_FORCE_ROOTLESS_WORKLOAD", "enabled");
        let vars = vec![EnvironmentVariable::new(
            "LAGOON_FEATURE_FLAG_ROOTLESS_WORKLOAD",
            "enabled",
            Scope::Build,
        )];
        let resolver = Resolver::new(&env, &vars);
        let resolved = feature_flag(&resolver, ROOTLESS_WORKLOAD, "").unwrap();
        assert_eq!("disabled", resolved.value);
        assert_eq!(
            "build variable ADMIN_LAGOON_FEATURE_FLAG_ROOTLESS_WORKLOAD",
            resolved.origin
        );
        assert!(!flag_enabled(&resolver, ROOTLESS_WORKLOAD, true));
    }

    #[test]
    fn api_variable_beats_build_default() {
        let env = BuildEnv::default()
            .with("LAGOON_FEATURE_FLAG_DEFAULT_ISOLATION_NETWORK_POLICY", "disabled");
        let vars = vec![EnvironmentVariable::new(
            "LAGOON_FEATURE_FLAG_ISOLATION_NETWORK_POLICY",
            "enabled",
            Scope::Global,
        )];
        let resolver = Resolver::new(&env, &vars);
        assert!(flag_enabled(&resolver, ISOLATION_NETWORK_POLICY, false));

        let no_vars = Vec::new();
        let resolver = Resolver::new(&env, &no_vars);
        assert!(!flag_enabled(&resolver, ISOLATION_NETWORK_POLICY, true));
    }

    #[test]
    fn compiled_default_is_used_last() {
        let env = BuildEnv::default();
        let vars = Vec::new();
        let resolver = Resolver::new(&env, &vars);
        let flags = FeatureFlags::resolve(&resolver);
        assert!(flags.custom_backup_config);
        assert!(!flags.rootless_workload);
        assert_eq!(SpotMode::Disabled, flags.spot_instance_production);
        assert_eq!(None, flags.image_cache);
    }

    #[test]
    fn spot_flags_support_force() {
        let env = BuildEnv::default()
            .with("LAGOON_FEATURE_FLAG_FORCE_SPOT_INSTANCE_PRODUCTION", "force")
            .with("LAGOON_FEATURE_FLAG_DEFAULT_SPOT_INSTANCE_DEVELOPMENT", "enabled")
            .with("LAGOON_FEATURE_FLAG_DEFAULT_IMAGECACHE_REGISTRY", "imagecache.example.com/");
        let vars = Vec::new();
        let flags = FeatureFlags::resolve(&Resolver::new(&env, &vars));
        assert_eq!(SpotMode::Force, flags.spot_instance_production);
        assert_eq!(SpotMode::Enabled, flags.spot_instance_development);
        assert_eq!(Some("imagecache.example.com".to_owned()), flags.image_cache);
    }
}
