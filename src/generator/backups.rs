//! Backup schedules, retention and storage location for the environment
use crate::generator::crontab::convert_crontab;
use crate::generator::precedence::{Resolved, Resolver, Source};
use crate::generator::{BuildType, ConfigError, EnvironmentType};
use crate::inputs::{LagoonYaml, BUILD_SCOPES};

pub const DEFAULT_BACKUP_SCHEDULE: &str = "M H(22-2) * * *";
pub const DEFAULT_CHECK_SCHEDULE: &str = "M H(5-8) * * 1";
pub const DEFAULT_PRUNE_SCHEDULE: &str = "M H(3-5) * * 0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PruneRetention {
    pub hourly: u32,
    pub daily: u32,
    pub weekly: u32,
    pub monthly: u32,
}

impl Default for PruneRetention {
    fn default() -> Self {
        PruneRetention {
            hourly: 0,
            daily: 7,
            weekly: 6,
            monthly: 1,
        }
    }
}

impl PruneRetention {
    /// Parses `hourly:daily:weekly:monthly`
    fn parse(resolved: &Resolved) -> Result<PruneRetention, ConfigError> {
        let invalid = || ConfigError::InvalidRetention {
            value: resolved.value.clone(),
            origin: resolved.origin.clone(),
        };
        let values = resolved
            .value
            .split(':')
            .map(|v| v.trim().parse::<u32>())
            .collect::<Result<Vec<u32>, _>>()
            .map_err(|_| invalid())?;
        match values.as_slice() {
            [hourly, daily, weekly, monthly] => Ok(PruneRetention {
                hourly: *hourly,
                daily: *daily,
                weekly: *weekly,
                monthly: *monthly,
            }),
            _ => Err(invalid()),
        }
    }
}

/// An S3 compatible location for backups or restores
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct S3Location {
    pub endpoint: Option<String>,
    pub bucket: String,
}

#[derive(Clone, PartialEq, Serialize)]
pub struct CustomLocation {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for CustomLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("CustomLocation")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupConfiguration {
    pub backup_schedule: String,
    pub check_schedule: String,
    pub prune_schedule: String,
    pub prune_retention: PruneRetention,
    pub s3: S3Location,
    pub custom_backup: Option<CustomLocation>,
    pub custom_restore: Option<CustomLocation>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackupContext<'a> {
    pub project: &'a str,
    pub namespace: &'a str,
    pub build_type: BuildType,
    pub environment_type: EnvironmentType,
    pub custom_backup_config: bool,
}

/// The variable name fragment for the kind of environment being built
fn branch_key(build_type: BuildType, environment_type: EnvironmentType) -> &'static str {
    match (build_type, environment_type) {
        (BuildType::PullRequest, _) => "PR",
        (_, EnvironmentType::Production) => "PROD",
        (_, EnvironmentType::Development) => "DEV",
    }
}

pub fn resolve_backups(
    resolver: &Resolver<'_>,
    yaml: &LagoonYaml,
    ctx: &BackupContext<'_>,
) -> Result<BackupConfiguration, ConfigError> {
    let key = branch_key(ctx.build_type, ctx.environment_type);
    let is_production = ctx.environment_type == EnvironmentType::Production;

    let mut schedule = Resolved {
        value: DEFAULT_BACKUP_SCHEDULE.to_owned(),
        origin: "default backup schedule".to_owned(),
    };
    let mut retention = PruneRetention::default();

    if ctx.custom_backup_config {
        if let Some(resolved) = resolver.resolve(&branch_sources(key, "SCHEDULE")) {
            log::debug!("using backup schedule from {}", resolved.origin);
            schedule = resolved;
        }
        if let Some(resolved) = resolver.resolve(&branch_sources(key, "RETENTION")) {
            log::debug!("using backup retention from {}", resolved.origin);
            retention = PruneRetention::parse(&resolved)?;
        }
    }

    if is_production {
        if let Some(production) = yaml.backup_schedule.production.as_ref() {
            schedule = Resolved {
                value: production.clone(),
                origin: ".lagoon.yml backup-schedule.production".to_owned(),
            };
        }
        if let Some(production) = yaml.backup_retention.production.as_ref() {
            retention.hourly = production.hourly.unwrap_or(retention.hourly);
            retention.daily = production.daily.unwrap_or(retention.daily);
            retention.weekly = production.weekly.unwrap_or(retention.weekly);
            retention.monthly = production.monthly.unwrap_or(retention.monthly);
        }
    }

    let (custom_backup, custom_restore) = if ctx.custom_backup_config {
        (
            custom_location(resolver, "LAGOON_BAAS_CUSTOM_BACKUP"),
            custom_location(resolver, "LAGOON_BAAS_CUSTOM_RESTORE"),
        )
    } else {
        (None, None)
    };

    Ok(BackupConfiguration {
        backup_schedule: convert_crontab(ctx.namespace, &schedule.value)?,
        check_schedule: convert_crontab(ctx.namespace, DEFAULT_CHECK_SCHEDULE)?,
        prune_schedule: convert_crontab(ctx.namespace, DEFAULT_PRUNE_SCHEDULE)?,
        prune_retention: retention,
        s3: S3Location {
            endpoint: resolver.env().get("BAAS_BACKUP_ENDPOINT").map(str::to_owned),
            bucket: format!("baas-{}", ctx.project),
        },
        custom_backup,
        custom_restore,
    })
}

fn branch_sources<'a>(key: &str, setting: &str) -> Vec<Source<'a>> {
    vec![
        Source::variable(format!("LAGOON_BACKUP_{}_{}", key, setting), BUILD_SCOPES),
        Source::build_env(format!("LAGOON_FEATURE_BACKUP_{}_{}", key, setting)),
    ]
}

/// A custom location is only used if all four of its values are set
fn custom_location(resolver: &Resolver<'_>, prefix: &str) -> Option<CustomLocation> {
    let get = |suffix: &str| {
        resolver
            .variable(&format!("{}_{}", prefix, suffix), BUILD_SCOPES)
            .map(str::to_owned)
    };
    let location = CustomLocation {
        endpoint: get("ENDPOINT")?,
        bucket: get("BUCKET")?,
        access_key: get("ACCESS_KEY")?,
        secret_key: get("SECRET_KEY")?,
    };
    Some(location)
}
