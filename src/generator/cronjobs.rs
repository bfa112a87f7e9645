use crate::generator::crontab::{convert_crontab, is_in_pod_schedule};
use crate::generator::ConfigError;
use crate::inputs::CronjobConfig;
use crate::naming::{make_safe, sha256_hex, truncate_with_hash};

use std::collections::HashSet;
use std::time::Duration;

pub const DEFAULT_CRONJOB_TIMEOUT: &str = "4h";
pub const MAX_CRONJOB_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);
pub const MAX_CRONJOB_NAME_LENGTH: usize = 52;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CronjobValues {
    /// For native cronjobs this is the Kubernetes object name, otherwise the name from `.lagoon.yml`
    pub name: String,
    pub service: String,
    /// The converted schedule, with all placeholders replaced
    pub schedule: String,
    pub command: String,
    pub timeout: String,
    pub in_pod: bool,
}

/// Resolves the cronjobs of one compose service, split into those that run inside the pod and
/// those that become native Kubernetes cronjobs
pub fn resolve_cronjobs(
    namespace: &str,
    service: &str,
    cronjobs: &[CronjobConfig],
) -> Result<(Vec<CronjobValues>, Vec<CronjobValues>), ConfigError> {
    let mut in_pod = Vec::new();
    let mut native = Vec::new();
    let mut seen = HashSet::new();

    for cronjob in cronjobs.iter().filter(|c| c.service == service) {
        if !seen.insert(cronjob.name.as_str()) {
            return Err(ConfigError::DuplicateCronjob {
                service: service.to_owned(),
                name: cronjob.name.clone(),
            });
        }
        let schedule = convert_crontab(namespace, &cronjob.schedule)?;
        let timeout = cronjob
            .timeout
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_CRONJOB_TIMEOUT);
        validate_timeout(&cronjob.name, timeout)?;

        if is_in_pod_schedule(&schedule) {
            log::debug!(
                "cronjob '{}' for service {} runs at '{}', so it will run inside the pod",
                cronjob.name,
                service,
                schedule
            );
            in_pod.push(CronjobValues {
                name: cronjob.name.clone(),
                service: service.to_owned(),
                command: in_pod_command(&cronjob.command),
                schedule,
                timeout: timeout.to_owned(),
                in_pod: true,
            });
        } else {
            native.push(CronjobValues {
                name: native_cronjob_name(service, &cronjob.name),
                service: service.to_owned(),
                command: cronjob.command.clone(),
                schedule,
                timeout: timeout.to_owned(),
                in_pod: false,
            });
        }
    }
    Ok((in_pod, native))
}

/// Wraps the command with a lock so that a run is skipped while the previous one is still going
pub fn in_pod_command(command: &str) -> String {
    format!(
        "flock -n '/tmp/cron.lock.{}' -c '{}'",
        sha256_hex(command),
        command.replace('\'', r#"'"'"'"#)
    )
}

/// `cronjob-<service>-<name>`, made safe for use as an object name. Names that are too long
/// keep their first 45 characters and get a hash of the full name appended.
pub fn native_cronjob_name(service: &str, name: &str) -> String {
    let full = make_safe(&format!("cronjob-{}-{}", service, name));
    let hash = sha256_hex(&full);
    truncate_with_hash(&full, MAX_CRONJOB_NAME_LENGTH, 45, &hash[..6])
}

fn validate_timeout(name: &str, timeout: &str) -> Result<Duration, ConfigError> {
    let duration = parse_duration(timeout).ok_or_else(|| ConfigError::InvalidCronjobTimeout {
        name: name.to_owned(),
        timeout: timeout.to_owned(),
    })?;
    if duration > MAX_CRONJOB_TIMEOUT {
        return Err(ConfigError::CronjobTimeoutTooLong {
            name: name.to_owned(),
            timeout: timeout.to_owned(),
        });
    }
    Ok(duration)
}

/// Parses durations like `30m`, `1h30m` or `90s`
pub fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    let mut total = 0u64;
    let mut number = String::new();
    for c in input.chars() {
        if c.is_ascii_digit() {
            number.push(c);
            continue;
        }
        let value: u64 = number.parse().ok()?;
        number.clear();
        let multiplier = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return None,
        };
        total = total.checked_add(value.checked_mul(multiplier)?)?;
    }
    // every number needs a unit
    if !number.is_empty() {
        return None;
    }
    Some(Duration::from_secs(total))
}
