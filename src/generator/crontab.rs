//! Namespace seeded cron schedules. Schedules may use `M` and `H` placeholders in place of a
//! literal minute or hour, which are replaced by values derived from the namespace. The same
//! namespace always gets the same schedule, and load from different namespaces is spread out.
use crate::generator::ConfigError;

use sha2::{Digest, Sha256};

/// Anything that runs at least this often is run inside the pod instead of as a native cronjob
pub const IN_POD_INTERVAL_MINUTES: u32 = 15;

fn seed(namespace: &str) -> u64 {
    let digest = Sha256::digest(namespace.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

fn invalid(schedule: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidCron {
        schedule: schedule.to_owned(),
        reason: reason.into(),
    }
}

/// Converts a schedule with `M`/`H` placeholders into a literal cron expression
pub fn convert_crontab(namespace: &str, schedule: &str) -> Result<String, ConfigError> {
    let fields: Vec<&str> = schedule.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(invalid(
            schedule,
            format!("expected 5 fields but found {}", fields.len()),
        ));
    }
    let seed = seed(namespace);
    let minute = convert_minute(schedule, fields[0], seed)?;
    let hour = convert_hour(schedule, fields[1], seed >> 16)?;
    validate_field(schedule, fields[2], 1, 31, &[])?;
    validate_field(schedule, fields[3], 1, 12, MONTH_NAMES)?;
    validate_field(schedule, fields[4], 0, 7, DAY_NAMES)?;

    Ok(format!(
        "{} {} {} {} {}",
        minute, hour, fields[2], fields[3], fields[4]
    ))
}

fn parse_step(schedule: &str, step: &str, max: u32) -> Result<u32, ConfigError> {
    match step.parse::<u32>() {
        Ok(n) if n > 0 && n <= max => Ok(n),
        _ => Err(invalid(schedule, format!("invalid step '{}'", step))),
    }
}

/// A list of every `step`th value starting at an offset derived from the seed
fn spread(seed: u64, step: u32, limit: u32) -> String {
    if step == 1 {
        return "*".to_owned();
    }
    let offset = (seed % u64::from(step)) as u32;
    let values: Vec<String> = (offset..limit)
        .step_by(step as usize)
        .map(|v| v.to_string())
        .collect();
    values.join(",")
}

fn convert_minute(schedule: &str, field: &str, seed: u64) -> Result<String, ConfigError> {
    if field == "M" || field == "H" {
        return Ok((seed % 60).to_string());
    }
    for prefix in &["M/", "H/", "*/"] {
        if let Some(step) = field.strip_prefix(*prefix) {
            let step = parse_step(schedule, step, 59)?;
            return Ok(spread(seed, step, 60));
        }
    }
    validate_field(schedule, field, 0, 59, &[])?;
    Ok(field.to_owned())
}

fn convert_hour(schedule: &str, field: &str, seed: u64) -> Result<String, ConfigError> {
    if field == "H" {
        return Ok((seed % 24).to_string());
    }
    if let Some(range) = field
        .strip_prefix("H(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        let (start, end) = parse_range(range)
            .filter(|(start, end)| *start < 24 && *end < 24)
            .ok_or_else(|| invalid(schedule, format!("invalid hour range '{}'", field)))?;
        // ranges like 22-2 wrap around midnight
        let len = if start <= end {
            end - start + 1
        } else {
            24 - start + end + 1
        };
        let hour = (start + (seed % u64::from(len)) as u32) % 24;
        return Ok(hour.to_string());
    }
    if let Some(step) = field.strip_prefix("H/") {
        let step = parse_step(schedule, step, 23)?;
        return Ok(spread(seed, step, 24));
    }
    validate_field(schedule, field, 0, 23, &[])?;
    Ok(field.to_owned())
}

fn parse_range(range: &str) -> Option<(u32, u32)> {
    let mut parts = range.splitn(2, '-');
    let start = parts.next()?.trim().parse().ok()?;
    let end = parts.next()?.trim().parse().ok()?;
    Some((start, end))
}

static MONTH_NAMES: &[&str] = &[
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
static DAY_NAMES: &[&str] = &["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// Validates a literal cron field: a comma separated list of `*`, `n`, `a-b`, each optionally
/// followed by `/step`
fn validate_field(
    schedule: &str,
    field: &str,
    min: u32,
    max: u32,
    names: &[&str],
) -> Result<(), ConfigError> {
    let in_range = |value: &str| -> bool {
        if names.contains(&value.to_ascii_lowercase().as_str()) {
            return true;
        }
        value
            .parse::<u32>()
            .map(|v| v >= min && v <= max)
            .unwrap_or(false)
    };

    for part in field.split(',') {
        let (base, step) = match part.find('/') {
            Some(idx) => (&part[..idx], Some(&part[(idx + 1)..])),
            None => (part, None),
        };
        if let Some(step) = step {
            parse_step(schedule, step, max.max(1))?;
        }
        let valid = match base {
            "*" => true,
            _ => match base.find('-') {
                Some(idx) => in_range(&base[..idx]) && in_range(&base[(idx + 1)..]),
                None => in_range(base),
            },
        };
        if !valid {
            return Err(invalid(
                schedule,
                format!("'{}' is not valid for a field with range {}-{}", part, min, max),
            ));
        }
    }
    Ok(())
}

/// Returns true if a converted schedule runs so often that it should run inside the pod: every
/// minute, or with two consecutive runs less than 15 minutes apart. When the schedule runs every
/// hour, the gap from the last minute of one hour to the first minute of the next counts too.
pub fn is_in_pod_schedule(converted: &str) -> bool {
    let mut fields = converted.split_whitespace();
    let minute = match fields.next() {
        Some(minute) => minute,
        None => return false,
    };
    let every_hour = fields.next().map(|hour| hour == "*").unwrap_or(false);
    if minute == "*" {
        return true;
    }
    if minute.contains('-') {
        return true;
    }
    let mut minutes: Vec<u32> = if let Some(step) = minute.strip_prefix("*/") {
        match step.parse::<u32>() {
            Ok(step) if step > 0 => (0..60).step_by(step as usize).collect(),
            _ => return false,
        }
    } else {
        match minute
            .split(',')
            .map(|m| m.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(minutes) => minutes,
            Err(_) => return false,
        }
    };
    minutes.sort_unstable();
    minutes.dedup();
    if minutes
        .windows(2)
        .any(|pair| pair[1] - pair[0] < IN_POD_INTERVAL_MINUTES)
    {
        return true;
    }
    match (minutes.first(), minutes.last()) {
        (Some(first), Some(last)) if every_hour && first != last => {
            60 - last + first < IN_POD_INTERVAL_MINUTES
        }
        _ => false,
    }
}
