//! Configuration validation

use crate::policy::{
    parse_extra, resolve_excluded, resolve_fake_flags, resolve_preset, resolve_probe_timeout,
    resolve_real_flag_ports, SchedulePolicy,
};
use crate::range::TargetRange;
use crate::schema::{RawConfig, RawPortPool, RawProbe};
use chaff_api::Protocol;
use std::collections::HashSet;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Unknown preset '{0}'")]
    UnknownPreset(String),

    #[error("Invalid target range '{value}': {message}")]
    InvalidRange { value: String, message: String },

    #[error("Extra target: {0}")]
    InvalidExtraTarget(String),

    #[error("Flag error: {0}")]
    FlagError(String),

    #[error("'{field}' must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("Probe timeout {timeout_ms}ms must be shorter than tick interval {tick_ms}ms")]
    ProbeTimeoutTooLong { timeout_ms: u128, tick_ms: u128 },

    #[error("Port pool '{pool}': {message}")]
    PortPoolError { pool: &'static str, message: String },

    #[error("No real-flag ports remain after removing excluded ports {excluded:?}")]
    NoRealFlagPorts { excluded: Vec<u16> },

    #[error("Protocol list '{field}': {message}")]
    ProtocolError { field: &'static str, message: String },

    #[error("Probe error: {0}")]
    ProbeError(String),

    #[error("Noise config error: {0}")]
    NoiseError(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let preset = match resolve_preset(config) {
        Ok(preset) => preset,
        Err(_) => {
            errors.push(ValidationError::UnknownPreset(
                config.preset.clone().unwrap_or_default(),
            ));
            Default::default()
        }
    };
    let defaults = preset.defaults();

    errors.extend(validate_targets(config));
    errors.extend(validate_flags(config));

    let schedule = SchedulePolicy::resolve(config, &defaults);
    errors.extend(validate_schedule(&schedule));
    errors.extend(validate_session(config, &schedule));
    errors.extend(validate_ports(config));
    errors.extend(validate_emission(config));
    errors.extend(validate_noise(config));

    errors
}

fn validate_targets(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Err(e) = config.targets.range.parse::<TargetRange>() {
        errors.push(ValidationError::InvalidRange {
            value: config.targets.range.clone(),
            message: e.to_string(),
        });
    }

    if config.targets.fixed_port == Some(0) {
        errors.push(ValidationError::PortPoolError {
            pool: "targets.fixed_port",
            message: "port 0 is not allowed".into(),
        });
    }

    for extra in &config.targets.extra {
        match parse_extra(extra) {
            Ok(target) if target.fixed_port == Some(0) => {
                errors.push(ValidationError::InvalidExtraTarget(format!(
                    "port 0 is not allowed for {}",
                    target.address
                )));
            }
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::InvalidExtraTarget(e)),
        }
    }

    errors
}

fn validate_flags(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.flags.real.trim().is_empty() {
        errors.push(ValidationError::FlagError("real flag cannot be empty".into()));
    }

    let fake = resolve_fake_flags(config);
    if fake.is_empty() {
        errors.push(ValidationError::FlagError(
            "at least one fake flag is required".into(),
        ));
    }

    let mut seen = HashSet::new();
    for flag in &fake {
        if flag.trim().is_empty() {
            errors.push(ValidationError::FlagError("fake flag cannot be empty".into()));
        } else if *flag == config.flags.real {
            errors.push(ValidationError::FlagError(
                "a fake flag is identical to the real flag".into(),
            ));
        } else if !seen.insert(flag.as_str()) {
            errors.push(ValidationError::FlagError(format!(
                "duplicate fake flag '{}'",
                flag
            )));
        }
    }

    errors
}

fn validate_schedule(schedule: &SchedulePolicy) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if schedule.tick_interval.is_zero() {
        errors.push(ValidationError::ZeroValue {
            field: "schedule.tick_interval_ms",
        });
    }
    if schedule.wave_interval.is_zero() {
        errors.push(ValidationError::ZeroValue {
            field: "schedule.wave_interval_seconds",
        });
    }
    if schedule.real_flag_interval.is_zero() {
        errors.push(ValidationError::ZeroValue {
            field: "schedule.real_flag_interval_seconds",
        });
    }

    errors
}

fn validate_session(config: &RawConfig, schedule: &SchedulePolicy) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let timeout = resolve_probe_timeout(config, schedule);
    if timeout.is_zero() {
        errors.push(ValidationError::ZeroValue {
            field: "session.timeout_ms",
        });
    } else if !schedule.tick_interval.is_zero() && timeout >= schedule.tick_interval {
        errors.push(ValidationError::ProbeTimeoutTooLong {
            timeout_ms: timeout.as_millis(),
            tick_ms: schedule.tick_interval.as_millis(),
        });
    }

    match &config.session.probe {
        Some(RawProbe::Command { argv }) => {
            if argv.first().is_none_or(|program| program.trim().is_empty()) {
                errors.push(ValidationError::ProbeError(
                    "command probe argv cannot be empty".into(),
                ));
            }
        }
        Some(RawProbe::Who { users: Some(users) }) => {
            if users.iter().all(|u| u.trim().is_empty()) {
                errors.push(ValidationError::ProbeError(
                    "who probe needs at least one user".into(),
                ));
            }
        }
        _ => {}
    }

    errors
}

fn validate_pool(pool: &RawPortPool, name: &'static str) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    match pool {
        RawPortPool::Range { min, max } => {
            if min > max {
                errors.push(ValidationError::PortPoolError {
                    pool: name,
                    message: format!("min {} is greater than max {}", min, max),
                });
            }
            if *min == 0 {
                errors.push(ValidationError::PortPoolError {
                    pool: name,
                    message: "port 0 is not allowed".into(),
                });
            }
        }
        RawPortPool::List(list) => {
            if list.is_empty() {
                errors.push(ValidationError::PortPoolError {
                    pool: name,
                    message: "port list cannot be empty".into(),
                });
            }
            if list.contains(&0) {
                errors.push(ValidationError::PortPoolError {
                    pool: name,
                    message: "port 0 is not allowed".into(),
                });
            }
        }
    }

    errors
}

fn validate_ports(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(wave) = &config.ports.wave {
        errors.extend(validate_pool(wave, "ports.wave"));
    }

    let real_pool_ok = match &config.ports.real_flag {
        Some(real) => {
            let pool_errors = validate_pool(real, "ports.real_flag");
            let ok = pool_errors.is_empty();
            errors.extend(pool_errors);
            ok
        }
        None => true,
    };

    // Applies to the default pool as well as an explicit one
    if real_pool_ok
        && let Err(e) = resolve_real_flag_ports(config, &resolve_excluded(config))
    {
        errors.push(e);
    }

    errors
}

fn validate_protocols(
    list: Option<&Vec<String>>,
    field: &'static str,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let Some(list) = list else {
        return errors;
    };

    if list.is_empty() {
        errors.push(ValidationError::ProtocolError {
            field,
            message: "list cannot be empty".into(),
        });
    }
    for name in list {
        if let Err(e) = name.parse::<Protocol>() {
            errors.push(ValidationError::ProtocolError {
                field,
                message: e.to_string(),
            });
        }
    }

    errors
}

fn validate_emission(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.emission.max_concurrent_sends == Some(0) {
        errors.push(ValidationError::ZeroValue {
            field: "emission.max_concurrent_sends",
        });
    }
    if config.emission.send_timeout_seconds == Some(0) {
        errors.push(ValidationError::ZeroValue {
            field: "emission.send_timeout_seconds",
        });
    }

    errors.extend(validate_protocols(
        config.emission.wave_protocols.as_ref(),
        "emission.wave_protocols",
    ));

    if let Some(name) = &config.emission.real_flag_protocol
        && let Err(e) = name.parse::<Protocol>()
    {
        errors.push(ValidationError::ProtocolError {
            field: "emission.real_flag_protocol",
            message: e.to_string(),
        });
    }

    errors
}

fn validate_noise(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let noise = &config.noise;

    if noise.interval_ms == Some(0) {
        errors.push(ValidationError::ZeroValue {
            field: "noise.interval_ms",
        });
    }

    errors.extend(validate_protocols(noise.protocols.as_ref(), "noise.protocols"));

    if let Some(ratio) = noise.fake_flag_ratio
        && !(0.0..=1.0).contains(&ratio)
    {
        errors.push(ValidationError::NoiseError(format!(
            "fake_flag_ratio {} is outside [0, 1]",
            ratio
        )));
    }

    if noise.ports.as_ref().is_some_and(|p| p.contains(&0)) {
        errors.push(ValidationError::PortPoolError {
            pool: "noise.ports",
            message: "port 0 is not allowed".into(),
        });
    }

    for (field, list) in [
        ("words", &noise.words),
        ("dns_domains", &noise.dns_domains),
        ("http_requests", &noise.http_requests),
    ] {
        if list.as_ref().is_some_and(|l| l.is_empty()) {
            errors.push(ValidationError::NoiseError(format!(
                "{} cannot be empty",
                field
            )));
        }
    }

    if noise.dns_zone.as_ref().is_some_and(|z| z.trim().is_empty()) {
        errors.push(ValidationError::NoiseError("dns_zone cannot be empty".into()));
    }

    errors
}
