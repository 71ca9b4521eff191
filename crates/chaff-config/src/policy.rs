//! Validated policy structures

use crate::preset::{Preset, PresetDefaults};
use crate::range::TargetRange;
use crate::schema::{RawConfig, RawExtraTarget, RawNoise, RawPortPool, RawProbe};
use crate::validation::ValidationError;
use chaff_api::{NoiseCorpus, Protocol, Target};
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

/// Fake flags used when the config does not list any
pub const DEFAULT_FAKE_FLAGS: &[&str] = &[
    "FLAG{ThisIsNotMe}",
    "FLAG{TryAgain}",
    "FLAG{SORRY}",
    "FLAG{NotTheFlag}",
    "FLAG{AlmostThere}",
    "FLAG{WrongOne}",
    "FLAG{NOPE}",
    "FLAG{CloseButNo}",
];

/// Well-known ports kept clear of the real flag by default
pub const DEFAULT_EXCLUDED_PORTS: &[u16] = &[53, 80, 23];

/// Ports used for background noise by default
pub const DEFAULT_NOISE_PORTS: &[u16] = &[53, 80, 23, 22, 443];

pub const DEFAULT_PORT_MIN: u16 = 1024;
pub const DEFAULT_PORT_MAX: u16 = 65535;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_CONCURRENT_SENDS: usize = 32;
pub const DEFAULT_PRIVILEGED_USERS: &[&str] = &["root"];

/// Validated policy ready for use by the core
#[derive(Debug, Clone)]
pub struct Policy {
    pub preset: Preset,
    pub targets: TargetsPolicy,
    pub schedule: SchedulePolicy,
    pub flags: FlagsPolicy,
    pub ports: PortsPolicy,
    pub session: SessionPolicy,
    pub emission: EmissionPolicy,
    pub noise: NoisePolicy,
}

impl Policy {
    /// Convert from raw config (after validation)
    ///
    /// Relies on `validate_config` having accepted `raw`; most values that
    /// would have failed validation fall back to defaults. A real-flag pool
    /// left empty by `ports.excluded` has no safe default and is an error.
    pub fn from_raw(raw: RawConfig) -> Result<Self, ValidationError> {
        let preset = resolve_preset(&raw).unwrap_or_default();
        let defaults = preset.defaults();

        let schedule = SchedulePolicy::resolve(&raw, &defaults);
        let session = SessionPolicy::resolve(&raw, &schedule);

        Ok(Self {
            preset,
            targets: TargetsPolicy::from_raw(&raw),
            flags: FlagsPolicy::from_raw(&raw),
            ports: PortsPolicy::from_raw(&raw)?,
            emission: EmissionPolicy::resolve(&raw, &defaults),
            noise: NoisePolicy::resolve(&raw.noise, &defaults),
            schedule,
            session,
        })
    }

    /// Number of fake-flag waves before the real flag becomes eligible
    pub fn fake_flag_count(&self) -> usize {
        self.flags.fake.len()
    }
}

pub(crate) fn resolve_preset(raw: &RawConfig) -> Result<Preset, String> {
    match &raw.preset {
        Some(name) => name.parse(),
        None => Ok(Preset::default()),
    }
}

/// Target set inputs
#[derive(Debug, Clone)]
pub struct TargetsPolicy {
    pub range: TargetRange,
    /// Port applied to every range target
    pub range_port: Option<u16>,
    /// Auxiliary targets, in configured order
    pub extras: Vec<Target>,
}

impl TargetsPolicy {
    fn from_raw(raw: &RawConfig) -> Self {
        // validate_config rejects malformed ranges before we get here
        let range = raw
            .targets
            .range
            .parse()
            .unwrap_or_else(|_| TargetRange::single(std::net::Ipv4Addr::LOCALHOST));

        Self {
            range,
            range_port: raw.targets.fixed_port,
            extras: raw
                .targets
                .extra
                .iter()
                .filter_map(|e| parse_extra(e).ok())
                .collect(),
        }
    }
}

pub(crate) fn parse_extra(extra: &RawExtraTarget) -> Result<Target, String> {
    let address: IpAddr = extra
        .address()
        .trim()
        .parse()
        .map_err(|_| format!("invalid address '{}'", extra.address()))?;

    Ok(match extra.port() {
        Some(port) => Target::with_port(address, port),
        None => Target::new(address),
    })
}

/// Timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulePolicy {
    pub tick_interval: Duration,
    pub wave_interval: Duration,
    pub real_flag_interval: Duration,
}

impl SchedulePolicy {
    pub(crate) fn resolve(raw: &RawConfig, defaults: &PresetDefaults) -> Self {
        Self {
            tick_interval: raw
                .schedule
                .tick_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.tick_interval),
            wave_interval: raw
                .schedule
                .wave_interval_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.wave_interval),
            real_flag_interval: raw
                .schedule
                .real_flag_interval_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.real_flag_interval),
        }
    }
}

/// Flag texts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagsPolicy {
    pub real: String,
    /// Sent in order, one per wave
    pub fake: Vec<String>,
}

impl FlagsPolicy {
    fn from_raw(raw: &RawConfig) -> Self {
        Self {
            real: raw.flags.real.clone(),
            fake: resolve_fake_flags(raw),
        }
    }
}

pub(crate) fn resolve_fake_flags(raw: &RawConfig) -> Vec<String> {
    raw.flags
        .fake
        .clone()
        .unwrap_or_else(|| DEFAULT_FAKE_FLAGS.iter().map(|s| s.to_string()).collect())
}

/// Non-empty, de-duplicated set of ports in ascending order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSet(Vec<u16>);

impl PortSet {
    /// Build from ports, dropping port 0 and any in `excluded`.
    /// Returns None if nothing remains.
    pub fn new(
        ports: impl IntoIterator<Item = u16>,
        excluded: &BTreeSet<u16>,
    ) -> Option<Self> {
        let set: BTreeSet<u16> = ports
            .into_iter()
            .filter(|p| *p != 0 && !excluded.contains(p))
            .collect();

        if set.is_empty() {
            None
        } else {
            Some(Self(set.into_iter().collect()))
        }
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, port: u16) -> bool {
        self.0.binary_search(&port).is_ok()
    }

    fn default_high() -> Self {
        Self((DEFAULT_PORT_MIN..=DEFAULT_PORT_MAX).collect())
    }
}

pub(crate) fn pool_ports(pool: &RawPortPool) -> Vec<u16> {
    match pool {
        RawPortPool::Range { min, max } => (*min..=*max).collect(),
        RawPortPool::List(list) => list.clone(),
    }
}

/// Configured real-flag pool, or the default high range, before exclusion
pub(crate) fn real_flag_pool_ports(raw: &RawConfig) -> Vec<u16> {
    match &raw.ports.real_flag {
        Some(pool) => pool_ports(pool),
        None => (DEFAULT_PORT_MIN..=DEFAULT_PORT_MAX).collect(),
    }
}

/// Real-flag candidates: the pool minus `excluded`
pub(crate) fn resolve_real_flag_ports(
    raw: &RawConfig,
    excluded: &BTreeSet<u16>,
) -> Result<PortSet, ValidationError> {
    PortSet::new(real_flag_pool_ports(raw), excluded).ok_or_else(|| {
        ValidationError::NoRealFlagPorts {
            excluded: excluded.iter().copied().collect(),
        }
    })
}

pub(crate) fn resolve_excluded(raw: &RawConfig) -> BTreeSet<u16> {
    raw.ports
        .excluded
        .clone()
        .unwrap_or_else(|| DEFAULT_EXCLUDED_PORTS.to_vec())
        .into_iter()
        .collect()
}

/// Port selection
#[derive(Debug, Clone)]
pub struct PortsPolicy {
    pub excluded: BTreeSet<u16>,
    pub wave: PortSet,
    /// Real-flag pool with `excluded` already removed
    pub real_flag: PortSet,
}

impl PortsPolicy {
    fn from_raw(raw: &RawConfig) -> Result<Self, ValidationError> {
        let excluded = resolve_excluded(raw);
        let none = BTreeSet::new();

        let wave = raw
            .ports
            .wave
            .as_ref()
            .and_then(|p| PortSet::new(pool_ports(p), &none))
            .unwrap_or_else(PortSet::default_high);

        let real_flag = resolve_real_flag_ports(raw, &excluded)?;

        Ok(Self {
            excluded,
            wave,
            real_flag,
        })
    }
}

/// How the privileged-session signal is obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeSpec {
    Who { users: Vec<String> },
    Command { argv: Vec<String> },
    Always,
    Never,
}

impl ProbeSpec {
    fn from_raw(raw: Option<&RawProbe>) -> Self {
        match raw {
            None => Self::default_who(),
            Some(RawProbe::Who { users }) => ProbeSpec::Who {
                users: users.clone().unwrap_or_else(default_users),
            },
            Some(RawProbe::Command { argv }) => ProbeSpec::Command { argv: argv.clone() },
            Some(RawProbe::Always) => ProbeSpec::Always,
            Some(RawProbe::Never) => ProbeSpec::Never,
        }
    }

    fn default_who() -> Self {
        ProbeSpec::Who {
            users: default_users(),
        }
    }
}

impl fmt::Display for ProbeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeSpec::Who { users } => write!(f, "who ({})", users.join(", ")),
            ProbeSpec::Command { argv } => write!(f, "command ({})", argv.join(" ")),
            ProbeSpec::Always => write!(f, "always"),
            ProbeSpec::Never => write!(f, "never"),
        }
    }
}

fn default_users() -> Vec<String> {
    DEFAULT_PRIVILEGED_USERS.iter().map(|s| s.to_string()).collect()
}

/// Session monitor settings
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    pub probe: ProbeSpec,
    pub timeout: Duration,
    pub fail_open: bool,
}

impl SessionPolicy {
    pub(crate) fn resolve(raw: &RawConfig, schedule: &SchedulePolicy) -> Self {
        Self {
            probe: ProbeSpec::from_raw(raw.session.probe.as_ref()),
            timeout: resolve_probe_timeout(raw, schedule),
            fail_open: raw.session.fail_open.unwrap_or(false),
        }
    }
}

/// Explicit timeout, or the default capped at half a tick
pub(crate) fn resolve_probe_timeout(raw: &RawConfig, schedule: &SchedulePolicy) -> Duration {
    match raw.session.timeout_ms {
        Some(ms) => Duration::from_millis(ms),
        None => DEFAULT_PROBE_TIMEOUT.min(schedule.tick_interval / 2),
    }
}

/// Emission sink settings
#[derive(Debug, Clone)]
pub struct EmissionPolicy {
    pub max_concurrent_sends: usize,
    pub send_timeout: Duration,
    pub wave_protocols: Vec<Protocol>,
    pub real_flag_protocol: Protocol,
}

impl EmissionPolicy {
    fn resolve(raw: &RawConfig, defaults: &PresetDefaults) -> Self {
        Self {
            max_concurrent_sends: raw
                .emission
                .max_concurrent_sends
                .unwrap_or(DEFAULT_MAX_CONCURRENT_SENDS),
            send_timeout: raw
                .emission
                .send_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_SEND_TIMEOUT),
            wave_protocols: raw
                .emission
                .wave_protocols
                .as_ref()
                .map(|list| parse_protocols(list))
                .filter(|list| !list.is_empty())
                .unwrap_or_else(|| defaults.wave_protocols.clone()),
            real_flag_protocol: raw
                .emission
                .real_flag_protocol
                .as_ref()
                .and_then(|p| p.parse().ok())
                .unwrap_or(Protocol::Udp),
        }
    }
}

fn parse_protocols(list: &[String]) -> Vec<Protocol> {
    list.iter().filter_map(|p| p.parse().ok()).collect()
}

/// Background noise settings
#[derive(Debug, Clone)]
pub struct NoisePolicy {
    pub enabled: bool,
    pub interval: Duration,
    pub protocols: Vec<Protocol>,
    pub ports: Vec<u16>,
    pub fake_flag_ratio: f64,
    pub corpus: NoiseCorpus,
}

impl NoisePolicy {
    fn resolve(raw: &RawNoise, defaults: &PresetDefaults) -> Self {
        let base = NoiseCorpus::default();
        let corpus = NoiseCorpus {
            words: raw.words.clone().unwrap_or(base.words),
            dns_domains: raw.dns_domains.clone().unwrap_or(base.dns_domains),
            http_requests: raw.http_requests.clone().unwrap_or(base.http_requests),
            dns_zone: raw.dns_zone.clone().unwrap_or(base.dns_zone),
        };

        Self {
            enabled: raw.enabled.unwrap_or(defaults.noise_enabled),
            interval: raw
                .interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.noise_interval),
            protocols: raw
                .protocols
                .as_ref()
                .map(|list| parse_protocols(list))
                .filter(|list| !list.is_empty())
                .unwrap_or_else(|| defaults.noise_protocols.clone()),
            ports: raw
                .ports
                .clone()
                .unwrap_or_else(|| DEFAULT_NOISE_PORTS.to_vec()),
            fake_flag_ratio: raw
                .fake_flag_ratio
                .unwrap_or(defaults.noise_fake_flag_ratio),
            corpus,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_config;

    const MINIMAL: &str = r#"
        config_version = 1

        [targets]
        range = "172.16.200.1-253"
        extra = ["172.16.120.11"]

        [flags]
        real = "FLAG{real}"
    "#;

    #[test]
    fn defaults_follow_standard_preset() {
        let policy = parse_config(MINIMAL).unwrap();

        assert_eq!(policy.preset, Preset::Standard);
        assert_eq!(policy.schedule.tick_interval, Duration::from_secs(1));
        assert_eq!(policy.schedule.wave_interval, Duration::from_secs(10));
        assert_eq!(policy.schedule.real_flag_interval, Duration::from_secs(300));
        assert_eq!(policy.fake_flag_count(), DEFAULT_FAKE_FLAGS.len());
        assert!(!policy.noise.enabled);
        assert_eq!(policy.emission.real_flag_protocol, Protocol::Udp);
        assert_eq!(policy.session.probe, ProbeSpec::Who { users: vec!["root".into()] });
        assert!(!policy.session.fail_open);
    }

    #[test]
    fn probe_timeout_defaults_inside_tick() {
        let policy = parse_config(MINIMAL).unwrap();
        assert!(policy.session.timeout < policy.schedule.tick_interval);
        assert_eq!(policy.session.timeout, Duration::from_millis(500));
    }

    #[test]
    fn real_flag_ports_skip_excluded() {
        let config = r#"
            config_version = 1

            [targets]
            range = "10.0.0.1"

            [flags]
            real = "FLAG{real}"

            [ports]
            excluded = [53, 80, 23]
            real_flag = [23, 53, 80, 8080]
        "#;

        let policy = parse_config(config).unwrap();
        assert_eq!(policy.ports.real_flag.as_slice(), &[8080]);
        assert!(policy.ports.excluded.contains(&53));
    }

    #[test]
    fn default_real_flag_pool_honors_excluded() {
        let config = r#"
            config_version = 1

            [targets]
            range = "10.0.0.1"

            [flags]
            real = "FLAG{real}"

            [ports]
            excluded = [1024, 1025, 65535]
        "#;

        let policy = parse_config(config).unwrap();
        let real = &policy.ports.real_flag;
        assert_eq!(real.len(), 64509);
        assert!(!real.contains(1024) && !real.contains(1025) && !real.contains(65535));
        assert!(real.contains(1026));
    }

    #[test]
    fn fully_excluded_pool_is_not_replaced() {
        let mut raw: RawConfig = toml::from_str(MINIMAL).unwrap();
        raw.ports.excluded = Some((1024..=65535).collect());

        // Even without validation, excluded ports never come back
        assert!(matches!(
            Policy::from_raw(raw),
            Err(ValidationError::NoRealFlagPorts { .. })
        ));
    }

    #[test]
    fn explicit_probe_timeout_in_milliseconds() {
        let config = format!("{}\n[session]\ntimeout_ms = 750\n", MINIMAL);
        let policy = parse_config(&config).unwrap();
        assert_eq!(policy.session.timeout, Duration::from_millis(750));
    }

    #[test]
    fn explicit_values_override_preset() {
        let config = r#"
            config_version = 1
            preset = "quiet"

            [targets]
            range = "10.0.0.1-4"

            [schedule]
            wave_interval_seconds = 7

            [flags]
            real = "FLAG{real}"
            fake = ["FLAG{one}"]
        "#;

        let policy = parse_config(config).unwrap();
        assert_eq!(policy.preset, Preset::Quiet);
        assert_eq!(policy.schedule.tick_interval, Duration::from_secs(5));
        assert_eq!(policy.schedule.wave_interval, Duration::from_secs(7));
        assert_eq!(policy.emission.wave_protocols, vec![Protocol::Udp]);
        assert_eq!(policy.flags.fake, vec!["FLAG{one}".to_string()]);
    }

    #[test]
    fn probe_spec_display() {
        let who = ProbeSpec::Who {
            users: vec!["root".into(), "admin".into()],
        };
        assert_eq!(who.to_string(), "who (root, admin)");

        let command = ProbeSpec::Command {
            argv: vec!["/usr/local/bin/admin-check".into(), "--quiet".into()],
        };
        assert_eq!(command.to_string(), "command (/usr/local/bin/admin-check --quiet)");
        assert_eq!(ProbeSpec::Never.to_string(), "never");
    }

    #[test]
    fn port_set_dedupes_and_sorts() {
        let set = PortSet::new(vec![9000, 0, 80, 9000, 443], &BTreeSet::from([443])).unwrap();
        assert_eq!(set.as_slice(), &[80, 9000]);
        assert!(set.contains(80));
        assert!(!set.contains(443));
        assert!(PortSet::new(vec![53], &BTreeSet::from([53])).is_none());
    }
}
