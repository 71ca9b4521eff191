//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Named preset supplying schedule/emission/noise defaults
    #[serde(default)]
    pub preset: Option<String>,

    /// Which endpoints receive traffic
    pub targets: RawTargets,

    #[serde(default)]
    pub schedule: RawSchedule,

    pub flags: RawFlags,

    #[serde(default)]
    pub ports: RawPorts,

    #[serde(default)]
    pub session: RawSession,

    #[serde(default)]
    pub emission: RawEmission,

    #[serde(default)]
    pub noise: RawNoise,
}

/// Target set specification
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawTargets {
    /// CIDR ("172.16.200.0/24"), last-octet range ("172.16.200.1-253"),
    /// full range ("10.0.0.5-10.0.1.20") or a single address
    pub range: String,

    /// Port used for every target enumerated from `range`
    pub fixed_port: Option<u16>,

    /// Auxiliary addresses appended after the range
    #[serde(default)]
    pub extra: Vec<RawExtraTarget>,
}

/// Auxiliary target: bare address or address with fixed port
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawExtraTarget {
    Address(String),
    WithPort { address: String, port: Option<u16> },
}

impl RawExtraTarget {
    pub fn address(&self) -> &str {
        match self {
            RawExtraTarget::Address(a) => a,
            RawExtraTarget::WithPort { address, .. } => address,
        }
    }

    pub fn port(&self) -> Option<u16> {
        match self {
            RawExtraTarget::Address(_) => None,
            RawExtraTarget::WithPort { port, .. } => *port,
        }
    }
}

/// Timing settings (preset defaults apply to unset fields)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSchedule {
    pub tick_interval_ms: Option<u64>,
    pub wave_interval_seconds: Option<u64>,
    pub real_flag_interval_seconds: Option<u64>,
}

/// Flag texts
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawFlags {
    pub real: String,

    /// Fake flags, sent in this order, one per wave (default: built-in list)
    pub fake: Option<Vec<String>>,
}

/// Port selection
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawPorts {
    /// Ports never used for the real flag (default: 53, 80, 23)
    pub excluded: Option<Vec<u16>>,

    /// Ports for fake-flag waves (default: 1024-65535)
    pub wave: Option<RawPortPool>,

    /// Ports for the real flag before exclusion (default: 1024-65535)
    pub real_flag: Option<RawPortPool>,
}

/// Either an inclusive range or an explicit list
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawPortPool {
    Range { min: u16, max: u16 },
    List(Vec<u16>),
}

/// Privileged-session probe settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSession {
    pub probe: Option<RawProbe>,

    /// Probe timeout; must be shorter than the tick interval
    /// (default: 5000, capped at half a tick)
    pub timeout_ms: Option<u64>,

    /// Treat probe failures as "privileged session active" (default: false)
    pub fail_open: Option<bool>,
}

/// Probe kind
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawProbe {
    /// Parse `who` output for privileged users
    Who {
        /// Users whose login counts as privileged (default: ["root"])
        users: Option<Vec<String>>,
    },
    /// Run a command; exit status 0 means active
    Command { argv: Vec<String> },
    Always,
    Never,
}

/// Emission sink settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawEmission {
    pub max_concurrent_sends: Option<usize>,
    pub send_timeout_seconds: Option<u64>,
    pub wave_protocols: Option<Vec<String>>,
    pub real_flag_protocol: Option<String>,
}

/// Background noise settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawNoise {
    pub enabled: Option<bool>,
    pub interval_ms: Option<u64>,
    pub protocols: Option<Vec<String>>,
    /// Ports for noise; a random high port is mixed in alongside these
    pub ports: Option<Vec<u16>>,
    /// Probability that a noise emission carries a fake flag instead
    pub fake_flag_ratio: Option<f64>,
    pub words: Option<Vec<String>>,
    pub dns_domains: Option<Vec<String>>,
    pub http_requests: Option<Vec<String>>,
    /// Zone under which DNS-carried flags are encoded
    pub dns_zone: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
            config_version = 1
            preset = "noisy"

            [targets]
            range = "172.16.200.1-253"
            extra = ["172.16.120.11", { address = "172.16.120.12", port = 31337 }]

            [schedule]
            wave_interval_seconds = 10

            [flags]
            real = "FLAG{real}"
            fake = ["FLAG{a}", "FLAG{b}"]

            [ports]
            excluded = [53, 80, 23]
            wave = { min = 1024, max = 65535 }
            real_flag = [4444, 5555]

            [session]
            probe = { type = "who", users = ["root", "admin"] }
            timeout_ms = 300

            [emission]
            wave_protocols = ["udp", "icmp"]

            [noise]
            enabled = true
            fake_flag_ratio = 0.3
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.preset.as_deref(), Some("noisy"));
        assert_eq!(config.targets.extra.len(), 2);
        assert_eq!(config.targets.extra[0].address(), "172.16.120.11");
        assert_eq!(config.targets.extra[1].port(), Some(31337));
        assert!(matches!(config.ports.wave, Some(RawPortPool::Range { min: 1024, max: 65535 })));
        assert!(matches!(config.ports.real_flag, Some(RawPortPool::List(ref l)) if l.len() == 2));
        assert!(matches!(config.session.probe, Some(RawProbe::Who { .. })));
        assert_eq!(config.noise.enabled, Some(true));
    }

    #[test]
    fn parse_probe_variants() {
        let toml_str = r#"
            config_version = 1

            [targets]
            range = "10.0.0.0/30"

            [flags]
            real = "FLAG{x}"

            [session]
            probe = { type = "command", argv = ["/usr/local/bin/admin-check"] }
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert!(matches!(config.session.probe, Some(RawProbe::Command { ref argv }) if argv.len() == 1));
        assert!(config.flags.fake.is_none());

        let never: RawProbe = toml::from_str(r#"type = "never""#).unwrap();
        assert!(matches!(never, RawProbe::Never));
    }
}
