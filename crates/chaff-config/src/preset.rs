//! Named presets
//!
//! Each preset reproduces one historical way of running the lab's decoy
//! traffic. Explicit configuration values always override the preset.

use chaff_api::Protocol;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    /// Waves every 10s, real flag every 5 minutes, no background noise
    #[default]
    Standard,
    /// Short intervals with constant background noise
    Aggressive,
    /// Standard flag cadence over a dense, mixed-protocol noise floor
    Noisy,
    /// Slow UDP-only cadence
    Quiet,
}

/// Values a preset supplies for unset fields
#[derive(Debug, Clone, PartialEq)]
pub struct PresetDefaults {
    pub tick_interval: Duration,
    pub wave_interval: Duration,
    pub real_flag_interval: Duration,
    pub wave_protocols: Vec<Protocol>,
    pub noise_enabled: bool,
    pub noise_interval: Duration,
    pub noise_protocols: Vec<Protocol>,
    pub noise_fake_flag_ratio: f64,
}

impl Preset {
    pub const ALL: [Preset; 4] = [
        Preset::Standard,
        Preset::Aggressive,
        Preset::Noisy,
        Preset::Quiet,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Preset::Standard => "standard",
            Preset::Aggressive => "aggressive",
            Preset::Noisy => "noisy",
            Preset::Quiet => "quiet",
        }
    }

    pub fn defaults(&self) -> PresetDefaults {
        match self {
            Preset::Standard => PresetDefaults {
                tick_interval: Duration::from_secs(1),
                wave_interval: Duration::from_secs(10),
                real_flag_interval: Duration::from_secs(300),
                wave_protocols: vec![Protocol::Udp, Protocol::Icmp],
                noise_enabled: false,
                noise_interval: Duration::from_secs(1),
                noise_protocols: Protocol::ALL.to_vec(),
                noise_fake_flag_ratio: 0.3,
            },
            Preset::Aggressive => PresetDefaults {
                tick_interval: Duration::from_secs(1),
                wave_interval: Duration::from_secs(5),
                real_flag_interval: Duration::from_secs(5),
                wave_protocols: vec![Protocol::Udp, Protocol::Icmp, Protocol::Tcp],
                noise_enabled: true,
                noise_interval: Duration::from_secs(1),
                noise_protocols: Protocol::ALL.to_vec(),
                noise_fake_flag_ratio: 0.3,
            },
            Preset::Noisy => PresetDefaults {
                tick_interval: Duration::from_secs(1),
                wave_interval: Duration::from_secs(10),
                real_flag_interval: Duration::from_secs(300),
                wave_protocols: vec![Protocol::Udp, Protocol::Icmp],
                noise_enabled: true,
                noise_interval: Duration::from_millis(500),
                noise_protocols: Protocol::ALL.to_vec(),
                noise_fake_flag_ratio: 0.3,
            },
            Preset::Quiet => PresetDefaults {
                tick_interval: Duration::from_secs(5),
                wave_interval: Duration::from_secs(30),
                real_flag_interval: Duration::from_secs(600),
                wave_protocols: vec![Protocol::Udp],
                noise_enabled: false,
                noise_interval: Duration::from_secs(5),
                noise_protocols: vec![Protocol::Udp],
                noise_fake_flag_ratio: 0.0,
            },
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" | "default" => Ok(Preset::Standard),
            "aggressive" => Ok(Preset::Aggressive),
            "noisy" => Ok(Preset::Noisy),
            "quiet" => Ok(Preset::Quiet),
            other => Err(format!("Unknown preset: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_names_round_trip() {
        for preset in Preset::ALL {
            assert_eq!(preset.name().parse::<Preset>().unwrap(), preset);
        }
        assert!("loud".parse::<Preset>().is_err());
    }

    #[test]
    fn preset_defaults_are_consistent() {
        for preset in Preset::ALL {
            let d = preset.defaults();
            assert!(d.tick_interval >= Duration::from_secs(1));
            assert!(d.wave_interval >= d.tick_interval);
            assert!(!d.wave_protocols.is_empty());
            assert!((0.0..=1.0).contains(&d.noise_fake_flag_ratio));
        }
    }
}
