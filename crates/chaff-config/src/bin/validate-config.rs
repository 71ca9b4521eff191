//! Config validation CLI tool
//!
//! Validates a chaffd configuration file and reports any errors.

use chaff_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a chaffd configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            eprintln!("  validate-config config.example.toml");
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match chaff_config::load_config(&config_path) {
        Ok(policy) => {
            let protocols: Vec<&str> = policy
                .emission
                .wave_protocols
                .iter()
                .map(|p| p.as_str())
                .collect();

            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", chaff_config::CURRENT_CONFIG_VERSION);
            println!("  Preset: {}", policy.preset);
            println!(
                "  Targets: {} ({} addresses) + {} extra",
                policy.targets.range,
                policy.targets.range.len(),
                policy.targets.extras.len()
            );
            println!(
                "  Waves: {} fake flags, every {}s over {}",
                policy.fake_flag_count(),
                policy.schedule.wave_interval.as_secs(),
                protocols.join("/")
            );
            println!(
                "  Real flag: every {}s via {}, {} candidate ports",
                policy.schedule.real_flag_interval.as_secs(),
                policy.emission.real_flag_protocol,
                policy.ports.real_flag.len()
            );
            println!(
                "  Session probe: {}, timeout {}ms",
                policy.session.probe,
                policy.session.timeout.as_millis()
            );
            println!(
                "  Noise: {}",
                if policy.noise.enabled { "enabled" } else { "disabled" }
            );

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                chaff_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                chaff_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                chaff_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                chaff_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        chaff_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
