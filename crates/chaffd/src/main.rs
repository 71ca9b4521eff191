//! chaffd - decoy traffic service for CTF lab networks
//!
//! This is the main entry point for the chaffd service.
//! It wires together all the components:
//! - Configuration loading and SIGHUP reload
//! - Target enumeration
//! - Session monitor (privileged-session probe)
//! - Decoy scheduler and emission sink
//! - Background noise generator

use anyhow::{Context, Result};
use chaff_api::{OutcomeSummary, PayloadKind};
use chaff_config::{load_config, Policy};
use chaff_core::{
    DecoyScheduler, EmissionSink, NoiseGenerator, SchedulerEvent, SessionMonitor, TargetSet,
    TickDecision,
};
use chaff_host_api::Emitter;
use chaff_host_linux::{probe_from_spec, LoggingEmitter, SubprocessEmitter};
use chaff_util::{default_config_path, format_datetime_full, format_duration, MonotonicInstant};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// chaffd - Decoy traffic generator for CTF lab networks
#[derive(Parser, Debug)]
#[command(name = "chaffd")]
#[command(about = "Decoy traffic generator for CTF lab networks", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/chaffd/config.toml, or set CHAFFD_CONFIG)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Log emissions instead of sending them
    #[arg(long)]
    dry_run: bool,

    /// Seed for target, port and protocol choices
    #[arg(long, env = "CHAFFD_SEED")]
    seed: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Handle to the running noise task
struct NoiseTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl NoiseTask {
    async fn stop(self) {
        let _ = self.shutdown.send(true);
        if tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .is_err()
        {
            warn!("Noise generator did not stop in time");
        }
    }
}

/// Main service state
struct Service {
    config_path: PathBuf,
    dry_run: bool,
    seed: Option<u64>,
    scheduler: DecoyScheduler,
    monitor: SessionMonitor,
    sink: EmissionSink,
    emitter: Arc<dyn Emitter>,
    noise: Option<NoiseTask>,
}

impl Service {
    fn new(args: &Args) -> Result<Self> {
        let (policy, targets) = load(&args.config)?;

        let emitter = build_emitter(&policy, args.dry_run);
        let monitor = SessionMonitor::from_policy(probe_from_spec(&policy.session.probe), &policy.session);
        let sink = EmissionSink::from_policy(emitter.clone(), &policy.emission);

        info!(
            probe = %monitor.describe(),
            probe_timeout = %format_duration(monitor.timeout()),
            emitter = sink.emitter_name(),
            "Session monitor and emission sink ready"
        );

        let scheduler = match args.seed {
            Some(seed) => DecoyScheduler::with_seed(policy, targets, seed),
            None => DecoyScheduler::new(policy, targets),
        };

        Ok(Self {
            config_path: args.config.clone(),
            dry_run: args.dry_run,
            seed: args.seed,
            scheduler,
            monitor,
            sink,
            emitter,
            noise: None,
        })
    }

    async fn run(mut self) -> Result<()> {
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup =
            signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        self.noise = self.start_noise();
        let mut tick_timer = self.tick_timer();

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }

                // Signal: SIGHUP - reload configuration
                _ = sighup.recv() => {
                    info!("Received SIGHUP, reloading configuration");
                    if self.reload().await {
                        tick_timer = self.tick_timer();
                    }
                }

                _ = tick_timer.tick() => {
                    // An interrupt mid-tick abandons the in-flight plan
                    let interrupted = tokio::select! {
                        _ = self.run_tick() => false,
                        _ = sigterm.recv() => true,
                        _ = sigint.recv() => true,
                    };
                    if interrupted {
                        info!("Interrupted during tick, shutting down");
                        break;
                    }
                }
            }
        }

        info!("Shutting down chaffd");

        if let Some(noise) = self.noise.take() {
            noise.stop().await;
        }

        info!("Shutdown complete");
        Ok(())
    }

    fn tick_timer(&self) -> tokio::time::Interval {
        let mut timer = tokio::time::interval(self.scheduler.policy().schedule.tick_interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        timer
    }

    /// Sample, decide, execute
    async fn run_tick(&mut self) {
        let privileged = self.monitor.sample(self.scheduler.next_tick()).await;
        let decision = self.scheduler.tick(MonotonicInstant::now(), privileged);

        for event in &decision.events {
            log_event(event);
        }

        if decision.plan.is_empty() {
            return;
        }

        let started = MonotonicInstant::now();
        let reports = self.sink.execute(&decision.plan).await;
        let summary = OutcomeSummary::from_reports(&reports);

        info!(
            tick = %decision.tick,
            session_id = ?self.scheduler.state().session_id,
            kind = %plan_kind(&decision),
            emissions = decision.plan.len(),
            sent = summary.sent,
            timeout = summary.timeout,
            error = summary.error,
            elapsed = %format_duration(started.elapsed()),
            "Plan executed"
        );
    }

    /// Reload configuration from disk. On failure the running
    /// configuration stays in place.
    async fn reload(&mut self) -> bool {
        let (policy, targets) = match load(&self.config_path) {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Reload failed, keeping current configuration");
                return false;
            }
        };

        if let Some(noise) = self.noise.take() {
            noise.stop().await;
        }

        self.emitter = build_emitter(&policy, self.dry_run);
        self.monitor = SessionMonitor::from_policy(probe_from_spec(&policy.session.probe), &policy.session);
        self.sink = EmissionSink::from_policy(self.emitter.clone(), &policy.emission);
        let event = self.scheduler.reload(policy, targets);
        log_event(&event);

        self.noise = self.start_noise();
        true
    }

    fn start_noise(&self) -> Option<NoiseTask> {
        let policy = self.scheduler.policy();
        if !policy.noise.enabled {
            return None;
        }

        let targets = self.scheduler.targets().clone();
        let generator = match self.seed {
            Some(seed) => NoiseGenerator::with_seed(self.emitter.clone(), policy, targets, seed),
            None => NoiseGenerator::new(self.emitter.clone(), policy, targets),
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(generator.run(shutdown_rx));
        Some(NoiseTask { shutdown, handle })
    }
}

fn load(path: &Path) -> Result<(Policy, TargetSet)> {
    let policy =
        load_config(path).with_context(|| format!("Failed to load config from {:?}", path))?;
    let targets =
        TargetSet::from_policy(&policy.targets).context("Failed to enumerate targets")?;

    info!(
        config_path = %path.display(),
        preset = %policy.preset,
        targets = targets.len(),
        fake_flags = policy.fake_flag_count(),
        wave_interval = %format_duration(policy.schedule.wave_interval),
        real_flag_interval = %format_duration(policy.schedule.real_flag_interval),
        noise = policy.noise.enabled,
        "Configuration loaded"
    );

    Ok((policy, targets))
}

fn build_emitter(policy: &Policy, dry_run: bool) -> Arc<dyn Emitter> {
    if dry_run {
        Arc::new(LoggingEmitter)
    } else {
        Arc::new(SubprocessEmitter::new(policy.noise.corpus.clone()))
    }
}

fn plan_kind(decision: &TickDecision) -> PayloadKind {
    if decision.plan.count_kind(PayloadKind::RealFlag) > 0 {
        PayloadKind::RealFlag
    } else if decision.plan.count_kind(PayloadKind::FakeFlag) > 0 {
        PayloadKind::FakeFlag
    } else {
        PayloadKind::Noise
    }
}

fn log_event(event: &SchedulerEvent) {
    match event {
        SchedulerEvent::WaveEmitted {
            flag_index, targets, ..
        } => {
            debug!(flag_index, targets, "Fake-flag wave planned");
        }
        SchedulerEvent::RealFlagEmitted {
            target,
            port,
            protocol,
            ..
        } => {
            info!(
                target = %target.address,
                port = ?port,
                protocol = %protocol,
                "Real flag emitted"
            );
        }
        SchedulerEvent::PolicyReloaded {
            targets,
            fake_flags,
        } => {
            info!(targets, fake_flags, "Policy reloaded");
        }
        // Transitions are logged by the scheduler itself
        SchedulerEvent::SessionActivated { .. } | SchedulerEvent::SessionEnded { .. } => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %format_datetime_full(&chaff_util::now()),
        dry_run = args.dry_run,
        "chaffd starting"
    );

    // Create and run the service
    let service = Service::new(&args)?;
    service.run().await
}
