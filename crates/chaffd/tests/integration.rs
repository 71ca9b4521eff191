//! Integration tests for chaffd
//!
//! These drive the monitor, scheduler and sink together with mock
//! collaborators over simulated time.

use chaff_api::{Outcome, Payload, PayloadKind};
use chaff_config::{parse_config, ConfigError, Policy, ValidationError};
use chaff_core::{DecoyScheduler, EmissionSink, SchedulerEvent, SessionMonitor, TargetSet};
use chaff_host_api::{MockBehavior, MockEmitter, MockProbe, MockProbeAnswer};
use chaff_util::MonotonicInstant;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::io::Write;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

fn make_test_policy(extra: &str) -> Policy {
    let config = format!(
        r#"
        config_version = 1

        [targets]
        range = "172.16.200.1-5"

        [schedule]
        wave_interval_seconds = 10
        real_flag_interval_seconds = 30

        [flags]
        real = "FLAG{{the_real_one}}"
        fake = ["FLAG{{ThisIsNotMe}}", "FLAG{{TryAgain}}", "FLAG{{SORRY}}"]

        [emission]
        send_timeout_seconds = 1
        wave_protocols = ["udp", "tcp"]

        {}
        "#,
        extra
    );
    parse_config(&config).unwrap()
}

/// Monitor + scheduler + sink wired to mocks
struct Harness {
    probe: Arc<MockProbe>,
    emitter: Arc<MockEmitter>,
    monitor: SessionMonitor,
    scheduler: DecoyScheduler,
    sink: EmissionSink,
    t0: MonotonicInstant,
}

impl Harness {
    fn new(policy: Policy) -> Self {
        let probe = Arc::new(MockProbe::new(false));
        let emitter = Arc::new(MockEmitter::new());
        let targets = TargetSet::from_policy(&policy.targets).unwrap();

        let monitor = SessionMonitor::new(probe.clone(), Duration::from_millis(100), false);
        let sink = EmissionSink::from_policy(emitter.clone(), &policy.emission);
        let scheduler = DecoyScheduler::with_seed(policy, targets, 1234);

        Self {
            probe,
            emitter,
            monitor,
            scheduler,
            sink,
            t0: MonotonicInstant::now(),
        }
    }

    /// One full tick at `secs` seconds of simulated time
    async fn tick_at(&mut self, secs: u64) -> (Vec<SchedulerEvent>, Vec<chaff_api::EmissionReport>) {
        let privileged = self.monitor.sample(self.scheduler.next_tick()).await;
        let now = self.t0 + Duration::from_secs(secs);
        let decision = self.scheduler.tick(now, privileged);
        let reports = self.sink.execute(&decision.plan).await;
        (decision.events, reports)
    }

    fn target_count(&self) -> usize {
        self.scheduler.targets().len()
    }
}

#[tokio::test]
async fn scenario_a_three_waves_then_real_flag() {
    let mut h = Harness::new(make_test_policy(""));
    h.probe.set_active(true);
    let n = h.target_count();

    for (i, secs) in [0, 10, 20].into_iter().enumerate() {
        let (_, reports) = h.tick_at(secs).await;
        assert_eq!(reports.len(), n, "wave {} goes to every target", i + 1);
        assert!(reports.iter().all(|r| r.outcome == Outcome::Sent));
    }

    let (events, reports) = h.tick_at(30).await;
    assert_eq!(reports.len(), 1);
    assert!(reports[0].emission.payload.is_real_flag());
    assert!(events
        .iter()
        .any(|e| matches!(e, SchedulerEvent::RealFlagEmitted { .. })));

    // Fake flags went out in configured order
    let sent = h.emitter.sent();
    let fake_order: Vec<&str> = sent
        .iter()
        .filter(|e| matches!(e.payload, Payload::FakeFlag(_)))
        .filter_map(|e| e.payload.text())
        .step_by(n)
        .collect();
    assert_eq!(
        fake_order,
        vec!["FLAG{ThisIsNotMe}", "FLAG{TryAgain}", "FLAG{SORRY}"]
    );
    assert_eq!(h.emitter.real_flags_sent().len(), 1);
}

#[tokio::test]
async fn scenario_b_privilege_drop_resets_cursor() {
    let mut h = Harness::new(make_test_policy(""));
    h.probe.set_active(true);

    h.tick_at(0).await;
    h.tick_at(10).await;
    assert_eq!(h.scheduler.state().fake_flag_cursor, 2);

    h.probe.set_active(false);
    let (events, reports) = h.tick_at(15).await;
    assert!(reports.is_empty());
    assert!(matches!(
        events[..],
        [SchedulerEvent::SessionEnded {
            waves_forfeited: 2,
            ..
        }]
    ));
    assert_eq!(h.scheduler.state().fake_flag_cursor, 0);

    // Staying logged out never produces the real flag
    for secs in [20, 30, 40, 300] {
        let (_, reports) = h.tick_at(secs).await;
        assert!(reports.is_empty());
    }
    assert!(h.emitter.real_flags_sent().is_empty());

    // Coming back starts from the first fake flag
    h.probe.set_active(true);
    let (_, reports) = h.tick_at(301).await;
    assert_eq!(
        reports[0].emission.payload,
        Payload::FakeFlag("FLAG{ThisIsNotMe}".into())
    );
}

#[tokio::test]
async fn scenario_c_stalled_target_times_out_others_receive() {
    let mut h = Harness::new(make_test_policy(""));
    let stalled: IpAddr = "172.16.200.3".parse().unwrap();
    h.emitter.set_behavior(stalled, MockBehavior::Hang);
    h.probe.set_active(true);

    for secs in [0, 10, 20] {
        let (_, reports) = h.tick_at(secs).await;
        for report in &reports {
            if report.emission.target.address == stalled {
                assert_eq!(report.outcome, Outcome::Timeout);
            } else {
                assert_eq!(report.outcome, Outcome::Sent);
            }
        }
    }

    let sent = h.emitter.sent();
    assert_eq!(sent.len(), 3 * (h.target_count() - 1));
    assert!(sent.iter().all(|e| e.target.address != stalled));
}

#[test]
fn scenario_d_no_real_flag_ports_rejected() {
    let config = r#"
        config_version = 1

        [targets]
        range = "172.16.200.1-5"

        [flags]
        real = "FLAG{x}"

        [ports]
        excluded = [53, 80, 23]
        real_flag = [53, 80, 23]
    "#;

    match parse_config(config) {
        Err(ConfigError::ValidationFailed { errors }) => {
            assert!(errors
                .iter()
                .any(|e| matches!(e, ValidationError::NoRealFlagPorts { .. })));
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("config with no real-flag ports was accepted"),
    }
}

#[test]
fn default_real_flag_pool_fully_excluded_rejected() {
    let excluded: Vec<String> = (1024..=65535u32).map(|p| p.to_string()).collect();
    let config = format!(
        r#"
        config_version = 1

        [targets]
        range = "172.16.200.1-5"

        [flags]
        real = "FLAG{{x}}"

        [ports]
        excluded = [{}]
        "#,
        excluded.join(", ")
    );

    assert!(matches!(
        parse_config(&config),
        Err(ConfigError::ValidationFailed { errors })
            if matches!(errors[..], [ValidationError::NoRealFlagPorts { .. }])
    ));
}

#[tokio::test]
async fn example_config_runs_a_cycle() {
    let mut policy = chaff_config::load_config(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../config.example.toml"
    ))
    .unwrap();
    assert!(policy.session.timeout < policy.schedule.tick_interval);

    // Keep the cycle short
    policy.flags.fake.truncate(1);
    let excluded = policy.ports.excluded.clone();

    let mut h = Harness::new(policy);
    h.probe.set_active(true);

    h.tick_at(0).await;
    let (_, reports) = h.tick_at(10).await;
    assert_eq!(reports.len(), 1);
    let emission = &reports[0].emission;
    assert!(emission.payload.is_real_flag());
    assert!(emission.port.is_some_and(|p| !excluded.contains(&p)));
}

#[tokio::test]
async fn probe_failure_behaves_as_logged_out() {
    let mut h = Harness::new(make_test_policy(""));
    h.probe.set_active(true);
    h.tick_at(0).await;
    h.tick_at(10).await;

    h.probe.set_answer(MockProbeAnswer::Fail("who: cannot open utmp".into()));
    let (events, reports) = h.tick_at(20).await;
    assert!(reports.is_empty());
    assert!(matches!(events[..], [SchedulerEvent::SessionEnded { .. }]));

    h.probe.set_answer(MockProbeAnswer::Hang);
    for secs in [30, 40, 50] {
        let (_, reports) = h.tick_at(secs).await;
        assert!(reports.is_empty());
    }
    assert!(h.emitter.real_flags_sent().is_empty());
}

#[tokio::test]
async fn real_flag_always_preceded_by_full_cycle() {
    let mut h = Harness::new(make_test_policy(
        r#"
        [noise]
        enabled = false
        "#,
    ));
    let n_fake = h.scheduler.policy().fake_flag_count();
    let mut rng = SmallRng::seed_from_u64(99);

    let mut waves_since = 0usize;
    let mut real_flags = 0usize;

    for secs in 0..2_000u64 {
        // Mostly stay logged in, with occasional logouts
        let privileged = !rng.gen_bool(0.02);
        h.probe.set_active(privileged);

        let (events, reports) = h.tick_at(secs).await;

        for event in &events {
            match event {
                SchedulerEvent::SessionActivated { .. } | SchedulerEvent::SessionEnded { .. } => {
                    waves_since = 0;
                }
                SchedulerEvent::WaveEmitted { flag_index, .. } => {
                    assert_eq!(*flag_index, waves_since);
                    waves_since += 1;
                }
                SchedulerEvent::RealFlagEmitted { .. } => {
                    assert!(privileged);
                    assert_eq!(waves_since, n_fake);
                    waves_since = 0;
                    real_flags += 1;
                }
                SchedulerEvent::PolicyReloaded { .. } => {}
            }
        }

        let real = reports
            .iter()
            .filter(|r| r.emission.payload.kind() == PayloadKind::RealFlag)
            .count();
        assert!(real <= 1);
        if !privileged {
            assert!(reports.is_empty());
        }
    }

    assert!(real_flags > 0);
}

#[tokio::test]
async fn real_flag_spacing_respects_interval() {
    let mut h = Harness::new(make_test_policy(""));
    h.probe.set_active(true);

    let mut real_times = Vec::new();
    for secs in 0..400u64 {
        let (events, _) = h.tick_at(secs).await;
        if events
            .iter()
            .any(|e| matches!(e, SchedulerEvent::RealFlagEmitted { .. }))
        {
            real_times.push(secs);
        }
    }

    assert!(real_times.len() >= 2);
    for pair in real_times.windows(2) {
        assert!(pair[1] - pair[0] >= 30);
    }
}

#[tokio::test]
async fn config_file_round_trip() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
        config_version = 1
        preset = "quiet"

        [targets]
        range = "10.9.0.0/30"
        extra = [{{ address = "10.9.1.1", port = 31337 }}]

        [flags]
        real = "FLAG{{file}}"
        "#
    )
    .unwrap();

    let policy = chaff_config::load_config(file.path()).unwrap();
    let targets = TargetSet::from_policy(&policy.targets).unwrap();

    assert_eq!(targets.len(), 3);
    assert_eq!(targets.as_slice()[2].fixed_port, Some(31337));
    assert_eq!(policy.schedule.tick_interval, Duration::from_secs(5));
}
