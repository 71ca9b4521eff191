//! Decoy scheduler: the per-tick emission state machine
//!
//! While no privileged session is active the scheduler stays Idle and plans
//! nothing. Once a session is active it walks the fake-flag list one wave at
//! a time, each wave going to every target, and only after the last fake
//! flag does it send the real flag to a single random target. Losing the
//! session at any point throws the cycle away.

use chaff_api::{Emission, EmissionPlan, Payload, Protocol, Target};
use chaff_config::{Policy, PortSet};
use chaff_util::{MonotonicInstant, SessionId, TickId};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::{SchedulerEvent, TargetSet};

/// Coarse scheduler phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Active,
}

/// State carried from one tick to the next
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulerState {
    pub privileged_active: bool,
    pub previous_privileged_active: bool,
    pub last_real_flag_emit_time: Option<MonotonicInstant>,
    pub last_wave_time: Option<MonotonicInstant>,
    /// Index of the next fake flag to broadcast
    pub fake_flag_cursor: usize,
    pub cycle_started_at: Option<MonotonicInstant>,
    pub session_id: Option<SessionId>,
}

impl SchedulerState {
    pub fn phase(&self) -> Phase {
        if self.privileged_active {
            Phase::Active
        } else {
            Phase::Idle
        }
    }
}

/// Result of one tick
#[derive(Debug)]
pub struct TickDecision {
    pub tick: TickId,
    pub plan: EmissionPlan,
    pub events: Vec<SchedulerEvent>,
}

pub struct DecoyScheduler {
    policy: Policy,
    targets: TargetSet,
    state: SchedulerState,
    tick: TickId,
    rng: SmallRng,
}

impl DecoyScheduler {
    pub fn new(policy: Policy, targets: TargetSet) -> Self {
        Self::with_rng(policy, targets, SmallRng::from_entropy())
    }

    /// Deterministic target, port and protocol choices
    pub fn with_seed(policy: Policy, targets: TargetSet, seed: u64) -> Self {
        Self::with_rng(policy, targets, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(policy: Policy, targets: TargetSet, rng: SmallRng) -> Self {
        info!(
            targets = targets.len(),
            fake_flags = policy.fake_flag_count(),
            wave_interval_s = policy.schedule.wave_interval.as_secs(),
            real_flag_interval_s = policy.schedule.real_flag_interval.as_secs(),
            "Decoy scheduler initialized"
        );

        Self {
            policy,
            targets,
            state: SchedulerState::default(),
            tick: TickId::default(),
            rng,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn targets(&self) -> &TargetSet {
        &self.targets
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// Id the next call to `tick` will use
    pub fn next_tick(&self) -> TickId {
        self.tick.next()
    }

    /// Swap in new configuration. State returns to Idle.
    pub fn reload(&mut self, policy: Policy, targets: TargetSet) -> SchedulerEvent {
        let event = SchedulerEvent::PolicyReloaded {
            targets: targets.len(),
            fake_flags: policy.fake_flag_count(),
        };

        self.policy = policy;
        self.targets = targets;
        self.state = SchedulerState::default();

        info!(
            targets = self.targets.len(),
            fake_flags = self.policy.fake_flag_count(),
            "Scheduler configuration reloaded"
        );

        event
    }

    /// Advance one tick given the latest session sample
    pub fn tick(&mut self, now: MonotonicInstant, privileged: bool) -> TickDecision {
        self.tick = self.tick.next();
        let tick = self.tick;
        let mut events = Vec::new();

        let was_active = self.state.privileged_active;
        self.state.previous_privileged_active = was_active;
        self.state.privileged_active = privileged;

        match (was_active, privileged) {
            (false, true) => {
                let session_id = SessionId::new();
                self.state.fake_flag_cursor = 0;
                self.state.cycle_started_at = Some(now);
                self.state.session_id = Some(session_id.clone());

                info!(tick = %tick, session_id = %session_id, "Privileged session active");
                events.push(SchedulerEvent::SessionActivated { session_id });
            }
            (true, false) => {
                let waves_forfeited = self.state.fake_flag_cursor;
                let session_id = self.state.session_id.take();
                self.state.fake_flag_cursor = 0;
                self.state.cycle_started_at = None;
                self.state.last_real_flag_emit_time = None;
                self.state.last_wave_time = None;

                info!(
                    tick = %tick,
                    session_id = ?session_id,
                    waves_forfeited,
                    "Privileged session ended"
                );
                events.push(SchedulerEvent::SessionEnded {
                    session_id,
                    waves_forfeited,
                });
            }
            _ => {}
        }

        if !privileged {
            return TickDecision {
                tick,
                plan: EmissionPlan::empty(tick),
                events,
            };
        }

        let fake_count = self.policy.fake_flag_count();
        let schedule = self.policy.schedule;

        let plan = if self.state.fake_flag_cursor < fake_count
            && now.has_elapsed(self.state.last_wave_time, schedule.wave_interval)
        {
            let (plan, event) = self.plan_wave(tick, now);
            events.push(event);
            plan
        } else if self.state.fake_flag_cursor >= fake_count
            && now.has_elapsed(self.state.last_real_flag_emit_time, schedule.real_flag_interval)
        {
            let (plan, event) = self.plan_real_flag(tick, now);
            events.push(event);
            plan
        } else {
            EmissionPlan::empty(tick)
        };

        TickDecision { tick, plan, events }
    }

    fn plan_wave(&mut self, tick: TickId, now: MonotonicInstant) -> (EmissionPlan, SchedulerEvent) {
        let flag_index = self.state.fake_flag_cursor;
        let flag = self.policy.flags.fake[flag_index].clone();

        let emissions: Vec<Emission> = self
            .targets
            .as_slice()
            .iter()
            .map(|target| {
                let protocol = pick_protocol(&self.policy.emission.wave_protocols, &mut self.rng);
                let port = target
                    .fixed_port
                    .unwrap_or_else(|| pick_port(&self.policy.ports.wave, &mut self.rng));
                emission(*target, protocol, Payload::FakeFlag(flag.clone()), port)
            })
            .collect();

        self.state.fake_flag_cursor += 1;
        self.state.last_wave_time = Some(now);

        debug!(
            tick = %tick,
            flag_index,
            targets = emissions.len(),
            "Planned fake-flag wave"
        );

        let event = SchedulerEvent::WaveEmitted {
            session_id: self.state.session_id.clone(),
            flag_index,
            targets: emissions.len(),
        };
        (EmissionPlan::new(tick, emissions), event)
    }

    fn plan_real_flag(&mut self, tick: TickId, now: MonotonicInstant) -> (EmissionPlan, SchedulerEvent) {
        let target = *self.targets.pick(&mut self.rng);
        let protocol = self.policy.emission.real_flag_protocol;

        let port = match target.fixed_port {
            Some(port) if !self.policy.ports.excluded.contains(&port) => port,
            _ => pick_port(&self.policy.ports.real_flag, &mut self.rng),
        };

        let emission = emission(
            target,
            protocol,
            Payload::RealFlag(self.policy.flags.real.clone()),
            port,
        );
        let port = emission.port;

        self.state.last_real_flag_emit_time = Some(now);
        self.state.fake_flag_cursor = 0;

        debug!(tick = %tick, target = %target.address, port = ?port, protocol = %protocol, "Planned real flag");

        let event = SchedulerEvent::RealFlagEmitted {
            session_id: self.state.session_id.clone(),
            target,
            port,
            protocol,
        };
        (EmissionPlan::new(tick, vec![emission]), event)
    }
}

fn emission(target: Target, protocol: Protocol, payload: Payload, port: u16) -> Emission {
    let port = protocol.uses_port().then_some(port);
    Emission::new(target, protocol, payload, port)
}

fn pick_protocol<R: Rng + ?Sized>(protocols: &[Protocol], rng: &mut R) -> Protocol {
    protocols.choose(rng).copied().unwrap_or(Protocol::Udp)
}

/// Uniform choice from a port set (never empty)
pub(crate) fn pick_port<R: Rng + ?Sized>(ports: &PortSet, rng: &mut R) -> u16 {
    let ports = ports.as_slice();
    ports[rng.gen_range(0..ports.len())]
}
