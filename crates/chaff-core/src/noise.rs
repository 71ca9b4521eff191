//! Background noise generator
//!
//! Runs beside the scheduler with its own timer. It only ever sends filler
//! or fake flags, and never reads or writes scheduler state.

use chaff_api::{Emission, Payload, Protocol};
use chaff_config::{NoisePolicy, Policy, PortSet};
use chaff_host_api::{EmitError, Emitter};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};

use crate::scheduler::pick_port;
use crate::TargetSet;

pub struct NoiseGenerator {
    emitter: Arc<dyn Emitter>,
    targets: TargetSet,
    noise: NoisePolicy,
    fake_flags: Vec<String>,
    wave_ports: PortSet,
    send_timeout: Duration,
    rng: SmallRng,
}

impl NoiseGenerator {
    pub fn new(emitter: Arc<dyn Emitter>, policy: &Policy, targets: TargetSet) -> Self {
        Self::with_rng(emitter, policy, targets, SmallRng::from_entropy())
    }

    pub fn with_seed(
        emitter: Arc<dyn Emitter>,
        policy: &Policy,
        targets: TargetSet,
        seed: u64,
    ) -> Self {
        Self::with_rng(emitter, policy, targets, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(
        emitter: Arc<dyn Emitter>,
        policy: &Policy,
        targets: TargetSet,
        rng: SmallRng,
    ) -> Self {
        Self {
            emitter,
            targets,
            noise: policy.noise.clone(),
            fake_flags: policy.flags.fake.clone(),
            wave_ports: policy.ports.wave.clone(),
            send_timeout: policy.emission.send_timeout,
            rng,
        }
    }

    /// Choose the next noise emission
    pub fn next_emission(&mut self) -> Emission {
        let target = *self.targets.pick(&mut self.rng);
        let protocol = self
            .noise
            .protocols
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(Protocol::Udp);

        let ratio = self.noise.fake_flag_ratio.clamp(0.0, 1.0);
        let payload = match self.fake_flags.choose(&mut self.rng) {
            Some(flag) if self.rng.gen_bool(ratio) => Payload::FakeFlag(flag.clone()),
            _ => Payload::Noise,
        };

        // Common service ports half the time, otherwise anything from the wave pool
        let port = match target.fixed_port {
            Some(port) => port,
            None => match self.noise.ports.choose(&mut self.rng) {
                Some(port) if self.rng.gen_bool(0.5) => *port,
                _ => pick_port(&self.wave_ports, &mut self.rng),
            },
        };

        Emission::new(target, protocol, payload, protocol.uses_port().then_some(port))
    }

    /// Send noise every interval until `shutdown` turns true
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.noise.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            interval_ms = self.noise.interval.as_millis() as u64,
            protocols = self.noise.protocols.len(),
            fake_flag_ratio = self.noise.fake_flag_ratio,
            "Noise generator started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let emission = self.next_emission();
                    self.send(&emission).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Noise generator shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn send(&self, emission: &Emission) {
        let result = tokio::time::timeout(
            self.send_timeout,
            self.emitter.send(emission, self.send_timeout),
        )
        .await;

        match result {
            Ok(Ok(())) => trace!(emission = %emission, "Noise sent"),
            Ok(Err(EmitError::Timeout(_))) | Err(_) => {
                trace!(emission = %emission, "Noise send timed out")
            }
            Ok(Err(e)) => debug!(
                target = %emission.target.address,
                protocol = %emission.protocol,
                kind = e.kind(),
                error = %e,
                "Noise send failed"
            ),
        }
    }
}
