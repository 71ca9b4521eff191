//! Emission sink: executes a plan with bounded concurrency

use chaff_api::{Emission, EmissionPlan, EmissionReport, Outcome};
use chaff_config::EmissionPolicy;
use chaff_host_api::{EmitError, Emitter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

pub struct EmissionSink {
    emitter: Arc<dyn Emitter>,
    limit: Arc<Semaphore>,
    send_timeout: Duration,
}

impl EmissionSink {
    pub fn new(emitter: Arc<dyn Emitter>, max_concurrent: usize, send_timeout: Duration) -> Self {
        Self {
            emitter,
            limit: Arc::new(Semaphore::new(max_concurrent.max(1))),
            send_timeout,
        }
    }

    pub fn from_policy(emitter: Arc<dyn Emitter>, policy: &EmissionPolicy) -> Self {
        Self::new(emitter, policy.max_concurrent_sends, policy.send_timeout)
    }

    pub fn emitter_name(&self) -> &'static str {
        self.emitter.name()
    }

    /// Send every emission in `plan` and wait for all of them.
    ///
    /// Reports come back in completion order, one per emission. Dropping the
    /// returned future aborts sends still in flight.
    pub async fn execute(&self, plan: &EmissionPlan) -> Vec<EmissionReport> {
        if plan.is_empty() {
            return Vec::new();
        }

        let mut tasks = JoinSet::new();
        for (index, emission) in plan.emissions.iter().cloned().enumerate() {
            let emitter = Arc::clone(&self.emitter);
            let limit = Arc::clone(&self.limit);
            let timeout = self.send_timeout;

            tasks.spawn(async move {
                let outcome = match limit.acquire_owned().await {
                    Ok(_permit) => send_one(emitter.as_ref(), &emission, timeout).await,
                    Err(_) => Outcome::Error("emission sink closed".into()),
                };
                (index, EmissionReport { emission, outcome })
            });
        }

        let mut reported = vec![false; plan.len()];
        let mut reports = Vec::with_capacity(plan.len());

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, report)) => {
                    reported[index] = true;
                    reports.push(report);
                }
                Err(e) => warn!(tick = %plan.tick, error = %e, "Send task failed"),
            }
        }

        // Tasks that panicked never returned their emission
        for (index, emission) in plan.emissions.iter().enumerate() {
            if !reported[index] {
                reports.push(EmissionReport {
                    emission: emission.clone(),
                    outcome: Outcome::Error("send task panicked".into()),
                });
            }
        }

        for report in &reports {
            log_failure(plan, report);
        }

        reports
    }
}

async fn send_one(emitter: &dyn Emitter, emission: &Emission, timeout: Duration) -> Outcome {
    match tokio::time::timeout(timeout, emitter.send(emission, timeout)).await {
        Ok(Ok(())) => Outcome::Sent,
        Ok(Err(EmitError::Timeout(_))) | Err(_) => Outcome::Timeout,
        Ok(Err(e)) => Outcome::Error(format!("{} ({})", e, e.kind())),
    }
}

fn log_failure(plan: &EmissionPlan, report: &EmissionReport) {
    let e = &report.emission;
    match &report.outcome {
        Outcome::Sent => {}
        Outcome::Timeout => warn!(
            tick = %plan.tick,
            target = %e.target.address,
            port = ?e.port,
            protocol = %e.protocol,
            kind = "timeout",
            "Send timed out"
        ),
        Outcome::Error(reason) => warn!(
            tick = %plan.tick,
            target = %e.target.address,
            port = ?e.port,
            protocol = %e.protocol,
            error = %reason,
            "Send failed"
        ),
    }
}
