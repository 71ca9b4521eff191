//! Mock host adapters for testing

use async_trait::async_trait;
use chaff_api::{Emission, Payload};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{EmitError, EmitResult, Emitter, ProbeError, ProbeResult, SessionProbe};

/// Scripted behavior for sends to one address
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Report success after the given delay
    Delay(Duration),
    /// Report the emitter's own timeout immediately
    Timeout,
    /// Never complete; only an outer timeout ends the send
    Hang,
    /// Fail with the given reason
    Fail(String),
}

/// Mock emitter for unit/integration testing
///
/// Records every emission that completed successfully.
pub struct MockEmitter {
    sent: Arc<Mutex<Vec<Emission>>>,
    attempts: AtomicU64,
    in_flight: AtomicU64,
    max_in_flight: AtomicU64,

    /// Per-address behavior; addresses not listed succeed immediately
    pub behaviors: Arc<Mutex<HashMap<IpAddr, MockBehavior>>>,
}

impl MockEmitter {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            attempts: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            max_in_flight: AtomicU64::new(0),
            behaviors: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_behavior(self, address: IpAddr, behavior: MockBehavior) -> Self {
        self.set_behavior(address, behavior);
        self
    }

    pub fn set_behavior(&self, address: IpAddr, behavior: MockBehavior) {
        self.behaviors.lock().unwrap().insert(address, behavior);
    }

    /// Emissions that were reported as sent
    pub fn sent(&self) -> Vec<Emission> {
        self.sent.lock().unwrap().clone()
    }

    /// Sent emissions carrying the real flag
    pub fn real_flags_sent(&self) -> Vec<Emission> {
        self.sent()
            .into_iter()
            .filter(|e| matches!(e.payload, Payload::RealFlag(_)))
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    /// Number of send attempts, including failed ones
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Highest number of sends observed running at the same time
    pub fn max_in_flight(&self) -> u64 {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockEmitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight counter even if the send future is dropped
struct InFlightGuard<'a>(&'a AtomicU64);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Emitter for MockEmitter {
    async fn send(&self, emission: &Emission, timeout: Duration) -> EmitResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&emission.target.address)
            .cloned();

        match behavior {
            None => {}
            Some(MockBehavior::Delay(delay)) => tokio::time::sleep(delay).await,
            Some(MockBehavior::Timeout) => return Err(EmitError::Timeout(timeout)),
            Some(MockBehavior::Hang) => std::future::pending::<()>().await,
            Some(MockBehavior::Fail(reason)) => return Err(EmitError::Failed(reason)),
        }

        self.sent.lock().unwrap().push(emission.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Scripted answer for the mock probe
#[derive(Debug, Clone)]
pub enum MockProbeAnswer {
    Active(bool),
    Fail(String),
    Hang,
}

/// Mock session probe for testing
pub struct MockProbe {
    calls: AtomicU64,

    /// Current answer returned by every call
    pub answer: Arc<Mutex<MockProbeAnswer>>,
}

impl MockProbe {
    pub fn new(active: bool) -> Self {
        Self {
            calls: AtomicU64::new(0),
            answer: Arc::new(Mutex::new(MockProbeAnswer::Active(active))),
        }
    }

    pub fn set_active(&self, active: bool) {
        *self.answer.lock().unwrap() = MockProbeAnswer::Active(active);
    }

    pub fn set_answer(&self, answer: MockProbeAnswer) {
        *self.answer.lock().unwrap() = answer;
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionProbe for MockProbe {
    async fn is_privileged_session_active(&self, _timeout: Duration) -> ProbeResult<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = self.answer.lock().unwrap().clone();

        match answer {
            MockProbeAnswer::Active(active) => Ok(active),
            MockProbeAnswer::Fail(reason) => Err(ProbeError::CommandFailed(reason)),
            MockProbeAnswer::Hang => {
                std::future::pending::<()>().await;
                Ok(false)
            }
        }
    }

    fn describe(&self) -> String {
        "mock".into()
    }
}
