//! Session monitor: bounded, fail-closed sampling of the session probe

use chaff_config::SessionPolicy;
use chaff_host_api::SessionProbe;
use chaff_util::TickId;
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

pub struct SessionMonitor {
    probe: Arc<dyn SessionProbe>,
    timeout: Duration,
    fail_open: bool,
}

impl SessionMonitor {
    pub fn new(probe: Arc<dyn SessionProbe>, timeout: Duration, fail_open: bool) -> Self {
        Self {
            probe,
            timeout,
            fail_open,
        }
    }

    pub fn from_policy(probe: Arc<dyn SessionProbe>, policy: &SessionPolicy) -> Self {
        Self::new(probe, policy.timeout, policy.fail_open)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn describe(&self) -> String {
        self.probe.describe()
    }

    /// Whether a privileged session is active right now, sampled for `tick`.
    ///
    /// Probe errors and timeouts are logged and answered with the
    /// configured failure value (false unless `fail_open`).
    pub async fn sample(&self, tick: TickId) -> bool {
        let answer = tokio::time::timeout(
            self.timeout,
            self.probe.is_privileged_session_active(self.timeout),
        )
        .await;

        match answer {
            Ok(Ok(active)) => {
                trace!(tick = %tick, active, "Session probe sampled");
                active
            }
            Ok(Err(e)) => {
                warn!(
                    tick = %tick,
                    probe = %self.probe.describe(),
                    kind = e.kind(),
                    error = %e,
                    fail_open = self.fail_open,
                    "Session probe failed"
                );
                self.fail_open
            }
            Err(_) => {
                warn!(
                    tick = %tick,
                    probe = %self.probe.describe(),
                    kind = "timeout",
                    timeout_ms = self.timeout.as_millis() as u64,
                    fail_open = self.fail_open,
                    "Session probe timed out"
                );
                self.fail_open
            }
        }
    }
}
