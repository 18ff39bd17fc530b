use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use aircon_common::{
    finish, plan, AdvisoryError, AdvisoryRequest, AdvisoryResponse, AdvisoryStep, ControllerConfig,
    CycleInput, CycleOutcome, Notification, SensorSnapshot, SystemState,
};

use crate::actuator::Actuator;
use crate::advisory::AdvisoryClient;

/// Owns `SystemState` and runs one optimization cycle at a time.
pub struct Optimizer {
    advisor: Option<Arc<dyn AdvisoryClient>>,
    actuator: Arc<dyn Actuator>,
    state: Mutex<SystemState>,
    in_flight: Mutex<()>,
}

impl Optimizer {
    pub fn new(advisor: Option<Arc<dyn AdvisoryClient>>, actuator: Arc<dyn Actuator>) -> Self {
        Self {
            advisor,
            actuator,
            state: Mutex::new(SystemState::default()),
            in_flight: Mutex::new(()),
        }
    }

    pub async fn state(&self) -> SystemState {
        self.state.lock().await.clone()
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    /// Runs a cycle unless one is already in flight, in which case this
    /// firing is dropped and `None` is returned.
    pub async fn run_once(
        &self,
        config: &ControllerConfig,
        snapshot: &SensorSnapshot,
        now_local: DateTime<FixedOffset>,
        now_ms: u64,
        startup_grace: bool,
    ) -> Option<CycleOutcome> {
        let Ok(_running) = self.in_flight.try_lock() else {
            debug!("optimization cycle still in flight, skipping");
            return None;
        };

        let state = self.state.lock().await.clone();
        let input = CycleInput {
            config,
            snapshot,
            state: &state,
            now_local,
            now_ms,
            startup_grace,
        };

        let planned = plan(&input);
        let advice = match &planned.advisory {
            AdvisoryStep::Request(request) => match self.advisor.as_deref() {
                Some(advisor) => {
                    let timeout = Duration::from_secs(config.advisory.timeout_secs);
                    Some(consult(advisor, request, timeout).await)
                }
                None => None,
            },
            AdvisoryStep::NotNeeded | AdvisoryStep::Disabled => None,
        };

        let mut outcome = finish(&input, planned, advice);

        for command in &outcome.commands {
            if let Err(err) = self.actuator.apply(command).await {
                let message = format!("{} failed: {err:#}", command.describe());
                warn!("actuator command {message}");
                if config.notifications_enabled {
                    outcome
                        .notifications
                        .push(Notification::new("Actuator command failed", message.clone()));
                }
                outcome.state.record_actuator_failure(message);
                outcome.state.revert_failed(command, &state);
            }
        }
        outcome.report.counters = outcome.state.counters.clone();
        outcome.report.last_error = outcome.state.last_error.clone();

        *self.state.lock().await = outcome.state.clone();
        info!(
            gate = ?outcome.report.gate,
            source = ?outcome.report.source,
            effective_target = outcome.report.effective_target_c,
            commands = outcome.commands.len(),
            "optimization cycle complete"
        );
        Some(outcome)
    }
}

async fn consult(
    advisor: &dyn AdvisoryClient,
    request: &AdvisoryRequest,
    timeout: Duration,
) -> Result<AdvisoryResponse, AdvisoryError> {
    let result = tokio::time::timeout(timeout, advisor.advise(request))
        .await
        .unwrap_or(Err(AdvisoryError::Timeout));
    if let Err(err) = &result {
        warn!("advisory {} failed: {err}", advisor.provider());
    }
    result
}
