use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The health state of one running integration, per the lifecycle
/// state machine. `Stopped`/`Starting`/`Stopping`/`Failed` are
/// transient or terminal; `Healthy`/`Degraded` are the two states
/// `ForEachHealthy` iterates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Stopped,
    Starting,
    Healthy,
    Degraded,
    Stopping,
    Failed,
}

impl InstanceState {
    pub fn is_healthy_or_degraded(self) -> bool {
        matches!(self, InstanceState::Healthy | InstanceState::Degraded)
    }
}

/// Written by an integration's own connectivity probe; read by
/// external collaborators (the REST `/health` endpoint, any future
/// readiness gate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub state: InstanceState,
    pub message: String,
    pub last_checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn new(state: InstanceState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
            last_checked_at: Utc::now(),
        }
    }
}

/// The server-wide health summary served at `GET /health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Healthy,
    Degraded,
}

impl OverallStatus {
    /// Reduces every running instance's state to one server-wide
    /// status: any instance not cleanly `Healthy` (degraded, starting,
    /// stopping, failed) drags the whole readout to `Degraded`. No
    /// running instances at all is `Healthy` - an idle server with
    /// nothing configured yet is not unhealthy.
    pub fn from_reports<'a>(reports: impl IntoIterator<Item = &'a InstanceState>) -> Self {
        if reports.into_iter().all(|state| *state == InstanceState::Healthy) {
            OverallStatus::Healthy
        } else {
            OverallStatus::Degraded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_instances_is_healthy() {
        assert_eq!(OverallStatus::from_reports(&[]), OverallStatus::Healthy);
    }

    #[test]
    fn all_healthy_is_healthy() {
        let states = [InstanceState::Healthy, InstanceState::Healthy];
        assert_eq!(OverallStatus::from_reports(&states), OverallStatus::Healthy);
    }

    #[test]
    fn one_degraded_drags_overall_status_down() {
        let states = [InstanceState::Healthy, InstanceState::Degraded];
        assert_eq!(OverallStatus::from_reports(&states), OverallStatus::Degraded);
    }
}
