//! Serializable health reports for registered components.

use serde::Serialize;
use uuid::Uuid;

use crate::error::ConnectError;
use crate::health::readiness::ReadinessState;
use crate::registry::Component;

/// Outcome of the most recent liveness check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LiveStatus {
    /// No liveness check was run for this report.
    Unchecked,
    Up,
    Down { error: String },
}

/// Health snapshot of one component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentReport {
    pub id: Uuid,
    pub key: &'static str,
    pub name: String,
    pub details: serde_json::Value,
    pub readiness: ReadinessState,
    pub live: LiveStatus,
}

impl ComponentReport {
    /// Build a report from a component and a liveness outcome.
    pub fn new(component: &dyn Component, outcome: Result<(), ConnectError>) -> Self {
        let live = match outcome {
            Ok(()) => LiveStatus::Up,
            Err(e) => LiveStatus::Down {
                error: e.to_string(),
            },
        };
        Self {
            live,
            ..Self::readiness_only(component)
        }
    }

    /// Build a report without running a liveness check.
    pub fn readiness_only(component: &dyn Component) -> Self {
        Self {
            id: component.id(),
            key: component.key(),
            name: component.name(),
            details: component.details(),
            readiness: component.readiness(),
            live: LiveStatus::Unchecked,
        }
    }

    /// True unless the last liveness check failed. Ignores the readiness gate.
    pub fn is_live(&self) -> bool {
        !matches!(self.live, LiveStatus::Down { .. })
    }

    /// True if the component is ready and, when checked, live.
    pub fn is_healthy(&self) -> bool {
        self.readiness.is_ready() && self.is_live()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(readiness: ReadinessState, live: LiveStatus) -> ComponentReport {
        ComponentReport {
            id: Uuid::nil(),
            key: "etcd",
            name: "name: etcd".into(),
            details: serde_json::Value::Null,
            readiness,
            live,
        }
    }

    #[test]
    fn test_liveness_is_independent_of_readiness() {
        let failed = ReadinessState::Failed(ConnectError::liveness("etcd", "refused"));

        let recovered = report(failed.clone(), LiveStatus::Up);
        assert!(recovered.is_live());
        assert!(!recovered.is_healthy());

        let down = report(ReadinessState::Ready, LiveStatus::Down { error: "refused".into() });
        assert!(!down.is_live());
        assert!(!down.is_healthy());

        assert!(report(ReadinessState::Ready, LiveStatus::Unchecked).is_healthy());
        assert!(report(failed, LiveStatus::Unchecked).is_live());
    }

    #[test]
    fn test_live_status_serialization() {
        let up = serde_json::to_value(LiveStatus::Up).unwrap();
        assert_eq!(up, serde_json::json!({ "status": "up" }));

        let down = serde_json::to_value(LiveStatus::Down {
            error: "refused".into(),
        })
        .unwrap();
        assert_eq!(down, serde_json::json!({ "status": "down", "error": "refused" }));
    }
}
