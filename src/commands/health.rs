// Service health

use crate::models::health::HealthReport;
use crate::models::performance::SystemLoad;
use crate::process_manager::ModelRunner;
use crate::AppState;

pub fn health<R: ModelRunner>(state: &AppState<R>) -> HealthReport {
    HealthReport {
        breaker: state.breaker.status(),
        system: SystemLoad::from(&state.engine.snapshot()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::health::BreakerState;
    use crate::testing::{idle_snapshot, test_bundle};

    #[test]
    fn test_health_reports_breaker_and_load() {
        let bundle = test_bundle("Float");
        let report = health(&bundle.state);

        assert_eq!(report.breaker.state, BreakerState::Closed);
        assert_eq!(report.breaker.failures, 0);
        assert_eq!(report.breaker.reset_timeout, 60);
        assert!(report.breaker.next_reset.is_none());
        assert_eq!(report.system.cpu, idle_snapshot().cpu_percent);
        assert_eq!(report.system.memory, idle_snapshot().memory_percent);
    }

    #[test]
    fn test_health_serializes_snake_case_state() {
        let bundle = test_bundle("Float");
        let value = serde_json::to_value(health(&bundle.state)).unwrap();
        assert_eq!(value["breaker"]["state"], "closed");
    }
}
