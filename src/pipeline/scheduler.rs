//! In-process scheduled sweeps.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tracing::{error, info, warn};

use crate::error::ConfigError;
use crate::pipeline::orchestrator::Sweeper;

/// Parse a cron expression. Classic five-field expressions get a leading
/// seconds field of `0`.
pub fn parse_schedule(expression: &str) -> Result<Schedule, ConfigError> {
    let trimmed = expression.trim();
    let normalized = if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    };

    Schedule::from_str(&normalized).map_err(|e| ConfigError::InvalidValue {
        key: "SWEEP_SCHEDULE".into(),
        message: format!("invalid cron expression {trimmed:?}: {e}"),
    })
}

/// Next fire time strictly after now.
pub fn next_fire(schedule: &Schedule) -> Option<DateTime<Utc>> {
    schedule.upcoming(Utc).next()
}

/// Spawn a task that runs a sweep at every fire time of `schedule`.
pub fn spawn_sweep_scheduler(
    sweeper: Arc<Sweeper>,
    schedule: Schedule,
    max_results: i64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let Some(next) = next_fire(&schedule) else {
                warn!("Sweep schedule has no upcoming fire times, scheduler stopping");
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            info!(next = %next, "Next scheduled sweep");
            tokio::time::sleep(wait).await;

            match sweeper.run_sweep(max_results).await {
                Ok(outcome) => info!(
                    sweep_id = %outcome.sweep_id,
                    candidates = outcome.candidates,
                    drafted = outcome.drafted.len(),
                    "Scheduled sweep finished"
                ),
                Err(e) => error!(code = e.code(), error = %e, "Scheduled sweep failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_six_field_expressions() {
        let schedule = parse_schedule("0 */15 * * * *").unwrap();
        assert!(next_fire(&schedule).is_some());
    }

    #[test]
    fn five_field_expressions_get_seconds() {
        let schedule = parse_schedule("*/30 8-18 * * MON-FRI").unwrap();
        let next = next_fire(&schedule).unwrap();
        assert_eq!(next.timestamp() % 60, 0);
    }

    #[test]
    fn rejects_garbage() {
        let err = parse_schedule("not a cron").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "SWEEP_SCHEDULE"));
    }

    #[test]
    fn next_fire_is_in_the_future() {
        let schedule = parse_schedule("* * * * * *").unwrap();
        assert!(next_fire(&schedule).unwrap() > Utc::now() - chrono::Duration::seconds(1));
    }
}
