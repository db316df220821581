// src/intel/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinHandle;

use crate::history::ReportLog;
use crate::intel::aggregator::{Aggregator, CollectRequest};
use crate::intel::config::ScheduleSettings;
use crate::intel::types::SourceId;

#[derive(Clone, Debug)]
pub struct CollectSchedule {
    pub interval: Duration,
    pub topics: Vec<String>,
    /// Empty means every registered source.
    pub sources: Vec<SourceId>,
}

impl CollectSchedule {
    /// `None` when the schedule is disabled (interval 0 or no topics).
    pub fn from_settings(s: &ScheduleSettings) -> Option<Self> {
        if s.interval_secs == 0 || s.topics.is_empty() {
            return None;
        }
        Some(Self {
            interval: Duration::from_secs(s.interval_secs),
            topics: s.topics.clone(),
            sources: s.sources.iter().map(SourceId::new).collect(),
        })
    }
}

/// Collect the scheduled topics every `interval`, first run immediately.
/// Reports go to `history` when given; failures are logged, never fatal.
pub fn spawn_collect_scheduler(
    aggregator: Arc<Aggregator>,
    schedule: CollectSchedule,
    history: Option<Arc<ReportLog>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(schedule.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;

            let sources = if schedule.sources.is_empty() {
                aggregator.source_ids()
            } else {
                schedule.sources.clone()
            };
            let req = CollectRequest::new(schedule.topics.iter().cloned(), sources);

            counter!("intel_scheduled_runs_total").increment(1);
            match aggregator.collect(&req).await {
                Ok(report) => {
                    tracing::info!(
                        target: "intel",
                        total_items = report.total_items,
                        failures = report.failed.len(),
                        "scheduled collection tick"
                    );
                    if let Some(h) = history.as_ref() {
                        h.push(&report);
                    }
                }
                Err(e) => {
                    tracing::warn!(target: "intel", error = %e, "scheduled collection rejected");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_without_interval_or_topics() {
        let mut s = ScheduleSettings::default();
        assert!(CollectSchedule::from_settings(&s).is_none());
        s.interval_secs = 60;
        assert!(CollectSchedule::from_settings(&s).is_none());
        s.topics = vec!["rust".into()];
        s.sources = vec!["GitHub".into()];
        let sched = CollectSchedule::from_settings(&s).unwrap();
        assert_eq!(sched.interval, Duration::from_secs(60));
        assert_eq!(sched.sources, vec![SourceId::new("github")]);
    }
}
