//! RefreshScheduler (C14): topological parallel-group execution of model
//! refreshes, plus a cron-driven periodic trigger with retry/backoff.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;
use grizzly_error::{GrizzlyError, Result};
use tracing::{info, warn};

use crate::graph::DependencyGraph;

/// Refresh `target` and every transitive dependency it has in `graph`.
///
/// Dependencies run before dependents, one topological group at a time.
/// Within a group of more than one model, workers run on a `rayon` scope
/// and join at the group boundary (spec §5: "full fence between groups").
/// If any worker in a group fails, the first failure in the group's
/// insertion order is returned and later groups never run.
///
/// Returns the ids that completed successfully, in execution order.
pub fn refresh_model<F>(graph: &DependencyGraph, target: &str, run: F) -> Result<Vec<String>>
where
    F: Fn(&str) -> Result<()> + Sync,
{
    let mut scope: HashSet<String> = graph.transitive_dependencies(target)?;
    scope.insert(target.to_owned());
    let groups = graph.parallel_execution_groups(&scope, HashSet::new())?;

    let mut executed = Vec::with_capacity(scope.len());
    for group in groups {
        if group.len() == 1 {
            run(&group[0])?;
        } else {
            let mut results: Vec<Option<Result<()>>> = (0..group.len()).map(|_| None).collect();
            rayon::scope(|s| {
                for (slot, name) in results.iter_mut().zip(&group) {
                    let run = &run;
                    s.spawn(move |_| *slot = Some(run(name)));
                }
            });
            for result in results {
                if let Some(Err(err)) = result {
                    return Err(err);
                }
            }
        }
        info!(group = ?group, "refresh group completed");
        executed.extend(group);
    }
    Ok(executed)
}

/// Compute the next occurrence of `cron_expr` strictly after `now`.
fn cron_next(cron_expr: &str, now: i64) -> Result<i64> {
    let schedule = CronSchedule::from_str(cron_expr)
        .map_err(|e| GrizzlyError::internal(format!("invalid cron expression {cron_expr:?}: {e}")))?;
    let after: DateTime<Utc> = DateTime::from_timestamp(now, 0)
        .ok_or_else(|| GrizzlyError::internal(format!("timestamp {now} out of range")))?;
    schedule
        .after(&after)
        .next()
        .map(|dt| dt.timestamp())
        .ok_or_else(|| GrizzlyError::internal("cron expression has no upcoming occurrence"))
}

/// A periodic refresh record: `{id, model_name, cron_expr, next_run,
/// retry_count, max_retries, enabled}` (spec §4.12), plus `last_run`.
#[derive(Debug, Clone)]
pub struct ScheduleRecord {
    /// Unique schedule id.
    pub id: String,
    /// Model this schedule refreshes.
    pub model_name: String,
    /// Cron expression (the `cron` crate's 7-field format, seconds first).
    pub cron_expr: String,
    /// Unix timestamp of the next due run.
    pub next_run: i64,
    /// Unix timestamp of the last run, if any.
    pub last_run: Option<i64>,
    /// Consecutive failures since the last success.
    pub retry_count: u32,
    /// Failures after which the schedule disables itself.
    pub max_retries: u32,
    /// State machine: `enabled -> running -> (enabled | failing -> disabled)`.
    pub enabled: bool,
}

/// Holds every periodic schedule and drives them on each [`tick`](Self::tick).
#[derive(Default)]
pub struct PeriodicScheduler {
    schedules: HashMap<String, ScheduleRecord>,
}

impl PeriodicScheduler {
    /// Construct an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new schedule, computing its first `next_run` from `now`.
    pub fn add_schedule(
        &mut self,
        id: impl Into<String>,
        model_name: impl Into<String>,
        cron_expr: impl Into<String>,
        max_retries: u32,
        now: i64,
    ) -> Result<()> {
        let id = id.into();
        let cron_expr = cron_expr.into();
        let next_run = cron_next(&cron_expr, now)?;
        self.schedules.insert(
            id.clone(),
            ScheduleRecord {
                id,
                model_name: model_name.into(),
                cron_expr,
                next_run,
                last_run: None,
                retry_count: 0,
                max_retries,
                enabled: true,
            },
        );
        Ok(())
    }

    /// Look up a schedule record by id.
    #[must_use]
    pub fn schedule(&self, id: &str) -> Option<&ScheduleRecord> {
        self.schedules.get(id)
    }

    /// Every registered schedule.
    pub fn schedules(&self) -> impl Iterator<Item = &ScheduleRecord> {
        self.schedules.values()
    }

    /// Re-enable a disabled schedule, resetting its retry count.
    pub fn enable(&mut self, id: &str, now: i64) -> Result<()> {
        let record = self.schedules.get_mut(id).ok_or_else(|| GrizzlyError::ScheduleNotFound(id.to_owned()))?;
        record.enabled = true;
        record.retry_count = 0;
        record.next_run = cron_next(&record.cron_expr, now)?;
        Ok(())
    }

    /// One wake-up of the background thread (spec §4.12: "≈ once per
    /// minute"). Runs `run_model` for every enabled schedule due at `now`;
    /// on success resets the retry count and reschedules; on failure
    /// increments the retry count and disables the schedule once it
    /// reaches `max_retries`.
    pub fn tick<F>(&mut self, now: i64, mut run_model: F) -> Result<()>
    where
        F: FnMut(&str) -> Result<()>,
    {
        let due: Vec<String> =
            self.schedules.values().filter(|s| s.enabled && now >= s.next_run).map(|s| s.id.clone()).collect();

        for id in due {
            let (model_name, cron_expr) = {
                let record = self.schedules.get(&id).expect("id came from this map");
                (record.model_name.clone(), record.cron_expr.clone())
            };
            match run_model(&model_name) {
                Ok(()) => {
                    let next_run = cron_next(&cron_expr, now)?;
                    let record = self.schedules.get_mut(&id).expect("id came from this map");
                    record.last_run = Some(now);
                    record.retry_count = 0;
                    record.next_run = next_run;
                    info!(schedule = %id, model = %model_name, "periodic refresh succeeded");
                }
                Err(err) => {
                    let record = self.schedules.get_mut(&id).expect("id came from this map");
                    record.retry_count += 1;
                    if record.retry_count >= record.max_retries {
                        record.enabled = false;
                        warn!(schedule = %id, model = %model_name, %err, "periodic refresh disabled after repeated failures");
                    } else {
                        warn!(schedule = %id, model = %model_name, %err, retry_count = record.retry_count, "periodic refresh failed, will retry");
                    }
                }
            }
        }
        Ok(())
    }
}
