//! Cron scheduler for the periodic bot jobs.
//!
//! - 5-field (`min hour dom mon dow`) or 6-field (`sec min hour dom mon dow`) syntax
//! - One task per job; a job never overlaps itself
//! - A failing run is logged and the job keeps its schedule

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Local, Timelike};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{jobs::JobKind, Error, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CronSchedule {
    pub job: JobKind,
    pub cron: String,
}

/// Executes one run of a scheduled job.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: JobKind) -> Result<()>;
}

#[derive(Clone)]
pub struct CronScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    runner: Arc<dyn JobRunner>,
    jobs: tokio::sync::Mutex<HashMap<JobKind, JobEntry>>,
}

struct JobEntry {
    expr: CronExpr,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl CronScheduler {
    pub fn new(runner: Arc<dyn JobRunner>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                runner,
                jobs: tokio::sync::Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Replace the running jobs with `schedules`.
    ///
    /// Every expression is validated before anything starts, so a bad
    /// schedule leaves the scheduler empty instead of half-started.
    pub async fn start(&self, schedules: Vec<CronSchedule>) -> Result<usize> {
        let parsed = schedules
            .into_iter()
            .map(|s| {
                CronExpr::parse(&s.cron)
                    .map(|expr| (s.job, expr))
                    .map_err(|e| Error::Config(format!("invalid cron for {}: {e}", s.job)))
            })
            .collect::<Result<Vec<_>>>()?;

        self.stop().await;

        let mut jobs = self.inner.jobs.lock().await;
        for (job, expr) in parsed {
            let cancel = CancellationToken::new();
            let scheduler = self.clone();
            let expr_for_task = expr.clone();
            let cancel_clone = cancel.clone();
            let handle = tokio::spawn(async move {
                scheduler.job_loop(job, expr_for_task, cancel_clone).await;
            });

            if let Some(old) = jobs.insert(
                job,
                JobEntry {
                    expr,
                    cancel,
                    handle,
                },
            ) {
                tracing::warn!("Job {job} scheduled twice, keeping the last schedule");
                old.cancel.cancel();
                old.handle.abort();
            }
        }

        tracing::info!("Started {} jobs", jobs.len());
        Ok(jobs.len())
    }

    pub async fn stop(&self) {
        let mut jobs = self.inner.jobs.lock().await;
        for (_, job) in jobs.drain() {
            job.cancel.cancel();
            job.handle.abort(); // best-effort
        }
    }

    /// Next fire time of every running job, ordered by job.
    pub async fn next_runs(&self) -> Vec<(JobKind, Option<DateTime<Local>>)> {
        let jobs = self.inner.jobs.lock().await;
        let now = Local::now();
        let mut runs = jobs
            .iter()
            .map(|(job, entry)| (*job, entry.expr.next_after(now)))
            .collect::<Vec<_>>();
        runs.sort_by_key(|(job, _)| *job);
        runs
    }

    async fn job_loop(&self, job: JobKind, expr: CronExpr, cancel: CancellationToken) {
        let mut last_run: Option<DateTime<Local>> = None;
        loop {
            // Never fire twice for the same second, even if the timer wakes early.
            let from = match last_run {
                Some(last) => last.max(Local::now()),
                None => Local::now(),
            };
            let Some(next) = expr.next_after(from) else {
                tracing::error!("Job {job} has no next run (stopping)");
                break;
            };

            let dur = (next - Local::now()).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
              _ = cancel.cancelled() => break,
              _ = sleep(dur) => {
                last_run = Some(next);
                tracing::debug!("Running job {job}");
                if let Err(e) = self.inner.runner.run(job).await {
                  tracing::error!("Scheduled job {job} failed: {e}");
                }
              }
            }
        }
    }
}

// === Cron expression engine ===

const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];
const MONTH_NAMES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// Parsed cron expression, evaluated in local time.
#[derive(Clone, Debug)]
pub struct CronExpr {
    sec: Field,
    min: Field,
    hour: Field,
    dom: Field,
    mon: Field,
    dow: Field,
}

#[derive(Clone, Debug)]
struct Field {
    min: u32,
    max: u32,
    any: bool,
    allowed: Vec<bool>, // index = value
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self> {
        let parts = expr.split_whitespace().collect::<Vec<_>>();
        let (sec, rest) = match parts.len() {
            5 => (Field::parse("0", 0, 59, &[], 0)?, &parts[..]),
            6 => (Field::parse(parts[0], 0, 59, &[], 0)?, &parts[1..]),
            n => {
                return Err(Error::Config(format!("expected 5 or 6 fields, got {n}")));
            }
        };

        let min = Field::parse(rest[0], 0, 59, &[], 0)?;
        let hour = Field::parse(rest[1], 0, 23, &[], 0)?;
        let dom = Field::parse(rest[2], 1, 31, &[], 0)?;
        let mon = Field::parse(rest[3], 1, 12, &MONTH_NAMES, 1)?;
        let dow = Field::parse(rest[4], 0, 7, &DAY_NAMES, 0)?.fold_sunday();

        Ok(Self {
            sec,
            min,
            hour,
            dom,
            mon,
            dow,
        })
    }

    pub fn matches(&self, dt: DateTime<Local>) -> bool {
        self.sec.contains(dt.second()) && self.matches_minute(dt)
    }

    fn matches_minute(&self, dt: DateTime<Local>) -> bool {
        if !self.min.contains(dt.minute()) {
            return false;
        }
        if !self.hour.contains(dt.hour()) {
            return false;
        }
        if !self.mon.contains(dt.month()) {
            return false;
        }

        // Standard cron semantics: if both DOM and DOW are restricted, match when EITHER matches.
        let dom_match = self.dom.contains(dt.day());
        let dow_match = self.dow.contains(dt.weekday().num_days_from_sunday());

        match (self.dom.any, self.dow.any) {
            (true, true) => true,
            (true, false) => dow_match,
            (false, true) => dom_match,
            (false, false) => dom_match || dow_match,
        }
    }

    /// First matching instant strictly after `now`, at whole-second precision.
    pub fn next_after(&self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        let start = now.with_nanosecond(0)? + chrono::Duration::seconds(1);
        let mut minute = start.with_second(0)?;
        let mut first_sec = start.second();

        // Hard cap to avoid infinite loops for impossible expressions.
        let max_iters = 366usize * 24 * 60;
        for _ in 0..max_iters {
            if self.matches_minute(minute) {
                if let Some(sec) = (first_sec..=59).find(|s| self.sec.contains(*s)) {
                    return minute.with_second(sec);
                }
            }
            minute += chrono::Duration::minutes(1);
            first_sec = 0;
        }
        None
    }
}

impl Field {
    fn parse(raw: &str, min: u32, max: u32, names: &[&str], name_base: u32) -> Result<Self> {
        let raw = raw.trim();
        if raw == "*" || raw == "?" {
            return Ok(Self {
                min,
                max,
                any: true,
                allowed: vec![true; (max + 1) as usize],
            });
        }

        let mut allowed = vec![false; (max + 1) as usize];
        for part in raw.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let (base, step) = if let Some((a, b)) = part.split_once('/') {
                let step: u32 = b
                    .trim()
                    .parse()
                    .map_err(|_| Error::Config(format!("invalid step: {b}")))?;
                if step == 0 {
                    return Err(Error::Config("step must be > 0".to_string()));
                }
                (a.trim(), Some(step))
            } else {
                (part, None)
            };

            let (start, end) = if base == "*" {
                (min, max)
            } else if let Some((a, b)) = base.split_once('-') {
                let a = parse_value(a.trim(), names, name_base)?;
                let b = parse_value(b.trim(), names, name_base)?;
                (a, b)
            } else {
                let a = parse_value(base, names, name_base)?;
                if step.is_some() {
                    (a, max)
                } else {
                    (a, a)
                }
            };

            if start < min || end > max || start > end {
                return Err(Error::Config(format!(
                    "value out of range {min}-{max}: {part}"
                )));
            }

            let step = step.unwrap_or(1);
            let mut v = start;
            while v <= end {
                allowed[v as usize] = true;
                v = v.saturating_add(step);
            }
        }

        let any = (min..=max).all(|v| allowed[v as usize]);
        Ok(Self {
            min,
            max,
            any,
            allowed,
        })
    }

    /// Day-of-week fields accept `7` for Sunday; fold it onto `0`.
    fn fold_sunday(mut self) -> Self {
        if self.allowed.get(7).copied().unwrap_or(false) {
            self.allowed[0] = true;
        }
        self.max = 6;
        self.allowed.truncate(7);
        self.any = self.allowed.iter().all(|v| *v);
        self
    }

    fn contains(&self, v: u32) -> bool {
        if v < self.min || v > self.max {
            return false;
        }
        self.allowed.get(v as usize).copied().unwrap_or(false)
    }
}

fn parse_value(s: &str, names: &[&str], name_base: u32) -> Result<u32> {
    if let Ok(v) = s.parse::<u32>() {
        return Ok(v);
    }
    names
        .iter()
        .position(|n| n.eq_ignore_ascii_case(s))
        .map(|idx| idx as u32 + name_base)
        .ok_or_else(|| Error::Config(format!("invalid value: {s}")))
}

// === Tests ===
