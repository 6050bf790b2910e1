//! Tick scheduling: fixed interval or cron expression
//!
//! The mode is chosen once at startup. Both modes run a tick immediately and
//! then wait for the next due time in slices of at most one second, checking
//! the cancellation token at every slice and at the top of each iteration.
//! A tick is never interrupted once started.

use crate::config::Config;
use crate::error::{FuelWatchError, Result};
use crate::logging::{StructuredLogger, get_logger};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Longest uninterrupted sleep between cancellation checks
pub const SLEEP_SLICE: Duration = Duration::from_secs(1);

/// Cooldown after the next fire time could not be computed
pub const ERROR_BACKOFF: Duration = Duration::from_secs(60);

/// Parse a cron expression. Classic five-field expressions fire at second
/// zero and use POSIX day-of-week numbering (0 or 7 = Sunday).
pub fn parse_cron(expr: &str) -> Result<cron::Schedule> {
    let trimmed = expr.trim();
    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    let normalized = if fields.len() == 5 {
        let dow = posix_day_of_week(fields[4]).map_err(|msg| {
            FuelWatchError::validation("cron_schedule", format!("invalid expression '{}': {}", expr, msg))
        })?;
        format!("0 {} {}", fields[..4].join(" "), dow)
    } else {
        trimmed.to_string()
    };
    cron::Schedule::from_str(&normalized).map_err(|e| {
        FuelWatchError::validation("cron_schedule", format!("invalid expression '{}': {}", expr, e))
    })
}

// The cron crate numbers days 1 = Sunday .. 7 = Saturday. Numeric POSIX
// items are expanded to explicit day lists in that numbering; names, `*`
// and `?` items already agree and pass through.
fn posix_day_of_week(field: &str) -> std::result::Result<String, String> {
    let mut out = Vec::new();
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: u8 = step
                    .parse()
                    .ok()
                    .filter(|s| *s > 0)
                    .ok_or_else(|| format!("invalid day-of-week step '{}'", item))?;
                (range, Some(step))
            }
            None => (item, None),
        };
        if range == "*" || range == "?" || range.chars().any(|c| c.is_ascii_alphabetic()) {
            out.push(item.to_string());
            continue;
        }

        let day = |s: &str| -> std::result::Result<u8, String> {
            s.parse::<u8>()
                .ok()
                .filter(|d| *d <= 7)
                .ok_or_else(|| format!("invalid day of week '{}'", s))
        };
        let (start, end) = match range.split_once('-') {
            Some((a, b)) => (day(a)?, day(b)?),
            // `n/step` runs to the end of the week
            None if step.is_some() => (day(range)?, 6),
            None => {
                let d = day(range)?;
                (d, d)
            }
        };
        if start > end {
            return Err(format!("day-of-week range '{}' runs backwards", range));
        }

        let mut days: Vec<u8> = (start..=end)
            .step_by(usize::from(step.unwrap_or(1)))
            .map(|d| d % 7 + 1)
            .collect();
        days.sort_unstable();
        days.dedup();
        out.extend(days.iter().map(u8::to_string));
    }
    Ok(out.join(","))
}

/// How ticks are spaced
#[derive(Debug, Clone)]
pub enum Cadence {
    Interval(Duration),
    /// `schedule` is `None` when the expression does not parse; every
    /// delay computation then reports a schedule error.
    Cron {
        expression: String,
        schedule: Option<Box<cron::Schedule>>,
        timezone: Tz,
    },
}

impl Cadence {
    /// Cron when `cron_schedule` is set, otherwise every `poll_interval`
    /// minutes. A malformed expression is kept and reported at each wait.
    pub fn from_config(config: &Config) -> Result<Self> {
        let expression = config.cron_schedule.trim();
        if expression.is_empty() {
            return Ok(Self::Interval(Duration::from_secs(
                config.poll_interval.max(1) * 60,
            )));
        }
        let schedule = match parse_cron(expression) {
            Ok(schedule) => Some(Box::new(schedule)),
            Err(e) => {
                get_logger("scheduler").warn(&format!(
                    "Cron schedule will not fire until fixed: {}",
                    e
                ));
                None
            }
        };
        Ok(Self::Cron {
            expression: expression.to_string(),
            schedule,
            timezone: config.timezone_tz()?,
        })
    }

    /// Delay from `now` until the next tick is due
    pub fn next_delay(&self, now: DateTime<Utc>) -> Result<Duration> {
        match self {
            Self::Interval(every) => Ok(*every),
            Self::Cron {
                expression,
                schedule,
                timezone,
            } => {
                let Some(schedule) = schedule else {
                    return Err(match parse_cron(expression) {
                        Err(e) => FuelWatchError::schedule(e.to_string()),
                        Ok(_) => FuelWatchError::schedule(format!("'{}' was not compiled", expression)),
                    });
                };
                let local = now.with_timezone(timezone);
                let next = schedule.after(&local).next().ok_or_else(|| {
                    FuelWatchError::schedule(format!("'{}' has no upcoming fire time", expression))
                })?;
                Ok((next.with_timezone(&Utc) - now)
                    .to_std()
                    .unwrap_or(Duration::ZERO))
            }
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Self::Interval(_) => "interval",
            Self::Cron { .. } => "cron",
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Interval(every) if every.as_secs() % 60 == 0 => {
                format!("every {} minutes", every.as_secs() / 60)
            }
            Self::Interval(every) => format!("every {:?}", every),
            Self::Cron {
                expression,
                timezone,
                ..
            } => format!("cron '{}' ({})", expression, timezone),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Waiting,
    Running,
    Stopped,
}

/// One unit of scheduled work
#[async_trait]
pub trait Tick: Send {
    async fn tick(&mut self);
}

pub struct Scheduler {
    cadence: Cadence,
    token: CancellationToken,
    state: watch::Sender<SchedulerState>,
    error_backoff: Duration,
    logger: StructuredLogger,
}

impl Scheduler {
    pub fn new(cadence: Cadence, token: CancellationToken) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            cadence,
            token,
            state,
            error_backoff: ERROR_BACKOFF,
            logger: get_logger("scheduler"),
        }
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    pub fn cadence(&self) -> &Cadence {
        &self.cadence
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    fn set_state(&self, state: SchedulerState) {
        self.state.send_replace(state);
    }

    /// Run until the token is cancelled
    pub async fn run(&self, work: &mut dyn Tick) {
        self.logger.info(&format!(
            "Starting scheduled monitoring, {}",
            self.cadence.describe()
        ));

        if !self.token.is_cancelled() {
            self.run_tick(work).await;
        }

        while !self.token.is_cancelled() {
            self.set_state(SchedulerState::Waiting);
            let delay = match self.cadence.next_delay(Utc::now()) {
                Ok(delay) => delay,
                Err(e) => {
                    self.logger
                        .error(&format!("Error in schedule computation: {}", e));
                    self.sleep_sliced(self.error_backoff).await;
                    continue;
                }
            };
            self.logger
                .info(&format!("Next run in {}s", delay.as_secs()));
            if !self.sleep_sliced(delay).await {
                break;
            }
            self.run_tick(work).await;
        }

        self.set_state(SchedulerState::Stopped);
        self.logger.info("Scheduler stopped");
    }

    async fn run_tick(&self, work: &mut dyn Tick) {
        self.set_state(SchedulerState::Running);
        work.tick().await;
    }

    /// Sleep for `total` in slices; false when cancelled before the end
    async fn sleep_sliced(&self, total: Duration) -> bool {
        let deadline = Instant::now() + total;
        loop {
            if self.token.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let slice = (deadline - now).min(SLEEP_SLICE);
            tokio::select! {
                _ = self.token.cancelled() => return false,
                _ = tokio::time::sleep(slice) => {}
            }
        }
    }
}
