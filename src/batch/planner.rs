//! Query splitting for server-side row and column limits
//!
//! [`BatchPlanner`] turns one logical query into leaf queries that each
//! respect `rows <= maxLines` and `measures <= maxCols`. Every planning step
//! applies the first matching rule:
//!
//! 1. Measures overflow: split off the first `maxCols` measures.
//! 2. Explicit range overflow: cut `[from, to)` at `from + maxLines * interval`.
//! 3. Relative window:
//!    a. `lastHours < 1` is clamped to 1;
//!    b. `lastHours > 168` becomes `from = now - maxLines * interval` with
//!       `updatedSince = now`;
//!    c. a window wider than `maxLines` intervals becomes the range
//!       `[now - 168h, now)`.
//! 4. Change cursor overflow: `[updatedSince, now)` is cut at
//!    `updatedSince + maxLines * interval` into two explicit ranges.
//! 5. Otherwise the query is a leaf.
//!
//! Steps run on an explicit depth-first work stack, so leaves come out in
//! recursion order and long ranges cannot exhaust the call stack.

use chrono::{DateTime, TimeDelta, Utc};

use crate::config::Limits;
use crate::error::{ClientError, ClientResult};
use crate::query::Query;

/// Upper bound on leaves produced for one query
pub const MAX_BATCHES: usize = 100_000;

/// Longest window expressible with `lastHours` (one week)
pub const MAX_LAST_HOURS: f64 = 168.0;

/// Outcome of one planning step
#[derive(Debug)]
enum Step {
    Split(Query, Query),
    Rewrite(Query),
    Leaf(Query),
}

/// Splits queries into batches that fit the server limits
#[derive(Debug, Clone)]
pub struct BatchPlanner {
    limits: Limits,
    interval: TimeDelta,
    now: DateTime<Utc>,
}

impl BatchPlanner {
    /// Create a planner
    ///
    /// # Arguments
    /// * `limits` - Server row/column caps
    /// * `interval` - Sampling interval of the series (at least one second)
    /// * `now` - Anchor for relative windows and the change cursor
    ///
    /// # Errors
    /// Returns `ClientError::Config` for a sub-second interval or zero limits
    pub fn new(limits: Limits, interval: TimeDelta, now: DateTime<Utc>) -> ClientResult<Self> {
        if interval < TimeDelta::seconds(1) {
            return Err(ClientError::Config(format!(
                "sampling interval must be at least 1s, got {}ms",
                interval.num_milliseconds()
            )));
        }
        if limits.max_data == 0 || limits.max_cols == 0 || limits.max_lines == Some(0) {
            return Err(ClientError::Config(
                "max_data, max_cols and max_lines must be positive".to_string(),
            ));
        }
        Ok(Self {
            limits,
            interval,
            now,
        })
    }

    /// Limits the planner splits against
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Anchor for relative windows
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Decompose `query` into leaf queries in depth-first order
    ///
    /// # Errors
    /// Returns `ClientError::TooManyBatches` if more than [`MAX_BATCHES`]
    /// leaves would be produced
    pub fn plan(&self, query: Query) -> ClientResult<Vec<Query>> {
        let mut pending = vec![query];
        let mut leaves = Vec::new();

        while let Some(query) = pending.pop() {
            match self.step(query) {
                Step::Split(first, second) => {
                    pending.push(second);
                    pending.push(first);
                }
                Step::Rewrite(query) => pending.push(query),
                Step::Leaf(query) => {
                    if leaves.len() >= MAX_BATCHES {
                        return Err(ClientError::TooManyBatches { limit: MAX_BATCHES });
                    }
                    leaves.push(query);
                }
            }
        }

        Ok(leaves)
    }

    /// Duration covered by `max_lines` samples
    fn chunk(&self, max_lines: u64) -> TimeDelta {
        let lines = i64::try_from(max_lines).unwrap_or(i64::MAX);
        TimeDelta::milliseconds(self.interval.num_milliseconds().saturating_mul(lines))
    }

    fn step(&self, query: Query) -> Step {
        let max_lines = self.limits.max_lines_for(query.measure_count());
        let chunk = self.chunk(max_lines);

        // Rule 1: too many measures for one request
        if let Some(measures) = &query.measures {
            if let Some(pivot) = measures.iter().nth(self.limits.max_cols).cloned() {
                let mut head = measures.clone();
                let tail = head.split_off(&pivot);
                let first = Query {
                    measures: Some(head),
                    ..query.clone()
                };
                let second = Query {
                    measures: Some(tail),
                    ..query
                };
                return Step::Split(first, second);
            }
        }

        // Rule 2: explicit range longer than max_lines samples
        if let (Some(from), Some(to)) = (query.from, query.to) {
            if to - from > chunk {
                let mid = from + chunk;
                let first = Query {
                    to: Some(mid),
                    ..query.clone()
                };
                let second = Query {
                    from: Some(mid),
                    ..query
                };
                return Step::Split(first, second);
            }
            return Step::Leaf(query);
        }

        // Rule 3: relative window
        if let Some(hours) = query.last_hours {
            if hours < 1.0 {
                return Step::Rewrite(Query {
                    last_hours: Some(1.0),
                    ..query
                });
            }

            if hours > MAX_LAST_HOURS {
                let from = self
                    .now
                    .checked_sub_signed(chunk)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC);
                return Step::Rewrite(Query {
                    last_hours: None,
                    from: Some(from),
                    updated_since: Some(self.now),
                    ..query
                });
            }

            let window_ms = hours * 3_600_000.0;
            if window_ms > chunk.num_milliseconds() as f64 {
                return Step::Rewrite(Query {
                    last_hours: None,
                    from: Some(self.now - TimeDelta::hours(MAX_LAST_HOURS as i64)),
                    to: Some(self.now),
                    ..query
                });
            }

            return Step::Leaf(query);
        }

        // Rule 4: change cursor further back than max_lines samples
        if let Some(since) = query.updated_since {
            if self.now - since > chunk {
                let mid = since + chunk;
                let first = Query {
                    updated_since: None,
                    from: Some(since),
                    to: Some(mid),
                    ..query.clone()
                };
                let second = Query {
                    updated_since: None,
                    from: Some(mid),
                    to: Some(self.now),
                    ..query
                };
                return Step::Split(first, second);
            }
        }

        Step::Leaf(query)
    }
}
