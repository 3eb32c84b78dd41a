//! Logical queries and their wire encoding
//!
//! A [`Query`] names a resource and carries its filter and time parameters.
//! It is an immutable value: the batch planner derives new queries from it
//! instead of mutating a shared parameter bag.
//!
//! # Time specification
//!
//! Exactly one of three styles must be present on a query for the batched
//! resource:
//! - `from` + `to`: explicit absolute range
//! - `lastHours`: relative window anchored at the session's "now"
//! - `updatedSince`: change cursor
//!
//! # Encoding
//!
//! Parameters render as `key=value` pairs joined by `&` in a fixed order
//! (from, to, measures, sites, groups, dataTypes, validOnly, lastHours,
//! updatedSince). Collections are comma-joined and datetimes use
//! `YYYY-MM-DDTHH:MM:SSZ` in UTC. Collection items are form-urlencoded one by
//! one, so the separating commas stay literal.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use url::form_urlencoded::byte_serialize;

use crate::error::{ClientError, ClientResult};

/// Wire format of datetime parameters
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Validated time specification of a query
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeSpec {
    /// Explicit range `[from, to)`
    Range {
        /// Inclusive start
        from: DateTime<Utc>,
        /// Exclusive end
        to: DateTime<Utc>,
    },
    /// Relative window of the given number of hours
    LastHours(f64),
    /// Records modified after this point
    UpdatedSince(DateTime<Utc>),
}

/// A logical, possibly over-sized request for one resource
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub(crate) resource: String,
    pub(crate) from: Option<DateTime<Utc>>,
    pub(crate) to: Option<DateTime<Utc>>,
    pub(crate) measures: Option<BTreeSet<String>>,
    pub(crate) sites: Option<Vec<String>>,
    pub(crate) groups: Option<Vec<String>>,
    pub(crate) data_types: Option<Vec<String>>,
    pub(crate) valid_only: Option<bool>,
    pub(crate) last_hours: Option<f64>,
    pub(crate) updated_since: Option<DateTime<Utc>>,
}

impl Query {
    /// Query for `resource` with no parameters
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            from: None,
            to: None,
            measures: None,
            sites: None,
            groups: None,
            data_types: None,
            valid_only: None,
            last_hours: None,
            updated_since: None,
        }
    }

    /// Set the inclusive start of an explicit range
    pub fn from(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    /// Set the exclusive end of an explicit range
    pub fn to(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    /// Set an explicit range `[from, to)`
    pub fn range(self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from(from).to(to)
    }

    /// Request the trailing `hours` relative to the session's "now"
    pub fn last_hours(mut self, hours: f64) -> Self {
        self.last_hours = Some(hours);
        self
    }

    /// Request records modified after `since`
    pub fn updated_since(mut self, since: DateTime<Utc>) -> Self {
        self.updated_since = Some(since);
        self
    }

    /// Restrict to the given measure identifiers
    pub fn measures<I, S>(mut self, measures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.measures = Some(measures.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict to the given sites
    pub fn sites<I, S>(mut self, sites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sites = Some(sites.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict to the given groups
    pub fn groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = Some(groups.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict to the given data types
    pub fn data_types<I, S>(mut self, data_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.data_types = Some(data_types.into_iter().map(Into::into).collect());
        self
    }

    /// Only return validated values
    pub fn valid_only(mut self, valid_only: bool) -> Self {
        self.valid_only = Some(valid_only);
        self
    }

    /// Resource name
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Start of the explicit range, if any
    pub fn from_time(&self) -> Option<DateTime<Utc>> {
        self.from
    }

    /// End of the explicit range, if any
    pub fn to_time(&self) -> Option<DateTime<Utc>> {
        self.to
    }

    /// Relative window in hours, if any
    pub fn last_hours_value(&self) -> Option<f64> {
        self.last_hours
    }

    /// Change cursor, if any
    pub fn updated_since_time(&self) -> Option<DateTime<Utc>> {
        self.updated_since
    }

    /// Measure identifiers, if restricted
    pub fn measure_set(&self) -> Option<&BTreeSet<String>> {
        self.measures.as_ref()
    }

    /// Number of measures requested (zero when unrestricted)
    pub fn measure_count(&self) -> usize {
        self.measures.as_ref().map_or(0, BTreeSet::len)
    }

    /// Names of the time parameters present, in canonical order
    pub fn time_keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.from.is_some() {
            keys.push("from");
        }
        if self.to.is_some() {
            keys.push("to");
        }
        if self.last_hours.is_some() {
            keys.push("lastHours");
        }
        if self.updated_since.is_some() {
            keys.push("updatedSince");
        }
        keys
    }

    /// Validate the time parameters and return their shape
    ///
    /// # Errors
    /// Returns `ClientError::Validation` unless exactly one of `{from, to}`,
    /// `{lastHours}` or `{updatedSince}` is present, when `from` is not
    /// before `to`, or when `lastHours` is not finite
    pub fn time_spec(&self) -> ClientResult<TimeSpec> {
        match (self.from, self.to, self.last_hours, self.updated_since) {
            (Some(from), Some(to), None, None) => {
                if from >= to {
                    return Err(ClientError::Validation(format!(
                        "`from` ({}) must be before `to` ({})",
                        format_datetime(from),
                        format_datetime(to)
                    )));
                }
                Ok(TimeSpec::Range { from, to })
            }
            (None, None, Some(hours), None) => {
                if !hours.is_finite() {
                    return Err(ClientError::Validation(format!(
                        "`lastHours` must be finite, got {hours}"
                    )));
                }
                Ok(TimeSpec::LastHours(hours))
            }
            (None, None, None, Some(since)) => Ok(TimeSpec::UpdatedSince(since)),
            _ => Err(ClientError::Validation(format!(
                "wrong time arguments {:?}: use (`from` & `to`), `lastHours` or `updatedSince` independently",
                self.time_keys()
            ))),
        }
    }

    /// Render `resource?key=value&...` in canonical parameter order
    pub fn to_resource_path(&self) -> String {
        let mut params: Vec<String> = Vec::new();

        if let Some(from) = self.from {
            params.push(format!("from={}", format_datetime(from)));
        }
        if let Some(to) = self.to {
            params.push(format!("to={}", format_datetime(to)));
        }
        if let Some(measures) = &self.measures {
            params.push(format!("measures={}", join(measures)));
        }
        if let Some(sites) = &self.sites {
            params.push(format!("sites={}", join(sites)));
        }
        if let Some(groups) = &self.groups {
            params.push(format!("groups={}", join(groups)));
        }
        if let Some(data_types) = &self.data_types {
            params.push(format!("dataTypes={}", join(data_types)));
        }
        if let Some(valid_only) = self.valid_only {
            params.push(format!("validOnly={valid_only}"));
        }
        if let Some(hours) = self.last_hours {
            params.push(format!("lastHours={}", format_hours(hours)));
        }
        if let Some(since) = self.updated_since {
            params.push(format!("updatedSince={}", format_datetime(since)));
        }

        if params.is_empty() {
            self.resource.clone()
        } else {
            format!("{}?{}", self.resource, params.join("&"))
        }
    }
}

/// Format a datetime parameter
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

fn format_hours(hours: f64) -> String {
    if hours.fract() == 0.0 && hours.abs() < 1e15 {
        format!("{}", hours as i64)
    } else {
        format!("{hours}")
    }
}

/// Encode each item and join with literal commas
fn join<'a>(values: impl IntoIterator<Item = &'a String>) -> String {
    values
        .into_iter()
        .map(|value| byte_serialize(value.as_bytes()).collect::<String>())
        .collect::<Vec<_>>()
        .join(",")
}
