//! Coordinator configuration, loaded from the environment.

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use dlpkit_core::ProjectId;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_MAX_MESSAGES: usize = 10;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Tuning for `JobCoordinator`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Project jobs are submitted under.
    pub project: ProjectId,
    /// Longest single pull before the deadline is re-checked.
    pub poll_interval: Duration,
    /// Batch size per pull.
    pub max_messages: usize,
    /// Wait bound used when a call passes no timeout. `None` defers to the
    /// service's job-level default.
    pub job_timeout: Option<Duration>,
}

impl CoordinatorConfig {
    pub fn new(project: ProjectId) -> Self {
        Self {
            project,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_messages: DEFAULT_MAX_MESSAGES,
            job_timeout: None,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages.max(1);
        self
    }

    pub fn with_job_timeout(mut self, job_timeout: Duration) -> Self {
        self.job_timeout = Some(job_timeout);
        self
    }

    /// Load from process environment.
    ///
    /// - `GCLOUD_PROJECT` (required)
    /// - `DLP_POLL_INTERVAL_MS` (default 500)
    /// - `DLP_MAX_MESSAGES` (default 10)
    /// - `DLP_JOB_TIMEOUT_SECS` (default: service default)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Malformed optional values fall back to
    /// their defaults with a warning; a malformed project id is an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let project = lookup("GCLOUD_PROJECT").ok_or(ConfigError::Missing("GCLOUD_PROJECT"))?;
        let project = ProjectId::new(project).map_err(|e| ConfigError::Invalid {
            name: "GCLOUD_PROJECT",
            reason: e.to_string(),
        })?;

        let mut config = Self::new(project);

        if let Some(ms) = parse_var::<u64>(&lookup, "DLP_POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(n) = parse_var::<usize>(&lookup, "DLP_MAX_MESSAGES") {
            config = config.with_max_messages(n);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "DLP_JOB_TIMEOUT_SECS") {
            config.job_timeout = Some(Duration::from_secs(secs));
        }

        Ok(config)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    let raw = lookup(name)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(var = name, value = %raw, error = %e, "ignoring invalid setting; using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn project_is_required() {
        let err = CoordinatorConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("GCLOUD_PROJECT"));
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = CoordinatorConfig::from_lookup(lookup_from(&[("GCLOUD_PROJECT", "acme")]))
            .unwrap();

        assert_eq!(config.project.as_str(), "acme");
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.max_messages, 10);
        assert_eq!(config.job_timeout, None);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = CoordinatorConfig::from_lookup(lookup_from(&[
            ("GCLOUD_PROJECT", "acme"),
            ("DLP_POLL_INTERVAL_MS", "50"),
            ("DLP_MAX_MESSAGES", "3"),
            ("DLP_JOB_TIMEOUT_SECS", "420"),
        ]))
        .unwrap();

        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.max_messages, 3);
        assert_eq!(config.job_timeout, Some(Duration::from_secs(420)));
    }

    #[test]
    fn malformed_optional_values_fall_back() {
        let config = CoordinatorConfig::from_lookup(lookup_from(&[
            ("GCLOUD_PROJECT", "acme"),
            ("DLP_MAX_MESSAGES", "lots"),
        ]))
        .unwrap();

        assert_eq!(config.max_messages, 10);
    }
}
