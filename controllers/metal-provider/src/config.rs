//! Controller configuration loaded from environment variables.

use crate::error::ControllerError;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Runtime settings of the metal provider controllers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch; all namespaces when unset
    pub namespace: Option<String>,
    /// Fixed re-check delay on the MetalCluster path (waiting for machines to go away)
    pub cluster_requeue: Duration,
    /// Fixed re-check delay on the MetalMachine path (bind wait, deletion)
    pub machine_requeue: Duration,
    /// Maximum concurrent reconciliations per controller
    pub concurrency: u16,
    /// Quiet period before a burst of watch events triggers a pass
    pub debounce: Duration,
    /// Bind address of the metrics and probe server
    pub metrics_bind_address: SocketAddr,
    /// Error backoff lower bound in seconds
    pub error_backoff_min_seconds: u64,
    /// Error backoff upper bound in seconds
    pub error_backoff_max_seconds: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            cluster_requeue: Duration::from_secs(10),
            machine_requeue: Duration::from_secs(5),
            concurrency: 3,
            debounce: Duration::from_millis(500),
            metrics_bind_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            error_backoff_min_seconds: 5,
            error_backoff_max_seconds: 300,
        }
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ControllerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| ControllerError::InvalidConfig(format!("{key}={raw}: {e}"))),
        _ => Ok(default),
    }
}

impl ControllerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let defaults = Self::default();

        let namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty());
        let cluster_requeue = parse(&lookup, "CLUSTER_REQUEUE_SECONDS", defaults.cluster_requeue.as_secs())?;
        let machine_requeue = parse(&lookup, "MACHINE_REQUEUE_SECONDS", defaults.machine_requeue.as_secs())?;
        let concurrency = parse(&lookup, "RECONCILE_CONCURRENCY", defaults.concurrency)?;
        let debounce = parse(&lookup, "RECONCILE_DEBOUNCE_MILLIS", 500u64)?;
        let metrics_bind_address = parse(&lookup, "METRICS_BIND_ADDRESS", defaults.metrics_bind_address)?;
        let error_backoff_min_seconds = parse(&lookup, "ERROR_BACKOFF_MIN_SECONDS", defaults.error_backoff_min_seconds)?;
        let error_backoff_max_seconds = parse(&lookup, "ERROR_BACKOFF_MAX_SECONDS", defaults.error_backoff_max_seconds)?;

        if cluster_requeue == 0 || machine_requeue == 0 {
            return Err(ControllerError::InvalidConfig(
                "requeue delays must be at least one second".to_string(),
            ));
        }
        if error_backoff_min_seconds == 0 || error_backoff_min_seconds > error_backoff_max_seconds {
            return Err(ControllerError::InvalidConfig(format!(
                "error backoff bounds must satisfy 0 < min <= max (got {error_backoff_min_seconds}..{error_backoff_max_seconds})"
            )));
        }

        Ok(Self {
            namespace,
            cluster_requeue: Duration::from_secs(cluster_requeue),
            machine_requeue: Duration::from_secs(machine_requeue),
            concurrency,
            debounce: Duration::from_millis(debounce),
            metrics_bind_address,
            error_backoff_min_seconds,
            error_backoff_max_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = ControllerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.machine_requeue, Duration::from_secs(5));
        assert_eq!(config.cluster_requeue, Duration::from_secs(10));
    }

    #[test]
    fn test_overrides() {
        let config = ControllerConfig::from_lookup(lookup(&[
            ("WATCH_NAMESPACE", "capi-system"),
            ("MACHINE_REQUEUE_SECONDS", "7"),
            ("RECONCILE_CONCURRENCY", "8"),
            ("METRICS_BIND_ADDRESS", "127.0.0.1:9090"),
        ]))
        .unwrap();

        assert_eq!(config.namespace.as_deref(), Some("capi-system"));
        assert_eq!(config.machine_requeue, Duration::from_secs(7));
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.metrics_bind_address, "127.0.0.1:9090".parse().unwrap());
    }

    #[test]
    fn test_malformed_value_is_rejected() {
        let err = ControllerConfig::from_lookup(lookup(&[("CLUSTER_REQUEUE_SECONDS", "soon")])).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(msg) if msg.contains("CLUSTER_REQUEUE_SECONDS")));
    }

    #[test]
    fn test_inverted_backoff_bounds_are_rejected() {
        let err = ControllerConfig::from_lookup(lookup(&[
            ("ERROR_BACKOFF_MIN_SECONDS", "60"),
            ("ERROR_BACKOFF_MAX_SECONDS", "30"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
    }

    #[test]
    fn test_empty_namespace_means_all() {
        let config = ControllerConfig::from_lookup(lookup(&[("WATCH_NAMESPACE", "")])).unwrap();
        assert_eq!(config.namespace, None);
    }
}
