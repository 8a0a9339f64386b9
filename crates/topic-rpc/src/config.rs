use std::time::Duration;

use crate::names::NamingConvention;

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub naming: NamingConvention,
    pub request_timeout: Duration,
    pub log_filter: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            naming: NamingConvention::ROS,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            log_filter: "info,topic_rpc=debug".into(),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let avoid_ros_namespace_conventions = lookup("TOPIC_RPC_AVOID_ROS_NAMESPACE_CONVENTIONS")
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes" | "on"))
            .unwrap_or(false);
        let request_timeout = lookup("TOPIC_RPC_REQUEST_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.request_timeout);
        let log_filter = lookup("RUST_LOG").unwrap_or(defaults.log_filter);
        Self {
            naming: NamingConvention {
                avoid_ros_namespace_conventions,
            },
            request_timeout,
            log_filter,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> ServiceConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test_timeout::timeout]
    fn defaults_apply_convention() {
        let config = config_from(&[]);
        assert_eq!(config, ServiceConfig::default());
        assert!(config.naming.applies_prefixes());
    }

    #[test_timeout::timeout]
    fn env_overrides_are_parsed() {
        let config = config_from(&[
            ("TOPIC_RPC_AVOID_ROS_NAMESPACE_CONVENTIONS", "on"),
            ("TOPIC_RPC_REQUEST_TIMEOUT_MS", "250"),
            ("RUST_LOG", "warn"),
        ]);
        assert_eq!(config.naming, NamingConvention::SUPPRESSED);
        assert_eq!(config.request_timeout, Duration::from_millis(250));
        assert_eq!(config.log_filter, "warn");
    }

    #[test_timeout::timeout]
    fn garbage_falls_back_to_defaults() {
        let config = config_from(&[
            ("TOPIC_RPC_AVOID_ROS_NAMESPACE_CONVENTIONS", "maybe"),
            ("TOPIC_RPC_REQUEST_TIMEOUT_MS", "soon"),
        ]);
        assert_eq!(config.naming, NamingConvention::ROS);
        assert_eq!(
            config.request_timeout,
            Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS)
        );
    }
}
