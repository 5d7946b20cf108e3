use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Whether a Kubernetes Event is emitted on the policy's first owner reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOnParentMode {
    Yes,
    No,
    IfPresent,
}

impl std::str::FromStr for EventOnParentMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            "ifpresent" => Ok(Self::IfPresent),
            _ => Err(()),
        }
    }
}

/// Reconciler configuration, sourced entirely from the process environment
/// (spec.md §6's external CLI flags: watched namespace, event-on-parent mode,
/// reconcile frequency, decryption concurrency, default operator namespace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyControllerConfig {
    pub watched_namespace: Option<String>,
    pub event_on_parent: EventOnParentMode,
    pub reconcile_frequency_seconds: u64,
    pub decryption_concurrency: usize,
    pub default_operator_namespace: String,
    /// When true, the scheduler runs a single pass and returns instead of
    /// looping forever. Used by integration tests.
    pub test_mode: bool,
}

impl Default for PolicyControllerConfig {
    fn default() -> Self {
        Self {
            watched_namespace: None,
            event_on_parent: EventOnParentMode::IfPresent,
            reconcile_frequency_seconds: 10,
            decryption_concurrency: 5,
            default_operator_namespace: "open-cluster-management-agent-addon".to_string(),
            test_mode: false,
        }
    }
}

impl PolicyControllerConfig {
    /// Load configuration from the process environment, falling back to
    /// defaults for anything unset. There is no cluster-side config source or
    /// hot-reload: a changed env var takes effect on the next process start.
    pub fn load() -> Self {
        info!("Loading policy reconciler configuration from the environment");

        let mut config = Self::default();

        if let Ok(ns) = std::env::var("WATCH_NAMESPACE") {
            if !ns.is_empty() {
                config.watched_namespace = Some(ns);
            }
        }
        if let Ok(mode) = std::env::var("EVENT_ON_PARENT") {
            if let Ok(parsed) = mode.parse() {
                config.event_on_parent = parsed;
            }
        }
        if let Ok(freq) = std::env::var("RECONCILE_FREQUENCY_SECONDS") {
            if let Ok(v) = freq.parse() {
                config.reconcile_frequency_seconds = v;
            }
        }
        if let Ok(concurrency) = std::env::var("DECRYPTION_CONCURRENCY") {
            if let Ok(v) = concurrency.parse() {
                config.decryption_concurrency = v;
            }
        }
        if let Ok(ns) = std::env::var("DEFAULT_OPERATOR_NAMESPACE") {
            if !ns.is_empty() {
                config.default_operator_namespace = ns;
            }
        }
        if std::env::var("POLICY_RECONCILER_TEST_MODE").as_deref() == Ok("true") {
            config.test_mode = true;
        }

        debug!("Loaded configuration: {:?}", config);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PolicyControllerConfig::default();
        assert_eq!(config.reconcile_frequency_seconds, 10);
        assert_eq!(config.event_on_parent, EventOnParentMode::IfPresent);
        assert!(!config.test_mode);
    }

    #[test]
    fn test_event_on_parent_from_str() {
        assert_eq!("ifpresent".parse::<EventOnParentMode>().unwrap(), EventOnParentMode::IfPresent);
        assert!("bogus".parse::<EventOnParentMode>().is_err());
    }

    #[test]
    fn load_picks_up_env_overrides() {
        unsafe {
            std::env::set_var("RECONCILE_FREQUENCY_SECONDS", "42");
            std::env::set_var("POLICY_RECONCILER_TEST_MODE", "true");
        }
        let config = PolicyControllerConfig::load();
        assert_eq!(config.reconcile_frequency_seconds, 42);
        assert!(config.test_mode);
        unsafe {
            std::env::remove_var("RECONCILE_FREQUENCY_SECONDS");
            std::env::remove_var("POLICY_RECONCILER_TEST_MODE");
        }
    }
}
