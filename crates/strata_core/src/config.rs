//! Repository configuration.

use std::time::Duration;

/// Configuration of the item-state layer.
#[derive(Debug, Clone)]
pub struct Config {
    /// How long `begin_update` waits for the single update slot.
    pub update_lock_timeout: Duration,

    /// Whether deletes of referenced nodes and dangling references are
    /// rejected.
    pub check_referential_integrity: bool,

    /// Attribute under which a transactional manager keeps its branch in a
    /// transaction context. Workspaces taking part in the same transaction
    /// need distinct attributes.
    pub change_log_attribute: String,

    /// Number of dispatched event bundles kept for polling.
    pub observation_history: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            update_lock_timeout: Duration::from_secs(10),
            check_referential_integrity: true,
            change_log_attribute: "ChangeLog".to_owned(),
            observation_history: 1000,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the update lock timeout.
    #[must_use]
    pub const fn update_lock_timeout(mut self, timeout: Duration) -> Self {
        self.update_lock_timeout = timeout;
        self
    }

    /// Sets whether referential integrity is enforced.
    #[must_use]
    pub const fn check_referential_integrity(mut self, value: bool) -> Self {
        self.check_referential_integrity = value;
        self
    }

    /// Sets the change log attribute name.
    #[must_use]
    pub fn change_log_attribute(mut self, name: impl Into<String>) -> Self {
        self.change_log_attribute = name.into();
        self
    }

    /// Sets the observation history size.
    #[must_use]
    pub const fn observation_history(mut self, size: usize) -> Self {
        self.observation_history = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.check_referential_integrity);
        assert_eq!(config.change_log_attribute, "ChangeLog");
        assert_eq!(config.update_lock_timeout, Duration::from_secs(10));
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .update_lock_timeout(Duration::from_millis(50))
            .check_referential_integrity(false)
            .change_log_attribute("ChangeLog.archive")
            .observation_history(8);

        assert_eq!(config.update_lock_timeout, Duration::from_millis(50));
        assert!(!config.check_referential_integrity);
        assert_eq!(config.change_log_attribute, "ChangeLog.archive");
        assert_eq!(config.observation_history, 8);
    }
}
