//! Broker configuration options

/// Configuration for the broker and the sessions it starts
///
/// # Examples
///
/// ```
/// use esox_workbroker::BrokerConfiguration;
///
/// let config = BrokerConfiguration::new()
///     .with_listen_addr("0.0.0.0:4000")
///     .with_default_pool("jobs")
///     .with_claim_limit(25);
///
/// assert_eq!(config.default_pool, "jobs");
/// assert_eq!(config.claim_limit, 25);
/// ```
#[derive(Debug, Clone)]
pub struct BrokerConfiguration {
    /// Address the TCP listener binds to
    pub listen_addr: String,

    /// Pool joined when a connection does not name one
    pub default_pool: String,

    /// Claim budget of a session that does not request one
    pub claim_limit: usize,

    /// Upper bound on the claim budget a connection may request
    pub max_claim_limit: usize,

    /// Capacity of a session's inbound command channel
    pub command_buffer: usize,

    /// Capacity of a session's outbound event channel
    pub event_buffer: usize,
}

impl Default for BrokerConfiguration {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".to_string(),
            default_pool: "test".to_string(),
            claim_limit: 10,
            max_claim_limit: 1024,
            command_buffer: 64,
            event_buffer: 64,
        }
    }
}

impl BrokerConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the listen address
    pub fn with_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = addr.into();
        self
    }

    /// Set the default pool name
    pub fn with_default_pool(mut self, name: impl Into<String>) -> Self {
        self.default_pool = name.into();
        self
    }

    /// Set the default per-session claim budget
    ///
    /// The value is clamped to the maximum claim limit.
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_workbroker::BrokerConfiguration;
    ///
    /// let config = BrokerConfiguration::new()
    ///     .with_max_claim_limit(8)
    ///     .with_claim_limit(50);
    ///
    /// assert_eq!(config.claim_limit, 8);
    /// ```
    pub fn with_claim_limit(mut self, limit: usize) -> Self {
        self.claim_limit = limit.min(self.max_claim_limit);
        self
    }

    /// Set the maximum per-session claim budget
    pub fn with_max_claim_limit(mut self, limit: usize) -> Self {
        self.max_claim_limit = limit;
        self.claim_limit = self.claim_limit.min(limit);
        self
    }

    /// Set channel capacities for commands and events
    pub fn with_buffers(mut self, commands: usize, events: usize) -> Self {
        self.command_buffer = commands.max(1);
        self.event_buffer = events.max(1);
        self
    }

    /// Resolve the claim budget for a requested limit
    pub fn effective_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.claim_limit)
            .min(self.max_claim_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BrokerConfiguration::default();
        assert_eq!(config.listen_addr, "127.0.0.1:3000");
        assert_eq!(config.default_pool, "test");
        assert_eq!(config.claim_limit, 10);
    }

    #[test]
    fn test_effective_limit_is_clamped() {
        let config = BrokerConfiguration::new().with_max_claim_limit(100);
        assert_eq!(config.effective_limit(None), 10);
        assert_eq!(config.effective_limit(Some(0)), 0);
        assert_eq!(config.effective_limit(Some(500)), 100);
    }

    #[test]
    fn test_buffers_never_zero() {
        let config = BrokerConfiguration::new().with_buffers(0, 0);
        assert_eq!(config.command_buffer, 1);
        assert_eq!(config.event_buffer, 1);
    }
}
