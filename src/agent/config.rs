use std::time::Duration;

use crate::core::{Result, RoutingError};
use crate::dial::TlsOptions;

/// Agent configuration.
///
/// Builder-style setters; validated once at bootstrap.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Connections per node pipeline.
    pub pool_size: usize,

    /// Queued-request capacity per pipeline; admission control beyond this
    /// is an immediate Overload.
    pub max_queue_size: usize,

    /// Deadline for one dial: transport connect, negotiation and
    /// authentication together.
    pub connect_timeout: Duration,

    /// Minimum interval between dial attempts to a failing node.
    pub dial_wait_interval: Duration,

    /// Defer each connection's first dial until work is queued for it.
    pub lazy_connect: bool,

    /// Advertise error-map support and fetch the node's error map.
    pub use_error_map: bool,

    /// Advertise mutation-token support.
    pub use_mutation_tokens: bool,

    /// Base TLS trust options. Per-node server names are derived at dial
    /// time.
    pub tls: Option<TlsOptions>,
}

impl AgentConfig {
    pub fn new() -> Self {
        Self {
            pool_size: 1,
            max_queue_size: 2048,
            connect_timeout: Duration::from_secs(7),
            dial_wait_interval: Duration::from_secs(5),
            lazy_connect: false,
            use_error_map: false,
            use_mutation_tokens: false,
            tls: None,
        }
    }

    /// Set the number of connections per node.
    pub fn pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Set the per-pipeline queue capacity.
    pub fn max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Set the dial deadline.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the minimum wait between dials to a failing node.
    pub fn dial_wait_interval(mut self, interval: Duration) -> Self {
        self.dial_wait_interval = interval;
        self
    }

    /// Dial lazily on first queued work instead of at snapshot start.
    pub fn lazy_connect(mut self, lazy: bool) -> Self {
        self.lazy_connect = lazy;
        self
    }

    /// Enable error-map negotiation and fetching.
    pub fn use_error_map(mut self, enabled: bool) -> Self {
        self.use_error_map = enabled;
        self
    }

    /// Enable mutation-token negotiation.
    pub fn use_mutation_tokens(mut self, enabled: bool) -> Self {
        self.use_mutation_tokens = enabled;
        self
    }

    /// Enable TLS with the given base trust options.
    pub fn tls(mut self, options: TlsOptions) -> Self {
        self.tls = Some(options);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(RoutingError::InvalidConfig(
                "pool_size must be greater than zero".to_string(),
            ));
        }
        if self.max_queue_size == 0 {
            return Err(RoutingError::InvalidConfig(
                "max_queue_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::new()
    }
}
