//! Logging switches and subscriber setup for batch-guard.
//!
//! Every component logs through `tracing`. A run over a large collection
//! touches many batches, so per-rule and per-query detail is gated behind
//! [`LogConfig`] rather than emitted unconditionally.

/// Per-run logging switches.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log every rule group evaluated inside a batch
    pub log_rule_details: bool,
    /// Log every store query issued, with a preview of its candidates
    pub log_queries: bool,
    /// Candidate previews longer than this are cut
    pub max_field_length: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_rule_details: false,
            log_queries: true,
            max_field_length: 256,
        }
    }
}

impl LogConfig {
    /// Everything on, long previews.
    pub fn verbose() -> Self {
        Self {
            log_rule_details: true,
            log_queries: true,
            max_field_length: 1024,
        }
    }

    /// Nothing per-batch.
    pub fn quiet() -> Self {
        Self {
            log_rule_details: false,
            log_queries: false,
            max_field_length: 128,
        }
    }
}

/// Logs rule evaluation details when enabled in the given [`LogConfig`].
#[macro_export]
macro_rules! log_rule {
    ($config:expr, $($arg:tt)*) => {
        if $config.log_rule_details {
            tracing::debug!($($arg)*);
        }
    };
}

/// Logs store queries when enabled in the given [`LogConfig`].
#[macro_export]
macro_rules! log_query {
    ($config:expr, $($arg:tt)*) => {
        if $config.log_queries {
            tracing::debug!($($arg)*);
        }
    };
}

/// Cuts `value` to at most `max_length` bytes on a char boundary.
pub fn truncate_field(value: &str, max_length: usize) -> String {
    if value.len() <= max_length {
        return value.to_string();
    }
    let mut cut = max_length;
    while !value.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...(truncated)", &value[..cut])
}

/// Subscriber setup for applications embedding batch-guard.
pub mod setup {
    use tracing::Level;
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    /// How [`init_logging`] builds the global subscriber.
    #[derive(Debug, Clone)]
    pub struct LoggingConfig {
        /// Level for everything outside batch-guard
        pub level: Level,
        /// Level for `batch_guard` targets
        pub crate_level: Level,
        /// Emit JSON lines instead of the human-readable format
        pub json_format: bool,
        /// Full filter directive, replacing the two levels
        pub env_filter: Option<String>,
    }

    impl Default for LoggingConfig {
        fn default() -> Self {
            Self {
                level: Level::INFO,
                crate_level: Level::DEBUG,
                json_format: false,
                env_filter: None,
            }
        }
    }

    impl LoggingConfig {
        /// JSON output, warnings from dependencies, info from batch-guard.
        pub fn json() -> Self {
            Self {
                level: Level::WARN,
                crate_level: Level::INFO,
                json_format: true,
                env_filter: None,
            }
        }

        pub fn with_crate_level(mut self, level: Level) -> Self {
            self.crate_level = level;
            self
        }

        pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
            self.env_filter = Some(filter.into());
            self
        }

        /// The filter directive this configuration stands for.
        pub fn directive(&self) -> String {
            match &self.env_filter {
                Some(filter) => filter.clone(),
                None => format!(
                    "{},batch_guard={}",
                    self.level.as_str().to_lowercase(),
                    self.crate_level.as_str().to_lowercase()
                ),
            }
        }
    }

    /// Installs a global `tracing` subscriber. `RUST_LOG` wins over the
    /// configured directive. Fails if a subscriber is already installed.
    ///
    /// ```rust,no_run
    /// use batch_guard::logging::setup::{init_logging, LoggingConfig};
    ///
    /// init_logging(LoggingConfig::json()).unwrap();
    /// ```
    pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.directive()));

        let output = if config.json_format {
            tracing_subscriber::fmt::layer().json().boxed()
        } else {
            tracing_subscriber::fmt::layer().boxed()
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(output)
            .try_init()?;
        Ok(())
    }
}
