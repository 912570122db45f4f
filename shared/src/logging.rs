//! Shared logging utilities for consistent tracing across both binaries

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::OnceLock;
use tracing::{error, info};

/// Global component singleton - set once at startup
static COMPONENT_ID: OnceLock<ComponentId> = OnceLock::new();

/// Component identifier attached to every log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ComponentId {
    /// The process supervisor / status monitor binary
    Supervisor,
    /// The RPC gateway binary hosting the cooperative tick
    Gateway,
    /// Library use inside another application (nothing initialized)
    #[default]
    Embedded,
}

impl ComponentId {
    /// Initialize the global component id for the supervisor binary
    pub fn init_supervisor() -> &'static ComponentId {
        COMPONENT_ID.get_or_init(|| ComponentId::Supervisor)
    }

    /// Initialize the global component id for the gateway binary
    pub fn init_gateway() -> &'static ComponentId {
        COMPONENT_ID.get_or_init(|| ComponentId::Gateway)
    }

    /// Get the global component id, `Embedded` when never initialized
    pub fn current() -> &'static ComponentId {
        static EMBEDDED: ComponentId = ComponentId::Embedded;
        COMPONENT_ID.get().unwrap_or(&EMBEDDED)
    }

    fn filter_directives(&self, level: &str) -> String {
        match self {
            ComponentId::Supervisor => {
                format!("supervisor={level},shared={level},reqwest=warn,hyper=warn")
            }
            ComponentId::Gateway => {
                format!("gateway={level},shared={level},tower_http=warn,axum={level},hyper=warn")
            }
            ComponentId::Embedded => level.to_string(),
        }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentId::Supervisor => write!(f, "supervisor"),
            ComponentId::Gateway => write!(f, "gateway"),
            ComponentId::Embedded => write!(f, "embedded"),
        }
    }
}

/// Initialize the tracing subscriber for the current component.
///
/// `RUST_LOG` takes precedence over `log_level` when it is set.
pub fn init_tracing(log_level: Option<&str>) {
    use tracing_subscriber::{fmt, EnvFilter};

    let base_level = log_level.unwrap_or("info");
    let directives = ComponentId::current().filter_directives(base_level);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));

    // A second init (tests, embedding apps) keeps the first subscriber
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// Get formatted timestamp for consistent logging
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%H:%M:%S%.3f").to_string()
}

/// Macro for component-aware info logging
#[macro_export]
macro_rules! component_info {
    ($component:expr, $($arg:tt)*) => {
        tracing::info!(
            component = %$component,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for component-aware warning logging
#[macro_export]
macro_rules! component_warn {
    ($component:expr, $($arg:tt)*) => {
        tracing::warn!(
            component = %$component,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for component-aware error logging
#[macro_export]
macro_rules! component_error {
    ($component:expr, $($arg:tt)*) => {
        tracing::error!(
            component = %$component,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for component-aware debug logging
#[macro_export]
macro_rules! component_debug {
    ($component:expr, $($arg:tt)*) => {
        tracing::debug!(
            component = %$component,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Contextual logging helper for startup messages
pub fn log_startup(component: &ComponentId, details: &str) {
    info!(
        component = %component,
        timestamp = format_timestamp(),
        "🚀 Starting {}",
        details
    );
}

/// Contextual logging helper for shutdown messages
pub fn log_shutdown(component: &ComponentId, reason: &str) {
    info!(
        component = %component,
        timestamp = format_timestamp(),
        "🛑 Shutting down: {}",
        reason
    );
}

/// Contextual logging helper for error conditions
pub fn log_error(component: &ComponentId, context: &str, error: &dyn std::fmt::Display) {
    error!(
        component = %component,
        timestamp = format_timestamp(),
        error = %error,
        "❌ {} failed: {}",
        context,
        error
    );
}

/// Contextual logging helper for success conditions
pub fn log_success(component: &ComponentId, message: &str) {
    info!(
        component = %component,
        timestamp = format_timestamp(),
        "✅ {}",
        message
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_display() {
        assert_eq!(ComponentId::Supervisor.to_string(), "supervisor");
        assert_eq!(ComponentId::Gateway.to_string(), "gateway");
        assert_eq!(ComponentId::Embedded.to_string(), "embedded");
    }

    #[test]
    fn test_filter_directives_scope_to_component() {
        let directives = ComponentId::Supervisor.filter_directives("debug");
        assert!(directives.starts_with("supervisor=debug"));
        assert!(directives.contains("shared=debug"));

        assert_eq!(ComponentId::Embedded.filter_directives("warn"), "warn");
    }

    #[test]
    fn test_timestamp_format() {
        let ts = format_timestamp();
        // HH:MM:SS.mmm
        assert_eq!(ts.len(), 12);
        assert_eq!(&ts[2..3], ":");
        assert_eq!(&ts[8..9], ".");
    }
}
