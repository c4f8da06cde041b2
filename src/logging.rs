//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::ChronoUtc;

use crate::config::Environment;

/// Directives used when `RUST_LOG` is not set.
pub fn default_directives(environment: Environment) -> &'static str {
    match environment {
        Environment::Dev => "visitor_gateway=debug,tower_http=debug,info",
        Environment::Prod => "visitor_gateway=info,tower_http=info,warn",
    }
}

/// Install the global subscriber.
///
/// `dev` logs human-readable lines with source locations; `prod` logs JSON.
pub fn init_tracing(environment: Environment) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(environment)))?;

    let result = match environment {
        Environment::Dev => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(ChronoUtc::rfc_3339())
            .with_file(true)
            .with_line_number(true)
            .try_init(),
        Environment::Prod => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_timer(ChronoUtc::rfc_3339())
            .with_current_span(true)
            .with_file(true)
            .with_line_number(true)
            .try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))
}
