//! Tracing subscriber setup
//!
//! Human-readable output in development and test, JSON lines in
//! production. `RUST_LOG` overrides the default filter.

use cuidar_domain::Environment;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::api::HTTP_LOG_TARGET;

/// Filter used when `RUST_LOG` is unset.
///
/// Outside production the client's own crates and the redacted HTTP lines
/// log at `debug`.
pub fn default_filter(environment: Environment) -> String {
    match environment {
        Environment::Production => "info".to_string(),
        Environment::Development | Environment::Test => format!(
            "info,cuidar_infra=debug,cuidar_common=debug,{HTTP_LOG_TARGET}=debug"
        ),
    }
}

/// Install the global subscriber.
///
/// Returns `false` if a subscriber was already installed, in which case
/// nothing changes.
pub fn init_tracing(environment: Environment) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(environment)));

    let installed = match environment {
        Environment::Production => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(false))
            .try_init(),
        Environment::Development | Environment::Test => {
            tracing_subscriber::registry().with(filter).with(fmt::layer()).try_init()
        }
    };

    match installed {
        Ok(()) => {
            tracing::debug!(?environment, "tracing initialised");
            true
        }
        Err(_) => false,
    }
}
