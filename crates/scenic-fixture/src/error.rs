//! Error types for fixture start-up and teardown.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Boxed error returned by application hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while starting, probing or stopping fixtures.
///
/// Any start-up error is fatal to the test session.
#[derive(Debug, Error)]
pub enum FixtureError {
    /// The database engine could not be provisioned.
    #[error("failed to provision database {image}: {message}")]
    DatabaseProvisioning {
        /// Image reference that was requested.
        image: String,
        /// Failure detail.
        message: String,
    },

    /// A component did not become reachable within the bounded timeout.
    #[error("{component} not ready after {timeout:?} ({attempts} attempts): {last_error}")]
    ReadinessTimeout {
        /// Component being probed.
        component: String,
        /// Configured timeout.
        timeout: Duration,
        /// Number of probes made.
        attempts: u32,
        /// Error reported by the final probe.
        last_error: String,
    },

    /// The application under test failed to build.
    #[error("failed to build application: {0}")]
    ApplicationBuild(#[source] BoxError),

    /// The runtime hosting the application could not be created.
    #[error("failed to start application runtime: {0}")]
    Runtime(#[source] io::Error),

    /// The application listener could not be bound.
    #[error("failed to bind application listener: {0}")]
    Listener(#[source] io::Error),

    /// The HTTP client could not be constructed.
    #[error("failed to build service client: {0}")]
    Client(#[from] reqwest::Error),

    /// A resource could not be released.
    #[error("failed to tear down {component}: {message}")]
    Teardown {
        /// Component being torn down.
        component: String,
        /// Failure detail.
        message: String,
    },

    /// Fixture configuration was rejected.
    #[error("invalid fixture configuration: {0}")]
    InvalidConfig(String),

    /// A shared session failed earlier, was poisoned or was shut down.
    #[error("service session unavailable: {reason}")]
    SessionUnavailable {
        /// Why the session cannot be used.
        reason: String,
    },
}
