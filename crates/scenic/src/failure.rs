//! Step failure taxonomy.
//!
//! Failures are split so that reports never confuse a broken fixture with a
//! regression in business behaviour: assertion failures, authoring errors
//! (missing context values or unregistered dependencies), infrastructure
//! errors, and fixture corruption that must abort the remaining session.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Result type returned by [`Step::execute`](crate::Step::execute).
pub type StepResult = Result<(), StepFailure>;

/// Shared, clonable error source attached to infrastructure failures.
pub type FailureSource = Arc<dyn StdError + Send + Sync + 'static>;

/// Reason a step stopped the scenario.
#[derive(Debug, Clone, Error)]
pub enum StepFailure {
    /// An expected business outcome did not hold.
    #[error("assertion failed: {message}{}", render_comparison(.expected.as_deref(), .observed.as_deref()))]
    Assertion {
        /// What was being checked.
        message: String,
        /// Expected value, when the check compared values.
        expected: Option<String>,
        /// Observed value, when the check compared values.
        observed: Option<String>,
    },
    /// A step read a context key that was never written, or was written with
    /// another type.
    #[error("missing context value '{key}' of type {expected_type}")]
    MissingContextValue {
        /// Key that was requested.
        key: String,
        /// Type the reader asked for.
        expected_type: &'static str,
    },
    /// A step resolved a dependency the live application never registered.
    #[error("dependency not registered: {type_name}")]
    DependencyNotRegistered {
        /// Type name of the requested dependency.
        type_name: &'static str,
    },
    /// The application or database could not be reached for reasons unrelated
    /// to the behaviour under test.
    #[error("infrastructure error: {message}")]
    Infrastructure {
        /// Description of the failed interaction.
        message: String,
        /// Underlying error, when available.
        #[source]
        source: Option<FailureSource>,
    },
    /// Shared fixture state is no longer trustworthy; the session must stop.
    #[error("fixture corrupted: {message}")]
    FixtureCorrupted {
        /// Description of the corruption.
        message: String,
    },
}

impl StepFailure {
    /// Build an assertion failure without a value comparison.
    #[must_use]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion {
            message: message.into(),
            expected: None,
            observed: None,
        }
    }

    /// Build an assertion failure that records expected and observed values.
    ///
    /// # Examples
    ///
    /// ```
    /// use scenic::StepFailure;
    ///
    /// let failure = StepFailure::mismatch("status code", 201, 409);
    /// assert_eq!(
    ///     failure.to_string(),
    ///     "assertion failed: status code (expected: 201, observed: 409)"
    /// );
    /// ```
    #[must_use]
    pub fn mismatch(
        message: impl Into<String>,
        expected: impl fmt::Display,
        observed: impl fmt::Display,
    ) -> Self {
        Self::Assertion {
            message: message.into(),
            expected: Some(expected.to_string()),
            observed: Some(observed.to_string()),
        }
    }

    /// Build an infrastructure error without a source.
    #[must_use]
    pub fn infrastructure(message: impl Into<String>) -> Self {
        Self::Infrastructure {
            message: message.into(),
            source: None,
        }
    }

    /// Build an infrastructure error wrapping `source`.
    #[must_use]
    pub fn infrastructure_with(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Infrastructure {
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Build a fixture corruption failure.
    #[must_use]
    pub fn fixture_corrupted(message: impl Into<String>) -> Self {
        Self::FixtureCorrupted {
            message: message.into(),
        }
    }

    /// Classify the failure for reporting.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Assertion { .. } => FailureKind::AssertionFailed,
            Self::MissingContextValue { .. } | Self::DependencyNotRegistered { .. } => {
                FailureKind::AuthoringError
            }
            Self::Infrastructure { .. } => FailureKind::InfrastructureError,
            Self::FixtureCorrupted { .. } => FailureKind::FixtureCorrupted,
        }
    }
}

fn render_comparison(expected: Option<&str>, observed: Option<&str>) -> String {
    match (expected, observed) {
        (Some(expected), Some(observed)) => {
            format!(" (expected: {expected}, observed: {observed})")
        }
        (Some(expected), None) => format!(" (expected: {expected})"),
        (None, Some(observed)) => format!(" (observed: {observed})"),
        (None, None) => String::new(),
    }
}

/// Reporting category of a [`StepFailure`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Business behaviour regressed.
    AssertionFailed,
    /// The scenario asked for data or a collaborator nobody provided.
    AuthoringError,
    /// The fixture or one of its dependencies misbehaved.
    InfrastructureError,
    /// Shared fixture state was damaged; the session is aborted.
    FixtureCorrupted,
}

impl FailureKind {
    /// Lowercase label used in logs and reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::AssertionFailed => "assertion_failed",
            Self::AuthoringError => "authoring_error",
            Self::InfrastructureError => "infrastructure_error",
            Self::FixtureCorrupted => "fixture_corrupted",
        }
    }

    /// Whether the failure reflects the behaviour under test rather than the
    /// test machinery.
    #[must_use]
    pub const fn is_behavioural(self) -> bool {
        matches!(self, Self::AssertionFailed)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use rstest::rstest;

    use super::{FailureKind, StepFailure};

    #[rstest]
    #[case::assertion(StepFailure::assertion("event exists"), FailureKind::AssertionFailed)]
    #[case::missing_value(
        StepFailure::MissingContextValue { key: "last_response".into(), expected_type: "u32" },
        FailureKind::AuthoringError
    )]
    #[case::missing_dependency(
        StepFailure::DependencyNotRegistered { type_name: "Clock" },
        FailureKind::AuthoringError
    )]
    #[case::infrastructure(StepFailure::infrastructure("connection reset"), FailureKind::InfrastructureError)]
    #[case::corrupted(StepFailure::fixture_corrupted("schema dropped"), FailureKind::FixtureCorrupted)]
    fn failures_are_classified(#[case] failure: StepFailure, #[case] expected: FailureKind) {
        assert_eq!(failure.kind(), expected);
    }

    #[test]
    fn only_assertions_are_behavioural() {
        assert!(FailureKind::AssertionFailed.is_behavioural());
        assert!(!FailureKind::InfrastructureError.is_behavioural());
        assert!(!FailureKind::AuthoringError.is_behavioural());
    }

    #[test]
    fn assertion_without_values_renders_message_only() {
        let failure = StepFailure::assertion("event should exist");
        assert_eq!(failure.to_string(), "assertion failed: event should exist");
    }

    #[test]
    fn infrastructure_error_exposes_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let failure = StepFailure::infrastructure_with("POST /events", io);
        assert_eq!(failure.to_string(), "infrastructure error: POST /events");
        let source = failure.source().map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("reset by peer"));
    }
}
