//! Data structures describing recorded scenario runs.

use std::time::Duration;

use crate::failure::FailureKind;
use crate::step::Phase;

const UNNAMED: &str = "<unnamed>";

/// Name and tags attached to a scenario.
///
/// # Examples
/// ```
/// use scenic::ScenarioMetadata;
///
/// let metadata = ScenarioMetadata::new("duplicate event names are rejected").with_tag("events");
/// assert_eq!(metadata.name(), "duplicate event names are rejected");
/// assert_eq!(metadata.tags(), ["events"]);
/// assert_eq!(ScenarioMetadata::default().name(), "<unnamed>");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScenarioMetadata {
    name: String,
    tags: Vec<String>,
}

impl ScenarioMetadata {
    /// Metadata for a named scenario without tags.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
        }
    }

    /// Replace the name, keeping tags.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add a tag, ignoring duplicates.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }

    /// Scenario name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tags in declaration order.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl Default for ScenarioMetadata {
    fn default() -> Self {
        Self::new(UNNAMED)
    }
}

/// Result of one executed step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step completed.
    Passed,
    /// The step stopped the scenario.
    Failed(FailureKind),
}

impl StepOutcome {
    /// Lowercase label used in logs and reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed(kind) => kind.label(),
        }
    }
}

/// Observation captured for each step that ran.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepRecord {
    /// Phase the step ran in.
    pub phase: Phase,
    /// Zero-based position within the phase.
    pub index: usize,
    /// Step description.
    pub description: String,
    /// Compact rendering of the step configuration.
    pub config: String,
    /// Wall-clock time spent in `execute`.
    pub elapsed: Duration,
    /// Whether the step passed.
    pub outcome: StepOutcome,
}

/// Details of the step that failed a scenario.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedScenario {
    /// Failure category.
    pub kind: FailureKind,
    /// Phase of the failing step.
    pub phase: Phase,
    /// Zero-based position within the phase.
    pub index: usize,
    /// Description of the failing step.
    pub step: String,
    /// Rendered failure message.
    pub message: String,
}

/// Final status of a scenario run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScenarioStatus {
    /// Every step completed.
    Passed,
    /// A step failed; later steps did not run.
    Failed(FailedScenario),
    /// The shared session was already poisoned, so no step ran.
    Aborted {
        /// Reason the session was poisoned.
        reason: String,
    },
}

impl ScenarioStatus {
    /// Lowercase label for the status.
    ///
    /// # Examples
    /// ```
    /// use scenic::reporting::ScenarioStatus;
    ///
    /// assert_eq!(ScenarioStatus::Passed.label(), "passed");
    /// ```
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed(_) => "failed",
            Self::Aborted { .. } => "aborted",
        }
    }
}

/// Outcome recorded for a single scenario execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScenarioRecord {
    metadata: ScenarioMetadata,
    isolation_key: String,
    steps: Vec<StepRecord>,
    status: ScenarioStatus,
    elapsed: Duration,
}

impl ScenarioRecord {
    /// Construct a record without step details.
    ///
    /// # Examples
    /// ```
    /// use scenic::ScenarioMetadata;
    /// use scenic::reporting::{ScenarioRecord, ScenarioStatus};
    ///
    /// let record = ScenarioRecord::new(
    ///     ScenarioMetadata::new("create event"),
    ///     "tenant-a",
    ///     ScenarioStatus::Passed,
    /// );
    /// assert_eq!(record.name(), "create event");
    /// assert_eq!(record.isolation_key(), "tenant-a");
    /// ```
    #[must_use]
    pub fn new(
        metadata: ScenarioMetadata,
        isolation_key: impl Into<String>,
        status: ScenarioStatus,
    ) -> Self {
        Self {
            metadata,
            isolation_key: isolation_key.into(),
            steps: Vec::new(),
            status,
            elapsed: Duration::ZERO,
        }
    }

    /// Attach the per-step observations.
    #[must_use]
    pub fn with_steps(mut self, steps: Vec<StepRecord>) -> Self {
        self.steps = steps;
        self
    }

    /// Attach the total elapsed time.
    #[must_use]
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    /// Scenario name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.metadata.name()
    }

    /// Scenario tags.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        self.metadata.tags()
    }

    /// Isolation key the scenario ran under.
    #[must_use]
    pub fn isolation_key(&self) -> &str {
        &self.isolation_key
    }

    /// Steps that ran, in execution order.
    #[must_use]
    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    /// Final status.
    #[must_use]
    pub fn status(&self) -> &ScenarioStatus {
        &self.status
    }

    /// Total elapsed time.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
