//! Scenario declaration and the fail-fast step executor.
//!
//! A [`Scenario`] borrows a [`ScenarioContext`] mutably for the duration of the
//! run, so one context can never be driven by two scenarios at once. Steps
//! run strictly in phase order: the context's background, then arrange, act
//! and assert. The first failure stops the run; later steps in the same phase
//! and all later phases are skipped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};

use crate::context::ScenarioContext;
use crate::failure::{FailureKind, StepFailure};
use crate::isolation::IsolationKey;
use crate::reporting::{
    self, FailedScenario, ScenarioMetadata, ScenarioRecord, ScenarioStatus, StepOutcome,
    StepRecord, millis,
};
use crate::step::{ActStep, ArrangeStep, AssertStep, Phase, Step};

/// A test case assembled from typed steps.
///
/// # Examples
///
/// ```
/// use std::borrow::Cow;
/// use scenic::{
///     ActStep, AssertStep, DependencyScope, Scenario, ScenarioContext, Step, StepFailure,
///     StepResult,
/// };
///
/// #[derive(Debug)]
/// struct Add(u32);
///
/// impl Step for Add {
///     fn description(&self) -> Cow<'_, str> {
///         Cow::Owned(format!("add {}", self.0))
///     }
///
///     fn execute(&self, ctx: &mut ScenarioContext<'_>) -> StepResult {
///         let total = ctx.get::<u32>("total").copied().unwrap_or(0);
///         ctx.set("total", total + self.0);
///         Ok(())
///     }
/// }
///
/// impl ActStep for Add {}
///
/// #[derive(Debug)]
/// struct TotalIs(u32);
///
/// impl Step for TotalIs {
///     fn description(&self) -> Cow<'_, str> {
///         Cow::Owned(format!("total is {}", self.0))
///     }
///
///     fn execute(&self, ctx: &mut ScenarioContext<'_>) -> StepResult {
///         let total = *ctx.get::<u32>("total")?;
///         if total == self.0 {
///             Ok(())
///         } else {
///             Err(StepFailure::mismatch("total", self.0, total))
///         }
///     }
/// }
///
/// impl AssertStep for TotalIs {}
///
/// let scope = DependencyScope::empty();
/// let mut ctx = ScenarioContext::new(&scope);
/// let report = Scenario::new(&mut ctx)
///     .named("adding")
///     .act(Add(2))
///     .assert(TotalIs(2))
///     .run()
///     .unwrap();
/// assert!(report.passed());
/// ```
pub struct Scenario<'ctx, 'scope> {
    context: &'ctx mut ScenarioContext<'scope>,
    metadata: ScenarioMetadata,
    arrange: Vec<Arc<dyn ArrangeStep>>,
    act: Vec<Arc<dyn ActStep>>,
    assert: Vec<Arc<dyn AssertStep>>,
}

impl<'ctx, 'scope> Scenario<'ctx, 'scope> {
    /// Bind a new, unnamed scenario to `context`.
    #[must_use]
    pub fn new(context: &'ctx mut ScenarioContext<'scope>) -> Self {
        Self {
            context,
            metadata: ScenarioMetadata::default(),
            arrange: Vec::new(),
            act: Vec::new(),
            assert: Vec::new(),
        }
    }

    /// Name the scenario for logs and reports.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.metadata = self.metadata.with_name(name);
        self
    }

    /// Attach a tag.
    #[must_use]
    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.metadata = self.metadata.with_tag(tag);
        self
    }

    /// Append an arrangement step.
    #[must_use]
    pub fn arrange(mut self, step: impl ArrangeStep + 'static) -> Self {
        self.arrange.push(Arc::new(step));
        self
    }

    /// Append an arrangement step shared with other scenarios.
    #[must_use]
    pub fn arrange_shared(mut self, step: Arc<dyn ArrangeStep>) -> Self {
        self.arrange.push(step);
        self
    }

    /// Append an action step.
    #[must_use]
    pub fn act(mut self, step: impl ActStep + 'static) -> Self {
        self.act.push(Arc::new(step));
        self
    }

    /// Append an action step shared with other scenarios.
    #[must_use]
    pub fn act_shared(mut self, step: Arc<dyn ActStep>) -> Self {
        self.act.push(step);
        self
    }

    /// Append a verification step.
    #[must_use]
    pub fn assert(mut self, step: impl AssertStep + 'static) -> Self {
        self.assert.push(Arc::new(step));
        self
    }

    /// Append a verification step shared with other scenarios.
    #[must_use]
    pub fn assert_shared(mut self, step: Arc<dyn AssertStep>) -> Self {
        self.assert.push(step);
        self
    }

    /// Metadata attached so far.
    #[must_use]
    pub fn metadata(&self) -> &ScenarioMetadata {
        &self.metadata
    }

    /// Run every phase and return the report, whatever the outcome.
    ///
    /// The report is also recorded in the global collector.
    #[must_use = "inspect the report or call `run` to turn failures into errors"]
    pub fn execute(self) -> ScenarioReport {
        let Self {
            context,
            metadata,
            arrange,
            act,
            assert,
        } = self;
        let span = info_span!(
            parent: context.span(),
            "scenario",
            scenario_name = metadata.name(),
            isolation_key = %context.isolation_key(),
        );
        let _entered = span.enter();
        let started = Instant::now();
        let mut steps = Vec::new();

        let outcome = if let Some(reason) = context.scope().poisoned() {
            warn!(reason, "session poisoned; scenario not started");
            ScenarioOutcome::Aborted {
                reason: reason.to_owned(),
            }
        } else {
            let background = context.background_steps().to_vec();
            let result = run_phase(Phase::Background, &background, context, &mut steps)
                .and_then(|()| run_phase(Phase::Arrange, &arrange, context, &mut steps))
                .and_then(|()| run_phase(Phase::Act, &act, context, &mut steps))
                .and_then(|()| run_phase(Phase::Assert, &assert, context, &mut steps));
            match result {
                Ok(()) => ScenarioOutcome::Passed,
                Err(failed) => {
                    if let StepFailure::FixtureCorrupted { message } = &failed.failure {
                        error!(reason = %message, "fixture corrupted; poisoning session");
                        context.scope().poison(message.clone());
                    }
                    ScenarioOutcome::Failed(failed)
                }
            }
        };

        let report = ScenarioReport {
            metadata,
            isolation_key: context.isolation_key().clone(),
            steps,
            outcome,
            elapsed: started.elapsed(),
        };
        info!(
            outcome = report.outcome.label(),
            steps = report.steps.len(),
            elapsed_ms = millis(report.elapsed),
            "scenario finished"
        );
        reporting::record(ScenarioRecord::from(&report));
        report
    }

    /// Run every phase, converting a failed or aborted run into an error.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError::StepFailed`] carrying the first failure, or
    /// [`ScenarioError::SessionAborted`] when an earlier scenario poisoned the
    /// shared scope.
    pub fn run(self) -> Result<ScenarioReport, ScenarioError> {
        self.execute().into_result()
    }
}

fn run_phase<S: Step + ?Sized>(
    phase: Phase,
    steps: &[Arc<S>],
    context: &mut ScenarioContext<'_>,
    records: &mut Vec<StepRecord>,
) -> Result<(), FailedStep> {
    info!(phase = phase.label(), steps = steps.len(), "entering phase");
    for (index, step) in steps.iter().enumerate() {
        let description = step.description().into_owned();
        let config = format!("{step:?}");
        debug!(phase = phase.label(), index, step = %description, "running step");
        let started = Instant::now();
        let result = step.execute(context);
        let elapsed = started.elapsed();
        let outcome = match &result {
            Ok(()) => StepOutcome::Passed,
            Err(failure) => StepOutcome::Failed(failure.kind()),
        };
        info!(
            phase = phase.label(),
            index,
            step = %description,
            config = %config,
            elapsed_ms = millis(elapsed),
            outcome = outcome.label(),
            "step finished"
        );
        records.push(StepRecord {
            phase,
            index,
            description: description.clone(),
            config,
            elapsed,
            outcome,
        });
        if let Err(failure) = result {
            warn!(
                phase = phase.label(),
                index,
                kind = failure.kind().label(),
                error = %failure,
                "step failed; stopping scenario"
            );
            return Err(FailedStep {
                phase,
                index,
                description,
                failure,
            });
        }
    }
    Ok(())
}

/// The step that stopped a scenario.
#[derive(Clone, Debug)]
pub struct FailedStep {
    /// Phase of the failing step.
    pub phase: Phase,
    /// Zero-based position within the phase.
    pub index: usize,
    /// Step description.
    pub description: String,
    /// Failure raised by the step.
    pub failure: StepFailure,
}

/// Overall result of a scenario run.
#[derive(Clone, Debug)]
pub enum ScenarioOutcome {
    /// Every step in every phase completed.
    Passed,
    /// The first failure encountered.
    Failed(FailedStep),
    /// The shared session was poisoned before the run started.
    Aborted {
        /// Reason recorded when the session was poisoned.
        reason: String,
    },
}

impl ScenarioOutcome {
    /// Lowercase label for logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed(_) => "failed",
            Self::Aborted { .. } => "aborted",
        }
    }
}

/// Everything observed while running one scenario.
#[derive(Clone, Debug)]
pub struct ScenarioReport {
    metadata: ScenarioMetadata,
    isolation_key: IsolationKey,
    steps: Vec<StepRecord>,
    outcome: ScenarioOutcome,
    elapsed: Duration,
}

impl ScenarioReport {
    /// Scenario metadata.
    #[must_use]
    pub fn metadata(&self) -> &ScenarioMetadata {
        &self.metadata
    }

    /// Isolation key of the context the scenario ran on.
    #[must_use]
    pub fn isolation_key(&self) -> &IsolationKey {
        &self.isolation_key
    }

    /// Steps that ran, in execution order.
    #[must_use]
    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    /// Overall outcome.
    #[must_use]
    pub fn outcome(&self) -> &ScenarioOutcome {
        &self.outcome
    }

    /// Total elapsed time.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Return `true` when every step passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        matches!(self.outcome, ScenarioOutcome::Passed)
    }

    /// The failure that stopped the run, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&FailedStep> {
        match &self.outcome {
            ScenarioOutcome::Failed(failed) => Some(failed),
            ScenarioOutcome::Passed | ScenarioOutcome::Aborted { .. } => None,
        }
    }

    /// Convert a failed or aborted report into a [`ScenarioError`].
    ///
    /// # Errors
    ///
    /// Returns the error matching the outcome when the scenario did not pass.
    pub fn into_result(self) -> Result<Self, ScenarioError> {
        match self.outcome {
            ScenarioOutcome::Passed => Ok(self),
            ScenarioOutcome::Failed(failed) => Err(ScenarioError::StepFailed {
                scenario: self.metadata.name().to_owned(),
                phase: failed.phase,
                index: failed.index,
                description: failed.description,
                failure: failed.failure,
            }),
            ScenarioOutcome::Aborted { reason } => Err(ScenarioError::SessionAborted {
                scenario: self.metadata.name().to_owned(),
                reason,
            }),
        }
    }
}

impl From<&ScenarioReport> for ScenarioRecord {
    fn from(report: &ScenarioReport) -> Self {
        let status = match &report.outcome {
            ScenarioOutcome::Passed => ScenarioStatus::Passed,
            ScenarioOutcome::Failed(failed) => ScenarioStatus::Failed(FailedScenario {
                kind: failed.failure.kind(),
                phase: failed.phase,
                index: failed.index,
                step: failed.description.clone(),
                message: failed.failure.to_string(),
            }),
            ScenarioOutcome::Aborted { reason } => ScenarioStatus::Aborted {
                reason: reason.clone(),
            },
        };
        Self::new(
            report.metadata.clone(),
            report.isolation_key.as_str(),
            status,
        )
        .with_steps(report.steps.clone())
        .with_elapsed(report.elapsed)
    }
}

/// Errors surfaced by [`Scenario::run`].
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// A step failed; later steps were skipped.
    #[error("scenario '{scenario}' failed at {phase} step {index} ({description}): {failure}")]
    StepFailed {
        /// Scenario name.
        scenario: String,
        /// Phase of the failing step.
        phase: Phase,
        /// Zero-based position within the phase.
        index: usize,
        /// Step description.
        description: String,
        /// Failure raised by the step.
        #[source]
        failure: StepFailure,
    },
    /// An earlier scenario corrupted shared fixture state.
    #[error("scenario '{scenario}' aborted: {reason}")]
    SessionAborted {
        /// Scenario name.
        scenario: String,
        /// Reason recorded when the session was poisoned.
        reason: String,
    },
}

impl ScenarioError {
    /// Reporting category of the error.
    ///
    /// Aborted sessions are classified as fixture corruption.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::StepFailed { failure, .. } => failure.kind(),
            Self::SessionAborted { .. } => FailureKind::FixtureCorrupted,
        }
    }

    /// The step failure, when a step failed.
    #[must_use]
    pub fn failure(&self) -> Option<&StepFailure> {
        match self {
            Self::StepFailed { failure, .. } => Some(failure),
            Self::SessionAborted { .. } => None,
        }
    }
}
