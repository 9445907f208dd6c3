//! Step roles and the phase model.
//!
//! A step is an immutable value object: its fields hold the configuration
//! chosen when the scenario was declared, and every side effect happens inside
//! [`Step::execute`]. The four role traits are markers that decide which
//! scenario slot a step type may occupy. A type that only implements
//! [`AssertStep`] cannot be handed to [`Scenario::act`](crate::Scenario::act);
//! the compiler rejects it:
//!
//! ```compile_fail
//! use std::borrow::Cow;
//! use scenic::{AssertStep, DependencyScope, Scenario, ScenarioContext, Step, StepResult};
//!
//! #[derive(Debug)]
//! struct EventExists;
//!
//! impl Step for EventExists {
//!     fn description(&self) -> Cow<'_, str> {
//!         "event exists".into()
//!     }
//!
//!     fn execute(&self, _ctx: &mut ScenarioContext<'_>) -> StepResult {
//!         Ok(())
//!     }
//! }
//!
//! impl AssertStep for EventExists {}
//!
//! let scope = DependencyScope::empty();
//! let mut ctx = ScenarioContext::new(&scope);
//! let _ = Scenario::new(&mut ctx).act(EventExists);
//! ```

use std::borrow::Cow;
use std::fmt;

use crate::context::ScenarioContext;
use crate::failure::StepResult;

/// Execution phase of a scenario.
///
/// Phases always run in declaration order of this enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Shared setup attached to the context.
    Background,
    /// Scenario-specific arrangement.
    Arrange,
    /// The action against the service boundary.
    Act,
    /// Verification of the observable outcome.
    Assert,
}

impl Phase {
    /// Every phase in execution order.
    pub const ALL: [Self; 4] = [Self::Background, Self::Arrange, Self::Act, Self::Assert];

    /// Lowercase label used in logs and reports.
    ///
    /// # Examples
    ///
    /// ```
    /// use scenic::Phase;
    ///
    /// assert_eq!(Phase::Arrange.label(), "arrange");
    /// ```
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Background => "background",
            Self::Arrange => "arrange",
            Self::Act => "act",
            Self::Assert => "assert",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Behaviour shared by every step role.
///
/// The `Debug` representation doubles as the compact configuration emitted in
/// step log lines, so derive it on the configuration struct.
///
/// # Examples
///
/// ```
/// use std::borrow::Cow;
/// use scenic::{ArrangeStep, ScenarioContext, Step, StepResult};
///
/// #[derive(Debug)]
/// struct RememberName {
///     name: String,
/// }
///
/// impl RememberName {
///     fn named(name: &str) -> Self {
///         Self { name: name.to_owned() }
///     }
/// }
///
/// impl Step for RememberName {
///     fn description(&self) -> Cow<'_, str> {
///         Cow::Owned(format!("remember the name {}", self.name))
///     }
///
///     fn execute(&self, ctx: &mut ScenarioContext<'_>) -> StepResult {
///         ctx.set("name", self.name.clone());
///         Ok(())
///     }
/// }
///
/// impl ArrangeStep for RememberName {}
///
/// let step = RememberName::named("Alice");
/// assert_eq!(step.description(), "remember the name Alice");
/// ```
pub trait Step: fmt::Debug + Send + Sync {
    /// Human-readable identity logged before the step runs.
    fn description(&self) -> Cow<'_, str>;

    /// Perform the step against the scenario context.
    ///
    /// # Errors
    ///
    /// Returns a [`StepFailure`](crate::StepFailure) describing either an
    /// assertion that did not hold or an infrastructure problem.
    fn execute(&self, ctx: &mut ScenarioContext<'_>) -> StepResult;
}

/// Marker for steps attached to a context as shared background.
pub trait BackgroundStep: Step {}

/// Marker for scenario-specific arrangement steps.
pub trait ArrangeStep: Step {}

/// Marker for the action performed against the service boundary.
pub trait ActStep: Step {}

/// Marker for verification steps.
pub trait AssertStep: Step {}
