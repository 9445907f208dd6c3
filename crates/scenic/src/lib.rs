//! Scenario execution engine for black-box service tests.
//!
//! Tests are composed from typed steps in four roles (background, arrange,
//! act, assert) and executed against a [`ScenarioContext`] that bridges the
//! steps to a live application's [`DependencyScope`]. Execution is fail-fast:
//! the first failing step stops the run and is reported with its phase, its
//! description and a [`FailureKind`] that keeps infrastructure problems apart
//! from behavioural regressions.
//!
//! ```
//! use std::borrow::Cow;
//! use scenic::{
//!     ArrangeStep, AssertStep, DependencyScope, Scenario, ScenarioContext, Step, StepFailure,
//!     StepResult,
//! };
//!
//! #[derive(Debug)]
//! struct SeedName(&'static str);
//!
//! impl Step for SeedName {
//!     fn description(&self) -> Cow<'_, str> {
//!         Cow::Owned(format!("seed name {}", self.0))
//!     }
//!
//!     fn execute(&self, ctx: &mut ScenarioContext<'_>) -> StepResult {
//!         ctx.set("name", self.0.to_owned());
//!         Ok(())
//!     }
//! }
//!
//! impl ArrangeStep for SeedName {}
//!
//! #[derive(Debug)]
//! struct NameIs(&'static str);
//!
//! impl Step for NameIs {
//!     fn description(&self) -> Cow<'_, str> {
//!         Cow::Owned(format!("name is {}", self.0))
//!     }
//!
//!     fn execute(&self, ctx: &mut ScenarioContext<'_>) -> StepResult {
//!         let name = ctx.get::<String>("name")?;
//!         if name == self.0 {
//!             Ok(())
//!         } else {
//!             Err(StepFailure::mismatch("name", self.0, name))
//!         }
//!     }
//! }
//!
//! impl AssertStep for NameIs {}
//!
//! let scope = DependencyScope::empty();
//! let mut ctx = ScenarioContext::new(&scope);
//! let report = Scenario::new(&mut ctx)
//!     .named("names round-trip through the context")
//!     .arrange(SeedName("Alice"))
//!     .assert(NameIs("Alice"))
//!     .execute();
//! assert!(report.passed());
//! ```

pub mod config;
mod context;
mod failure;
mod isolation;
pub mod logging;
pub mod reporting;
mod scenario;
mod scope;
mod step;

pub use context::{ContextBuilder, ContextKey, ScenarioContext};
pub use failure::{FailureKind, FailureSource, StepFailure, StepResult};
pub use isolation::IsolationKey;
pub use reporting::ScenarioMetadata;
pub use scenario::{FailedStep, Scenario, ScenarioError, ScenarioOutcome, ScenarioReport};
pub use scope::{DependencyRegistry, DependencyScope};
pub use step::{ActStep, ArrangeStep, AssertStep, BackgroundStep, Phase, Step};
