//! Per-scenario mutable state.
//!
//! A [`ScenarioContext`] borrows the live service's [`DependencyScope`] for
//! the duration of one test, relays values between steps through an ordered
//! key/value store, and owns the background steps shared by every scenario
//! built on it. Values must be `'static` so they can be boxed. A later write
//! to the same key replaces the earlier value in place; reading an absent key
//! or asking for the wrong type fails instead of producing a default.
//!
//! Teardown hooks registered with [`ScenarioContext::on_teardown`] run in
//! reverse order when the context is dropped, including while unwinding from
//! a panic, so resources acquired by steps are released even when a run is
//! cancelled.

use std::any::{Any, type_name};
use std::fmt;
use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::{Span, info_span, warn};

use crate::failure::StepFailure;
use crate::isolation::IsolationKey;
use crate::scope::DependencyScope;
use crate::step::BackgroundStep;

type TeardownHook<'scope> = Box<dyn FnOnce() + Send + 'scope>;

struct ContextEntry {
    key: String,
    type_name: &'static str,
    value: Box<dyn Any + Send>,
}

/// Compile-time typed key for the context store.
///
/// # Examples
///
/// ```
/// use scenic::{ContextKey, DependencyScope, ScenarioContext};
///
/// const LAST_EVENT_ID: ContextKey<i64> = ContextKey::new("last_event_id");
///
/// let scope = DependencyScope::empty();
/// let mut ctx = ScenarioContext::new(&scope);
/// ctx.put(LAST_EVENT_ID, 7);
/// assert_eq!(ctx.fetch(LAST_EVENT_ID).ok(), Some(&7));
/// ```
pub struct ContextKey<T> {
    name: &'static str,
    marker: PhantomData<fn() -> T>,
}

impl<T> ContextKey<T> {
    /// Declare a key with the given name.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            marker: PhantomData,
        }
    }

    /// Name under which the value is stored.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for ContextKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ContextKey<T> {}

impl<T> fmt::Debug for ContextKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContextKey").field(&self.name).finish()
    }
}

/// Builder used to declare background steps before the context exists.
///
/// Background steps accumulate in call order; once [`build`](Self::build)
/// returns, the background of that context can no longer change.
pub struct ContextBuilder<'scope> {
    scope: &'scope DependencyScope,
    isolation_key: Option<IsolationKey>,
    background: Vec<Arc<dyn BackgroundStep>>,
}

impl<'scope> ContextBuilder<'scope> {
    /// Append a background step.
    #[must_use]
    pub fn background(mut self, step: impl BackgroundStep + 'static) -> Self {
        self.background.push(Arc::new(step));
        self
    }

    /// Append a background step shared with other contexts.
    #[must_use]
    pub fn background_shared(mut self, step: Arc<dyn BackgroundStep>) -> Self {
        self.background.push(step);
        self
    }

    /// Use a caller-chosen isolation key instead of a generated one.
    #[must_use]
    pub fn isolation_key(mut self, key: impl Into<IsolationKey>) -> Self {
        self.isolation_key = Some(key.into());
        self
    }

    /// Finish construction.
    #[must_use]
    pub fn build(self) -> ScenarioContext<'scope> {
        let isolation_key = self.isolation_key.unwrap_or_else(IsolationKey::generate);
        let span = info_span!("scenario_context", isolation_key = %isolation_key);
        ScenarioContext {
            scope: self.scope,
            isolation_key,
            background: self.background,
            values: Vec::new(),
            teardown: Vec::new(),
            span,
        }
    }
}

/// Mutable state shared by the steps of one scenario run.
///
/// # Examples
///
/// ```
/// use scenic::{DependencyScope, ScenarioContext, StepFailure};
///
/// let scope = DependencyScope::empty();
/// let mut ctx = ScenarioContext::new(&scope);
/// ctx.set("status", 201_u16);
/// assert_eq!(ctx.get::<u16>("status").ok(), Some(&201));
///
/// let missing = ctx.get::<u16>("body");
/// assert!(matches!(missing, Err(StepFailure::MissingContextValue { .. })));
/// ```
pub struct ScenarioContext<'scope> {
    scope: &'scope DependencyScope,
    isolation_key: IsolationKey,
    background: Vec<Arc<dyn BackgroundStep>>,
    values: Vec<ContextEntry>,
    teardown: Vec<TeardownHook<'scope>>,
    span: Span,
}

impl<'scope> ScenarioContext<'scope> {
    /// Start building a context bound to `scope`.
    #[must_use]
    pub fn builder(scope: &'scope DependencyScope) -> ContextBuilder<'scope> {
        ContextBuilder {
            scope,
            isolation_key: None,
            background: Vec::new(),
        }
    }

    /// Context with no background steps and a generated isolation key.
    #[must_use]
    pub fn new(scope: &'scope DependencyScope) -> Self {
        Self::builder(scope).build()
    }

    /// Resolve a dependency from the live application.
    ///
    /// # Errors
    ///
    /// Returns [`StepFailure::DependencyNotRegistered`] when the application
    /// did not register a value of type `T`.
    pub fn resolve<T: Any + Clone + Send + Sync>(&self) -> Result<T, StepFailure> {
        self.scope.resolve()
    }

    /// Store `value` under `key`, replacing any earlier value.
    pub fn set<T: Any + Send>(&mut self, key: impl Into<String>, value: T) {
        let key = key.into();
        let entry = ContextEntry {
            type_name: type_name::<T>(),
            value: Box::new(value),
            key,
        };
        for existing in &mut self.values {
            if existing.key == entry.key {
                *existing = entry;
                return;
            }
        }
        self.values.push(entry);
    }

    /// Borrow the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StepFailure::MissingContextValue`] when the key was never
    /// set or holds a value of another type.
    pub fn get<T: Any>(&self, key: &str) -> Result<&T, StepFailure> {
        self.values
            .iter()
            .find(|entry| entry.key == key)
            .and_then(|entry| entry.value.downcast_ref::<T>())
            .ok_or_else(|| missing::<T>(key))
    }

    /// Mutably borrow the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StepFailure::MissingContextValue`] under the same conditions
    /// as [`get`](Self::get).
    pub fn get_mut<T: Any>(&mut self, key: &str) -> Result<&mut T, StepFailure> {
        self.values
            .iter_mut()
            .find(|entry| entry.key == key)
            .and_then(|entry| entry.value.downcast_mut::<T>())
            .ok_or_else(|| missing::<T>(key))
    }

    /// Remove and return the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StepFailure::MissingContextValue`] when the key is absent or
    /// holds another type; a value of another type stays in place.
    pub fn take<T: Any>(&mut self, key: &str) -> Result<T, StepFailure> {
        let position = self
            .values
            .iter()
            .position(|entry| entry.key == key && entry.value.is::<T>())
            .ok_or_else(|| missing::<T>(key))?;
        let entry = self.values.remove(position);
        entry
            .value
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| missing::<T>(key))
    }

    /// Store a value under a typed key.
    pub fn put<T: Any + Send>(&mut self, key: ContextKey<T>, value: T) {
        self.set(key.name, value);
    }

    /// Borrow the value stored under a typed key.
    ///
    /// # Errors
    ///
    /// Returns [`StepFailure::MissingContextValue`] when the key is absent.
    pub fn fetch<T: Any>(&self, key: ContextKey<T>) -> Result<&T, StepFailure> {
        self.get(key.name)
    }

    /// Return `true` when `key` holds a value of any type.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.iter().any(|entry| entry.key == key)
    }

    /// Keys in first-write order.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.values.iter().map(|entry| entry.key.as_str())
    }

    /// Isolation key threaded through requests made by this scenario.
    #[must_use]
    pub fn isolation_key(&self) -> &IsolationKey {
        &self.isolation_key
    }

    /// Shared dependency scope this context borrows.
    #[must_use]
    pub fn scope(&self) -> &'scope DependencyScope {
        self.scope
    }

    /// Logging span for this context; steps may enter it for their own events.
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Register a cleanup to run when the context is dropped.
    ///
    /// Hooks run last-registered first.
    pub fn on_teardown(&mut self, hook: impl FnOnce() + Send + 'scope) {
        self.teardown.push(Box::new(hook));
    }

    pub(crate) fn background_steps(&self) -> &[Arc<dyn BackgroundStep>] {
        &self.background
    }
}

impl fmt::Debug for ScenarioContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<_> = self
            .values
            .iter()
            .map(|entry| (entry.key.as_str(), entry.type_name))
            .collect();
        f.debug_struct("ScenarioContext")
            .field("isolation_key", &self.isolation_key)
            .field("background", &self.background)
            .field("values", &values)
            .field("teardown_hooks", &self.teardown.len())
            .finish_non_exhaustive()
    }
}

impl Drop for ScenarioContext<'_> {
    fn drop(&mut self) {
        let _entered = self.span.enter();
        while let Some(hook) = self.teardown.pop() {
            if catch_unwind(AssertUnwindSafe(hook)).is_err() {
                warn!("scenario teardown hook panicked");
            }
        }
    }
}

fn missing<T>(key: &str) -> StepFailure {
    StepFailure::MissingContextValue {
        key: key.to_owned(),
        expected_type: type_name::<T>(),
    }
}

#[cfg(test)]
mod tests;
