//! Dependency resolution scope exposed by a live service instance.
//!
//! A [`DependencyRegistry`] is filled while the service fixture wires the
//! application and then frozen into an immutable [`DependencyScope`]. The
//! frozen scope is shared by reference with every scenario context, so
//! concurrent resolution never touches shared mutable state. The only mutable
//! cell is the poison marker, which is written at most once.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::failure::StepFailure;

struct Registration {
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

/// Mutable collection of dependencies gathered during fixture start-up.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use scenic::DependencyRegistry;
///
/// let mut registry = DependencyRegistry::new();
/// registry.register(Arc::new(String::from("postgres://localhost/app")));
/// let scope = registry.freeze();
///
/// let url: Arc<String> = scope.resolve().unwrap();
/// assert_eq!(url.as_str(), "postgres://localhost/app");
/// ```
#[derive(Default)]
pub struct DependencyRegistry {
    entries: HashMap<TypeId, Registration>,
}

impl DependencyRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` under its concrete type, replacing any earlier value
    /// of the same type.
    pub fn register<T: Any + Send + Sync>(&mut self, value: T) -> &mut Self {
        self.entries.insert(
            TypeId::of::<T>(),
            Registration {
                type_name: type_name::<T>(),
                value: Arc::new(value),
            },
        );
        self
    }

    /// Return `true` when a value of type `T` has been registered.
    #[must_use]
    pub fn contains<T: Any>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Number of registered dependencies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return `true` when nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Freeze the registry into a shareable scope.
    #[must_use]
    pub fn freeze(self) -> DependencyScope {
        DependencyScope {
            entries: self.entries,
            poisoned: OnceLock::new(),
        }
    }
}

impl fmt::Debug for DependencyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyRegistry")
            .field("types", &sorted_type_names(&self.entries))
            .finish()
    }
}

/// Immutable dependency graph of one running service instance.
pub struct DependencyScope {
    entries: HashMap<TypeId, Registration>,
    poisoned: OnceLock<String>,
}

impl DependencyScope {
    /// Scope with no registered dependencies.
    ///
    /// Useful for scenarios that only exercise context plumbing.
    #[must_use]
    pub fn empty() -> Self {
        DependencyRegistry::new().freeze()
    }

    /// Resolve a clone of the dependency registered under type `T`.
    ///
    /// Register shared collaborators as `Arc<…>` so resolution clones the
    /// handle rather than the collaborator.
    ///
    /// # Errors
    ///
    /// Returns [`StepFailure::DependencyNotRegistered`] when no value of type
    /// `T` was registered.
    pub fn resolve<T: Any + Clone + Send + Sync>(&self) -> Result<T, StepFailure> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|registration| registration.value.downcast_ref::<T>())
            .cloned()
            .ok_or(StepFailure::DependencyNotRegistered {
                type_name: type_name::<T>(),
            })
    }

    /// Return `true` when a value of type `T` is resolvable.
    #[must_use]
    pub fn is_registered<T: Any>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Type names of every registered dependency, sorted.
    #[must_use]
    pub fn registered_types(&self) -> Vec<&'static str> {
        sorted_type_names(&self.entries)
    }

    /// Mark the shared fixture as unusable.
    ///
    /// Only the first reason is kept; later calls are ignored.
    pub fn poison(&self, reason: impl Into<String>) {
        let _ = self.poisoned.set(reason.into());
    }

    /// Reason the scope was poisoned, if any.
    #[must_use]
    pub fn poisoned(&self) -> Option<&str> {
        self.poisoned.get().map(String::as_str)
    }
}

impl fmt::Debug for DependencyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyScope")
            .field("types", &sorted_type_names(&self.entries))
            .field("poisoned", &self.poisoned.get())
            .finish()
    }
}

fn sorted_type_names(entries: &HashMap<TypeId, Registration>) -> Vec<&'static str> {
    let mut names: Vec<_> = entries.values().map(|entry| entry.type_name).collect();
    names.sort_unstable();
    names
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::{DependencyRegistry, DependencyScope};
    use crate::failure::StepFailure;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_owned()
        }
    }

    #[test]
    fn resolves_trait_object_handles() {
        let mut registry = DependencyRegistry::new();
        registry.register::<Arc<dyn Greeter>>(Arc::new(English));
        let scope = registry.freeze();

        let Ok(greeter) = scope.resolve::<Arc<dyn Greeter>>() else {
            panic!("greeter should resolve");
        };
        assert_eq!(greeter.greet(), "hello");
    }

    #[test]
    fn missing_dependency_is_reported_by_type() {
        let scope = DependencyScope::empty();
        let Err(failure) = scope.resolve::<Arc<u32>>() else {
            panic!("resolution should fail");
        };
        assert!(matches!(
            failure,
            StepFailure::DependencyNotRegistered { type_name } if type_name.contains("u32")
        ));
    }

    #[test]
    fn later_registration_replaces_earlier_value() {
        let mut registry = DependencyRegistry::new();
        registry.register(1_u8).register(2_u8);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.freeze().resolve::<u8>().ok(), Some(2));
    }

    #[test]
    fn poison_keeps_first_reason() {
        let scope = DependencyScope::empty();
        assert_eq!(scope.poisoned(), None);
        scope.poison("database dropped");
        scope.poison("second reason");
        assert_eq!(scope.poisoned(), Some("database dropped"));
    }

    #[test]
    fn concurrent_resolution_shares_one_scope() {
        let mut registry = DependencyRegistry::new();
        registry.register(Arc::new(String::from("shared")));
        let scope = registry.freeze();

        thread::scope(|threads| {
            for _ in 0..8 {
                threads.spawn(|| {
                    let value = scope.resolve::<Arc<String>>().ok();
                    assert_eq!(value.as_deref().map(String::as_str), Some("shared"));
                });
            }
        });
    }
}
