//! Boundary substitutions.
//!
//! A substitution replaces a collaborator that crosses the application's
//! boundary (an outbound HTTP endpoint, the wall clock) with a value the test
//! controls. Substitutions are keyed by type: the application asks for a `T`
//! while wiring itself, and steps resolve the same `T` from the scope to drive
//! the double.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;

use scenic::DependencyRegistry;

type Installer = Arc<dyn Fn(&mut DependencyRegistry) + Send + Sync>;

#[derive(Clone)]
struct Substitution {
    type_id: TypeId,
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
    install: Installer,
}

/// Set of test doubles, one per type.
///
/// # Examples
///
/// ```
/// use scenic_fixture::Substitutions;
///
/// let mut substitutions = Substitutions::new();
/// substitutions.insert(String::from("http://127.0.0.1:9/notify"));
/// assert_eq!(
///     substitutions.get::<String>().as_deref(),
///     Some("http://127.0.0.1:9/notify")
/// );
/// assert!(substitutions.get::<u32>().is_none());
/// ```
#[derive(Clone, Default)]
pub struct Substitutions {
    entries: Vec<Substitution>,
}

impl Substitutions {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `value`, replacing an earlier substitution of the same type.
    pub fn insert<T: Any + Clone + Send + Sync>(&mut self, value: T) -> &mut Self {
        let registered = value.clone();
        let entry = Substitution {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            value: Arc::new(value),
            install: Arc::new(move |registry: &mut DependencyRegistry| {
                registry.register(registered.clone());
            }),
        };
        if let Some(position) = self
            .entries
            .iter()
            .position(|existing| existing.type_id == entry.type_id)
        {
            self.entries.remove(position);
        }
        self.entries.push(entry);
        self
    }

    /// Builder form of [`insert`](Self::insert).
    #[must_use]
    pub fn with<T: Any + Clone + Send + Sync>(mut self, value: T) -> Self {
        self.insert(value);
        self
    }

    /// Clone of the substitution registered for `T`.
    #[must_use]
    pub fn get<T: Any + Clone + Send + Sync>(&self) -> Option<T> {
        self.entries
            .iter()
            .find(|entry| entry.type_id == TypeId::of::<T>())
            .and_then(|entry| entry.value.downcast_ref::<T>())
            .cloned()
    }

    /// Return `true` when `T` is substituted.
    #[must_use]
    pub fn contains<T: Any>(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.type_id == TypeId::of::<T>())
    }

    /// Number of substitutions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return `true` when nothing is substituted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Type names, most recently replaced last.
    #[must_use]
    pub fn type_names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|entry| entry.type_name).collect()
    }

    /// Register every substitution so steps can resolve it.
    pub fn install_into(&self, registry: &mut DependencyRegistry) {
        for entry in &self.entries {
            (entry.install)(registry);
        }
    }
}

impl fmt::Debug for Substitutions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Substitutions")
            .field(&self.type_names())
            .finish()
    }
}
