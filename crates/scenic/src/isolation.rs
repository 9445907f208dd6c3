//! Per-scenario isolation keys.
//!
//! The engine only guarantees that contexts and step graphs are private to a
//! scenario. Business data isolation is enforced by the application under
//! test, which partitions records by the key each step sends along.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

/// Tenant or partition key that keeps one scenario's data apart from others
/// sharing the same service instance.
///
/// # Examples
///
/// ```
/// use scenic::IsolationKey;
///
/// let first = IsolationKey::generate();
/// let second = IsolationKey::generate();
/// assert_ne!(first, second);
///
/// let fixed = IsolationKey::new("tenant-a");
/// assert_eq!(fixed.as_str(), "tenant-a");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IsolationKey(String);

impl IsolationKey {
    /// Use a caller-chosen key.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generate a key unique within this process.
    ///
    /// The process id is part of the key so that separate test binaries
    /// sharing a database do not collide either.
    #[must_use]
    pub fn generate() -> Self {
        let sequence = NEXT_KEY.fetch_add(1, Ordering::Relaxed);
        Self(format!("scn-{:x}-{sequence}", std::process::id()))
    }

    /// Borrow the key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IsolationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IsolationKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for IsolationKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;

    use super::IsolationKey;

    #[test]
    fn generated_keys_are_unique_across_threads() {
        let keys: Vec<IsolationKey> = thread::scope(|threads| {
            let handles: Vec<_> = (0..16)
                .map(|_| threads.spawn(IsolationKey::generate))
                .collect();
            handles
                .into_iter()
                .filter_map(|handle| handle.join().ok())
                .collect()
        });
        let unique: HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), 16);
    }

    #[test]
    fn generated_keys_carry_the_prefix() {
        assert!(IsolationKey::generate().as_str().starts_with("scn-"));
    }
}
