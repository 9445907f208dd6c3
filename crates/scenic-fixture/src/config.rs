//! Fixture configuration.
//!
//! The configuration surface is deliberately small: which boundary
//! collaborators to substitute, which database image to provision, and how
//! long start-up may take. Values can be read from `SCENIC_`-prefixed
//! environment variables.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::FixtureError;
use crate::substitution::Substitutions;

/// Environment variable selecting the database image.
pub const DB_IMAGE_VAR: &str = "SCENIC_DB_IMAGE";
/// Environment variable bounding start-up time, in milliseconds.
pub const STARTUP_TIMEOUT_VAR: &str = "SCENIC_STARTUP_TIMEOUT_MS";

const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_READINESS_PATH: &str = "/health";
const DEFAULT_IMAGE: &str = "sqlite";

/// Database image reference in `name[:tag]` form.
///
/// # Examples
///
/// ```
/// use scenic_fixture::DatabaseImage;
///
/// let image: DatabaseImage = "postgres:16-alpine".parse().unwrap();
/// assert_eq!(image.name(), "postgres");
/// assert_eq!(image.tag(), Some("16-alpine"));
/// assert_eq!(image.to_string(), "postgres:16-alpine");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseImage {
    name: String,
    tag: Option<String>,
}

impl DatabaseImage {
    /// Image with an optional tag.
    #[must_use]
    pub fn new(name: impl Into<String>, tag: Option<&str>) -> Self {
        Self {
            name: name.into(),
            tag: tag.map(str::to_owned),
        }
    }

    /// Image name, including any registry prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Image tag, if one was given.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Last path segment of the name, used to pick an engine.
    #[must_use]
    pub fn engine_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

impl Default for DatabaseImage {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE, None)
    }
}

impl FromStr for DatabaseImage {
    type Err = FixtureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || FixtureError::InvalidConfig(format!("invalid database image '{s}'"));
        if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
            return Err(invalid());
        }
        // A colon before the last slash belongs to a registry host and port.
        let tag_split = trimmed
            .rfind(':')
            .filter(|colon| trimmed.rfind('/').is_none_or(|slash| *colon > slash));
        let Some(colon) = tag_split else {
            return Ok(Self::new(trimmed, None));
        };
        let (name, tag) = trimmed.split_at(colon);
        let tag = tag.trim_start_matches(':');
        if name.is_empty() || tag.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(name, Some(tag)))
    }
}

impl fmt::Display for DatabaseImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        Ok(())
    }
}

/// Bounded retry policy used while waiting for a component to become ready.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Total time allowed.
    pub timeout: Duration,
    /// Pause between probes.
    pub interval: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_STARTUP_TIMEOUT,
            interval: DEFAULT_PROBE_INTERVAL,
        }
    }
}

/// Options accepted by the service fixture.
#[derive(Clone, Debug)]
pub struct FixtureConfig {
    database: DatabaseImage,
    readiness: ReadinessPolicy,
    readiness_path: String,
    substitutions: Substitutions,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            database: DatabaseImage::default(),
            readiness: ReadinessPolicy::default(),
            readiness_path: DEFAULT_READINESS_PATH.to_owned(),
            substitutions: Substitutions::new(),
        }
    }
}

impl FixtureConfig {
    /// Configuration with defaults: SQLite, 30 second start-up bound, `/health`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::InvalidConfig`] when a variable holds an
    /// invalid value.
    pub fn from_env() -> Result<Self, FixtureError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through a variable lookup function.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::InvalidConfig`] when a variable holds an
    /// invalid value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, FixtureError> {
        let mut config = Self::default();
        if let Some(image) = lookup(DB_IMAGE_VAR) {
            config.database = image.parse()?;
        }
        if let Some(raw) = lookup(STARTUP_TIMEOUT_VAR) {
            let millis: u64 = raw.trim().parse().map_err(|_| {
                FixtureError::InvalidConfig(format!(
                    "invalid {STARTUP_TIMEOUT_VAR} value '{raw}', expected milliseconds"
                ))
            })?;
            if millis == 0 {
                return Err(FixtureError::InvalidConfig(format!(
                    "{STARTUP_TIMEOUT_VAR} must be greater than zero"
                )));
            }
            config.readiness.timeout = Duration::from_millis(millis);
        }
        Ok(config)
    }

    /// Select the database image.
    #[must_use]
    pub fn with_database(mut self, image: DatabaseImage) -> Self {
        self.database = image;
        self
    }

    /// Bound the time allowed for each component to become ready.
    #[must_use]
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.readiness.timeout = timeout;
        self
    }

    /// Pause between readiness probes.
    #[must_use]
    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.readiness.interval = interval;
        self
    }

    /// Path probed on the application before the fixture is handed out.
    #[must_use]
    pub fn with_readiness_path(mut self, path: impl Into<String>) -> Self {
        self.readiness_path = path.into();
        self
    }

    /// Substitute a boundary collaborator with a test double.
    #[must_use]
    pub fn substitute<T: std::any::Any + Clone + Send + Sync>(mut self, value: T) -> Self {
        self.substitutions.insert(value);
        self
    }

    /// Replace every substitution at once.
    #[must_use]
    pub fn with_substitutions(mut self, substitutions: Substitutions) -> Self {
        self.substitutions = substitutions;
        self
    }

    /// Database image to provision.
    #[must_use]
    pub fn database(&self) -> &DatabaseImage {
        &self.database
    }

    /// Readiness policy shared by the database and the application.
    #[must_use]
    pub fn readiness(&self) -> ReadinessPolicy {
        self.readiness
    }

    /// Path probed on the application.
    #[must_use]
    pub fn readiness_path(&self) -> &str {
        &self.readiness_path
    }

    /// Registered substitutions.
    #[must_use]
    pub fn substitutions(&self) -> &Substitutions {
        &self.substitutions
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("sqlite", "sqlite", None)]
    #[case("postgres:16", "postgres", Some("16"))]
    #[case("docker.io/library/postgres:16-alpine", "docker.io/library/postgres", Some("16-alpine"))]
    #[case("registry.local:5000/postgres", "registry.local:5000/postgres", None)]
    fn parses_image_references(
        #[case] raw: &str,
        #[case] name: &str,
        #[case] tag: Option<&str>,
    ) {
        let Ok(image) = raw.parse::<DatabaseImage>() else {
            panic!("'{raw}' should parse");
        };
        assert_eq!(image.name(), name);
        assert_eq!(image.tag(), tag);
        assert_eq!(image.to_string(), raw);
    }

    #[rstest]
    #[case("")]
    #[case("postgres:")]
    #[case(":16")]
    #[case("post gres")]
    fn rejects_malformed_images(#[case] raw: &str) {
        assert!(matches!(
            raw.parse::<DatabaseImage>(),
            Err(FixtureError::InvalidConfig(_))
        ));
    }

    #[test]
    fn engine_name_drops_registry_path() {
        let image = DatabaseImage::new("docker.io/library/postgres", Some("16"));
        assert_eq!(image.engine_name(), "postgres");
    }

    #[test]
    fn reads_environment_lookup() {
        let vars: HashMap<&str, &str> =
            HashMap::from([(DB_IMAGE_VAR, "postgres:16"), (STARTUP_TIMEOUT_VAR, "2500")]);
        let Ok(config) = FixtureConfig::from_lookup(|name| vars.get(name).map(|v| (*v).to_owned()))
        else {
            panic!("configuration should parse");
        };
        assert_eq!(config.database().tag(), Some("16"));
        assert_eq!(config.readiness().timeout, Duration::from_millis(2500));
        assert_eq!(config.readiness_path(), "/health");
    }

    #[rstest]
    #[case("soon")]
    #[case("0")]
    fn rejects_invalid_timeouts(#[case] raw: &str) {
        let result = FixtureConfig::from_lookup(|name| {
            (name == STARTUP_TIMEOUT_VAR).then(|| raw.to_owned())
        });
        assert!(matches!(result, Err(FixtureError::InvalidConfig(_))));
    }

    #[test]
    fn substitutions_accumulate() {
        let config = FixtureConfig::new().substitute(7_u8).substitute(String::from("stub"));
        assert_eq!(config.substitutions().len(), 2);
        assert_eq!(config.substitutions().get::<u8>(), Some(7));
    }
}
