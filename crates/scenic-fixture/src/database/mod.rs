//! Database fixture.
//!
//! A [`DatabaseEngine`] provisions one disposable instance of a real database
//! engine. [`DatabaseFixture`] drives the lifecycle: provision, wait for the
//! instance to answer within the bounded timeout, hand out the
//! [`ConnectionDescriptor`], and destroy the instance on stop, on drop, or
//! when the readiness probe gives up.

mod container;
mod descriptor;
mod sqlite;

use tracing::{info, warn};

pub use container::{ContainerEngine, parse_published_port};
pub use descriptor::ConnectionDescriptor;
pub use sqlite::SqliteEngine;

use crate::config::{DatabaseImage, ReadinessPolicy};
use crate::error::FixtureError;
use crate::probe::wait_until_ready;

/// Provisions disposable database instances.
pub trait DatabaseEngine: Send + Sync {
    /// Image this engine provisions.
    fn image(&self) -> &DatabaseImage;

    /// Start a new instance.
    ///
    /// The instance may not accept connections yet; the fixture probes it.
    /// Implementations release anything they acquired before returning an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::DatabaseProvisioning`] when the instance cannot
    /// be started.
    fn provision(&self) -> Result<Box<dyn DatabaseInstance>, FixtureError>;
}

/// A running, disposable database instance.
pub trait DatabaseInstance: Send + Sync {
    /// Connection details for the application.
    fn descriptor(&self) -> &ConnectionDescriptor;

    /// Check that the instance accepts connections.
    ///
    /// # Errors
    ///
    /// Returns a description of why the instance is not reachable yet.
    fn probe(&mut self) -> Result<(), String>;

    /// Destroy the instance. Calling it more than once is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::Teardown`] when the instance could not be
    /// removed.
    fn teardown(&mut self) -> Result<(), FixtureError>;
}

/// Pick the engine matching `image`.
///
/// `sqlite` maps to [`SqliteEngine`]; `postgres` to
/// [`ContainerEngine::postgres`].
///
/// # Errors
///
/// Returns [`FixtureError::InvalidConfig`] for unsupported images.
pub fn engine_for_image(image: &DatabaseImage) -> Result<Box<dyn DatabaseEngine>, FixtureError> {
    match image.engine_name() {
        "sqlite" => Ok(Box::new(SqliteEngine::new())),
        "postgres" => Ok(Box::new(ContainerEngine::postgres(image.clone()))),
        other => Err(FixtureError::InvalidConfig(format!(
            "unsupported database engine '{other}', expected sqlite or postgres"
        ))),
    }
}

/// Owns one database instance for the lifetime of a test session.
pub struct DatabaseFixture {
    image: DatabaseImage,
    instance: Option<Box<dyn DatabaseInstance>>,
}

impl DatabaseFixture {
    /// Provision an instance and wait until it accepts connections.
    ///
    /// # Errors
    ///
    /// Returns the provisioning error, or [`FixtureError::ReadinessTimeout`]
    /// after tearing the unready instance down.
    pub fn start(
        engine: &dyn DatabaseEngine,
        readiness: &ReadinessPolicy,
    ) -> Result<Self, FixtureError> {
        let image = engine.image().clone();
        info!(%image, "provisioning database");
        let mut instance = engine.provision()?;
        if let Err(error) = wait_until_ready(readiness, "database", || instance.probe()) {
            warn!(%image, %error, "database never became ready; tearing it down");
            if let Err(teardown) = instance.teardown() {
                warn!(%image, error = %teardown, "database teardown failed");
            }
            return Err(error);
        }
        info!(%image, descriptor = %instance.descriptor(), "database ready");
        Ok(Self {
            image,
            instance: Some(instance),
        })
    }

    /// Image the instance was provisioned from.
    #[must_use]
    pub fn image(&self) -> &DatabaseImage {
        &self.image
    }

    /// Connection details, or `None` once stopped.
    #[must_use]
    pub fn descriptor(&self) -> Option<&ConnectionDescriptor> {
        self.instance.as_deref().map(|instance| instance.descriptor())
    }

    /// Destroy the instance now.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::Teardown`] when the instance could not be
    /// removed.
    pub fn stop(mut self) -> Result<(), FixtureError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), FixtureError> {
        let Some(mut instance) = self.instance.take() else {
            return Ok(());
        };
        info!(image = %self.image, "tearing down database");
        instance.teardown()
    }
}

impl std::fmt::Debug for DatabaseFixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseFixture")
            .field("image", &self.image)
            .field("descriptor", &self.descriptor())
            .finish()
    }
}

impl Drop for DatabaseFixture {
    fn drop(&mut self) {
        if let Err(error) = self.release() {
            warn!(image = %self.image, %error, "database teardown failed");
        }
    }
}
