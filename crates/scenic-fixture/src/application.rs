//! Seam between the service fixture and the application under test.
//!
//! The fixture owns the runtime, the listener and the database. The
//! application only wires itself from an [`ApplicationSetup`] and serves
//! requests until the [`ShutdownSignal`] fires.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;

use scenic::DependencyRegistry;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::database::ConnectionDescriptor;
use crate::error::BoxError;
use crate::substitution::Substitutions;

/// Future returned by [`ApplicationUnderTest::serve`].
pub type ServeFuture = Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send>>;

/// An HTTP service the fixture can start against a disposable database.
///
/// `build` runs inside the fixture's runtime context, so it may spawn tasks
/// or create runtime-bound resources.
pub trait ApplicationUnderTest: Sized + Send + 'static {
    /// Wire the application against `setup`.
    ///
    /// Substituted collaborators should be taken from
    /// [`ApplicationSetup::substitution`] in preference to production ones.
    /// Anything steps need to reach directly can be registered with
    /// [`ApplicationSetup::register`].
    ///
    /// # Errors
    ///
    /// Any error aborts fixture start-up.
    fn build(setup: &mut ApplicationSetup<'_>) -> Result<Self, BoxError>;

    /// Serve requests on `listener` until `shutdown` resolves.
    fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> ServeFuture;
}

/// Inputs available while the application wires itself.
pub struct ApplicationSetup<'a> {
    descriptor: &'a ConnectionDescriptor,
    substitutions: &'a Substitutions,
    registry: &'a mut DependencyRegistry,
}

impl<'a> ApplicationSetup<'a> {
    pub(crate) fn new(
        descriptor: &'a ConnectionDescriptor,
        substitutions: &'a Substitutions,
        registry: &'a mut DependencyRegistry,
    ) -> Self {
        Self {
            descriptor,
            substitutions,
            registry,
        }
    }

    /// Database the application must connect to.
    #[must_use]
    pub fn descriptor(&self) -> &ConnectionDescriptor {
        self.descriptor
    }

    /// Test double substituted for `T`, if any.
    #[must_use]
    pub fn substitution<T: Any + Clone + Send + Sync>(&self) -> Option<T> {
        self.substitutions.get::<T>()
    }

    /// Expose `value` to steps through the dependency scope.
    pub fn register<T: Any + Send + Sync>(&mut self, value: T) -> &mut Self {
        self.registry.register(value);
        self
    }
}

impl std::fmt::Debug for ApplicationSetup<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationSetup")
            .field("descriptor", self.descriptor)
            .field("substitutions", self.substitutions)
            .finish_non_exhaustive()
    }
}

/// Resolves when the fixture wants the application to stop.
#[derive(Debug)]
pub struct ShutdownSignal(oneshot::Receiver<()>);

impl ShutdownSignal {
    pub(crate) fn channel() -> (oneshot::Sender<()>, Self) {
        let (sender, receiver) = oneshot::channel();
        (sender, Self(receiver))
    }

    /// Wait for shutdown. Also resolves if the fixture is dropped.
    pub async fn wait(self) {
        let _ = self.0.await;
    }
}
