//! Service fixture: a live application wired to a disposable database.
//!
//! Start-up runs in a fixed order and every step is bounded:
//!
//! 1. provision the database and wait until it accepts connections;
//! 2. build the application against the connection descriptor and the
//!    configured substitutions;
//! 3. bind an ephemeral loopback port and serve on a dedicated runtime;
//! 4. wait until the readiness path answers.
//!
//! Whatever was acquired before a failing step is released in reverse order
//! before the error is returned.

use std::net::{Ipv4Addr, TcpListener as StdTcpListener};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use scenic::{ContextBuilder, DependencyRegistry, DependencyScope, ScenarioContext};
use tokio::net::TcpListener;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn};

use crate::application::{ApplicationSetup, ApplicationUnderTest, ShutdownSignal};
use crate::client::ServiceClient;
use crate::config::FixtureConfig;
use crate::database::{ConnectionDescriptor, DatabaseEngine, DatabaseFixture, engine_for_image};
use crate::error::{BoxError, FixtureError};
use crate::probe::wait_until_ready;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const RUNTIME_THREADS: usize = 2;

/// A running application and its database.
///
/// Steps reach the application through [`client`](Self::client) and
/// registered collaborators through [`scope`](Self::scope). The fixture is
/// `Send + Sync` and is meant to be shared by every scenario in a test
/// binary.
///
/// Dropping or [stopping](Self::stop) the fixture signals the application to
/// shut down, waits for it, stops the runtime and destroys the database. Do
/// not drop it from inside an async runtime.
pub struct ServiceFixture {
    client: ServiceClient,
    scope: DependencyScope,
    descriptor: ConnectionDescriptor,
    resources: Mutex<Option<Resources>>,
}

impl ServiceFixture {
    /// Start `A` against the database engine selected by `config`.
    ///
    /// # Errors
    ///
    /// Returns the first start-up failure. Nothing started is left running.
    pub fn start<A: ApplicationUnderTest>(config: &FixtureConfig) -> Result<Self, FixtureError> {
        let engine = engine_for_image(config.database())?;
        Self::start_with_engine::<A>(config, engine.as_ref())
    }

    /// Start `A` against an explicit database engine.
    ///
    /// # Errors
    ///
    /// Returns the first start-up failure. Nothing started is left running.
    pub fn start_with_engine<A: ApplicationUnderTest>(
        config: &FixtureConfig,
        engine: &dyn DatabaseEngine,
    ) -> Result<Self, FixtureError> {
        let span = info_span!("service_fixture", image = %engine.image());
        let _entered = span.enter();
        let readiness = config.readiness();

        let database = DatabaseFixture::start(engine, &readiness)?;
        let Some(descriptor) = database.descriptor().cloned() else {
            return Err(FixtureError::DatabaseProvisioning {
                image: engine.image().to_string(),
                message: "database stopped before the application started".to_owned(),
            });
        };
        let mut resources = Resources {
            database: Some(database),
            runtime: None,
            shutdown: None,
            server: None,
        };

        let runtime = Builder::new_multi_thread()
            .worker_threads(RUNTIME_THREADS)
            .thread_name("scenic-app")
            .enable_all()
            .build()
            .map_err(FixtureError::Runtime)?;
        let handle = runtime.handle().clone();
        resources.runtime = Some(runtime);

        let mut registry = DependencyRegistry::new();
        config.substitutions().install_into(&mut registry);
        let application = {
            let _runtime = handle.enter();
            let mut setup = ApplicationSetup::new(&descriptor, config.substitutions(), &mut registry);
            A::build(&mut setup).map_err(FixtureError::ApplicationBuild)?
        };

        let listener = bind_loopback()?;
        let address = listener.local_addr().map_err(FixtureError::Listener)?;
        let listener = {
            let _runtime = handle.enter();
            TcpListener::from_std(listener).map_err(FixtureError::Listener)?
        };
        let (shutdown, signal) = ShutdownSignal::channel();
        resources.shutdown = Some(shutdown);
        resources.server = Some(handle.spawn(application.serve(listener, signal)));
        info!(%address, "application listening");

        let client = ServiceClient::new(format!("http://{address}"))?;
        let readiness_path = config.readiness_path();
        wait_until_ready(&readiness, "application", || {
            if resources.server.as_ref().is_some_and(JoinHandle::is_finished) {
                return Err("application task exited before becoming ready".to_owned());
            }
            client.probe(readiness_path)
        })?;

        registry.register(client.clone());
        registry.register(descriptor.clone());
        let scope = registry.freeze();
        info!(base_url = client.base_url(), "service fixture ready");
        Ok(Self {
            client,
            scope,
            descriptor,
            resources: Mutex::new(Some(resources)),
        })
    }

    /// Client bound to the application.
    #[must_use]
    pub fn client(&self) -> &ServiceClient {
        &self.client
    }

    /// Collaborators registered by the fixture and the application.
    ///
    /// Always holds the [`ServiceClient`], the [`ConnectionDescriptor`] and
    /// every substitution.
    #[must_use]
    pub fn scope(&self) -> &DependencyScope {
        &self.scope
    }

    /// Base URL of the application.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.client.base_url()
    }

    /// Database connection details.
    #[must_use]
    pub fn database(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    /// Fresh scenario context with a generated isolation key.
    #[must_use]
    pub fn context(&self) -> ScenarioContext<'_> {
        ScenarioContext::new(&self.scope)
    }

    /// Builder for a scenario context bound to this fixture.
    #[must_use]
    pub fn context_builder(&self) -> ContextBuilder<'_> {
        ScenarioContext::builder(&self.scope)
    }

    /// Return `true` until the fixture has been stopped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock_resources().is_some()
    }

    /// Shut the application down and destroy the database.
    ///
    /// Later calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::Teardown`] when the database could not be
    /// destroyed.
    pub fn stop(&self) -> Result<(), FixtureError> {
        let resources = self.lock_resources().take();
        resources.map_or(Ok(()), |mut resources| resources.release())
    }

    fn lock_resources(&self) -> MutexGuard<'_, Option<Resources>> {
        match self.resources.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for ServiceFixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceFixture")
            .field("base_url", &self.base_url())
            .field("database", &self.descriptor)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

fn bind_loopback() -> Result<StdTcpListener, FixtureError> {
    let listener = StdTcpListener::bind((Ipv4Addr::LOCALHOST, 0)).map_err(FixtureError::Listener)?;
    listener
        .set_nonblocking(true)
        .map_err(FixtureError::Listener)?;
    Ok(listener)
}

/// Everything the fixture must release, in acquisition order.
struct Resources {
    database: Option<DatabaseFixture>,
    runtime: Option<Runtime>,
    shutdown: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<Result<(), BoxError>>>,
}

impl Resources {
    /// Release in reverse acquisition order.
    fn release(&mut self) -> Result<(), FixtureError> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(runtime) = self.runtime.take() {
            if let Some(server) = self.server.take() {
                match runtime.block_on(async { tokio::time::timeout(SHUTDOWN_GRACE, server).await }) {
                    Ok(Ok(Ok(()))) => info!("application stopped"),
                    Ok(Ok(Err(error))) => warn!(%error, "application exited with an error"),
                    Ok(Err(error)) => warn!(%error, "application task failed"),
                    Err(_) => warn!(grace = ?SHUTDOWN_GRACE, "application did not stop in time"),
                }
            }
            runtime.shutdown_timeout(SHUTDOWN_GRACE);
        }
        self.database.take().map_or(Ok(()), DatabaseFixture::stop)
    }
}

impl Drop for Resources {
    fn drop(&mut self) {
        if let Err(error) = self.release() {
            warn!(%error, "service fixture teardown failed");
        }
    }
}
