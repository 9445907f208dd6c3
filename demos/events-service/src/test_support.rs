//! Scenario fixture wiring.
//!
//! [`EventsApp`] builds the service against the fixture's database. A
//! substituted [`FakeClock`] replaces the system clock and a substituted
//! [`NotificationEndpoint`] redirects outbound notifications; everything else
//! is the production wiring. The [`EventStore`] and the clock are registered
//! so steps can inspect the database and move time.

use std::sync::Arc;

use scenic_fixture::{
    ApplicationSetup, ApplicationUnderTest, BoxError, FakeClock, ServeFuture, ShutdownSignal,
};
use tokio::net::TcpListener;

use crate::clock::{Clock, SystemClock};
use crate::notify::{NotificationEndpoint, NotificationGateway};
use crate::service::EventsService;
use crate::store::EventStore;

/// The events service as an application under test.
#[derive(Debug)]
pub struct EventsApp {
    service: EventsService,
}

impl ApplicationUnderTest for EventsApp {
    fn build(setup: &mut ApplicationSetup<'_>) -> Result<Self, BoxError> {
        let descriptor = setup.descriptor();
        let Some(path) = descriptor.path() else {
            return Err(format!(
                "events service stores data in SQLite, got a {} database",
                descriptor.scheme()
            )
            .into());
        };
        let store = EventStore::open(&path.to_string_lossy())?;

        let clock: Arc<dyn Clock> = setup
            .substitution::<FakeClock>()
            .map_or_else(
                || -> Arc<dyn Clock> { Arc::new(SystemClock) },
                |fake| -> Arc<dyn Clock> { Arc::new(fake) },
            );
        let notifier = setup
            .substitution::<NotificationEndpoint>()
            .map(|endpoint| NotificationGateway::new(&endpoint))
            .transpose()?;

        setup.register(store.clone());
        Ok(Self {
            service: EventsService::new(store, clock, notifier),
        })
    }

    fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> ServeFuture {
        Box::pin(async move {
            self.service
                .serve(listener, shutdown.wait())
                .await
                .map_err(BoxError::from)
        })
    }
}

#[cfg(test)]
mod tests {
    use scenic_fixture::ISOLATION_HEADER;

    use crate::service::TENANT_HEADER;

    #[test]
    fn tenant_header_is_the_fixture_isolation_header() {
        assert_eq!(TENANT_HEADER, ISOLATION_HEADER);
    }
}
