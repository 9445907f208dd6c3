//! Events service: users and events over HTTP/JSON, stored in `SQLite`.
//!
//! Requests act for the tenant named in the `x-scenic-tenant` header. Event
//! names are unique per tenant; a duplicate is rejected with
//! `409 EVENT-NAME-ALREADY-EXISTS`. Dates in the past, according to the
//! service [`Clock`], are rejected with `422 EVENT-DATE-IN-PAST`. When a
//! [`NotificationGateway`] is configured every created event is announced to
//! the external notification system.
//!
//! The `test-support` feature implements
//! [`ApplicationUnderTest`](scenic_fixture::ApplicationUnderTest) so scenario
//! suites can run the service against a disposable database.

mod clock;
mod error;
mod model;
mod notify;
mod service;
mod store;
#[cfg(feature = "test-support")]
pub mod test_support;

pub use clock::{Clock, SystemClock};
pub use error::{ApiError, StoreError};
pub use model::{Event, NewEvent, NewUser, User};
pub use notify::{NotificationEndpoint, NotificationGateway};
pub use service::{DEFAULT_TENANT, EventsService, TENANT_HEADER};
pub use store::{EventStore, MIGRATIONS};
