//! Service and database fixtures for `scenic` scenarios.
//!
//! A [`ServiceFixture`] runs one instance of an application under test with
//! its internal wiring intact, backed by a disposable database from a
//! [`DatabaseEngine`]. Collaborators that cross the application's boundary
//! are replaced through [`Substitutions`]. Steps talk to the application over
//! HTTP with the [`ServiceClient`] and resolve collaborators from the
//! fixture's [`DependencyScope`](scenic::DependencyScope).
//!
//! Test binaries normally keep the fixture in a [`SharedSession`] so it starts
//! once and is shared by every test; it stops when the last test releases its
//! [`SessionLease`].

mod application;
mod client;
mod clock;
pub mod config;
mod database;
mod error;
mod probe;
mod service;
mod session;
mod substitution;

pub use application::{ApplicationSetup, ApplicationUnderTest, ServeFuture, ShutdownSignal};
pub use client::{ApiResponse, ISOLATION_HEADER, ServiceClient, ServiceRequest};
pub use clock::FakeClock;
pub use config::{DatabaseImage, FixtureConfig, ReadinessPolicy};
pub use database::{
    ConnectionDescriptor, ContainerEngine, DatabaseEngine, DatabaseFixture, DatabaseInstance,
    SqliteEngine, engine_for_image, parse_published_port,
};
pub use error::{BoxError, FixtureError};
pub use probe::wait_until_ready;
pub use service::ServiceFixture;
pub use session::{SessionLease, SharedSession};
pub use substitution::Substitutions;
