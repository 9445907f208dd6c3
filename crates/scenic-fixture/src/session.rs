//! One service fixture per test binary.
//!
//! Test functions run on many threads in one process. [`SharedSession`] starts
//! the fixture on first use and hands every concurrent caller a
//! [`SessionLease`] on the same instance. When the last lease is dropped the
//! session ends: the fixture is stopped, its database destroyed, and the
//! session-end hook runs. A later caller starts a fresh session.
//!
//! Once start-up failed or a step reported fixture corruption the session
//! refuses to hand the fixture out again.

use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{error, info, warn};

use crate::application::ApplicationUnderTest;
use crate::config::FixtureConfig;
use crate::error::FixtureError;
use crate::service::ServiceFixture;

enum SessionState {
    Idle,
    Running {
        fixture: Arc<ServiceFixture>,
        leases: usize,
    },
    Failed(String),
    Stopped,
}

/// Lazily started, process-wide service fixture for application `A`.
///
/// Intended for a `static`:
///
/// ```ignore
/// static SESSION: SharedSession<EventsApp> = SharedSession::new().on_end(write_reports);
///
/// let service = SESSION.get_or_start(FixtureConfig::from_env)?;
/// ```
///
/// Statics are never dropped, so teardown is driven by the leases: the
/// fixture stops when the last [`SessionLease`] goes away, or when
/// [`shutdown`](Self::shutdown) is called.
pub struct SharedSession<A> {
    state: Mutex<SessionState>,
    on_end: Option<fn()>,
    application: PhantomData<fn() -> A>,
}

/// Shared access to the session's running fixture.
///
/// Dereferences to [`ServiceFixture`]. Dropping the last lease of a session
/// stops the fixture.
pub struct SessionLease<'s, A> {
    session: &'s SharedSession<A>,
    fixture: Arc<ServiceFixture>,
}

impl<A: ApplicationUnderTest> SharedSession<A> {
    /// Session that has not started yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Idle),
            on_end: None,
            application: PhantomData,
        }
    }

    /// Run `hook` each time a session ends, after the fixture has stopped.
    #[must_use]
    pub const fn on_end(mut self, hook: fn()) -> Self {
        self.on_end = Some(hook);
        self
    }

    /// Return the running fixture, starting it with `config` on first use.
    ///
    /// # Errors
    ///
    /// The call that attempts start-up returns the start-up error itself.
    /// Every later call, and every call after a step poisoned the scope,
    /// returns [`FixtureError::SessionUnavailable`].
    pub fn get_or_start(
        &self,
        config: impl FnOnce() -> Result<FixtureConfig, FixtureError>,
    ) -> Result<SessionLease<'_, A>, FixtureError> {
        self.get_or_start_with(|| ServiceFixture::start::<A>(&config()?))
    }

    /// Like [`get_or_start`](Self::get_or_start) with a custom start routine.
    ///
    /// # Errors
    ///
    /// As for [`get_or_start`](Self::get_or_start).
    pub fn get_or_start_with(
        &self,
        start: impl FnOnce() -> Result<ServiceFixture, FixtureError>,
    ) -> Result<SessionLease<'_, A>, FixtureError> {
        let mut state = self.lock();
        if let SessionState::Running { fixture, leases } = &mut *state {
            let Some(reason) = fixture
                .scope()
                .poisoned()
                .map(|reason| format!("fixture corrupted: {reason}"))
            else {
                *leases = leases.saturating_add(1);
                return Ok(self.lease(Arc::clone(fixture)));
            };
            // Outstanding leases keep the fixture alive; the last one to drop
            // releases it.
            error!(%reason, "refusing to reuse service fixture");
            *state = SessionState::Failed(reason.clone());
            return Err(FixtureError::SessionUnavailable { reason });
        }
        match &*state {
            SessionState::Failed(reason) => {
                return Err(FixtureError::SessionUnavailable {
                    reason: reason.clone(),
                });
            }
            SessionState::Stopped => {
                return Err(FixtureError::SessionUnavailable {
                    reason: "session was shut down".to_owned(),
                });
            }
            SessionState::Idle | SessionState::Running { .. } => {}
        }
        match start() {
            Ok(fixture) => {
                let fixture = Arc::new(fixture);
                info!(base_url = fixture.base_url(), "shared session started");
                *state = SessionState::Running {
                    fixture: Arc::clone(&fixture),
                    leases: 1,
                };
                Ok(self.lease(fixture))
            }
            Err(start_error) => {
                error!(error = %start_error, "shared session failed to start");
                *state = SessionState::Failed(format!("start-up failed: {start_error}"));
                Err(start_error)
            }
        }
    }

    /// Return `true` while a healthy fixture is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(
            &*self.lock(),
            SessionState::Running { fixture, .. } if fixture.scope().poisoned().is_none()
        )
    }

    /// Stop the fixture, if one is running, regardless of outstanding
    /// leases. Later calls to [`get_or_start`](Self::get_or_start) fail with
    /// [`FixtureError::SessionUnavailable`].
    ///
    /// Returns `true` when a fixture was stopped by this call.
    ///
    /// # Errors
    ///
    /// Returns the teardown error of the fixture.
    pub fn shutdown(&self) -> Result<bool, FixtureError> {
        let previous = std::mem::replace(&mut *self.lock(), SessionState::Stopped);
        let SessionState::Running { fixture, .. } = previous else {
            return Ok(false);
        };
        let stopped = fixture.stop().map(|()| true);
        self.run_end_hook();
        stopped
    }

    fn lease(&self, fixture: Arc<ServiceFixture>) -> SessionLease<'_, A> {
        SessionLease {
            session: self,
            fixture,
        }
    }
}

impl<A> SharedSession<A> {
    /// Drop one lease on `fixture`; the last one ends the session.
    fn release(&self, fixture: &Arc<ServiceFixture>) {
        let mut state = self.lock();
        let SessionState::Running {
            fixture: current,
            leases,
        } = &mut *state
        else {
            return;
        };
        if !Arc::ptr_eq(current, fixture) {
            return;
        }
        *leases = leases.saturating_sub(1);
        if *leases > 0 {
            return;
        }
        let previous = std::mem::replace(&mut *state, SessionState::Idle);
        let SessionState::Running { fixture, .. } = previous else {
            return;
        };
        // The lock stays held so a new session cannot start before this one
        // has released its database.
        info!(base_url = fixture.base_url(), "last lease released; ending session");
        if let Err(error) = fixture.stop() {
            warn!(%error, "shared session teardown failed");
        }
        self.run_end_hook();
    }

    fn run_end_hook(&self) {
        if let Some(hook) = self.on_end {
            hook();
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<A: ApplicationUnderTest> Default for SharedSession<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> std::fmt::Debug for SharedSession<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state.lock().as_deref() {
            Ok(SessionState::Idle) => "idle",
            Ok(SessionState::Running { .. }) => "running",
            Ok(SessionState::Failed(_)) => "failed",
            Ok(SessionState::Stopped) => "stopped",
            Err(_) => "poisoned",
        };
        f.debug_struct("SharedSession").field("state", &state).finish()
    }
}

impl<A> SessionLease<'_, A> {
    /// Return `true` when both leases refer to the same running fixture.
    #[must_use]
    pub fn same_fixture(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.fixture, &other.fixture)
    }
}

impl<A> Deref for SessionLease<'_, A> {
    type Target = ServiceFixture;

    fn deref(&self) -> &Self::Target {
        &self.fixture
    }
}

impl<A> Drop for SessionLease<'_, A> {
    fn drop(&mut self) {
        self.session.release(&self.fixture);
    }
}

impl<A> std::fmt::Debug for SessionLease<'_, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("fixture", &self.fixture)
            .finish()
    }
}
