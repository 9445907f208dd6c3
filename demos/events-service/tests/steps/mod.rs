//! Steps shared by the events-service scenario suites.

use std::borrow::Cow;

use chrono::{DateTime, TimeZone, Utc};
use events_service::{Event, EventStore, User};
use scenic::{
    ActStep, ArrangeStep, AssertStep, BackgroundStep, ContextKey, ScenarioContext, Step,
    StepFailure, StepResult,
};
use scenic_fixture::{ApiResponse, FakeClock, ServiceClient};
use serde_json::json;

/// Id of the user seeded by [`SeedUser`].
pub const USER_ID: ContextKey<i64> = ContextKey::new("user_id");
/// Response of the last act step.
pub const LAST_RESPONSE: ContextKey<ApiResponse> = ContextKey::new("last_response");

/// Instant the session's fake clock starts at.
pub fn session_start() -> DateTime<Utc> {
    match Utc.with_ymd_and_hms(2025, 9, 1, 9, 0, 0) {
        chrono::LocalResult::Single(instant) => instant,
        _ => panic!("session start should be a valid instant"),
    }
}

fn client(ctx: &ScenarioContext<'_>) -> Result<ServiceClient, StepFailure> {
    ctx.resolve::<ServiceClient>()
}

fn post_event(ctx: &ScenarioContext<'_>, name: &str, date: &str) -> Result<ApiResponse, StepFailure> {
    let created_by = *ctx.fetch(USER_ID)?;
    client(ctx)?
        .post("/events")
        .isolated(ctx.isolation_key())
        .json(&json!({ "name": name, "date": date, "created_by": created_by }))
        .send()
}

/// Register a user for the scenario's tenant.
#[derive(Debug)]
pub struct SeedUser {
    name: &'static str,
}

impl SeedUser {
    pub fn named(name: &'static str) -> Self {
        Self { name }
    }
}

impl Step for SeedUser {
    fn description(&self) -> Cow<'_, str> {
        Cow::Owned(format!("a user named {}", self.name))
    }

    fn execute(&self, ctx: &mut ScenarioContext<'_>) -> StepResult {
        let response = client(ctx)?
            .post("/users")
            .isolated(ctx.isolation_key())
            .json(&json!({ "name": self.name }))
            .send()?;
        if response.status() != 201 {
            return Err(StepFailure::infrastructure(format!(
                "seeding user {} answered {}",
                self.name,
                response.status()
            )));
        }
        let user: User = response.json()?;
        ctx.put(USER_ID, user.id);
        Ok(())
    }
}

impl BackgroundStep for SeedUser {}

/// Create an event directly, as pre-existing data.
#[derive(Debug)]
pub struct SeedEvent {
    name: &'static str,
    date: &'static str,
}

impl SeedEvent {
    pub fn new(name: &'static str, date: &'static str) -> Self {
        Self { name, date }
    }
}

impl Step for SeedEvent {
    fn description(&self) -> Cow<'_, str> {
        Cow::Owned(format!("an existing event named {} on {}", self.name, self.date))
    }

    fn execute(&self, ctx: &mut ScenarioContext<'_>) -> StepResult {
        let response = post_event(ctx, self.name, self.date)?;
        if response.status() == 201 {
            Ok(())
        } else {
            Err(StepFailure::infrastructure(format!(
                "seeding event {} answered {}",
                self.name,
                response.status()
            )))
        }
    }
}

impl ArrangeStep for SeedEvent {}

/// Point the scenario at a user id that does not exist.
#[derive(Debug)]
pub struct UnknownCreator;

impl Step for UnknownCreator {
    fn description(&self) -> Cow<'_, str> {
        Cow::Borrowed("the creator is unknown")
    }

    fn execute(&self, ctx: &mut ScenarioContext<'_>) -> StepResult {
        ctx.put(USER_ID, i64::MAX);
        Ok(())
    }
}

impl ArrangeStep for UnknownCreator {}

/// Move the shared fake clock.
#[derive(Debug)]
pub struct ClockAt(pub DateTime<Utc>);

impl Step for ClockAt {
    fn description(&self) -> Cow<'_, str> {
        Cow::Owned(format!("the clock reads {}", self.0.to_rfc3339()))
    }

    fn execute(&self, ctx: &mut ScenarioContext<'_>) -> StepResult {
        ctx.resolve::<FakeClock>()?.set(self.0);
        Ok(())
    }
}

impl ArrangeStep for ClockAt {}

/// Attempt to create an event through the API.
#[derive(Debug)]
pub struct CreateEvent {
    name: &'static str,
    date: &'static str,
}

impl CreateEvent {
    pub fn new(name: &'static str, date: &'static str) -> Self {
        Self { name, date }
    }
}

impl Step for CreateEvent {
    fn description(&self) -> Cow<'_, str> {
        Cow::Owned(format!("create an event named {} on {}", self.name, self.date))
    }

    fn execute(&self, ctx: &mut ScenarioContext<'_>) -> StepResult {
        let response = post_event(ctx, self.name, self.date)?;
        ctx.put(LAST_RESPONSE, response);
        Ok(())
    }
}

impl ActStep for CreateEvent {}

/// The last request was accepted with `201 Created`.
#[derive(Debug)]
pub struct RequestSucceeded;

impl Step for RequestSucceeded {
    fn description(&self) -> Cow<'_, str> {
        Cow::Borrowed("the request succeeded")
    }

    fn execute(&self, ctx: &mut ScenarioContext<'_>) -> StepResult {
        ctx.fetch(LAST_RESPONSE)?.expect_status(201)
    }
}

impl AssertStep for RequestSucceeded {}

/// The last request failed with `status` and the application error `code`.
#[derive(Debug)]
pub struct RequestFailedWith {
    pub status: u16,
    pub code: &'static str,
}

impl Step for RequestFailedWith {
    fn description(&self) -> Cow<'_, str> {
        Cow::Owned(format!("the request failed with {} {}", self.status, self.code))
    }

    fn execute(&self, ctx: &mut ScenarioContext<'_>) -> StepResult {
        let response = ctx.fetch(LAST_RESPONSE)?;
        response.expect_status(self.status)?;
        match response.error_code() {
            Some(code) if code == self.code => Ok(()),
            observed => Err(StepFailure::mismatch(
                "error code",
                self.code,
                observed.unwrap_or("<none>"),
            )),
        }
    }
}

impl AssertStep for RequestFailedWith {}

/// Exactly one event with this name is visible to the scenario's tenant.
#[derive(Debug)]
pub struct EventExists {
    pub name: &'static str,
}

impl Step for EventExists {
    fn description(&self) -> Cow<'_, str> {
        Cow::Owned(format!("an event named {} exists", self.name))
    }

    fn execute(&self, ctx: &mut ScenarioContext<'_>) -> StepResult {
        let response = client(ctx)?
            .get("/events")
            .isolated(ctx.isolation_key())
            .query(&[("name", self.name)])
            .send()?;
        response.expect_status(200)?;
        let events: Vec<Event> = response.json()?;
        match events.as_slice() {
            [event] if event.name == self.name => Ok(()),
            _ => Err(StepFailure::mismatch(
                format!("events named {}", self.name),
                1,
                events.len(),
            )),
        }
    }
}

impl AssertStep for EventExists {}

/// The database holds `count` events with this name for the tenant.
#[derive(Debug)]
pub struct StoredEvents {
    pub name: &'static str,
    pub count: i64,
}

impl Step for StoredEvents {
    fn description(&self) -> Cow<'_, str> {
        Cow::Owned(format!("{} stored event(s) named {}", self.count, self.name))
    }

    fn execute(&self, ctx: &mut ScenarioContext<'_>) -> StepResult {
        let store = ctx.resolve::<EventStore>()?;
        let stored = store
            .count_events(ctx.isolation_key().as_str(), self.name)
            .map_err(|error| StepFailure::infrastructure_with("counting stored events", error))?;
        if stored == self.count {
            Ok(())
        } else {
            Err(StepFailure::mismatch("stored events", self.count, stored))
        }
    }
}

impl AssertStep for StoredEvents {}
