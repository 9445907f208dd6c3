//! Resources exchanged over HTTP.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A registered user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Row id.
    pub id: i64,
    /// Display name.
    pub name: String,
}

/// A scheduled event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Row id.
    pub id: i64,
    /// Name, unique per tenant.
    pub name: String,
    /// Day the event takes place.
    pub date: NaiveDate,
    /// Id of the user who created the event.
    pub created_by: i64,
    /// Instant the event was recorded, per the service clock.
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /users`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewUser {
    /// Display name.
    pub name: String,
}

/// Body of `POST /events`.
///
/// The date stays text so malformed values can be reported with a stable
/// error code.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewEvent {
    /// Event name.
    pub name: String,
    /// `YYYY-MM-DD`.
    pub date: String,
    /// Id of the creating user.
    pub created_by: i64,
}
