//! `SQLite` storage for users and events.
//!
//! Every row carries the tenant it was written under; reads never cross
//! tenants. Name uniqueness is enforced by the schema, per tenant.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::{BigInt, Nullable, Text};
use diesel::sqlite::SqliteConnection;
use diesel::{Connection, OptionalExtension, QueryableByName, RunQueryDsl, sql_query};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::debug;

use crate::error::StoreError;
use crate::model::{Event, User};

/// Embedded schema migrations.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, QueryableByName)]
struct EventRow {
    #[diesel(sql_type = BigInt)]
    id: i64,
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = Text)]
    event_date: String,
    #[diesel(sql_type = BigInt)]
    created_by: i64,
    #[diesel(sql_type = Text)]
    created_at: String,
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let date = NaiveDate::parse_from_str(&row.event_date, DATE_FORMAT).map_err(|_| {
            StoreError::CorruptValue {
                column: "event_date",
                value: row.event_date.clone(),
            }
        })?;
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|_| StoreError::CorruptValue {
                column: "created_at",
                value: row.created_at.clone(),
            })?
            .with_timezone(&Utc);
        Ok(Self {
            id: row.id,
            name: row.name,
            date,
            created_by: row.created_by,
            created_at,
        })
    }
}

#[derive(Debug, QueryableByName)]
struct IdRow {
    #[diesel(sql_type = BigInt)]
    id: i64,
}

#[derive(Debug, QueryableByName)]
struct UserRow {
    #[diesel(sql_type = BigInt)]
    id: i64,
    #[diesel(sql_type = Text)]
    name: String,
}

#[derive(Debug, QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

/// Shared handle to the service database.
///
/// Clones share one connection; calls are serialised.
#[derive(Clone)]
pub struct EventStore {
    connection: Arc<Mutex<SqliteConnection>>,
}

impl EventStore {
    /// Open the database at `database_url` and apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the database cannot be opened, configured
    /// or migrated.
    pub fn open(database_url: &str) -> Result<Self, StoreError> {
        let database_url = database_url.trim();
        if database_url.is_empty() {
            return Err(StoreError::BlankDatabaseUrl);
        }
        let mut connection = SqliteConnection::establish(database_url).map_err(|error| {
            StoreError::ConnectionFailed {
                message: error.to_string(),
            }
        })?;
        for pragma in [
            "PRAGMA foreign_keys = ON;",
            "PRAGMA journal_mode = WAL;",
            "PRAGMA busy_timeout = 5000;",
        ] {
            sql_query(pragma)
                .execute(&mut connection)
                .map(drop)
                .map_err(|error| StoreError::PragmaFailed {
                    message: error.to_string(),
                })?;
        }
        connection
            .run_pending_migrations(MIGRATIONS)
            .map_err(|error| StoreError::MigrationFailed {
                message: error.to_string(),
            })?;
        debug!(database_url, "event store ready");
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Check that the database answers.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::QueryFailed`] when it does not.
    pub fn ping(&self) -> Result<(), StoreError> {
        sql_query("SELECT 1;")
            .execute(&mut *self.lock())
            .map(drop)
            .map_err(map_error)
    }

    /// Insert a user.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    pub fn create_user(
        &self,
        tenant: &str,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        let mut connection = self.lock();
        sql_query("INSERT INTO users (tenant, name, created_at) VALUES (?, ?, ?);")
            .bind::<Text, _>(tenant)
            .bind::<Text, _>(name)
            .bind::<Text, _>(now.to_rfc3339())
            .execute(&mut *connection)
            .map_err(map_error)?;
        let id = last_insert_id(&mut connection)?;
        Ok(User {
            id,
            name: name.to_owned(),
        })
    }

    /// Find a user visible to `tenant`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::QueryFailed`] when the query fails.
    pub fn find_user(&self, tenant: &str, id: i64) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> =
            sql_query("SELECT id, name FROM users WHERE tenant = ? AND id = ? LIMIT 1;")
                .bind::<Text, _>(tenant)
                .bind::<BigInt, _>(id)
                .get_result(&mut *self.lock())
                .optional()
                .map_err(map_error)?;
        Ok(row.map(|row| User {
            id: row.id,
            name: row.name,
        }))
    }

    /// Insert an event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] when the tenant already has an event
    /// with this name, [`StoreError::MissingReference`] when the creator does
    /// not exist, and [`StoreError::QueryFailed`] otherwise.
    pub fn insert_event(
        &self,
        tenant: &str,
        name: &str,
        date: NaiveDate,
        created_by: i64,
        now: DateTime<Utc>,
    ) -> Result<Event, StoreError> {
        let mut connection = self.lock();
        sql_query(
            "INSERT INTO events (tenant, name, event_date, created_by, created_at) \
             VALUES (?, ?, ?, ?, ?);",
        )
        .bind::<Text, _>(tenant)
        .bind::<Text, _>(name)
        .bind::<Text, _>(date.format(DATE_FORMAT).to_string())
        .bind::<BigInt, _>(created_by)
        .bind::<Text, _>(now.to_rfc3339())
        .execute(&mut *connection)
        .map_err(map_error)?;
        let id = last_insert_id(&mut connection)?;
        Ok(Event {
            id,
            name: name.to_owned(),
            date,
            created_by,
            created_at: now,
        })
    }

    /// Event with `id` visible to `tenant`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails or the row is corrupt.
    pub fn get_event(&self, tenant: &str, id: i64) -> Result<Option<Event>, StoreError> {
        let row: Option<EventRow> = sql_query(
            "SELECT id, name, event_date, created_by, created_at FROM events \
             WHERE tenant = ? AND id = ? LIMIT 1;",
        )
        .bind::<Text, _>(tenant)
        .bind::<BigInt, _>(id)
        .get_result(&mut *self.lock())
        .optional()
        .map_err(map_error)?;
        row.map(Event::try_from).transpose()
    }

    /// Events visible to `tenant`, optionally filtered by exact name, oldest
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails or a row is corrupt.
    pub fn list_events(&self, tenant: &str, name: Option<&str>) -> Result<Vec<Event>, StoreError> {
        let rows: Vec<EventRow> = sql_query(
            "SELECT id, name, event_date, created_by, created_at FROM events \
             WHERE tenant = ? AND (? IS NULL OR name = ?) ORDER BY id;",
        )
        .bind::<Text, _>(tenant)
        .bind::<Nullable<Text>, _>(name)
        .bind::<Nullable<Text>, _>(name)
        .load(&mut *self.lock())
        .map_err(map_error)?;
        rows.into_iter().map(Event::try_from).collect()
    }

    /// Number of events named `name` stored for `tenant`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::QueryFailed`] when the query fails.
    pub fn count_events(&self, tenant: &str, name: &str) -> Result<i64, StoreError> {
        let row: CountRow =
            sql_query("SELECT COUNT(*) AS count FROM events WHERE tenant = ? AND name = ?;")
                .bind::<Text, _>(tenant)
                .bind::<Text, _>(name)
                .get_result(&mut *self.lock())
                .map_err(map_error)?;
        Ok(row.count)
    }

    fn lock(&self) -> MutexGuard<'_, SqliteConnection> {
        match self.connection.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for EventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore").finish_non_exhaustive()
    }
}

fn last_insert_id(connection: &mut SqliteConnection) -> Result<i64, StoreError> {
    sql_query("SELECT last_insert_rowid() AS id;")
        .get_result::<IdRow>(connection)
        .map(|row| row.id)
        .map_err(map_error)
}

fn map_error(error: DieselError) -> StoreError {
    match error {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => StoreError::Duplicate,
        DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
            StoreError::MissingReference
        }
        other => StoreError::QueryFailed {
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;

    struct Database {
        store: EventStore,
        _dir: TempDir,
    }

    #[fixture]
    fn database() -> Database {
        let Ok(dir) = TempDir::new() else {
            panic!("temporary directory should be created");
        };
        let path = dir.path().join("events.sqlite3");
        match EventStore::open(&path.to_string_lossy()) {
            Ok(store) => Database { store, _dir: dir },
            Err(error) => panic!("store should open: {error}"),
        }
    }

    fn now() -> DateTime<Utc> {
        match Utc.with_ymd_and_hms(2025, 9, 1, 9, 0, 0) {
            chrono::LocalResult::Single(instant) => instant,
            _ => panic!("fixed instant should be valid"),
        }
    }

    fn conference_day() -> NaiveDate {
        let Some(date) = NaiveDate::from_ymd_opt(2025, 10, 15) else {
            panic!("fixed date should be valid");
        };
        date
    }

    fn seed_user(store: &EventStore, tenant: &str) -> User {
        match store.create_user(tenant, "Alice", now()) {
            Ok(user) => user,
            Err(error) => panic!("user should be created: {error}"),
        }
    }

    #[rstest]
    fn inserts_and_reads_back_events(database: Database) {
        let store = &database.store;
        let alice = seed_user(store, "tenant-a");
        let Ok(event) = store.insert_event("tenant-a", "Tech Conference", conference_day(), alice.id, now())
        else {
            panic!("event should be inserted");
        };
        assert_eq!(store.get_event("tenant-a", event.id), Ok(Some(event.clone())));
        assert_eq!(store.list_events("tenant-a", Some("Tech Conference")), Ok(vec![event]));
        assert_eq!(store.count_events("tenant-a", "Tech Conference"), Ok(1));
    }

    #[rstest]
    fn rejects_duplicate_names_within_a_tenant(database: Database) {
        let store = &database.store;
        let alice = seed_user(store, "tenant-a");
        let first = store.insert_event("tenant-a", "Tech Conference", conference_day(), alice.id, now());
        assert!(first.is_ok());
        let second = store.insert_event("tenant-a", "Tech Conference", conference_day(), alice.id, now());
        assert_eq!(second, Err(StoreError::Duplicate));
    }

    #[rstest]
    fn tenants_do_not_see_each_other(database: Database) {
        let store = &database.store;
        let alice = seed_user(store, "tenant-a");
        let bob = seed_user(store, "tenant-b");
        assert!(store.insert_event("tenant-a", "Tech Conference", conference_day(), alice.id, now()).is_ok());
        assert!(store.insert_event("tenant-b", "Tech Conference", conference_day(), bob.id, now()).is_ok());

        assert_eq!(store.list_events("tenant-a", None).map(|events| events.len()), Ok(1));
        assert_eq!(store.find_user("tenant-b", alice.id), Ok(None));
    }

    #[rstest]
    fn unknown_creator_is_a_missing_reference(database: Database) {
        let result = database
            .store
            .insert_event("tenant-a", "Orphan", conference_day(), 9_999, now());
        assert_eq!(result, Err(StoreError::MissingReference));
    }

    #[test]
    fn blank_url_is_rejected() {
        assert!(matches!(EventStore::open("  "), Err(StoreError::BlankDatabaseUrl)));
    }
}
