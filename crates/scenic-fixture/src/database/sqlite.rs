//! File-backed SQLite engine.
//!
//! Each instance lives in its own temporary directory, so the database file
//! and its WAL side files disappear on teardown.

use diesel::sqlite::SqliteConnection;
use diesel::{Connection, RunQueryDsl, sql_query};
use tempfile::TempDir;

use super::{ConnectionDescriptor, DatabaseEngine, DatabaseInstance};
use crate::config::DatabaseImage;
use crate::error::FixtureError;

const DATABASE_FILE: &str = "scenic.sqlite3";

/// Provisions SQLite databases in temporary directories.
#[derive(Debug, Clone)]
pub struct SqliteEngine {
    image: DatabaseImage,
}

impl SqliteEngine {
    /// Engine for the default `sqlite` image.
    #[must_use]
    pub fn new() -> Self {
        Self {
            image: DatabaseImage::new("sqlite", None),
        }
    }
}

impl Default for SqliteEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseEngine for SqliteEngine {
    fn image(&self) -> &DatabaseImage {
        &self.image
    }

    fn provision(&self) -> Result<Box<dyn DatabaseInstance>, FixtureError> {
        let dir = tempfile::Builder::new()
            .prefix("scenic-db-")
            .tempdir()
            .map_err(|error| FixtureError::DatabaseProvisioning {
                image: self.image.to_string(),
                message: error.to_string(),
            })?;
        let descriptor = ConnectionDescriptor::file("sqlite", dir.path().join(DATABASE_FILE));
        Ok(Box::new(SqliteInstance {
            dir: Some(dir),
            descriptor,
        }))
    }
}

struct SqliteInstance {
    dir: Option<TempDir>,
    descriptor: ConnectionDescriptor,
}

impl DatabaseInstance for SqliteInstance {
    fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    fn probe(&mut self) -> Result<(), String> {
        let mut connection =
            SqliteConnection::establish(&self.descriptor.url()).map_err(|error| error.to_string())?;
        sql_query("SELECT 1;")
            .execute(&mut connection)
            .map(drop)
            .map_err(|error| error.to_string())
    }

    fn teardown(&mut self) -> Result<(), FixtureError> {
        self.dir.take().map_or(Ok(()), |dir| {
            dir.close().map_err(|error| FixtureError::Teardown {
                component: "sqlite database".to_owned(),
                message: error.to_string(),
            })
        })
    }
}
