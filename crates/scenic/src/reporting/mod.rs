//! Scenario reporting collector.
//!
//! Every executed scenario is stored in a global, thread-safe collector.
//! Reporters read the collected entries to render summaries for CI without
//! depending on the test functions that produced them.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};

use thiserror::Error;
use tracing::info;

/// JSON report writer for scenario outcomes.
#[cfg(feature = "diagnostics")]
pub mod json;
/// JUnit XML writer for scenario outcomes.
pub mod junit;
mod record;

pub(crate) use record::millis;
pub use record::{
    FailedScenario, ScenarioMetadata, ScenarioRecord, ScenarioStatus, StepOutcome, StepRecord,
};

/// File name used for the JUnit report written by [`persist`].
pub const JUNIT_FILE_NAME: &str = "scenic-junit.xml";
/// File name used for the JSON report written by [`persist`].
#[cfg(feature = "diagnostics")]
pub const JSON_FILE_NAME: &str = "scenic-report.json";

static REPORTS: OnceLock<Mutex<Vec<ScenarioRecord>>> = OnceLock::new();

fn reports_mutex() -> &'static Mutex<Vec<ScenarioRecord>> {
    REPORTS.get_or_init(|| Mutex::new(Vec::new()))
}

fn lock_reports() -> MutexGuard<'static, Vec<ScenarioRecord>> {
    match reports_mutex().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Errors raised while writing reports to disk.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The report directory or file could not be written.
    #[error("failed to write report {path}: {source}")]
    Io {
        /// Target path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Rendering the XML document failed.
    #[error("failed to render junit report")]
    Render(#[from] std::fmt::Error),
    /// Serializing the JSON document failed.
    #[cfg(feature = "diagnostics")]
    #[error("failed to serialize json report: {0}")]
    Json(#[from] serde_json::Error),
}

/// Record a scenario outcome in the shared collector.
///
/// # Examples
/// ```
/// use scenic::ScenarioMetadata;
/// use scenic::reporting::{drain, record, ScenarioRecord, ScenarioStatus};
///
/// record(ScenarioRecord::new(ScenarioMetadata::new("scenario"), "key", ScenarioStatus::Passed));
/// assert!(!drain().is_empty());
/// ```
pub fn record(record: ScenarioRecord) {
    lock_reports().push(record);
}

/// Retrieve a snapshot of the recorded scenarios without clearing them.
#[must_use]
pub fn snapshot() -> Vec<ScenarioRecord> {
    lock_reports().clone()
}

/// Remove and return all recorded scenario outcomes.
#[must_use]
pub fn drain() -> Vec<ScenarioRecord> {
    lock_reports().drain(..).collect()
}

/// Write the collector snapshot into `dir`.
///
/// The JUnit document is always written; the JSON document is written when
/// the `diagnostics` feature is enabled. The directory is created when
/// missing.
///
/// # Errors
///
/// Returns [`ReportError`] when the directory cannot be created or a report
/// cannot be rendered or written.
pub fn persist(dir: &Path) -> Result<(), ReportError> {
    fs::create_dir_all(dir).map_err(|source| ReportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let records = snapshot();

    let mut xml = String::new();
    junit::write(&mut xml, &records)?;
    write_file(&dir.join(JUNIT_FILE_NAME), xml.as_bytes())?;

    #[cfg(feature = "diagnostics")]
    {
        let rendered = json::to_string(&records)?;
        write_file(&dir.join(JSON_FILE_NAME), rendered.as_bytes())?;
    }

    info!(dir = %dir.display(), scenarios = records.len(), "wrote scenario reports");
    Ok(())
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), ReportError> {
    fs::write(path, contents).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests;
