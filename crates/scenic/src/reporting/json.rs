//! JSON writer for scenario outcome records.
//!
//! Status, phase and failure labels are lowercase so downstream tools can
//! rely on consistent casing.

use std::io::Write;

use serde::Serialize;

use super::{ScenarioRecord, ScenarioStatus, StepRecord, millis, snapshot};

#[derive(Serialize)]
struct JsonReport<'a> {
    scenarios: Vec<JsonScenario<'a>>,
}

#[derive(Serialize)]
struct JsonScenario<'a> {
    name: &'a str,
    tags: &'a [String],
    isolation_key: &'a str,
    status: &'static str,
    elapsed_ms: u64,
    steps: Vec<JsonStep<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<JsonFailure<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    aborted_reason: Option<&'a str>,
}

#[derive(Serialize)]
struct JsonStep<'a> {
    phase: &'static str,
    index: usize,
    description: &'a str,
    config: &'a str,
    elapsed_ms: u64,
    outcome: &'static str,
}

#[derive(Serialize)]
struct JsonFailure<'a> {
    kind: &'static str,
    phase: &'static str,
    index: usize,
    step: &'a str,
    message: &'a str,
}

impl<'a> From<&'a [ScenarioRecord]> for JsonReport<'a> {
    fn from(records: &'a [ScenarioRecord]) -> Self {
        let scenarios = records.iter().map(JsonScenario::from).collect();
        Self { scenarios }
    }
}

impl<'a> From<&'a ScenarioRecord> for JsonScenario<'a> {
    fn from(record: &'a ScenarioRecord) -> Self {
        let (failure, aborted_reason) = match record.status() {
            ScenarioStatus::Passed => (None, None),
            ScenarioStatus::Failed(details) => (
                Some(JsonFailure {
                    kind: details.kind.label(),
                    phase: details.phase.label(),
                    index: details.index,
                    step: &details.step,
                    message: &details.message,
                }),
                None,
            ),
            ScenarioStatus::Aborted { reason } => (None, Some(reason.as_str())),
        };
        Self {
            name: record.name(),
            tags: record.tags(),
            isolation_key: record.isolation_key(),
            status: record.status().label(),
            elapsed_ms: millis(record.elapsed()),
            steps: record.steps().iter().map(JsonStep::from).collect(),
            failure,
            aborted_reason,
        }
    }
}

impl<'a> From<&'a StepRecord> for JsonStep<'a> {
    fn from(step: &'a StepRecord) -> Self {
        Self {
            phase: step.phase.label(),
            index: step.index,
            description: &step.description,
            config: &step.config,
            elapsed_ms: millis(step.elapsed),
            outcome: step.outcome.label(),
        }
    }
}

/// Serialize the provided scenario records into the supplied writer.
///
/// # Examples
/// ```rust
/// use scenic::ScenarioMetadata;
/// use scenic::reporting::{json, ScenarioRecord, ScenarioStatus};
///
/// let records = vec![ScenarioRecord::new(
///     ScenarioMetadata::new("scenario"),
///     "tenant",
///     ScenarioStatus::Passed,
/// )];
/// let mut buffer = Vec::new();
/// json::write(&mut buffer, &records).unwrap();
/// let output = String::from_utf8(buffer).unwrap();
/// assert!(output.contains("\"status\":\"passed\""));
/// ```
///
/// # Errors
/// Returns an error when serialization of the provided records fails.
pub fn write<W: Write>(writer: &mut W, records: &[ScenarioRecord]) -> serde_json::Result<()> {
    serde_json::to_writer(writer, &JsonReport::from(records))
}

/// Serialize the current collector snapshot into the supplied writer.
///
/// # Errors
/// Returns an error when serializing the snapshot fails.
pub fn write_snapshot<W: Write>(writer: &mut W) -> serde_json::Result<()> {
    let snapshot = snapshot();
    write(writer, &snapshot)
}

/// Produce a JSON string representation of the provided scenario records.
///
/// # Errors
/// Returns an error when serializing the provided records fails.
pub fn to_string(records: &[ScenarioRecord]) -> serde_json::Result<String> {
    serde_json::to_string(&JsonReport::from(records))
}
