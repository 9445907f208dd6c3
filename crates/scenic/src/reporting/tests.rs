//! Unit tests for the reporting module.
//!
//! Executor tests record into the same collector concurrently, so assertions
//! look records up by name instead of counting them.

use std::time::Duration;

use rstest::{fixture, rstest};
use serial_test::serial;

use super::*;
use crate::failure::FailureKind;
use crate::step::Phase;

fn failed(kind: FailureKind, message: &str) -> ScenarioStatus {
    ScenarioStatus::Failed(FailedScenario {
        kind,
        phase: Phase::Assert,
        index: 0,
        step: "request failed with EVENT-NAME-ALREADY-EXISTS".to_owned(),
        message: message.to_owned(),
    })
}

#[fixture]
fn mixed_records() -> Vec<ScenarioRecord> {
    vec![
        ScenarioRecord::new(
            ScenarioMetadata::new("creates event").with_tag("events"),
            "tenant-1",
            ScenarioStatus::Passed,
        )
        .with_elapsed(Duration::from_millis(1500)),
        ScenarioRecord::new(
            ScenarioMetadata::new("rejects duplicate"),
            "tenant-2",
            failed(FailureKind::AssertionFailed, "status code <409>"),
        ),
        ScenarioRecord::new(
            ScenarioMetadata::new("database unreachable"),
            "tenant-3",
            failed(FailureKind::InfrastructureError, "connection reset"),
        ),
        ScenarioRecord::new(
            ScenarioMetadata::default(),
            "tenant-4",
            ScenarioStatus::Aborted {
                reason: "schema dropped".to_owned(),
            },
        ),
    ]
}

#[test]
#[serial]
fn drain_clears_records() {
    let _ = drain();
    record(ScenarioRecord::new(
        ScenarioMetadata::new("drain_clears_records"),
        "key",
        ScenarioStatus::Passed,
    ));
    assert!(
        snapshot()
            .iter()
            .any(|record| record.name() == "drain_clears_records")
    );
    let drained = drain();
    assert!(
        drained
            .iter()
            .any(|record| record.name() == "drain_clears_records")
    );
    assert!(
        !snapshot()
            .iter()
            .any(|record| record.name() == "drain_clears_records")
    );
}

#[test]
#[serial]
fn failed_records_keep_failure_details() {
    record(ScenarioRecord::new(
        ScenarioMetadata::new("failed_records_keep_failure_details"),
        "key",
        failed(FailureKind::AssertionFailed, "event missing"),
    ));
    let records = drain();
    let Some(stored) = records
        .iter()
        .find(|record| record.name() == "failed_records_keep_failure_details")
    else {
        panic!("collector should retain the failed record");
    };
    match stored.status() {
        ScenarioStatus::Failed(details) => {
            assert_eq!(details.kind, FailureKind::AssertionFailed);
            assert_eq!(details.phase, Phase::Assert);
            assert_eq!(details.message, "event missing");
        }
        other => panic!("expected failed record, got {other:?}"),
    }
}

#[rstest]
fn junit_separates_failures_from_errors(mixed_records: Vec<ScenarioRecord>) {
    let mut output = String::new();
    let Ok(()) = junit::write(&mut output, &mixed_records) else {
        panic!("rendering into a String cannot fail");
    };
    assert!(output.contains("tests=\"4\" failures=\"1\" errors=\"2\""));
    assert!(output.contains("<failure type=\"assertion_failed\" message=\"status code &lt;409&gt;\">"));
    assert!(output.contains("<error type=\"infrastructure_error\""));
    assert!(output.contains("<error type=\"session_aborted\" message=\"schema dropped\" />"));
    assert!(output.contains("classname=\"events\" time=\"1.500\""));
    assert!(output.contains("name=\"&lt;unnamed&gt;\""));
}

#[test]
fn junit_replaces_invalid_characters() {
    let records = vec![ScenarioRecord::new(
        ScenarioMetadata::new("bell\u{7}"),
        "key",
        ScenarioStatus::Passed,
    )];
    let mut output = String::new();
    let Ok(()) = junit::write(&mut output, &records) else {
        panic!("rendering into a String cannot fail");
    };
    assert!(output.contains("name=\"bell&#xFFFD;\""));
}

#[cfg(feature = "diagnostics")]
#[rstest]
fn json_labels_statuses_in_lowercase(mixed_records: Vec<ScenarioRecord>) {
    let Ok(rendered) = json::to_string(&mixed_records) else {
        panic!("records should serialize");
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(&rendered) else {
        panic!("output should be valid JSON");
    };
    let statuses: Vec<_> = value["scenarios"]
        .as_array()
        .map(|scenarios| {
            scenarios
                .iter()
                .filter_map(|scenario| scenario["status"].as_str())
                .collect()
        })
        .unwrap_or_default();
    assert_eq!(statuses, ["passed", "failed", "failed", "aborted"]);
    assert_eq!(value["scenarios"][0]["elapsed_ms"], 1500);
    assert_eq!(value["scenarios"][2]["failure"]["kind"], "infrastructure_error");
    assert_eq!(value["scenarios"][3]["aborted_reason"], "schema dropped");
}

#[test]
#[serial]
fn persist_writes_reports_into_directory() {
    let Ok(dir) = tempfile::tempdir() else {
        panic!("temporary directory should be available");
    };
    record(ScenarioRecord::new(
        ScenarioMetadata::new("persist_writes_reports_into_directory"),
        "key",
        ScenarioStatus::Passed,
    ));
    let target = dir.path().join("reports");
    if let Err(error) = persist(&target) {
        panic!("persisting should succeed: {error}");
    }
    let Ok(xml) = std::fs::read_to_string(target.join(JUNIT_FILE_NAME)) else {
        panic!("junit report should exist");
    };
    assert!(xml.contains("persist_writes_reports_into_directory"));
    #[cfg(feature = "diagnostics")]
    assert!(target.join(JSON_FILE_NAME).exists());
}
