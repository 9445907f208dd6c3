//! JUnit XML writer for scenario outcome records.
//!
//! Assertion failures become `<failure>` elements; authoring mistakes,
//! infrastructure errors and aborted sessions become `<error>` elements, so CI
//! dashboards keep broken fixtures apart from behavioural regressions.

use std::fmt::{self, Write};

use super::{FailedScenario, ScenarioRecord, ScenarioStatus, snapshot};

const SUITE_NAME: &str = "scenic";
const SESSION_ABORTED: &str = "session_aborted";

/// Render the supplied scenario records as a `JUnit` XML document.
///
/// # Examples
/// ```
/// use scenic::ScenarioMetadata;
/// use scenic::reporting::{junit, ScenarioRecord, ScenarioStatus};
///
/// let records = vec![ScenarioRecord::new(
///     ScenarioMetadata::new("scenario"),
///     "tenant",
///     ScenarioStatus::Passed,
/// )];
/// let mut output = String::new();
/// junit::write(&mut output, &records).unwrap();
/// assert!(output.contains("<testsuite"));
/// ```
///
/// # Errors
/// Returns an error if writing to the provided formatter fails.
pub fn write<W: Write>(writer: &mut W, records: &[ScenarioRecord]) -> fmt::Result {
    let tests = records.len();
    let failures = records
        .iter()
        .filter(|record| {
            matches!(record.status(), ScenarioStatus::Failed(details) if details.kind.is_behavioural())
        })
        .count();
    let errors = records
        .iter()
        .filter(|record| match record.status() {
            ScenarioStatus::Passed => false,
            ScenarioStatus::Failed(details) => !details.kind.is_behavioural(),
            ScenarioStatus::Aborted { .. } => true,
        })
        .count();
    writer.write_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n")?;
    writeln!(
        writer,
        "<testsuite name=\"{SUITE_NAME}\" tests=\"{tests}\" failures=\"{failures}\" errors=\"{errors}\">",
    )?;
    for record in records {
        writer.write_str("  <testcase name=\"")?;
        write_escaped(writer, record.name())?;
        writer.write_str("\" classname=\"")?;
        write_escaped(
            writer,
            record.tags().first().map_or(SUITE_NAME, String::as_str),
        )?;
        write!(
            writer,
            "\" time=\"{:.3}\"",
            record.elapsed().as_secs_f64()
        )?;
        match record.status() {
            ScenarioStatus::Passed => writer.write_str(" />\n")?,
            ScenarioStatus::Failed(details) => {
                writer.write_str(">\n")?;
                write_failure(writer, details)?;
                writer.write_str("  </testcase>\n")?;
            }
            ScenarioStatus::Aborted { reason } => {
                writer.write_str(">\n")?;
                write!(writer, "    <error type=\"{SESSION_ABORTED}\" message=\"")?;
                write_escaped(writer, reason)?;
                writer.write_str("\" />\n")?;
                writer.write_str("  </testcase>\n")?;
            }
        }
    }
    writer.write_str("</testsuite>\n")
}

/// Render the collector snapshot as a `JUnit` XML document.
///
/// # Errors
/// Returns an error if writing to the provided formatter fails.
pub fn write_snapshot<W: Write>(writer: &mut W) -> fmt::Result {
    let snapshot = snapshot();
    write(writer, &snapshot)
}

fn write_failure<W: Write>(writer: &mut W, details: &FailedScenario) -> fmt::Result {
    let element = if details.kind.is_behavioural() {
        "failure"
    } else {
        "error"
    };
    write!(writer, "    <{element} type=\"{}\" message=\"", details.kind.label())?;
    write_escaped(writer, &details.message)?;
    write!(writer, "\">{} step {}: ", details.phase, details.index)?;
    write_escaped(writer, &details.step)?;
    writeln!(writer, "</{element}>")
}

fn write_escaped<W: Write>(writer: &mut W, value: &str) -> fmt::Result {
    const INVALID_REPLACEMENT: &str = "&#xFFFD;";
    for character in value.chars() {
        if !is_valid_xml_character(character) {
            writer.write_str(INVALID_REPLACEMENT)?;
            continue;
        }
        match character {
            '&' => writer.write_str("&amp;")?,
            '<' => writer.write_str("&lt;")?,
            '>' => writer.write_str("&gt;")?,
            '"' => writer.write_str("&quot;")?,
            '\'' => writer.write_str("&apos;")?,
            other => writer.write_char(other)?,
        }
    }
    Ok(())
}

fn is_valid_xml_character(character: char) -> bool {
    matches!(
        u32::from(character),
        0x09 | 0x0A | 0x0D
            | 0x20..=0xD7FF
            | 0xE000..=0xFFFD
            | 0x1_0000..=0x10_FFFF
    )
}
