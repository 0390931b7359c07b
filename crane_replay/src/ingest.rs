//! History ingestion from JSON documents and tabular crane logs.
//!
//! Three input shapes are recognised from the first non-blank character:
//! a JSON array of row objects, JSON lines (one object per line), or a
//! delimited table with a header row. Field values may be numbers or
//! strings; strings may use a decimal comma. Times are epoch milliseconds
//! or datetime strings (RFC 3339, or `yyyy-mm-dd hh:mm:ss` read as UTC).
//! A row missing any of time, radius, height or angle is skipped with a
//! warning rather than failing the whole file.
//!
//! ```text
//! {"time": 1704067200000, "radius": "23,5", "height": 18.2, "angle": 140,
//!  "weight": 1.8, "wind": 4.1, "reeving": 2}
//!
//! время;амплитуда (м);высота (м);поворот (°);вес (т);скорость ветра;запасовка (кр.)
//! 2024-01-01 00:00:00;23,5;18,2;140;1,8;4,1;2
//! ```

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use crane_core::record::normalize_reeving;
use crane_core::{Record, RecordError, RecordSequence};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to read history: {0}")]
    Io(#[from] std::io::Error),

    #[error("History is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("History line {line} is not valid JSON: {source}")]
    Line {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("History table is malformed: {0}")]
    Table(#[from] csv::Error),

    #[error("Missing essential columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Result of ingesting one document.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub records: RecordSequence,
    /// Rows dropped for missing or unparseable essentials
    pub skipped: usize,
}

#[derive(Debug, Default, Deserialize)]
struct RawRecord {
    #[serde(default, alias = "timestamp", alias = "timeMillis")]
    time: Option<Value>,
    #[serde(default)]
    radius: Option<Value>,
    #[serde(default)]
    height: Option<Value>,
    #[serde(default)]
    angle: Option<Value>,
    #[serde(default)]
    weight: Option<Value>,
    #[serde(default)]
    wind: Option<Value>,
    #[serde(default)]
    reeving: Option<Value>,
    #[serde(default)]
    torque: Option<Value>,
}

impl RawRecord {
    fn into_record(self) -> Option<Record> {
        let time = self.time.as_ref().and_then(parse_millis)?;
        let radius = self.radius.as_ref().and_then(parse_number)?;
        let height = self.height.as_ref().and_then(parse_number)?;
        let angle = self.angle.as_ref().and_then(parse_number)?;

        let mut record = Record::new(time, radius, height, angle);
        record.weight = self.weight.as_ref().and_then(parse_number);
        record.wind = self.wind.as_ref().and_then(parse_number);
        record.torque = self.torque.as_ref().and_then(parse_number);
        record.reeving = normalize_reeving(
            self.reeving
                .as_ref()
                .and_then(parse_number)
                .map(|r| r.round() as i64),
        );
        Some(record)
    }
}

// ============================================================================
// FIELD PARSING
// ============================================================================

/// Finite number from a JSON number or a (possibly comma-decimal) string.
fn parse_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().replace(',', ".").parse().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn parse_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| parse_number(value).map(|f| f.round() as i64)),
        Value::String(s) => parse_time_str(s),
        _ => None,
    }
}

/// Epoch milliseconds from an integer string or a datetime string.
///
/// Datetimes without an offset are taken as UTC.
fn parse_time_str(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(millis) = s.parse::<i64>() {
        return Some(millis);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    for format in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&dt).timestamp_millis());
        }
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?).timestamp_millis())
}

// ============================================================================
// TABLES
// ============================================================================

/// Header names accepted for each column (compared trimmed and lowercased).
const TIME_HEADERS: &[&str] = &["время", "time", "timestamp"];
const RADIUS_HEADERS: &[&str] = &["амплитуда (м)", "radius"];
const HEIGHT_HEADERS: &[&str] = &["высота (м)", "height"];
const ANGLE_HEADERS: &[&str] = &["поворот (°)", "angle"];
const WEIGHT_HEADERS: &[&str] = &["вес (т)", "weight"];
const WIND_HEADERS: &[&str] = &["скорость ветра", "wind"];
const REEVING_HEADERS: &[&str] = &["запасовка (кр.)", "reeving"];
const TORQUE_HEADERS: &[&str] = &["крутящий момент (%)", "torque"];

/// Column positions located from a table's header row.
#[derive(Debug, Clone, Copy)]
struct Columns {
    time: usize,
    radius: usize,
    height: usize,
    angle: usize,
    weight: Option<usize>,
    wind: Option<usize>,
    reeving: Option<usize>,
    torque: Option<usize>,
}

impl Columns {
    fn locate(headers: &csv::StringRecord) -> Result<Self, IngestError> {
        let names: Vec<String> = headers
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_lowercase())
            .collect();
        let find = |aliases: &[&str]| names.iter().position(|n| aliases.contains(&n.as_str()));

        let essentials = [TIME_HEADERS, RADIUS_HEADERS, HEIGHT_HEADERS, ANGLE_HEADERS];
        let missing: Vec<String> = essentials
            .into_iter()
            .filter(|aliases| find(*aliases).is_none())
            .map(|aliases| aliases[0].to_string())
            .collect();

        match (
            find(TIME_HEADERS),
            find(RADIUS_HEADERS),
            find(HEIGHT_HEADERS),
            find(ANGLE_HEADERS),
        ) {
            (Some(time), Some(radius), Some(height), Some(angle)) => Ok(Self {
                time,
                radius,
                height,
                angle,
                weight: find(WEIGHT_HEADERS),
                wind: find(WIND_HEADERS),
                reeving: find(REEVING_HEADERS),
                torque: find(TORQUE_HEADERS),
            }),
            _ => Err(IngestError::MissingColumns(missing)),
        }
    }

    fn read(&self, row: &csv::StringRecord) -> RawRecord {
        let cell = |index: Option<usize>| {
            index
                .and_then(|i| row.get(i))
                .filter(|c| !c.is_empty())
                .map(|c| Value::String(c.to_string()))
        };

        RawRecord {
            time: cell(Some(self.time)),
            radius: cell(Some(self.radius)),
            height: cell(Some(self.height)),
            angle: cell(Some(self.angle)),
            weight: cell(self.weight),
            wind: cell(self.wind),
            reeving: cell(self.reeving),
            torque: cell(self.torque),
        }
    }
}

/// Picks the most frequent of `;`, tab and `,` in the header line.
fn sniff_delimiter(header: &str) -> u8 {
    [b';', b'\t', b',']
        .into_iter()
        .max_by_key(|&d| header.bytes().filter(|&b| b == d).count())
        .filter(|&d| header.as_bytes().contains(&d))
        .unwrap_or(b',')
}

fn parse_table(text: &str) -> Result<(Vec<Record>, usize), IngestError> {
    let header = text.lines().find(|l| !l.trim().is_empty()).unwrap_or_default();
    let delimiter = sniff_delimiter(header);
    debug!(delimiter = %(delimiter as char).escape_default(), "reading history table");

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.trim_start().as_bytes());
    let columns = Columns::locate(reader.headers()?)?;

    let mut records = Vec::new();
    let mut total = 0;
    for (row, result) in reader.records().enumerate() {
        let row_record = result?;
        if row_record.iter().all(str::is_empty) {
            continue;
        }
        total += 1;
        match columns.read(&row_record).into_record() {
            Some(record) => records.push(record),
            // +2: one for the header, one for 1-based numbering
            None => warn!(row = row + 2, "skipping row with missing or invalid essentials"),
        }
    }
    Ok((records, total))
}

// ============================================================================
// JSON
// ============================================================================

fn parse_json(text: &str) -> Result<(Vec<Record>, usize), IngestError> {
    let rows: Vec<Value> = if text.trim_start().starts_with('[') {
        serde_json::from_str(text)?
    } else {
        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line).map_err(|source| IngestError::Line {
                    line: i + 1,
                    source,
                })
            })
            .collect::<Result<_, _>>()?
    };

    let total = rows.len();
    let mut records = Vec::with_capacity(total);
    for (row, value) in rows.into_iter().enumerate() {
        match RawRecord::deserialize(&value).ok().and_then(RawRecord::into_record) {
            Some(record) => records.push(record),
            None => warn!(row, "skipping row with missing or invalid essentials"),
        }
    }
    Ok((records, total))
}

/// Parses a JSON array, JSON-lines or delimited-table document.
pub fn parse_str(text: &str) -> Result<Ingested, IngestError> {
    let text = text.trim_start_matches('\u{feff}');
    let (records, total) = match text.trim_start().chars().next() {
        Some('[') | Some('{') => parse_json(text)?,
        Some(_) => parse_table(text)?,
        None => (Vec::new(), 0),
    };

    let skipped = total - records.len();
    let records = RecordSequence::new(records)?;
    info!(records = records.len(), skipped, "history ingested");

    Ok(Ingested { records, skipped })
}

/// Reads and parses a history file.
pub fn load_file(path: impl AsRef<Path>) -> Result<Ingested, IngestError> {
    let text = std::fs::read_to_string(path)?;
    parse_str(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_json_array() {
        let text = r#"[
            {"time": 2000, "radius": 20, "height": 10, "angle": 90, "weight": 1.5, "reeving": 2},
            {"time": 1000, "radius": "18,5", "height": "9.5", "angle": 45}
        ]"#;
        let ingested = parse_str(text).unwrap();

        assert_eq!(ingested.skipped, 0);
        let records = ingested.records.records();
        assert_eq!(records[0].radius, 18.5);
        assert_eq!(records[0].reeving, 1);
        assert_eq!(records[1].relative_millis, 1000);
        assert_eq!(records[1].weight, Some(1.5));
        assert_eq!(records[1].reeving, 2);
    }

    #[test]
    fn test_parse_json_lines_skips_bad_rows() {
        let text = concat!(
            "{\"time\": 0, \"radius\": 10, \"height\": 5, \"angle\": 0}\n",
            "\n",
            "{\"time\": 500, \"radius\": 10, \"angle\": 0}\n",
            "{\"time\": \"later\", \"radius\": 10, \"height\": 5, \"angle\": 0}\n",
            "[1, 2]\n",
            "{\"timestamp\": 1000, \"radius\": 11, \"height\": 5, \"angle\": 3, \"reeving\": -2}\n",
        );
        let ingested = parse_str(text).unwrap();

        assert_eq!(ingested.records.len(), 2);
        assert_eq!(ingested.skipped, 3);
        assert_eq!(ingested.records.records()[1].reeving, 1);
    }

    #[test]
    fn test_invalid_optionals_become_none() {
        let text = r#"[{"time": 0, "radius": 1, "height": 1, "angle": 1, "weight": "n/a", "wind": null}]"#;
        let ingested = parse_str(text).unwrap();
        let record = &ingested.records.records()[0];
        assert_eq!(record.weight, None);
        assert_eq!(record.wind, None);
    }

    #[test]
    fn test_broken_line_reports_position() {
        let err = parse_str("{\"time\": 0}\n{oops\n").unwrap_err();
        assert!(matches!(err, IngestError::Line { line: 2, .. }));
    }

    #[test]
    fn test_datetime_strings_are_utc() {
        assert_eq!(parse_time_str("2024-01-01 00:00:01"), Some(1_704_067_201_000));
        assert_eq!(parse_time_str("2024-01-01T00:00:00.250"), Some(1_704_067_200_250));
        assert_eq!(parse_time_str("2024-01-01T00:00:00Z"), Some(1_704_067_200_000));
        assert_eq!(parse_time_str("2024-01-01T03:00:00+03:00"), Some(1_704_067_200_000));
        assert_eq!(parse_time_str("2024-01-01 00:01"), Some(1_704_067_260_000));
        assert_eq!(parse_time_str("2024-01-02"), Some(1_704_153_600_000));
        assert_eq!(parse_time_str(" 1500 "), Some(1_500));
        assert_eq!(parse_time_str("yesterday"), None);
    }

    #[test]
    fn test_json_rows_accept_datetime_strings() {
        let text = r#"[
            {"time": "2024-01-01 00:00:05", "radius": 20, "height": 10, "angle": 90},
            {"time": "2024-01-01T00:00:00Z", "radius": 20, "height": 10, "angle": 90}
        ]"#;
        let ingested = parse_str(text).unwrap();

        let records = ingested.records.records();
        assert_eq!(records[0].timestamp_millis, 1_704_067_200_000);
        assert_eq!(records[1].relative_millis, 5_000);
    }

    #[test]
    fn test_parse_crane_log_table() {
        let text = concat!(
            "Время;Амплитуда (м);Высота (м);Поворот (°);Вес (т);Скорость ветра;Запасовка (кр.);Крутящий момент (%)\n",
            "2024-01-01 00:00:02;23,5;18;140;1,8;4,1;2;35\n",
            "2024-01-01 00:00:00;20;17,5;135;;3,9;2;\n",
            ";;;;;;;\n",
            "2024-01-01 00:00:04;;18;140;1,8;4,1;2;35\n",
        );
        let ingested = parse_str(text).unwrap();

        assert_eq!(ingested.records.len(), 2);
        assert_eq!(ingested.skipped, 1);

        let records = ingested.records.records();
        assert_eq!(records[0].timestamp_millis, 1_704_067_200_000);
        assert_eq!(records[0].height, 17.5);
        assert_eq!(records[0].weight, None);
        assert_eq!(records[0].torque, None);
        assert_eq!(records[1].relative_millis, 2_000);
        assert_eq!(records[1].radius, 23.5);
        assert_eq!(records[1].weight, Some(1.8));
        assert_eq!(records[1].wind, Some(4.1));
        assert_eq!(records[1].reeving, 2);
        assert_eq!(records[1].torque, Some(35.0));
    }

    #[test]
    fn test_comma_separated_table_without_optional_columns() {
        let text = "time,radius,height,angle\n1000,12.5,8,30\n0,12,8,25\n";
        let ingested = parse_str(text).unwrap();

        let records = ingested.records.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].radius, 12.0);
        assert_eq!(records[1].relative_millis, 1_000);
        assert_eq!(records[1].reeving, 1);
    }

    #[test]
    fn test_table_missing_essential_columns() {
        let err = parse_str("время;высота (м);вес (т)\n2024-01-01 00:00:00;10;1\n").unwrap_err();
        match err {
            IngestError::MissingColumns(missing) => {
                assert_eq!(missing, vec!["амплитуда (м)", "поворот (°)"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"time": 10, "radius": 3, "height": 4, "angle": 5}}"#).unwrap();

        let ingested = load_file(file.path()).unwrap();
        assert_eq!(ingested.records.len(), 1);
    }

    #[test]
    fn test_load_table_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "время;амплитуда (м);высота (м);поворот (°)").unwrap();
        writeln!(file, "2024-01-01 08:00:00;15;12;90").unwrap();

        let ingested = load_file(file.path()).unwrap();
        assert_eq!(ingested.records.len(), 1);
        assert_eq!(ingested.records.records()[0].timestamp_millis, 1_704_096_000_000);
    }

    #[test]
    fn test_missing_file() {
        let err = load_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, IngestError::Io(_)));
    }
}
