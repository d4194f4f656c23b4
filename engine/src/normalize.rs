//! Normalization of parsed trace rows into the shared [`LogEntry`] model:
//! wall-clock time parsing, duration flooring, anchor discovery for
//! profiler-relative timestamps and name backfill from a loaded profile.

use std::sync::LazyLock;

use regex::Regex;
use shared::{
    CellValue, EntrySource, LogEntry, Row, CONTENT_PROCESS_MARKER, MIN_EVENT_DURATION_SECS,
    PROCESS_START_OP,
};

use crate::error::FormatError;
use crate::procmon_xml::RawEvent;
use crate::profiler::Profile;

const COL_TIME: &str = "Time of Day";
const COL_OPERATION: &str = "Operation";
const COL_PATH: &str = "Path";
const COL_PID: &str = "PID";
const COL_TID: &str = "TID";
const COL_PROCESS_NAME: &str = "Process Name";
const COL_DETAIL: &str = "Detail";
const COL_DURATION: &str = "Duration";

static TIME_OF_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]+):([0-9]+):([0-9.]+)").unwrap());

/// Parse a wall-clock timestamp (`H:MM:SS.fraction`, AM/PM suffix ignored)
/// into seconds since midnight.
pub fn parse_time_of_day(raw: &str) -> Result<f64, FormatError> {
    let captures = TIME_OF_DAY
        .captures(raw)
        .ok_or_else(|| FormatError::Time(raw.to_string()))?;
    let hours = captures[1]
        .parse::<f64>()
        .map_err(|_| FormatError::Time(raw.to_string()))?;
    let minutes = captures[2]
        .parse::<f64>()
        .map_err(|_| FormatError::Time(raw.to_string()))?;
    let seconds = captures[3]
        .parse::<f64>()
        .map_err(|_| FormatError::Time(raw.to_string()))?;
    Ok(hours * 3600.0 + minutes * 60.0 + seconds)
}

fn cell_text(row: &Row, key: &str) -> String {
    row.get(key).map(CellValue::to_display_string).unwrap_or_default()
}

fn cell_integer(row: &Row, key: &str) -> i64 {
    match row.get(key) {
        Some(CellValue::Number(n)) => *n as i64,
        Some(CellValue::Text(s)) => s.trim().parse::<i64>().unwrap_or(0),
        None => 0,
    }
}

fn cell_float(row: &Row, key: &str) -> Option<f64> {
    match row.get(key)? {
        CellValue::Number(n) => Some(*n),
        CellValue::Text(s) => s.trim().parse::<f64>().ok(),
    }
}

/// Convert one row into an entry, or `None` for rows the timeline drops:
/// zero-length operations that are not process launches.
fn entry_from_row(row: &Row) -> Result<Option<LogEntry>, FormatError> {
    let time_text = row
        .get(COL_TIME)
        .map(CellValue::to_display_string)
        .ok_or(FormatError::MissingColumn(COL_TIME))?;
    if !row.contains_key(COL_OPERATION) {
        return Err(FormatError::MissingColumn(COL_OPERATION));
    }
    let start = parse_time_of_day(&time_text)?;

    let operation = cell_text(row, COL_OPERATION);
    // A missing or unparseable duration is not the same as a recorded zero:
    // it falls through the finiteness check and gets the display floor.
    let mut duration = cell_float(row, COL_DURATION).unwrap_or(f64::NAN);
    if !duration.is_finite() {
        duration = MIN_EVENT_DURATION_SECS;
    }
    if duration <= 0.0 {
        if operation != PROCESS_START_OP {
            return Ok(None);
        }
        duration = MIN_EVENT_DURATION_SECS;
    }

    Ok(Some(LogEntry {
        operation,
        path: cell_text(row, COL_PATH),
        pid: cell_integer(row, COL_PID),
        tid: cell_integer(row, COL_TID),
        process_name: cell_text(row, COL_PROCESS_NAME),
        thread_name: String::new(),
        start,
        duration,
        detail: cell_text(row, COL_DETAIL),
        stack: None,
        source: EntrySource::Trace,
    }))
}

/// Normalize header-keyed rows from the delimited-text parser.
pub fn normalize_rows(rows: &[Row]) -> Result<Vec<LogEntry>, FormatError> {
    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(entry) = entry_from_row(row)? {
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// Normalize structured events, carrying their stacks across.
pub fn normalize_events(events: Vec<RawEvent>) -> Result<Vec<LogEntry>, FormatError> {
    let mut entries = Vec::with_capacity(events.len());
    for event in events {
        if let Some(mut entry) = entry_from_row(&event.fields)? {
            entry.stack = event.stack;
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// Absolute start time to anchor profiler-relative timestamps on.
///
/// The profiler clock starts when the instrumented parent process launches,
/// which is the process-launch entry immediately preceding the first child
/// launch (detail contains the content-process marker). Falls back to the
/// first process launch, then to the first entry.
pub fn profiler_anchor_time(entries: &[LogEntry]) -> Option<f64> {
    let child_index = entries
        .iter()
        .position(|e| e.detail.contains(CONTENT_PROCESS_MARKER));
    if let Some(index) = child_index {
        if let Some(anchor) = entries[..index]
            .iter()
            .rev()
            .find(|e| e.operation == PROCESS_START_OP)
        {
            return Some(anchor.start);
        }
    }
    entries
        .iter()
        .find(|e| e.operation == PROCESS_START_OP)
        .or_else(|| entries.first())
        .map(|e| e.start)
}

/// Backfill process and thread names on trace entries from a loaded
/// profile's thread metadata. Existing names are kept.
pub fn apply_profile_names(entries: &mut [LogEntry], profile: &Profile) {
    for entry in entries {
        if entry.process_name.is_empty() {
            if let Some(name) = profile.process_name_for(entry.pid) {
                entry.process_name = name.to_string();
            }
        }
        if entry.thread_name.is_empty() {
            if let Some(name) = profile.thread_name_for(entry.tid) {
                entry.thread_name = name.to_string();
            }
        }
    }
}

/// Sort the merged entry sequence by start time, keeping input order for
/// ties. NaN starts cannot occur after normalization.
pub fn sort_by_start(entries: &mut [LogEntry]) {
    entries.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap_or(std::cmp::Ordering::Equal));
}
