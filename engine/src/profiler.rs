//! Sampling-profiler JSON input: per-thread parallel marker arrays, a
//! string table, a module list and a category name table.

use log::warn;
use serde::Deserialize;
use shared::{
    EntrySource, LogEntry, FILE_IO_MARKER, MIN_EVENT_DURATION_SECS, PROFILER_MARKER_PREFIX,
};
use std::collections::HashMap;

use crate::error::FormatError;

/// Fallback process name for profiles that carry no per-thread name.
const DEFAULT_PROCESS_NAME: &str = "firefox.exe";

#[derive(Deserialize, Debug, Default)]
pub struct Profile {
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub threads: Vec<Thread>,
}

#[derive(Deserialize, Debug, Default)]
pub struct Meta {
    #[serde(default)]
    pub categories: Vec<Category>,
}

#[derive(Deserialize, Debug)]
pub struct Category {
    pub name: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct Thread {
    #[serde(default)]
    pub pid: i64,
    #[serde(default)]
    pub tid: i64,
    /// Thread name ("GeckoMain", "Compositor", ...).
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "processName")]
    pub process_name: String,
    #[serde(default)]
    pub libs: Vec<Lib>,
    #[serde(default, rename = "stringArray")]
    pub string_array: Vec<String>,
    #[serde(default)]
    pub markers: MarkerTable,
}

/// Parallel arrays; `time` is milliseconds relative to process start.
#[derive(Deserialize, Debug, Default)]
pub struct MarkerTable {
    #[serde(default)]
    pub time: Vec<f64>,
    #[serde(default)]
    pub name: Vec<usize>,
    #[serde(default)]
    pub category: Vec<usize>,
    #[serde(default)]
    pub data: Vec<Option<MarkerData>>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct MarkerData {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default, rename = "startTime")]
    pub start_time: Option<f64>,
    #[serde(default, rename = "endTime")]
    pub end_time: Option<f64>,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Lib {
    #[serde(default)]
    pub path: String,
    #[serde(default, rename = "debugName")]
    pub debug_name: String,
    #[serde(default, rename = "breakpadId")]
    pub breakpad_id: String,
}

pub fn parse_profile(text: &str) -> Result<Profile, FormatError> {
    Ok(serde_json::from_str(text)?)
}

impl Profile {
    /// Human-readable process name for a PID, if the profile knows one.
    pub fn process_name_for(&self, pid: i64) -> Option<&str> {
        self.threads
            .iter()
            .find(|t| t.pid == pid && !t.process_name.is_empty())
            .map(|t| t.process_name.as_str())
    }

    /// Thread name for a TID, if the profile knows one.
    pub fn thread_name_for(&self, tid: i64) -> Option<&str> {
        self.threads
            .iter()
            .find(|t| t.tid == tid && !t.name.is_empty())
            .map(|t| t.name.as_str())
    }
}

/// Duration in seconds for a non-tracing marker: the interval payload when
/// it is positive and finite, the instantaneous floor otherwise.
fn marker_duration(data: Option<&MarkerData>) -> f64 {
    let Some(data) = data else {
        return MIN_EVENT_DURATION_SECS;
    };
    match (data.start_time, data.end_time) {
        (Some(start), Some(end)) => {
            let candidate_ms = end - start;
            if candidate_ms > 0.0 && candidate_ms.is_finite() {
                candidate_ms / 1000.0
            } else {
                MIN_EVENT_DURATION_SECS
            }
        }
        _ => MIN_EVENT_DURATION_SECS,
    }
}

/// Convert every thread's markers into normalized log entries, anchored at
/// `process_start_time` (absolute seconds).
///
/// Tracing-interval markers are paired rather than emitted individually:
/// a `start` pushes its marker index on a per-name pending stack and the
/// matching `end` pops the most recent start (last-start-first-matched)
/// and emits one marker spanning the pair. An `end` with no pending start
/// is dropped with a warning.
pub fn extract_markers(profile: &Profile, process_start_time: f64) -> Vec<LogEntry> {
    let mut result = Vec::new();

    for thread in &profile.threads {
        let markers = &thread.markers;
        let mut pending_tracing: HashMap<&str, Vec<usize>> = HashMap::new();
        let process_name = if thread.process_name.is_empty() {
            DEFAULT_PROCESS_NAME
        } else {
            &thread.process_name
        };

        for i in 0..markers.time.len() {
            let profile_time = markers.time[i] / 1000.0;

            let Some(name) = markers
                .name
                .get(i)
                .and_then(|&idx| thread.string_array.get(idx))
                .map(String::as_str)
            else {
                warn!("marker {i} on tid {} has no name entry", thread.tid);
                continue;
            };
            let Some(category) = markers
                .category
                .get(i)
                .and_then(|&idx| profile.meta.categories.get(idx))
            else {
                warn!("marker {name:?} on tid {} has no category entry", thread.tid);
                continue;
            };
            let operation = format!("{PROFILER_MARKER_PREFIX}{}", category.name);
            let data = markers.data.get(i).and_then(Option::as_ref);

            if let Some(data) = data.filter(|d| d.kind.as_deref() == Some("tracing")) {
                match data.interval.as_deref() {
                    Some("start") => {
                        pending_tracing.entry(name).or_default().push(i);
                    }
                    Some("end") => {
                        let started = pending_tracing.get_mut(name).and_then(Vec::pop);
                        let Some(start_index) = started else {
                            warn!("tracing end marker {name:?} has no pending start");
                            continue;
                        };
                        let start_time = markers.time[start_index] / 1000.0;
                        result.push(LogEntry {
                            operation,
                            path: String::new(),
                            pid: thread.pid,
                            tid: thread.tid,
                            process_name: process_name.to_string(),
                            thread_name: thread.name.clone(),
                            start: start_time + process_start_time,
                            duration: profile_time - start_time,
                            detail: name.to_string(),
                            stack: None,
                            source: EntrySource::Profiler,
                        });
                    }
                    other => {
                        warn!("bad interval on tracing marker: {other:?}");
                    }
                }
                continue;
            }

            let path = if name == FILE_IO_MARKER {
                data.and_then(|d| d.filename.clone()).unwrap_or_default()
            } else {
                String::new()
            };

            result.push(LogEntry {
                operation,
                path,
                pid: thread.pid,
                tid: thread.tid,
                process_name: process_name.to_string(),
                thread_name: thread.name.clone(),
                start: profile_time + process_start_time,
                duration: marker_duration(data),
                detail: name.to_string(),
                stack: None,
                source: EntrySource::Profiler,
            });
        }
    }
    result
}
