use indexmap::IndexMap;
use serde::{Serialize, Deserialize};

// ===== MODEL CONSTANTS =====

/// Floor applied to every event whose duration is unknown, non-finite or
/// computed as non-positive. Keeps "instantaneous" markers visible.
pub const MIN_EVENT_DURATION_SECS: f64 = 0.01;

/// Placeholder location for stack frames that have not been symbolicated.
pub const UNSYMBOLICATED: &str = "<unsymbolicated>";

/// Operation label of the process-launch trace row. Always retained even
/// when its duration is zero, because it anchors the timeline start.
pub const PROCESS_START_OP: &str = "Process Start";

/// Operation label of file-read trace rows; feeds the disk-map aggregates.
pub const READ_OP: &str = "ReadFile";

/// Prefix put in front of the category name for profiler-sourced markers.
pub const PROFILER_MARKER_PREFIX: &str = "ProfilerMarker - ";

/// Marker name whose payload carries a filename worth surfacing as a path.
pub const FILE_IO_MARKER: &str = "FileIO";

/// Substring in a process launch detail that identifies a content child
/// process. The process-start entry immediately preceding the first launch
/// containing this marker anchors profiler-relative timestamps.
pub const CONTENT_PROCESS_MARKER: &str = "-contentproc";

// ===== CELL VALUES =====

/// A parsed cell from any of the tabular inputs.
///
/// Both the CSV parser and the structured-event parser coerce through
/// [`CellValue::coerce`] so the numeric-vs-string decision is made in exactly
/// one place.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Coerce raw cell text: values matching `^[0-9][0-9.]*$` become
    /// numbers, everything else (including the empty string) stays text.
    pub fn coerce(raw: &str) -> CellValue {
        let mut chars = raw.chars();
        let numeric = matches!(chars.next(), Some(c) if c.is_ascii_digit())
            && chars.all(|c| c.is_ascii_digit() || c == '.');
        if numeric {
            if let Ok(value) = raw.parse::<f64>() {
                return CellValue::Number(value);
            }
        }
        CellValue::Text(raw.to_string())
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Number(_) => None,
            CellValue::Text(s) => Some(s),
        }
    }

    /// Display form used when concatenating details and building tooltips.
    pub fn to_display_string(&self) -> String {
        match self {
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            CellValue::Text(s) => s.clone(),
        }
    }
}

/// A row from a tabular input: header name → coerced cell value, in header
/// order.
pub type Row = IndexMap<String, CellValue>;

// ===== CORE DATA TYPES =====

/// One frame of a captured call stack, post-parse.
///
/// `address` is relative to the module load base when the resolving XML
/// variant produced it, absolute otherwise.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StackFrame {
    pub location: String,
    pub module_path: String,
    pub address: u64,
}

impl StackFrame {
    pub fn unsymbolicated(module_path: String, address: u64) -> Self {
        StackFrame {
            location: UNSYMBOLICATED.to_string(),
            module_path,
            address,
        }
    }

    pub fn is_symbolicated(&self) -> bool {
        self.location != UNSYMBOLICATED
    }
}

/// Where a log entry came from. Profiler-sourced entries merge and sort
/// under different rules than raw trace rows.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySource {
    Trace,
    Profiler,
}

/// A normalized timed event, the common currency between all parsers and
/// the track aggregator. `start` is absolute seconds; `end = start + duration`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub operation: String,
    pub path: String,
    pub pid: i64,
    pub tid: i64,
    pub process_name: String,
    pub thread_name: String,
    pub start: f64,
    pub duration: f64,
    pub detail: String,
    pub stack: Option<Vec<StackFrame>>,
    pub source: EntrySource,
}

impl LogEntry {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

impl Default for LogEntry {
    fn default() -> Self {
        LogEntry {
            operation: String::new(),
            path: String::new(),
            pid: 0,
            tid: 0,
            process_name: String::new(),
            thread_name: String::new(),
            start: 0.0,
            duration: 0.0,
            detail: String::new(),
            stack: None,
            source: EntrySource::Trace,
        }
    }
}

// ===== DISK EXTENTS =====

/// Marker value for extents that cover virtual space without any physical
/// backing (sparse or compressed regions). They consume virtual clusters
/// but must never be drawn.
pub const UNMAPPED_LCN: i64 = -1;

/// One run of physical disk clusters backing a contiguous virtual-cluster
/// range of a file.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub lcn: i64,
    pub length: u64,
}

impl Extent {
    /// `-1` is the usual unmapped marker, but any negative cluster number
    /// has no physical backing.
    pub fn is_mapped(&self) -> bool {
        self.lcn >= 0
    }
}

/// Full extent mapping of the scanned volume: path → ordered extent list.
/// Insertion order matches the input file and is part of the contract.
pub type ExtentMap = IndexMap<String, Vec<Extent>>;

// ===== CONFIG TYPES =====

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct AppConfig {
    pub app: AppSection,
    pub ui: UiSection,
    pub viewer: ViewerSection,
}

// AppSection carries configuration metadata, primarily for versioning and
// migration when the AppConfig format changes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AppSection {
    pub version: String,
}

impl AppSection {
    /// Current configuration format version
    pub const CURRENT_VERSION: &'static str = "1.0.0";

    /// Check if this config version is supported
    pub fn is_supported_version(&self) -> bool {
        matches!(self.version.as_str(), "1.0.0")
    }

    /// Check if this config needs migration to current version
    pub fn needs_migration(&self) -> bool {
        self.version != Self::CURRENT_VERSION
    }

    /// Get migration path for unsupported versions
    pub fn get_migration_strategy(&self) -> MigrationStrategy {
        match self.version.as_str() {
            "1.0.0" => MigrationStrategy::None,
            // Future versions would be handled here:
            // "1.0.0" => MigrationStrategy::Upgrade("1.0.0 -> 1.1.0"),
            _ => MigrationStrategy::Recreate,
        }
    }
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MigrationStrategy {
    None,                    // No migration needed
    Upgrade(String),         // Automatic upgrade with description
    Recreate,                // Unknown version, create new config
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UiSection {
    pub theme: String,
}

impl Default for UiSection {
    fn default() -> Self {
        Self {
            theme: "light".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ViewerSection {
    /// Delay before a coalesced full redraw after rapid input.
    pub redraw_debounce_ms: u64,
    /// Delay before repositioning timeline indicator labels.
    pub indicator_debounce_ms: u64,
}

impl Default for ViewerSection {
    fn default() -> Self {
        Self {
            redraw_debounce_ms: 250,
            indicator_debounce_ms: 10,
        }
    }
}

// ===== UTILITY FUNCTIONS =====

/// Case-insensitive substring match over the searchable fields of an entry:
/// path, stringified PID, process name and detail.
pub fn entry_matches_filter(entry: &LogEntry, filter: &str) -> bool {
    if filter.is_empty() {
        return true;
    }
    let needle = filter.to_lowercase();
    entry.path.to_lowercase().contains(&needle)
        || entry.pid.to_string().contains(&needle)
        || entry.process_name.to_lowercase().contains(&needle)
        || entry.detail.to_lowercase().contains(&needle)
}

pub fn filter_entries<'a>(entries: &'a [LogEntry], filter: &str) -> Vec<&'a LogEntry> {
    entries
        .iter()
        .filter(|entry| entry_matches_filter(entry, filter))
        .collect()
}

/// Trailing component of a backslash- or slash-separated module path,
/// lowercased. Used both for symbolication memory maps and display.
pub fn module_basename(path: &str) -> String {
    let lower = path.to_lowercase();
    lower
        .rsplit(['\\', '/'])
        .next()
        .unwrap_or(&lower)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_coercion() {
        assert_eq!(CellValue::coerce("12"), CellValue::Number(12.0));
        assert_eq!(CellValue::coerce("3.14"), CellValue::Number(3.14));
        assert_eq!(CellValue::coerce("12a"), CellValue::Text("12a".to_string()));
        assert_eq!(CellValue::coerce(""), CellValue::Text(String::new()));
        assert_eq!(CellValue::coerce(".5"), CellValue::Text(".5".to_string()));
        assert_eq!(CellValue::coerce("-3"), CellValue::Text("-3".to_string()));
    }

    #[test]
    fn test_entry_end() {
        let entry = LogEntry {
            start: 2.5,
            duration: 0.5,
            ..Default::default()
        };
        assert_eq!(entry.end(), 3.0);
    }

    #[test]
    fn test_filter_matches_pid_and_path() {
        let entry = LogEntry {
            operation: READ_OP.to_string(),
            path: "C:\\Windows\\System32\\xul.dll".to_string(),
            pid: 4242,
            process_name: "firefox.exe".to_string(),
            detail: "Offset: 0, Length: 4096".to_string(),
            ..Default::default()
        };
        assert!(entry_matches_filter(&entry, "XUL"));
        assert!(entry_matches_filter(&entry, "4242"));
        assert!(entry_matches_filter(&entry, "FireFox"));
        assert!(entry_matches_filter(&entry, "length"));
        assert!(!entry_matches_filter(&entry, "chrome"));
        assert!(entry_matches_filter(&entry, ""));
    }

    #[test]
    fn test_module_basename() {
        assert_eq!(module_basename("C:\\Windows\\System32\\XUL.dll"), "xul.dll");
        assert_eq!(module_basename("/usr/lib/libxul.so"), "libxul.so");
        assert_eq!(module_basename("bare.dll"), "bare.dll");
    }

    #[test]
    fn test_config_toml_round_trip() {
        let config = AppConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let restored: AppConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(config, restored);
        assert!(restored.app.is_supported_version());
        assert!(!restored.app.needs_migration());
    }

    #[test]
    fn test_unknown_config_version_recreates() {
        let section = AppSection {
            version: "0.0.1".to_string(),
        };
        assert!(!section.is_supported_version());
        assert_eq!(section.get_migration_strategy(), MigrationStrategy::Recreate);
    }

    #[test]
    fn test_extent_mapped_flag() {
        assert!(Extent { lcn: 100, length: 10 }.is_mapped());
        assert!(!Extent { lcn: UNMAPPED_LCN, length: 10 }.is_mapped());
    }
}
