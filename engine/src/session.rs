//! Loading a full data session: read the selected input files, run every
//! parser, normalize and merge the entries and aggregate them into tracks.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{info, warn};
use shared::{ExtentMap, LogEntry};

use crate::aggregate::{aggregate, Aggregation};
use crate::error::LoadError;
use crate::extents::{collect_read_records, parse_diskify, ReadRecord};
use crate::normalize::{
    apply_profile_names, normalize_events, normalize_rows, profiler_anchor_time, sort_by_start,
};
use crate::procmon_xml::parse_resolving;
use crate::profiler::{extract_markers, parse_profile, Lib, Profile};
use crate::symbolicate::{symbolicate_entries, SymbolResolver};
use crate::tabular::parse_tabular;

/// Input files selected for one session. Every field is optional; an empty
/// selection produces an empty timeline.
#[derive(Debug, Clone, Default)]
pub struct SessionInputs {
    pub trace_csv: Option<PathBuf>,
    pub trace_xml: Option<PathBuf>,
    pub profile: Option<PathBuf>,
    pub diskify: Option<PathBuf>,
}

/// Everything the viewer needs after a load completes.
#[derive(Debug, Default)]
pub struct SessionData {
    /// All normalized entries, sorted by start time.
    pub entries: Vec<LogEntry>,
    pub aggregation: Aggregation,
    /// Per-path extent lists, when a diskify file was loaded and parsed.
    pub extent_map: Option<ExtentMap>,
    /// Per-path read aggregates derived from the entries.
    pub read_records: IndexMap<String, ReadRecord>,
    pub profile: Option<Profile>,
}

impl SessionData {
    /// Every library the loaded profile knows about, across all threads.
    pub fn profile_libs(&self) -> Vec<Lib> {
        self.profile
            .iter()
            .flat_map(|p| p.threads.iter())
            .flat_map(|t| t.libs.iter().cloned())
            .collect()
    }

    /// Resolve stack frames in place through the given symbol source and
    /// rebuild the dependent aggregates.
    pub async fn symbolicate<R: SymbolResolver>(&mut self, resolver: &R) {
        let libs = self.profile_libs();
        if libs.is_empty() {
            info!("no library metadata loaded, skipping symbolication");
            return;
        }
        symbolicate_entries(&mut self.entries, &libs, resolver).await;
    }
}

async fn read_input(path: &Path) -> Result<String, LoadError> {
    tokio::fs::read_to_string(path).await.map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load and merge every selected input.
///
/// A malformed trace or profile fails the whole load; a malformed diskify
/// file only disables the disk map, because the timeline is still usable
/// without extent data.
pub async fn load_session(inputs: &SessionInputs) -> Result<SessionData, LoadError> {
    let mut entries: Vec<LogEntry> = Vec::new();

    if let Some(path) = &inputs.trace_csv {
        let text = read_input(path).await?;
        let rows = parse_tabular(&text).map_err(LoadError::Format)?;
        entries.extend(normalize_rows(&rows).map_err(LoadError::Format)?);
        info!("loaded {} entries from {}", entries.len(), path.display());
    }

    if let Some(path) = &inputs.trace_xml {
        let text = read_input(path).await?;
        let events = parse_resolving(&text).map_err(LoadError::Format)?;
        let before = entries.len();
        entries.extend(normalize_events(events).map_err(LoadError::Format)?);
        info!("loaded {} entries from {}", entries.len() - before, path.display());
    }

    sort_by_start(&mut entries);

    let mut profile = None;
    if let Some(path) = &inputs.profile {
        let text = read_input(path).await?;
        let parsed = parse_profile(&text).map_err(LoadError::Format)?;
        let anchor = profiler_anchor_time(&entries).unwrap_or(0.0);
        let markers = extract_markers(&parsed, anchor);
        info!("extracted {} markers from {}", markers.len(), path.display());
        apply_profile_names(&mut entries, &parsed);
        entries.extend(markers);
        sort_by_start(&mut entries);
        profile = Some(parsed);
    }

    let mut extent_map = None;
    if let Some(path) = &inputs.diskify {
        let text = read_input(path).await?;
        match parse_diskify(&text) {
            Ok(map) => {
                info!("loaded extents for {} paths from {}", map.len(), path.display());
                extent_map = Some(map);
            }
            Err(err) => {
                warn!("disk map disabled, {}: {err}", path.display());
            }
        }
    }

    let aggregation = aggregate(&entries).map_err(LoadError::Semantic)?;
    let read_records = collect_read_records(&entries);

    Ok(SessionData {
        entries,
        aggregation,
        extent_map,
        read_records,
        profile,
    })
}
