//! Track aggregation: pack the time-ordered entry sequence into horizontal
//! tracks, one per operation lane, merging adjacent compatible entries and
//! ordering lanes by how much total time they cover.

use indexmap::IndexMap;
use shared::{EntrySource, LogEntry};

use crate::error::SemanticError;

/// One drawn box on a track. Spans `[start, end]` and remembers enough of
/// its source entries to answer hover and search queries.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackEntry {
    pub start: f64,
    pub end: f64,
    pub path: String,
    pub pid: i64,
    pub tid: i64,
    pub process_name: String,
    pub detail: String,
    pub source: EntrySource,
    /// Set by the active search; dimmed but still hoverable.
    pub hidden_by_search: bool,
}

impl TrackEntry {
    fn from_log(entry: &LogEntry) -> Self {
        TrackEntry {
            start: entry.start,
            end: entry.end(),
            path: entry.path.clone(),
            pid: entry.pid,
            tid: entry.tid,
            process_name: entry.process_name.clone(),
            detail: entry.detail.clone(),
            source: entry.source,
            hidden_by_search: false,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Whether a later entry may be folded into this box instead of
    /// opening a new track. Trace entries merge when they concern the same
    /// file and thread; profiler markers only when they are repeats of the
    /// exact same detail.
    fn can_merge(&self, entry: &LogEntry) -> bool {
        if self.path != entry.path || self.pid != entry.pid || self.tid != entry.tid {
            return false;
        }
        match self.source {
            EntrySource::Trace => true,
            EntrySource::Profiler => self.detail == entry.detail,
        }
    }

    fn merge(&mut self, entry: &LogEntry) {
        self.end = self.end.max(entry.end());
        if self.source == EntrySource::Trace && !entry.detail.is_empty() {
            if self.detail.is_empty() {
                self.detail = entry.detail.clone();
            } else {
                self.detail.push('\n');
                self.detail.push_str(&entry.detail);
            }
        }
    }
}

/// One horizontal lane: an operation name and its non-overlapping boxes.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub operation: String,
    pub source: EntrySource,
    pub entries: Vec<TrackEntry>,
    /// Row index after sorting; drives vertical placement.
    pub index: usize,
}

impl Track {
    pub fn total_duration(&self) -> f64 {
        self.entries.iter().map(TrackEntry::duration).sum()
    }
}

/// The aggregated timeline.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub tracks: Vec<Track>,
    pub min_time: f64,
    pub max_time: f64,
}

impl Aggregation {
    pub fn time_span(&self) -> f64 {
        self.max_time - self.min_time
    }
}

/// Build tracks from entries already sorted by start time.
///
/// Every entry lands on a track of its operation: on the first such track
/// whose last box ends before the entry starts (reuse), inside a touching
/// compatible box (merge), or on a brand-new track. Tracks are then sorted
/// by descending covered time, with profiler lanes after trace lanes.
pub fn aggregate(entries: &[LogEntry]) -> Result<Aggregation, SemanticError> {
    let mut tracks_by_operation: IndexMap<String, Vec<Track>> = IndexMap::new();
    let mut min_time = f64::INFINITY;
    let mut max_time = f64::NEG_INFINITY;
    let mut previous_start = f64::NEG_INFINITY;

    for (index, entry) in entries.iter().enumerate() {
        if entry.start < previous_start {
            return Err(SemanticError::UnorderedData {
                index,
                start: entry.start,
                previous: previous_start,
            });
        }
        previous_start = entry.start;
        min_time = min_time.min(entry.start);
        max_time = max_time.max(entry.end());

        let tracks = tracks_by_operation.entry(entry.operation.clone()).or_default();
        let mut placed = false;
        for track in tracks.iter_mut() {
            // Entries arrive start-ordered, so only the last box can touch.
            let last = match track.entries.last_mut() {
                Some(last) => last,
                None => continue,
            };
            if entry.start > last.end {
                track.entries.push(TrackEntry::from_log(entry));
                placed = true;
                break;
            }
            if last.can_merge(entry) {
                last.merge(entry);
                placed = true;
                break;
            }
        }
        if !placed {
            tracks.push(Track {
                operation: entry.operation.clone(),
                source: entry.source,
                entries: vec![TrackEntry::from_log(entry)],
                index: 0,
            });
        }
    }

    let totals_by_operation: IndexMap<String, f64> = tracks_by_operation
        .iter()
        .map(|(operation, tracks)| {
            (operation.clone(), tracks.iter().map(Track::total_duration).sum())
        })
        .collect();

    let mut tracks: Vec<Track> = tracks_by_operation.into_values().flatten().collect();
    // Ranked by the operation's cumulative time, so overflow lanes of one
    // operation stay adjacent; the stable sort keeps their relative order.
    tracks.sort_by(|a, b| {
        let a_profiler = a.source == EntrySource::Profiler;
        let b_profiler = b.source == EntrySource::Profiler;
        a_profiler.cmp(&b_profiler).then_with(|| {
            let a_total = totals_by_operation.get(&a.operation).copied().unwrap_or(0.0);
            let b_total = totals_by_operation.get(&b.operation).copied().unwrap_or(0.0);
            b_total.partial_cmp(&a_total).unwrap_or(std::cmp::Ordering::Equal)
        })
    });
    for (index, track) in tracks.iter_mut().enumerate() {
        track.index = index;
    }

    if tracks.is_empty() {
        min_time = 0.0;
        max_time = 0.0;
    }
    Ok(Aggregation { tracks, min_time, max_time })
}
