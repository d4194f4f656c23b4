//! Disk-extent mapping: the diskify input format, the VCN→LCN range
//! mapper, and the per-path read aggregates that feed the disk map.

use std::sync::LazyLock;

use indexmap::IndexMap;
use log::debug;
use regex::Regex;
use shared::{Extent, ExtentMap, LogEntry, READ_OP};

use crate::error::FormatError;

/// Cluster size assumed when converting byte ranges to virtual clusters.
/// This is an assumption, not derived from any input; if the scanned
/// volume uses a different cluster size the disk map is systematically
/// offset. Known approximation, kept deliberately.
pub const ASSUMED_CLUSTER_SIZE: u64 = 4096;

/// Read length issued by the OS prefetcher. Reads of exactly this size are
/// excluded from the per-path aggregates so they do not skew totals.
pub const PREFETCH_READ_BYTES: u64 = 524_288;

static PATH_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[^\s]").unwrap());
static STATUS_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^  (?:OK|BAD [0-9]+)").unwrap());
static EXTENT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^    ([0-9-]+),([0-9]+)").unwrap());

/// Parse the line-oriented extent-mapping format.
///
/// An unindented line starts a new path key, a two-space status line is
/// ignored, a four-space `start,length` pair appends an extent. Anything
/// else makes the whole file unusable; the caller must treat the failure
/// as "no extent data available" rather than a crash.
pub fn parse_diskify(text: &str) -> Result<ExtentMap, FormatError> {
    let mut map: ExtentMap = IndexMap::new();
    let mut current_path: Option<String> = None;
    let mut current_extents: Vec<Extent> = Vec::new();

    for (line_number, line) in text.replace('\r', "").lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        if PATH_LINE.is_match(line) {
            if let Some(path) = current_path.take() {
                map.insert(path, std::mem::take(&mut current_extents));
            }
            current_path = Some(line.to_string());
        } else if let Some(captures) = EXTENT_LINE.captures(line) {
            let lcn = captures[1].parse::<i64>().map_err(|_| FormatError::ExtentLine {
                line: line_number,
                text: line.to_string(),
            })?;
            let length = captures[2].parse::<u64>().map_err(|_| FormatError::ExtentLine {
                line: line_number,
                text: line.to_string(),
            })?;
            current_extents.push(Extent { lcn, length });
        } else if !STATUS_LINE.is_match(line) {
            return Err(FormatError::ExtentLine {
                line: line_number,
                text: line.to_string(),
            });
        }
    }

    if let Some(path) = current_path {
        if !current_extents.is_empty() {
            map.insert(path, current_extents);
        }
    }
    Ok(map)
}

/// A physically-backed run of disk clusters produced by the mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterRange {
    pub lcn: u64,
    pub length: u64,
}

/// Translate a file-relative virtual-cluster range into physical cluster
/// runs by walking the file's extent list.
///
/// Unmapped (`lcn == -1`) extents consume virtual space but emit nothing,
/// so the emitted lengths sum to the requested length minus any virtual
/// regions it crosses. Stops when the request is consumed or the extents
/// are exhausted.
pub fn map_virtual_range(extents: &[Extent], start_vcn: u64, length: u64) -> Vec<ClusterRange> {
    let mut ranges = Vec::new();
    let mut vcn_cursor: u64 = 0;
    let mut position = start_vcn;
    let mut remaining = length;

    for extent in extents {
        if remaining == 0 {
            break;
        }
        let extent_end = vcn_cursor + extent.length;
        if position < extent_end {
            let intra_offset = position - vcn_cursor;
            let available = extent.length - intra_offset;
            let take = available.min(remaining);
            if extent.is_mapped() {
                ranges.push(ClusterRange {
                    lcn: extent.lcn as u64 + intra_offset,
                    length: take,
                });
            }
            position += take;
            remaining -= take;
        }
        vcn_cursor = extent_end;
    }
    ranges
}

/// Convert a byte range to whole virtual clusters: start rounded down,
/// length rounded up.
pub fn byte_range_to_clusters(byte_offset: u64, byte_length: u64) -> (u64, u64) {
    let start_vcn = byte_offset / ASSUMED_CLUSTER_SIZE;
    let cluster_count = byte_length.div_ceil(ASSUMED_CLUSTER_SIZE);
    (start_vcn, cluster_count)
}

/// One read taken from a `ReadFile` entry's detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadSpan {
    pub byte_offset: u64,
    pub byte_length: u64,
    /// Index of the owning entry in the normalized sequence.
    pub entry_index: usize,
}

/// Per-path aggregate of all non-prefetch reads.
#[derive(Debug, Clone, Default)]
pub struct ReadRecord {
    pub reads: Vec<ReadSpan>,
    pub min_address: u64,
    pub max_address: u64,
    pub total_bytes_read: u64,
}

static READ_DETAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Offset:\s*([0-9,]+).*Length:\s*([0-9,]+)").unwrap());

fn parse_grouped_number(raw: &str) -> Option<u64> {
    raw.replace(',', "").parse::<u64>().ok()
}

/// Scan the normalized sequence for read operations and accumulate per-path
/// records. Unparseable details are skipped; reads of the prefetch block
/// size are excluded from the aggregate.
pub fn collect_read_records(entries: &[LogEntry]) -> IndexMap<String, ReadRecord> {
    let mut records: IndexMap<String, ReadRecord> = IndexMap::new();

    for (entry_index, entry) in entries.iter().enumerate() {
        if entry.operation != READ_OP || entry.path.is_empty() {
            continue;
        }
        let Some(captures) = READ_DETAIL.captures(&entry.detail) else {
            debug!("unparseable read detail for {}: {:?}", entry.path, entry.detail);
            continue;
        };
        let (Some(byte_offset), Some(byte_length)) = (
            parse_grouped_number(&captures[1]),
            parse_grouped_number(&captures[2]),
        ) else {
            debug!("unparseable read detail for {}: {:?}", entry.path, entry.detail);
            continue;
        };
        if byte_length == PREFETCH_READ_BYTES {
            continue;
        }

        let record = records.entry(entry.path.clone()).or_default();
        if record.reads.is_empty() {
            record.min_address = byte_offset;
            record.max_address = byte_offset + byte_length;
        } else {
            record.min_address = record.min_address.min(byte_offset);
            record.max_address = record.max_address.max(byte_offset + byte_length);
        }
        record.total_bytes_read += byte_length;
        record.reads.push(ReadSpan {
            byte_offset,
            byte_length,
            entry_index,
        });
    }
    records
}
