//! Geometry: turns tracks plus view state into scene rectangles. Time runs
//! down the canvas; tracks are vertical columns addressed by their sorted
//! index.

use engine::aggregate::{Track, TrackEntry};
use engine::extents::{byte_range_to_clusters, map_virtual_range, ClusterRange, ReadRecord};
use indexmap::IndexMap;
use shared::{Extent, ExtentMap};

use crate::scene::{
    Color, RectInstance, BACKGROUND_DEPTH, DIMMED_ENTRY_FILL, FOREGROUND_DEPTH, TRACK_GUTTER_DEPTH,
};
use crate::viewport::ViewState;

const STRIPE_DEPTH: f32 = BACKGROUND_DEPTH - 0.05;
const STRIPE_EVEN: Color = Color { r: 0xef, g: 0xef, b: 0xef };
const STRIPE_ODD: Color = Color { r: 0xff, g: 0xff, b: 0xff };
const GUTTER_COLOR: Color = Color { r: 0xfa, g: 0xfa, b: 0xfa };
/// All read bands on the disk map share one color; path counts are
/// unbounded and must not drain the track palette.
pub const DISK_READ_COLOR: Color = Color { r: 0x47, g: 0x36, b: 0xfc };

#[derive(Debug, Clone, Copy)]
pub struct LayoutParams {
    pub canvas_width: f64,
    pub canvas_height: f64,
    /// Absolute time of domain position zero.
    pub min_time: f64,
}

impl LayoutParams {
    /// Off-screen slack kept on each side so small pans reveal already
    /// drawn content before the debounced rebuild.
    pub fn viewport_buffer(&self) -> f64 {
        self.canvas_height
    }

    pub fn track_width(&self, track_count: usize) -> f64 {
        if track_count == 0 {
            self.canvas_width
        } else {
            self.canvas_width / track_count as f64
        }
    }
}

/// Stripe interval in seconds for the current magnification.
pub fn stripe_scale_secs(pixels_per_second: f64) -> f64 {
    if pixels_per_second < 1000.0 {
        1.0
    } else if pixels_per_second < 10_000.0 {
        0.1
    } else if pixels_per_second < 100_000.0 {
        0.01
    } else {
        0.001
    }
}

fn on_screen(params: &LayoutParams, top: f64, bottom: f64) -> bool {
    let buffer = params.viewport_buffer();
    bottom >= -buffer && top <= params.canvas_height + buffer
}

/// Alternating full-width background stripes, one per stripe interval,
/// culled to the buffered viewport.
pub fn background_stripes(
    view: &ViewState,
    params: &LayoutParams,
    total_time: f64,
) -> Vec<(Color, RectInstance)> {
    let pixels_per_second = view.scale();
    let interval = stripe_scale_secs(pixels_per_second);
    let mut stripes = Vec::new();

    let count = (total_time / interval).ceil() as i64;
    for i in 0..count {
        let top = view.domain_to_pixel(i as f64 * interval);
        let height = interval * pixels_per_second;
        if !on_screen(params, top, top + height) {
            continue;
        }
        let color = if i & 1 == 1 { STRIPE_ODD } else { STRIPE_EVEN };
        stripes.push((
            color,
            RectInstance {
                x: 0.0,
                y: top as f32,
                width: params.canvas_width as f32,
                height: height as f32,
                depth: STRIPE_DEPTH,
                fill: 1.0,
            },
        ));
    }
    stripes
}

/// One thin gutter at the left edge of each operation's first column.
/// Overflow tracks of the same operation share their leader's gutter.
pub fn track_gutters(tracks: &[Track], params: &LayoutParams) -> Vec<(Color, RectInstance)> {
    let track_width = params.track_width(tracks.len());
    let mut gutters = Vec::new();
    let mut last_operation: Option<&str> = None;

    for (i, track) in tracks.iter().enumerate() {
        if last_operation == Some(track.operation.as_str()) {
            continue;
        }
        last_operation = Some(track.operation.as_str());
        gutters.push((
            GUTTER_COLOR,
            RectInstance {
                x: (i as f64 * track_width) as f32,
                y: -params.canvas_height as f32,
                width: (track_width * 0.1) as f32,
                height: (params.canvas_height * 3.0) as f32,
                depth: TRACK_GUTTER_DEPTH,
                fill: 1.0,
            },
        ));
    }
    gutters
}

/// Foreground rect for one display entry, or `None` when it falls outside
/// the buffered viewport.
pub fn entry_rect(
    entry: &TrackEntry,
    track_index: usize,
    track_count: usize,
    view: &ViewState,
    params: &LayoutParams,
) -> Option<RectInstance> {
    let top = view.domain_to_pixel(entry.start - params.min_time);
    let bottom = view.domain_to_pixel(entry.end - params.min_time);
    if !on_screen(params, top, bottom) {
        return None;
    }
    let track_width = params.track_width(track_count);
    Some(RectInstance {
        x: (track_index as f64 * track_width) as f32,
        y: top as f32,
        width: track_width as f32,
        height: (bottom - top) as f32,
        depth: FOREGROUND_DEPTH,
        fill: if entry.hidden_by_search { DIMMED_ENTRY_FILL } else { 1.0 },
    })
}

/// A time label pinned next to the timeline at a stripe boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorLabel {
    pub text: String,
    /// Vertical pixel offset at full-redraw time; the indicator debounce
    /// re-applies the view translation between redraws.
    pub offset: f64,
}

pub fn indicator_labels(
    view: &ViewState,
    params: &LayoutParams,
    total_time: f64,
) -> Vec<IndicatorLabel> {
    let interval = stripe_scale_secs(view.scale());
    let print_seconds = interval == 1.0;
    let mut labels = Vec::new();

    let count = (total_time / interval).floor() as i64;
    for i in 0..count {
        let offset = view.domain_to_pixel(i as f64 * interval);
        if !on_screen(params, offset, offset) {
            continue;
        }
        let text = if print_seconds {
            format!("{i}s")
        } else {
            format!("{}ms", (i as f64 * interval * 1000.0).round() as i64)
        };
        labels.push(IndicatorLabel { text, offset });
    }
    labels
}

/// Physical cluster runs touched by every recorded read of one path.
pub fn read_cluster_ranges(record: &ReadRecord, extents: &[Extent]) -> Vec<ClusterRange> {
    let mut ranges = Vec::new();
    for read in &record.reads {
        let (start_vcn, cluster_count) = byte_range_to_clusters(read.byte_offset, read.byte_length);
        ranges.extend(map_virtual_range(extents, start_vcn, cluster_count));
    }
    ranges
}

/// Disk-map geometry: one full-width band per physical cluster run touched
/// by a recorded read, in the cluster domain of `view`. Paths without
/// extent data are skipped.
pub fn disk_rects(
    read_records: &IndexMap<String, ReadRecord>,
    extent_map: &ExtentMap,
    view: &ViewState,
    params: &LayoutParams,
) -> Vec<RectInstance> {
    let mut rects = Vec::new();
    for (path, record) in read_records {
        let Some(extents) = extent_map.get(path) else { continue };
        for range in read_cluster_ranges(record, extents) {
            let top = view.domain_to_pixel(range.lcn as f64);
            let bottom = view.domain_to_pixel((range.lcn + range.length) as f64);
            if !on_screen(params, top, bottom) {
                continue;
            }
            rects.push(RectInstance {
                x: 0.0,
                y: top as f32,
                width: params.canvas_width as f32,
                height: (bottom - top) as f32,
                depth: FOREGROUND_DEPTH,
                fill: 1.0,
            });
        }
    }
    rects
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::aggregate::aggregate;
    use engine::extents::ReadSpan;
    use shared::LogEntry;

    fn params() -> LayoutParams {
        LayoutParams {
            canvas_width: 800.0,
            canvas_height: 600.0,
            min_time: 100.0,
        }
    }

    #[test]
    fn test_stripe_scale_thresholds() {
        assert_eq!(stripe_scale_secs(999.0), 1.0);
        assert_eq!(stripe_scale_secs(1000.0), 0.1);
        assert_eq!(stripe_scale_secs(9999.0), 0.1);
        assert_eq!(stripe_scale_secs(10_000.0), 0.01);
        assert_eq!(stripe_scale_secs(100_000.0), 0.001);
    }

    #[test]
    fn test_stripes_alternate_and_tile() {
        let view = ViewState::fitted(600.0, 10.0);
        let stripes = background_stripes(&view, &params(), 10.0);
        assert_eq!(stripes.len(), 10);
        assert_eq!(stripes[0].0, STRIPE_EVEN);
        assert_eq!(stripes[1].0, STRIPE_ODD);
        assert_eq!(stripes[0].1.height, 60.0);
        assert_eq!(stripes[1].1.y, 60.0);
    }

    #[test]
    fn test_entry_rect_geometry_and_dimming() {
        let view = ViewState::fitted(600.0, 10.0);
        let mut entry = TrackEntry {
            start: 102.0,
            end: 104.0,
            path: String::new(),
            pid: 0,
            tid: 0,
            process_name: String::new(),
            detail: String::new(),
            source: shared::EntrySource::Trace,
            hidden_by_search: false,
        };
        let rect = entry_rect(&entry, 1, 4, &view, &params()).unwrap();
        assert_eq!(rect.x, 200.0);
        assert_eq!(rect.y, 120.0);
        assert_eq!(rect.width, 200.0);
        assert_eq!(rect.height, 120.0);
        assert_eq!(rect.fill, 1.0);

        entry.hidden_by_search = true;
        let dimmed = entry_rect(&entry, 1, 4, &view, &params()).unwrap();
        assert_eq!(dimmed.fill, DIMMED_ENTRY_FILL);
    }

    #[test]
    fn test_entry_rect_culled_outside_buffer() {
        let mut view = ViewState::fitted(600.0, 10.0);
        view.zoom_at(0.0, -1980.0); // factor 100, window 0.1 units
        view.finish_transition();
        let entry = TrackEntry {
            start: 109.0,
            end: 109.5,
            path: String::new(),
            pid: 0,
            tid: 0,
            process_name: String::new(),
            detail: String::new(),
            source: shared::EntrySource::Trace,
            hidden_by_search: false,
        };
        // 9 units past the window start at 6000 px/unit is far below the
        // one-canvas-height buffer.
        assert!(entry_rect(&entry, 0, 1, &view, &params()).is_none());
    }

    #[test]
    fn test_gutters_only_on_operation_change() {
        let entries = vec![
            LogEntry {
                operation: "ReadFile".to_string(),
                path: "C:\\a".to_string(),
                start: 0.0,
                duration: 1.0,
                ..Default::default()
            },
            // Overlapping incompatible entry forces a second ReadFile track.
            LogEntry {
                operation: "ReadFile".to_string(),
                path: "C:\\b".to_string(),
                start: 0.5,
                duration: 1.0,
                ..Default::default()
            },
            LogEntry {
                operation: "CloseFile".to_string(),
                path: "C:\\a".to_string(),
                start: 2.0,
                duration: 0.2,
                ..Default::default()
            },
        ];
        let aggregation = aggregate(&entries).unwrap();
        assert_eq!(aggregation.tracks.len(), 3);
        let gutters = track_gutters(&aggregation.tracks, &params());
        assert_eq!(gutters.len(), 2);
    }

    #[test]
    fn test_indicator_labels_text() {
        let view = ViewState::fitted(600.0, 10.0);
        let labels = indicator_labels(&view, &params(), 10.0);
        assert_eq!(labels[0].text, "0s");
        assert_eq!(labels[1].text, "1s");
        assert_eq!(labels[1].offset, 60.0);

        let zoomed = ViewState::fitted(600.0, 0.2); // 3000 px/s
        let labels = indicator_labels(&zoomed, &params(), 0.2);
        assert_eq!(labels[1].text, "100ms");
    }

    #[test]
    fn test_disk_rects_map_reads_to_cluster_bands() {
        let mut extent_map = ExtentMap::new();
        extent_map.insert(
            "C:\\data\\big.bin".to_string(),
            vec![Extent { lcn: 100, length: 10 }],
        );
        let mut read_records: IndexMap<String, ReadRecord> = IndexMap::new();
        read_records.insert(
            "C:\\data\\big.bin".to_string(),
            ReadRecord {
                reads: vec![ReadSpan { byte_offset: 0, byte_length: 2 * 4096, entry_index: 0 }],
                ..Default::default()
            },
        );
        // Path without extent data contributes nothing.
        read_records.insert("C:\\other.bin".to_string(), ReadRecord::default());

        let view = ViewState::fitted(600.0, 120.0); // 5 px per cluster
        let rects = disk_rects(&read_records, &extent_map, &view, &params());
        assert_eq!(rects.len(), 1);
        assert_eq!(rects[0].y, 500.0);
        assert_eq!(rects[0].height, 10.0);
        assert_eq!(rects[0].width, 800.0);
    }

    #[test]
    fn test_read_cluster_ranges() {
        let extents = vec![
            Extent { lcn: 100, length: 10 },
            Extent { lcn: 200, length: 5 },
        ];
        let record = ReadRecord {
            reads: vec![ReadSpan {
                byte_offset: 5 * 4096,
                byte_length: 10 * 4096,
                entry_index: 0,
            }],
            min_address: 0,
            max_address: 0,
            total_bytes_read: 0,
        };
        let ranges = read_cluster_ranges(&record, &extents);
        assert_eq!(ranges, vec![
            ClusterRange { lcn: 105, length: 5 },
            ClusterRange { lcn: 200, length: 5 },
        ]);
    }
}
