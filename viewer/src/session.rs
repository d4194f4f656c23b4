//! One interactive viewing session. All mutable state lives here and is
//! passed by reference into the geometry and input helpers; loading a new
//! file set replaces the whole session model.

use std::time::Instant;

use engine::SessionData;
use log::debug;
use shared::AppConfig;

use crate::colors::{ColorAssignments, ColorBy, ColorError};
use crate::hit_test::{hover_entry, hover_summary};
use crate::layout::{
    background_stripes, disk_rects, entry_rect, indicator_labels, track_gutters, IndicatorLabel,
    LayoutParams, DISK_READ_COLOR,
};
use crate::scene::{RectHandle, RectScene, Transform, HOVERED_ENTRY_FILL};
use crate::scheduler::Debounce;
use crate::search::SearchFilter;
use crate::viewport::ViewState;

struct EntryHandle {
    track_index: usize,
    entry_index: usize,
    handle: RectHandle,
    base_fill: f32,
}

/// What the host loop should do after a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Another animation frame is needed.
    pub animating: bool,
    /// The scene was rebuilt; present it.
    pub rebuilt: bool,
    /// Indicator labels moved; reposition them.
    pub indicators_moved: bool,
}

pub struct ViewerSession {
    config: AppConfig,
    data: SessionData,
    pub main_view: ViewState,
    pub disk_view: ViewState,
    layout: LayoutParams,
    colors: ColorAssignments,
    color_by: ColorBy,
    search: SearchFilter,
    scene: RectScene,
    disk_scene: RectScene,
    entry_handles: Vec<EntryHandle>,
    indicators: Vec<IndicatorLabel>,
    hovered: Option<usize>,
    redraw: Debounce,
    indicator_translate: Debounce,
    /// View values at the last full rebuild, for the interim transforms.
    rebuilt_scroll: f64,
    rebuilt_scale: f64,
    rebuilt_disk_scroll: f64,
    rebuilt_disk_scale: f64,
}

impl ViewerSession {
    pub fn new(
        config: AppConfig,
        data: SessionData,
        canvas_width: f64,
        canvas_height: f64,
    ) -> Result<Self, ColorError> {
        let layout = LayoutParams {
            canvas_width,
            canvas_height,
            min_time: data.aggregation.min_time,
        };
        let main_view = ViewState::fitted(canvas_height, data.aggregation.time_span());
        let disk_view = ViewState::fitted(canvas_height, disk_extent(&data));
        let redraw = Debounce::from_millis(config.viewer.redraw_debounce_ms);
        let indicator_translate = Debounce::from_millis(config.viewer.indicator_debounce_ms);

        let mut session = ViewerSession {
            config,
            data,
            main_view,
            disk_view,
            layout,
            colors: ColorAssignments::new(),
            color_by: ColorBy::default(),
            search: SearchFilter::new(),
            scene: RectScene::new(),
            disk_scene: RectScene::new(),
            entry_handles: Vec::new(),
            indicators: Vec::new(),
            hovered: None,
            redraw,
            indicator_translate,
            rebuilt_scroll: 0.0,
            rebuilt_scale: 1.0,
            rebuilt_disk_scroll: 0.0,
            rebuilt_disk_scale: 1.0,
        };
        session.rebuild_scene()?;
        Ok(session)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn data(&self) -> &SessionData {
        &self.data
    }

    pub fn scene(&self) -> &RectScene {
        &self.scene
    }

    pub fn disk_scene(&self) -> &RectScene {
        &self.disk_scene
    }

    pub fn indicators(&self) -> &[IndicatorLabel] {
        &self.indicators
    }

    /// Replace the loaded data wholesale, keeping config and canvas size.
    pub fn load(&mut self, data: SessionData) -> Result<(), ColorError> {
        self.layout.min_time = data.aggregation.min_time;
        self.main_view = ViewState::fitted(self.layout.canvas_height, data.aggregation.time_span());
        self.disk_view = ViewState::fitted(self.layout.canvas_height, disk_extent(&data));
        self.data = data;
        self.colors.reset();
        self.search = SearchFilter::new();
        self.hovered = None;
        self.redraw.cancel();
        self.indicator_translate.cancel();
        self.rebuild_scene()
    }

    /// Tear the scene down and redraw everything for the current view.
    pub fn rebuild_scene(&mut self) -> Result<(), ColorError> {
        self.scene.clear_all();
        self.entry_handles.clear();
        self.hovered = None;

        let total_time = self.data.aggregation.time_span();
        for (color, rect) in background_stripes(&self.main_view, &self.layout, total_time) {
            self.scene.push_rect(color, rect);
        }
        for (color, rect) in track_gutters(&self.data.aggregation.tracks, &self.layout) {
            self.scene.push_rect(color, rect);
        }

        let track_count = self.data.aggregation.tracks.len();
        for (track_index, track) in self.data.aggregation.tracks.iter().enumerate() {
            for (entry_index, entry) in track.entries.iter().enumerate() {
                let Some(rect) =
                    entry_rect(entry, track_index, track_count, &self.main_view, &self.layout)
                else {
                    continue;
                };
                let color = self
                    .colors
                    .color_for(&self.color_by.key(&track.operation, entry))?;
                let handle = self.scene.push_rect(color, rect);
                self.entry_handles.push(EntryHandle {
                    track_index,
                    entry_index,
                    handle,
                    base_fill: rect.fill,
                });
            }
        }

        self.indicators = indicator_labels(&self.main_view, &self.layout, total_time);
        self.rebuilt_scroll = self.main_view.scroll_offset();
        self.rebuilt_scale = self.main_view.scale();

        self.disk_scene.clear_all();
        if let Some(extent_map) = &self.data.extent_map {
            for rect in disk_rects(&self.data.read_records, extent_map, &self.disk_view, &self.layout)
            {
                self.disk_scene.push_rect(DISK_READ_COLOR, rect);
            }
        }
        self.rebuilt_disk_scroll = self.disk_view.scroll_offset();
        self.rebuilt_disk_scale = self.disk_view.scale();

        debug!(
            "rebuilt scene: {} rects across {} tracks, {} disk rects",
            self.scene.rect_count(),
            track_count,
            self.disk_scene.rect_count()
        );
        Ok(())
    }

    pub fn set_search(&mut self, query: &str, now: Instant) {
        self.search.set_query(query);
        self.search.apply(&mut self.data.aggregation);
        self.redraw.trigger(now);
    }

    pub fn set_color_by(&mut self, color_by: ColorBy, now: Instant) {
        if self.color_by != color_by {
            self.color_by = color_by;
            self.colors.reset();
            self.redraw.trigger(now);
        }
    }

    /// Wheel input over the main view. Ctrl zooms, plain scrolls.
    pub fn wheel(&mut self, delta: f64, ctrl: bool, pointer_px: f64, now: Instant) {
        if ctrl {
            self.main_view.zoom_at(pointer_px, delta);
        } else {
            self.main_view.scroll_by_pixels(delta);
        }
        self.apply_interim_transforms();
        self.indicator_translate.trigger(now);
    }

    /// Wheel input over the disk map, same semantics in the cluster domain.
    pub fn disk_wheel(&mut self, delta: f64, ctrl: bool, pointer_px: f64) {
        if ctrl {
            self.disk_view.zoom_at(pointer_px, delta);
        } else {
            self.disk_view.scroll_by_pixels(delta);
        }
        self.apply_interim_transforms();
    }

    /// Pointer hover: resolve the entry under the cursor, move the
    /// highlight fill, and return the tooltip text for that position.
    pub fn pointer_moved(&mut self, x: f64, y: f64) -> Option<String> {
        let track_count = self.data.aggregation.tracks.len();
        if track_count == 0 {
            return None;
        }
        let track_width = self.layout.track_width(track_count);
        let track_index = (x / track_width) as usize;
        let track = self.data.aggregation.tracks.get(track_index)?;

        let time = self.layout.min_time + self.main_view.pixel_to_domain(y);
        let hovered_entry = hover_entry(track, time);
        let summary = hover_summary(track, hovered_entry);

        let hovered_slot = hovered_entry.and_then(|entry| {
            let entry_index = track.entries.iter().position(|e| std::ptr::eq(e, entry))?;
            self.entry_handles
                .iter()
                .position(|h| h.track_index == track_index && h.entry_index == entry_index)
        });

        if hovered_slot != self.hovered {
            if let Some(previous) = self.hovered.take() {
                let previous = &self.entry_handles[previous];
                self.scene.maybe_mutate_fill(previous.handle, previous.base_fill);
            }
            if let Some(slot) = hovered_slot {
                self.scene
                    .maybe_mutate_fill(self.entry_handles[slot].handle, HOVERED_ENTRY_FILL);
            }
            self.hovered = hovered_slot;
        }
        Some(summary)
    }

    fn apply_interim_transforms(&mut self) {
        let scale_ratio = self.main_view.scale() / self.rebuilt_scale;
        let translate =
            (self.rebuilt_scroll - self.main_view.scroll_offset()) * self.main_view.scale();
        self.scene.set_transform(Transform {
            translate: translate as f32,
            scale: scale_ratio as f32,
        });

        let disk_ratio = self.disk_view.scale() / self.rebuilt_disk_scale;
        let disk_translate =
            (self.rebuilt_disk_scroll - self.disk_view.scroll_offset()) * self.disk_view.scale();
        self.disk_scene.set_transform(Transform {
            translate: disk_translate as f32,
            scale: disk_ratio as f32,
        });
    }

    /// Advance animations and debounces. `dt` is the frame delta in
    /// seconds; `now` drives the debounce clocks.
    pub fn tick(&mut self, now: Instant, dt: f64) -> Result<TickReport, ColorError> {
        let mut report = TickReport::default();

        report.animating |= self.main_view.tick(dt);
        report.animating |= self.disk_view.tick(dt);
        if report.animating {
            self.apply_interim_transforms();
        }
        if self.main_view.take_settled() | self.disk_view.take_settled() {
            self.redraw.trigger(now);
        }

        if self.redraw.fire_if_due(now) {
            self.rebuild_scene()?;
            report.rebuilt = true;
        }
        if self.indicator_translate.fire_if_due(now) {
            report.indicators_moved = true;
        }
        Ok(report)
    }

    /// Offset to add to each indicator's stored position while the interim
    /// transform is active.
    pub fn indicator_translation(&self) -> f64 {
        f64::from(self.scene.transform().translate)
    }
}

/// Cluster-domain extent of the disk map: one past the furthest mapped
/// cluster of any loaded file.
fn disk_extent(data: &SessionData) -> f64 {
    let Some(extent_map) = &data.extent_map else {
        return 0.0;
    };
    extent_map
        .values()
        .flatten()
        .filter(|extent| extent.is_mapped())
        .map(|extent| (extent.lcn as u64 + extent.length) as f64)
        .fold(0.0, f64::max)
}
