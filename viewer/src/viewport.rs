//! Per-domain zoom/scroll state. Two instances exist per session, one for
//! the time-domain timeline and one for the cluster-domain disk map, each
//! independently zoomable.
//!
//! Units: `scroll_offset` is in domain units (seconds or clusters) at the
//! top edge of the viewport; `scale` is in pixels per domain unit.

use crate::animation::Animated;

/// Zoom step per wheel notch: `factor = 1 + delta * -0.05`.
const WHEEL_ZOOM_STEP: f64 = -0.05;

/// Acceleration for eased scroll transitions, domain units per second^2.
/// Scale transitions use a proportional acceleration so zooming in far
/// does not crawl.
const SCROLL_ACCELERATION: f64 = 50_000.0;
const SCALE_ACCELERATION_RATIO: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewPhase {
    Idle,
    /// Drag in progress; offsets follow the pointer 1:1.
    Panning,
    /// Eased transition toward target scale/offset.
    Animating,
    /// Transition finished; a coalesced full redraw is owed.
    Settled,
}

#[derive(Debug, Clone)]
pub struct ViewState {
    scroll: Animated,
    scale: Animated,
    phase: ViewPhase,
    /// Viewport extent along the zoom axis, in pixels.
    viewport_px: f64,
    /// Content extent, in domain units.
    content_extent: f64,
}

impl ViewState {
    /// A view fitted to show the whole content extent.
    pub fn fitted(viewport_px: f64, content_extent: f64) -> Self {
        let scale = if content_extent > 0.0 {
            viewport_px / content_extent
        } else {
            1.0
        };
        ViewState {
            scroll: Animated::new(0.0, SCROLL_ACCELERATION),
            scale: Animated::new(scale, scale * SCALE_ACCELERATION_RATIO),
            phase: ViewPhase::Idle,
            viewport_px,
            content_extent,
        }
    }

    pub fn phase(&self) -> ViewPhase {
        self.phase
    }

    pub fn scroll_offset(&self) -> f64 {
        self.scroll.current()
    }

    pub fn scale(&self) -> f64 {
        self.scale.current()
    }

    pub fn viewport_px(&self) -> f64 {
        self.viewport_px
    }

    pub fn content_extent(&self) -> f64 {
        self.content_extent
    }

    /// Visible window size, in domain units.
    pub fn window_extent(&self) -> f64 {
        self.viewport_px / self.scale.current()
    }

    pub fn domain_to_pixel(&self, position: f64) -> f64 {
        (position - self.scroll.current()) * self.scale.current()
    }

    pub fn pixel_to_domain(&self, pixel: f64) -> f64 {
        self.scroll.current() + pixel / self.scale.current()
    }

    fn clamp_scroll(&self, offset: f64, scale: f64) -> f64 {
        let max = (self.content_extent - self.viewport_px / scale).max(0.0);
        offset.clamp(0.0, max)
    }

    pub fn set_viewport_px(&mut self, viewport_px: f64) {
        self.viewport_px = viewport_px;
        let clamped = self.clamp_scroll(self.scroll.current(), self.scale.current());
        self.scroll.jump_to(clamped);
    }

    /// Scroll by a pixel delta, immediately (wheel without ctrl, or drag).
    pub fn scroll_by_pixels(&mut self, delta_px: f64) {
        let offset = self.scroll.current() + delta_px / self.scale.current();
        self.scroll.jump_to(self.clamp_scroll(offset, self.scale.current()));
        if self.phase == ViewPhase::Idle {
            self.phase = ViewPhase::Settled;
        }
    }

    pub fn begin_pan(&mut self) {
        self.phase = ViewPhase::Panning;
    }

    pub fn pan_by_pixels(&mut self, delta_px: f64) {
        let offset = self.scroll.current() + delta_px / self.scale.current();
        self.scroll.jump_to(self.clamp_scroll(offset, self.scale.current()));
    }

    pub fn end_pan(&mut self) {
        if self.phase == ViewPhase::Panning {
            self.phase = ViewPhase::Settled;
        }
    }

    /// Zoom by a wheel delta, anchored at `pointer_px`: the domain
    /// coordinate under the pointer stays under it across the scale change.
    pub fn zoom_at(&mut self, pointer_px: f64, wheel_delta: f64) {
        let factor = 1.0 + wheel_delta * WHEEL_ZOOM_STEP;
        if factor <= 0.0 {
            return;
        }
        let old_scale = self.scale.target();
        let new_scale = old_scale * factor;
        let anchor = self.scroll.target() + pointer_px / old_scale;
        let offset = anchor - pointer_px / new_scale;
        self.scale.set_target(new_scale);
        self.scroll.set_target(self.clamp_scroll(offset, new_scale));
        self.phase = ViewPhase::Animating;
    }

    /// Advance animations by `dt` seconds. Returns `true` while another
    /// frame is needed.
    pub fn tick(&mut self, dt: f64) -> bool {
        if self.phase != ViewPhase::Animating {
            return false;
        }
        let scale_moving = self.scale.step(dt);
        let scroll_moving = self.scroll.step(dt);
        if !scale_moving && !scroll_moving {
            self.phase = ViewPhase::Settled;
            return false;
        }
        true
    }

    /// Consume the settled flag; the caller owes a debounced full redraw
    /// when this returns `true`.
    pub fn take_settled(&mut self) -> bool {
        if self.phase == ViewPhase::Settled {
            self.phase = ViewPhase::Idle;
            true
        } else {
            false
        }
    }

    /// Jump both values to their targets, skipping the animation.
    pub fn finish_transition(&mut self) {
        self.scale.jump_to(self.scale.target());
        self.scroll.jump_to(self.scroll.target());
        if self.phase == ViewPhase::Animating {
            self.phase = ViewPhase::Settled;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: f64 = 1.0 / 60.0;

    fn settled(view: &mut ViewState) {
        view.finish_transition();
        view.take_settled();
    }

    #[test]
    fn test_fitted_view_shows_everything() {
        let view = ViewState::fitted(600.0, 30.0);
        assert_eq!(view.scale(), 20.0);
        assert_eq!(view.scroll_offset(), 0.0);
        assert_eq!(view.window_extent(), 30.0);
        assert_eq!(view.domain_to_pixel(30.0), 600.0);
    }

    #[test]
    fn test_zoom_anchors_pointer_position() {
        let mut view = ViewState::fitted(600.0, 30.0);
        let pointer = 450.0;
        let anchor = view.pixel_to_domain(pointer);
        view.zoom_at(pointer, -2.0); // factor 1.1
        settled(&mut view);
        assert!((view.scale() - 22.0).abs() < 1e-12);
        assert!((view.domain_to_pixel(anchor) - pointer).abs() < 1e-9);
    }

    #[test]
    fn test_zoom_out_clamps_to_content() {
        let mut view = ViewState::fitted(600.0, 30.0);
        view.zoom_at(300.0, -2.0);
        settled(&mut view);
        view.zoom_at(300.0, 2.0); // back out to a window larger than fit
        view.zoom_at(300.0, 2.0);
        settled(&mut view);
        assert_eq!(view.scroll_offset(), 0.0);
    }

    #[test]
    fn test_scroll_clamped_to_window() {
        let mut view = ViewState::fitted(600.0, 30.0);
        view.zoom_at(0.0, -20.0); // factor 2, window now 15 units
        settled(&mut view);
        view.scroll_by_pixels(1e9);
        assert_eq!(view.scroll_offset(), 15.0);
        view.scroll_by_pixels(-1e9);
        assert_eq!(view.scroll_offset(), 0.0);
    }

    #[test]
    fn test_zoom_transition_eases_and_settles() {
        let mut view = ViewState::fitted(600.0, 30.0);
        view.zoom_at(300.0, -10.0);
        assert_eq!(view.phase(), ViewPhase::Animating);
        let mut frames = 0;
        while view.tick(FRAME) {
            frames += 1;
            assert!(frames < 100_000, "zoom never settled");
        }
        assert_eq!(view.phase(), ViewPhase::Settled);
        assert!(view.take_settled());
        assert!(!view.take_settled());
        assert_eq!(view.phase(), ViewPhase::Idle);
    }

    #[test]
    fn test_pan_is_immediate() {
        let mut view = ViewState::fitted(600.0, 30.0);
        view.zoom_at(0.0, -20.0);
        settled(&mut view);
        view.begin_pan();
        view.pan_by_pixels(40.0);
        assert_eq!(view.phase(), ViewPhase::Panning);
        assert!((view.scroll_offset() - 1.0).abs() < 1e-12);
        view.end_pan();
        assert!(view.take_settled());
    }
}
