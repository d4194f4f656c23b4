//! Rectangle scene handed to the external renderer. Rects are batched per
//! color; each batch remembers whether any of its rects needs an alpha
//! pass. Pushed rects are addressed through generation-tagged handles so a
//! handle kept across `clear_all` mutates nothing.

use indexmap::IndexMap;

pub const BACKGROUND_DEPTH: f32 = 0.9;
pub const TRACK_GUTTER_DEPTH: f32 = 0.8;
pub const FOREGROUND_DEPTH: f32 = 0.7;
/// Fill applied to the rect under the cursor.
pub const HOVERED_ENTRY_FILL: f32 = 0.9;
/// Fill for entries dimmed by an active search.
pub const DIMMED_ENTRY_FILL: f32 = 0.3;

/// Solid color, usable as a batch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    /// Parse `#rrggbb`.
    pub fn from_hex(hex: &str) -> Option<Color> {
        let digits = hex.strip_prefix('#')?;
        if digits.len() != 6 {
            return None;
        }
        let r = u8::from_str_radix(&digits[0..2], 16).ok()?;
        let g = u8::from_str_radix(&digits[2..4], 16).ok()?;
        let b = u8::from_str_radix(&digits[4..6], 16).ok()?;
        Some(Color { r, g, b })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectInstance {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub depth: f32,
    /// Opacity in `[0, 1]`; anything below 1 forces the batch onto the
    /// alpha pass.
    pub fill: f32,
}

#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub rects: Vec<RectInstance>,
    pub has_alpha: bool,
}

/// Ticket for one pushed rect. Becomes stale when the scene is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RectHandle {
    color: Color,
    index: usize,
    generation: u64,
}

/// Horizontal-axis view transform applied by the renderer between full
/// redraws, so pans and zooms stay responsive while the rebuilt scene is
/// debounced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translate: f32,
    pub scale: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Transform { translate: 0.0, scale: 1.0 }
    }
}

#[derive(Debug, Default)]
pub struct RectScene {
    batches: IndexMap<Color, Batch>,
    generation: u64,
    transform: Transform,
}

impl RectScene {
    pub fn new() -> Self {
        RectScene {
            batches: IndexMap::new(),
            generation: 1,
            transform: Transform::default(),
        }
    }

    pub fn push_rect(&mut self, color: Color, rect: RectInstance) -> RectHandle {
        let batch = self.batches.entry(color).or_default();
        if rect.fill < 1.0 {
            batch.has_alpha = true;
        }
        batch.rects.push(rect);
        RectHandle {
            color,
            index: batch.rects.len() - 1,
            generation: self.generation,
        }
    }

    /// Change a pushed rect's fill. Stale or dangling handles are ignored;
    /// returns whether anything was written.
    pub fn maybe_mutate_fill(&mut self, handle: RectHandle, fill: f32) -> bool {
        if handle.generation != self.generation {
            return false;
        }
        let Some(batch) = self.batches.get_mut(&handle.color) else {
            return false;
        };
        let Some(rect) = batch.rects.get_mut(handle.index) else {
            return false;
        };
        rect.fill = fill;
        if fill < 1.0 {
            batch.has_alpha = true;
        }
        true
    }

    /// Drop every batch and invalidate all outstanding handles.
    pub fn clear_all(&mut self) {
        self.generation += 1;
        self.batches.clear();
        self.transform = Transform::default();
    }

    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn batches(&self) -> impl Iterator<Item = (&Color, &Batch)> {
        self.batches.iter()
    }

    pub fn rect_count(&self) -> usize {
        self.batches.values().map(|b| b.rects.len()).sum()
    }
}

/// The external renderer's side of the contract: consume the batched scene
/// and put pixels on screen.
pub trait SceneRenderer {
    fn draw(&mut self, scene: &RectScene);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(fill: f32) -> RectInstance {
        RectInstance {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
            depth: FOREGROUND_DEPTH,
            fill,
        }
    }

    const RED: Color = Color { r: 0xff, g: 0, b: 0 };
    const BLUE: Color = Color { r: 0, g: 0, b: 0xff };

    #[test]
    fn test_color_from_hex() {
        assert_eq!(Color::from_hex("#4736fc"), Some(Color { r: 0x47, g: 0x36, b: 0xfc }));
        assert_eq!(Color::from_hex("4736fc"), None);
        assert_eq!(Color::from_hex("#47 6fc"), None);
    }

    #[test]
    fn test_rects_batch_by_color() {
        let mut scene = RectScene::new();
        scene.push_rect(RED, rect(1.0));
        scene.push_rect(BLUE, rect(1.0));
        scene.push_rect(RED, rect(1.0));
        let sizes: Vec<usize> = scene.batches().map(|(_, b)| b.rects.len()).collect();
        assert_eq!(sizes, vec![2, 1]);
        assert_eq!(scene.rect_count(), 3);
    }

    #[test]
    fn test_alpha_flag_tracks_fills() {
        let mut scene = RectScene::new();
        scene.push_rect(RED, rect(1.0));
        assert!(!scene.batches().next().unwrap().1.has_alpha);
        let handle = scene.push_rect(RED, rect(1.0));
        scene.maybe_mutate_fill(handle, HOVERED_ENTRY_FILL);
        assert!(scene.batches().next().unwrap().1.has_alpha);
    }

    #[test]
    fn test_mutation_through_handle() {
        let mut scene = RectScene::new();
        let handle = scene.push_rect(RED, rect(1.0));
        assert!(scene.maybe_mutate_fill(handle, 0.5));
        let (_, batch) = scene.batches().next().unwrap();
        assert_eq!(batch.rects[0].fill, 0.5);
    }

    #[test]
    fn test_stale_handle_after_clear_is_noop() {
        let mut scene = RectScene::new();
        let handle = scene.push_rect(RED, rect(1.0));
        scene.clear_all();
        let replacement = scene.push_rect(RED, rect(1.0));
        assert!(!scene.maybe_mutate_fill(handle, 0.1));
        assert_eq!(scene.batches().next().unwrap().1.rects[0].fill, 1.0);
        assert!(scene.maybe_mutate_fill(replacement, 0.1));
    }

    #[test]
    fn test_clear_resets_transform_and_batches() {
        let mut scene = RectScene::new();
        scene.push_rect(RED, rect(1.0));
        scene.set_transform(Transform { translate: 5.0, scale: 2.0 });
        scene.clear_all();
        assert_eq!(scene.rect_count(), 0);
        assert_eq!(scene.transform(), Transform::default());
    }
}
