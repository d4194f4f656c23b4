//! Color assignment for timeline boxes. Keys draw from a fixed palette on
//! first use; running out of palette entries is a hard error because two
//! operations sharing a color would silently mislead.

use engine::aggregate::TrackEntry;
use indexmap::IndexMap;
use thiserror::Error;

use crate::scene::Color;

/// The palette, consumed from the back. Repeats are deliberate; distant
/// assignment order keeps identical colors far apart on screen.
const PALETTE: [&str; 52] = [
    "#4736fc", "#e4ba6e", "#623b1a", "#8fb0e9", "#857ebb", "#7fcbd7", "#427975", "#72b37e",
    "#4736fc", "#e4ba6e", "#623b1a", "#8fb0e9", "#857ebb", "#7fcbd7", "#427975", "#72b37e",
    "#4736fc", "#e4ba6e", "#623b1a", "#8fb0e9", "#857ebb", "#7fcbd7", "#427975", "#72b37e",
    "#6f6add", "#584081", "#cb6b6f", "#6f6add",
    "#4736fc", "#e4ba6e", "#623b1a", "#8fb0e9", "#857ebb", "#7fcbd7", "#427975", "#72b37e",
    "#6f6add", "#584081", "#cb6b6f", "#6f6add",
    "#4736fc", "#e4ba6e", "#623b1a", "#8fb0e9", "#857ebb", "#7fcbd7", "#427975", "#72b37e",
    "#6f6add", "#584081", "#cb6b6f", "#6f6add",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ColorError {
    #[error("not enough colors for {key:?}: palette exhausted after {assigned} assignments")]
    Exhausted { key: String, assigned: usize },
}

/// Which entry attribute selects the color bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorBy {
    #[default]
    Operation,
    Pid,
    Tid,
}

impl ColorBy {
    /// Bucket key for one display entry on a given operation lane.
    pub fn key(&self, operation: &str, entry: &TrackEntry) -> String {
        match self {
            ColorBy::Operation => operation.to_string(),
            ColorBy::Pid => entry.pid.to_string(),
            ColorBy::Tid => entry.tid.to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ColorAssignments {
    available: Vec<Color>,
    assigned: IndexMap<String, Color>,
}

impl Default for ColorAssignments {
    fn default() -> Self {
        ColorAssignments::new()
    }
}

impl ColorAssignments {
    pub fn new() -> Self {
        ColorAssignments {
            available: PALETTE
                .iter()
                .filter_map(|hex| Color::from_hex(hex))
                .collect(),
            assigned: IndexMap::new(),
        }
    }

    /// Color for a bucket key, assigning a fresh palette entry on first
    /// sight of the key.
    pub fn color_for(&mut self, key: &str) -> Result<Color, ColorError> {
        if let Some(color) = self.assigned.get(key) {
            return Ok(*color);
        }
        let Some(color) = self.available.pop() else {
            return Err(ColorError::Exhausted {
                key: key.to_string(),
                assigned: self.assigned.len(),
            });
        };
        self.assigned.insert(key.to_string(), color);
        Ok(color)
    }

    pub fn assigned_count(&self) -> usize {
        self.assigned.len()
    }

    /// Forget every assignment and refill the palette, for a new session.
    pub fn reset(&mut self) {
        *self = ColorAssignments::new();
    }
}
