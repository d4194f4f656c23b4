//! Live search over the aggregated timeline. The query is matched as a
//! case-insensitive escaped literal against each display entry's path,
//! stringified PID, process name and detail. Misses are dimmed, not
//! removed; they stay visible at reduced fill and stay hoverable.

use engine::aggregate::{Aggregation, TrackEntry};
use log::warn;
use regex::{Regex, RegexBuilder};

#[derive(Debug, Default)]
pub struct SearchFilter {
    query: String,
    pattern: Option<Regex>,
}

impl SearchFilter {
    pub fn new() -> Self {
        SearchFilter::default()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, query: &str) {
        self.query = query.to_string();
        self.pattern = if query.is_empty() {
            None
        } else {
            match RegexBuilder::new(&regex::escape(query)).case_insensitive(true).build() {
                Ok(pattern) => Some(pattern),
                Err(err) => {
                    // Escaped literals always compile; keep the old state
                    // rather than panicking if that ever stops holding.
                    warn!("unusable search query {query:?}: {err}");
                    return;
                }
            }
        };
    }

    pub fn matches(&self, entry: &TrackEntry) -> bool {
        let Some(pattern) = &self.pattern else {
            return true;
        };
        pattern.is_match(&entry.path)
            || pattern.is_match(&entry.pid.to_string())
            || pattern.is_match(&entry.process_name)
            || pattern.is_match(&entry.detail)
    }

    /// Re-evaluate every entry's dimmed state against the current query.
    pub fn apply(&self, aggregation: &mut Aggregation) {
        for track in &mut aggregation.tracks {
            for entry in &mut track.entries {
                entry.hidden_by_search = !self.matches(entry);
            }
        }
    }
}
