use std::path::PathBuf;
use thiserror::Error;

/// Malformed input data. Fatal for the file that produced it; other loaded
/// files stay usable.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("bad number of columns in row {row}: {count}")]
    ColumnCount { row: usize, count: usize },

    #[error("unsupported diskify file, line {line}: {text}")]
    ExtentLine { line: usize, text: String },

    #[error("malformed event markup: {0}")]
    Markup(String),

    #[error("failed to parse time: {0}")]
    Time(String),

    #[error("malformed profile JSON: {0}")]
    Profile(#[from] serde_json::Error),

    #[error("missing required column: {0}")]
    MissingColumn(&'static str),
}

impl From<quick_xml::Error> for FormatError {
    fn from(err: quick_xml::Error) -> Self {
        FormatError::Markup(err.to_string())
    }
}

/// Invariant violations the aggregation pipeline cannot safely continue
/// past. Surfaced as blocking errors rather than degraded output.
#[derive(Debug, Error)]
pub enum SemanticError {
    #[error(
        "data should be ordered by start time: entry {index} starts at {start} before {previous}"
    )]
    UnorderedData {
        index: usize,
        start: f64,
        previous: f64,
    },
}

/// Terminal error for one load attempt. The caller may re-select files and
/// retry; nothing is retried automatically.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Semantic(#[from] SemanticError),
}
