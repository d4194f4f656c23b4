//! Trace-processing engine: parsers for the supported input formats,
//! normalization into the shared entry model, track aggregation, disk
//! extent mapping and stack symbolication.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod extents;
pub mod normalize;
pub mod procmon_xml;
pub mod profiler;
pub mod session;
pub mod symbolicate;
pub mod tabular;

pub use aggregate::{aggregate, Aggregation, Track, TrackEntry};
pub use error::{FormatError, LoadError, SemanticError};
pub use session::{load_session, SessionData, SessionInputs};
