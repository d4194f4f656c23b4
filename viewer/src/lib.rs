//! Interactive timeline viewer: viewport state machines, search, hit
//! testing and the rectangle scene handed to the external renderer.

pub mod animation;
pub mod colors;
pub mod layout;
pub mod scene;
pub mod scheduler;
pub mod search;
pub mod session;
pub mod viewport;

pub use session::{TickReport, ViewerSession};
pub use viewport::{ViewPhase, ViewState};
