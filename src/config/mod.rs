// This module re-exports important pieces for convenience,
// so we can "use crate::config::*" easily.
pub mod api;
pub mod logging;
pub mod types;
pub mod upload;

pub use api::*;
pub use logging::*;
pub use types::*;
pub use upload::*;
