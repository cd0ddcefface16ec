//! Terminal user interface.
//!
//! - `detail` - the entry detail screen and its collaborator seams
//! - `actions` - the action-row model
//! - `host` - concrete collaborators (storage, service, layout, OS)
//! - `loop_runner` - event loop and terminal management
//! - `input` - keyboard dispatch
//! - `render` - frame rendering
//! - `markdown` - markdown-to-line conversion for entry bodies
//! - `sidebar` - entry list shown in two-column layout

pub mod actions;
pub mod detail;
pub mod host;
mod input;
mod loop_runner;
mod markdown;
mod render;
pub mod sidebar;

pub use loop_runner::{run, Action};
