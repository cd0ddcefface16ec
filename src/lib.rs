//! lectern: a terminal article reader built around a single detail view.
//!
//! The database of feeds and entries is populated externally; lectern
//! renders one entry at a time, navigates the browsing sequence, toggles
//! between feed-provided and mobilized full-text content, and runs the
//! background mobilization service that extracts full text on demand.

pub mod config;
pub mod mobilize;
pub mod storage;
pub mod ui;
pub mod util;
