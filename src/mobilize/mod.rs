//! Full-text mobilization: a DB-backed task queue with live pending-count
//! observation, and a background worker that extracts readable article text
//! through a reader gateway.

mod extract;
mod service;

pub use extract::{fetch_full_text, ExtractError, DEFAULT_GATEWAY};
pub use service::{Mobilizer, MobilizeQueue, ServiceHandle};
