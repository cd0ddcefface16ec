mod entries;
mod prefs;
mod schema;
mod tasks;
mod types;

pub use entries::NewEntry;
pub use prefs::ScreenState;
pub use schema::Database;
pub use types::{Entry, EntryWithFeed, MobilizeTask, StorageError};
