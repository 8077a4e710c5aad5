/// Engine applying fetches and mutations to per-collection stores.
pub mod engine;
/// Content-equality keys used to match provisional and fetched records.
pub mod keys;
/// Merge of a fetch result with the provisional entries of a collection.
pub mod reconcile;

pub use engine::{Created, Deleted, RefreshOutcome, SharedEngine, SyncEngine, SyncOptions};
pub use keys::{ContentKey, KeyFn, KeyPolicy};
