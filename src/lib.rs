//! Library crate for the quiz admin client: typed records, per-collection stores, the
//! optimistic synchronisation engine and view navigation.

pub mod config;
/// Failures reported by the engine and the session.
pub mod error;
/// Backend contract and its HTTP and in-memory implementations.
pub mod gateway;
/// Records, identities and collection keys.
pub mod model;
/// View navigation state machine.
pub mod navigation;
pub mod session;
/// Per-collection entity stores.
pub mod store;
/// Fetch reconciliation and the optimistic overlay engine.
pub mod sync;
