/// Insertion-ordered store for one collection.
pub mod collection;

pub use collection::EntityStore;
