//! Persistence layer: path-keyed JSON documents.

pub mod file;
pub mod traits;

pub use file::JsonFileStore;
pub use traits::{DocumentChange, DocumentStore, SetOptions, normalize_path, shallow_merge};
