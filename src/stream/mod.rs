//! The stream consumption loop.
//!
//! One worker thread reads the change log on behalf of two consumer groups,
//! `{prefix}.index` and `{prefix}.suggest`, dispatches each entry through
//! the entity registry and acknowledges it only after the downstream
//! manager applied it.

mod indexer;
mod worker;

pub use indexer::{IndexerStatus, StreamIndexer, ToggleOutcome};
pub use worker::{Dispatched, Downstream, GroupKind};
