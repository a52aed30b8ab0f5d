//! Change data capture: turning raw capture records into canonical change
//! events and publishing them onto the change log.

pub mod event;
pub mod normalizer;
pub mod publisher;

pub use event::{ChangeEvent, ChangeHeader};
pub use normalizer::{Normalizer, RawRecord, SourceFilter};
pub use publisher::ChangeEventPublisher;

/// Stream entry field holding the source database name.
pub const FIELD_SOURCE_DB: &str = "source.db";
/// Stream entry field holding the source table name.
pub const FIELD_SOURCE_TABLE: &str = "source.table";
/// Stream entry field holding `CREATE`, `UPDATE` or `DELETE`.
pub const FIELD_SOURCE_OPERATION: &str = "source.operation";
/// Stream entry field holding the comma separated primary key field names.
pub const FIELD_SOURCE_KEY_FIELDS: &str = "source.key.fields";
/// Namespace of pre-image fields on an UPDATE entry.
pub const BEFORE_PREFIX: &str = "before:";

pub fn before_field(name: &str) -> String {
    format!("{}{}", BEFORE_PREFIX, name)
}
