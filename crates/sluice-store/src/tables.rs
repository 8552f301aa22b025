//! redb table definitions for the record store.

use redb::TableDefinition;

/// Persisted records keyed by an auto-incrementing id, JSON values.
pub const RECORDS: TableDefinition<u64, &[u8]> = TableDefinition::new("records");
