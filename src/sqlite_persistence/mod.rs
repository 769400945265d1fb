mod versioned_schema;

pub use versioned_schema::*;

/// Offset added to schema versions when stored in `PRAGMA user_version`, so a
/// database created by an unrelated tool is never mistaken for one of ours.
pub const BASE_DB_VERSION: usize = 41000;
