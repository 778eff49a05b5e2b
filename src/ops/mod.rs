/// Repository operations
///
/// This module handles the filesystem work behind the commands:
/// - Copy helpers shared by the other operations (copy.rs)
/// - Name search (search.rs)
/// - Statistics (stats.rs)
/// - Importing external files (import.rs)
/// - Single and batch renaming (rename.rs)
/// - Snapshots of the whole repository (backup.rs)

pub mod backup;
pub mod copy;
pub mod import;
pub mod rename;
pub mod search;
pub mod stats;
