//! Directory of canonical organization records.
//!
//! ```text
//! DirectoryMatcher ──► QueryPool (bounded, timeout) ──► dyn DirectoryStore
//!                                                        ├── InMemoryDirectory
//!                                                        └── SqliteDirectory
//! ```

mod matcher;
mod memory;
mod pool;
#[cfg(feature = "sqlite")]
mod sqlite;
mod traits;

pub use matcher::{AffixPattern, AffixPosition, DirectoryMatch, DirectoryMatcher, MatcherConfig};
pub use memory::InMemoryDirectory;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDirectory;
pub use traits::{DirectoryRecord, DirectoryStore, StorageError};
