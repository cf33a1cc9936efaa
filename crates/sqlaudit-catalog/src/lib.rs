//! Collaborators of the audit engine
//!
//! The engine never talks to MySQL directly. It reads table metadata and issues
//! statements through [`LiveDatabase`], and hands rollback SQL to a
//! [`BackupStore`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use sqlaudit_catalog::{LiveDatabase, MockDatabaseBuilder};
//! use sqlaudit_core::{ColumnInfo, TableInfo, TableKey};
//!
//! let db = MockDatabaseBuilder::new()
//!     .with_table(TableInfo::new("test", "t").with_columns(vec![ColumnInfo::new("id", "INT")]))
//!     .build();
//! let table = db.fetch_table(&TableKey::new("test", "t")).await?;
//! ```

pub mod adapter;
pub mod backup;
pub mod mock;
pub mod snapshot;

pub use adapter::{CatalogError, LiveDatabase};
pub use backup::{BackupEntry, BackupError, BackupStore, DmlCapture, DmlKind, MemoryBackupStore};
pub use mock::{MockDatabase, MockDatabaseBuilder};
pub use snapshot::{SchemaSnapshot, SnapshotDatabase};
