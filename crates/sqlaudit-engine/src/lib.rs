//! sqlaudit engine - Audit and rollback pipeline
//!
//! This crate implements the statement-level logic:
//! - Session schema cache
//! - Statement handlers (DDL, CHECK constraints, DML)
//! - Rollback generation
//! - Check / Execute stage pipeline
//! - Column origins of SELECT results (masking)

pub mod cache;
pub mod checks;
mod handlers;
pub mod masking;
pub mod rollback;
pub mod scope;
pub mod session;

pub use cache::{LookupError, SchemaCache};
pub use checks::{
    add_check_rollback, add_table_check, alter_check_enforcement, alter_check_rollback,
    attach_column_checks, drop_check, drop_check_rollback, ensure_column_unreferenced,
    remove_table_checks_on, update_column_checks, ColumnCheckUpdate,
};
pub use masking::{MaskingError, MaskingField};
pub use rollback::RollbackBuffer;
pub use scope::StatementScope;
pub use session::{Session, SessionError};
