//! Execute stage: live application, rollback text and backup persistence

use pretty_assertions::assert_eq;
use sqlaudit_catalog::{CatalogError, MemoryBackupStore, MockDatabase, MockDatabaseBuilder};
use sqlaudit_core::{
    AuditConfig, BackupTiming, CheckConstraintInfo, ColumnInfo, DiagnosticCode, IndexInfo, Stage,
    StageStatus, TableInfo, TableKey,
};
use sqlaudit_engine::{Session, SessionError};
use std::sync::Arc;

fn users() -> TableInfo {
    TableInfo::new("test", "users")
        .with_columns(vec![
            ColumnInfo::new("id", "INT").with_nullable(false),
            ColumnInfo::new("age", "INT"),
        ])
        .with_index(IndexInfo::primary(vec!["id".to_string()]))
        .with_index(IndexInfo::plain("idx_age", vec!["age".to_string()]))
        .with_check(CheckConstraintInfo::table("chk_age", "(`age` >= 18)", true))
}

fn executing(db: &MockDatabase, configure: impl FnOnce(&mut AuditConfig)) -> Session {
    let mut config = AuditConfig::default();
    config.options.database = Some("test".to_string());
    config.options.execute = true;
    configure(&mut config);
    Session::new(config, Arc::new(db.clone()))
}

fn rollback(session: &Session, index: usize) -> &str {
    &session.records().get(index).unwrap().rollback_sql
}

#[tokio::test]
async fn check_constraint_rollback() {
    let db = MockDatabaseBuilder::new().with_table(users()).build();
    let mut session = executing(&db, |_| {});

    session
        .run(
            "ALTER TABLE users ALTER CHECK chk_age NOT ENFORCED;\n\
             ALTER TABLE users ADD COLUMN nick VARCHAR(20) AFTER id, DROP CHECK chk_age,\n\
                 ADD CONSTRAINT chk_nick CHECK (age < 150);",
        )
        .await
        .unwrap();

    assert_eq!(session.stage(), Stage::Execute);
    assert_eq!(
        rollback(&session, 0),
        "ALTER TABLE `test`.`users` ALTER CHECK `chk_age` ENFORCED;"
    );
    assert_eq!(
        rollback(&session, 1),
        "ALTER TABLE `test`.`users` DROP CHECK `chk_nick`, \
         ADD CONSTRAINT `chk_age` CHECK (`age`>=18) NOT ENFORCED, DROP COLUMN `nick`;"
    );
    for record in session.records() {
        assert_eq!(record.stage_status, StageStatus::ExecuteSucceeded);
        assert_eq!(record.stage, Stage::Execute);
    }
    assert_eq!(db.executed_statements().await.len(), 2);
}

#[tokio::test]
async fn column_and_index_rollback() {
    let db = MockDatabaseBuilder::new().with_table(users()).build();
    let mut session = executing(&db, |_| {});

    session
        .run(
            "ALTER TABLE users DROP COLUMN age;\n\
             ALTER TABLE users ADD COLUMN age TINYINT NOT NULL, ADD UNIQUE INDEX uk_age (age);\n\
             ALTER TABLE users CHANGE COLUMN age years TINYINT NOT NULL, RENAME INDEX uk_age TO uk_years;\n\
             ALTER TABLE users RENAME TO members;",
        )
        .await
        .unwrap();

    assert_eq!(
        rollback(&session, 0),
        "ALTER TABLE `test`.`users` ADD COLUMN `age` INT NULL AFTER `id`, ADD INDEX `idx_age`(`age`), \
         ADD CONSTRAINT `chk_age` CHECK (`age`>=18);"
    );
    assert_eq!(
        rollback(&session, 1),
        "ALTER TABLE `test`.`users` DROP INDEX `uk_age`, DROP COLUMN `age`;"
    );
    assert_eq!(
        rollback(&session, 2),
        "ALTER TABLE `test`.`users` RENAME INDEX `uk_years` TO `uk_age`, \
         CHANGE COLUMN `years` `age` TINYINT NOT NULL;"
    );
    assert_eq!(
        rollback(&session, 3),
        "ALTER TABLE `test`.`members` RENAME TO `test`.`users`;"
    );

    let members = session.cache().get(&TableKey::new("test", "members")).unwrap();
    assert_eq!(members.column_names(), vec!["id", "years"]);
    assert!(members.checks.is_empty());
    assert_eq!(members.indexes[1].columns, vec!["years".to_string()]);
}

#[tokio::test]
async fn table_level_rollback() {
    let db = MockDatabaseBuilder::new().with_table(users()).build();
    let mut session = executing(&db, |_| {});

    session
        .run(
            "CREATE TABLE t9 (id INT PRIMARY KEY);\n\
             RENAME TABLE t9 TO t10;\n\
             DROP TABLE users;",
        )
        .await
        .unwrap();

    assert_eq!(rollback(&session, 0), "DROP TABLE `test`.`t9`;");
    assert_eq!(rollback(&session, 1), "RENAME TABLE `test`.`t10` TO `test`.`t9`;");
    assert!(rollback(&session, 2).starts_with("CREATE TABLE `test`.`users` ("));
    assert!(rollback(&session, 2).contains("CONSTRAINT `chk_age` CHECK (`age`>=18)"));
}

#[tokio::test]
async fn warnings_gate_execution() {
    let db = MockDatabaseBuilder::new().with_table(users()).build();

    let mut cautious = executing(&db, |_| {});
    cautious.run("DELETE FROM users").await.unwrap();
    assert_eq!(cautious.stage(), Stage::Check);
    assert!(db.executed_statements().await.is_empty());

    let mut bold = executing(&db, |config| config.options.ignore_warnings = true);
    bold.run("DELETE FROM users").await.unwrap();
    assert_eq!(bold.stage(), Stage::Execute);
    assert_eq!(db.executed_statements().await.len(), 1);
}

#[tokio::test]
async fn errors_gate_execution() {
    let db = MockDatabaseBuilder::new().with_table(users()).build();
    let mut session = executing(&db, |config| config.options.ignore_warnings = true);

    let records = session
        .run("INSERT INTO users (id) VALUES (1); INSERT INTO nope VALUES (1)")
        .await
        .unwrap();

    assert!(records.has_errors());
    assert_eq!(session.stage(), Stage::Check);
    assert!(db.executed_statements().await.is_empty());
}

#[tokio::test]
async fn backup_after_success() {
    let db = MockDatabaseBuilder::new().with_table(users()).with_affected_rows(1).build();
    let store = MemoryBackupStore::new();
    store
        .add_row_images(
            &TableKey::new("test", "users"),
            vec!["INSERT INTO `test`.`users`(`id`,`age`) VALUES(1,20);".to_string()],
        )
        .await;

    let mut session = executing(&db, |config| config.options.backup = true)
        .with_backup_store(Arc::new(store.clone()));
    session
        .run("CREATE TABLE t9 (id INT PRIMARY KEY); DELETE FROM users WHERE id = 1; SELECT 1")
        .await
        .unwrap();

    let records = session.records();
    assert_eq!(records.get(0).unwrap().stage_status, StageStatus::BackupSucceeded);
    assert_eq!(
        records.get(1).unwrap().rollback_sql,
        "INSERT INTO `test`.`users`(`id`,`age`) VALUES(1,20);"
    );
    assert_eq!(records.get(1).unwrap().affected_rows, 1);
    assert_eq!(records.get(2).unwrap().stage_status, StageStatus::Skipped);

    let entries = store.entries().await;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].rollback_sql, "DROP TABLE `test`.`t9`;");
    assert_eq!(entries[1].table, Some(TableKey::new("test", "users")));
}

#[tokio::test]
async fn backup_failure_does_not_abort() {
    let db = MockDatabaseBuilder::new().with_table(users()).build();
    let store = MemoryBackupStore::new().with_persist_failure();

    let mut session = executing(&db, |config| config.options.backup = true)
        .with_backup_store(Arc::new(store));
    session
        .run("CREATE TABLE t9 (id INT PRIMARY KEY); CREATE TABLE t10 (id INT PRIMARY KEY)")
        .await
        .unwrap();

    for record in session.records() {
        assert_eq!(record.stage_status, StageStatus::BackupFailed);
        assert_eq!(record.err_level(), 1);
        assert_eq!(record.diagnostics[0].code, DiagnosticCode::BackupFailed);
    }
    assert_eq!(db.executed_statements().await.len(), 2);
}

#[tokio::test]
async fn execute_failure_stops_the_batch() {
    let db = MockDatabaseBuilder::new()
        .with_table(users())
        .with_execute_failure("t_bad", CatalogError::ExecuteError("Lock wait timeout".into()))
        .build();
    let store = MemoryBackupStore::new();
    let mut session = executing(&db, |config| {
        config.options.backup = true;
        config.options.backup_timing = BackupTiming::Before;
    })
    .with_backup_store(Arc::new(store.clone()));

    let result = session
        .run("CREATE TABLE t_ok (id INT PRIMARY KEY); CREATE TABLE t_bad (id INT PRIMARY KEY); CREATE TABLE t_after (id INT PRIMARY KEY)")
        .await;

    assert!(matches!(result, Err(SessionError::Execute { sequence: 2, .. })));
    let statuses: Vec<StageStatus> = session.records().iter().map(|r| r.stage_status).collect();
    assert_eq!(
        statuses,
        vec![
            StageStatus::BackupSucceeded,
            StageStatus::ExecuteFailed,
            StageStatus::Skipped
        ]
    );
    assert_eq!(session.records().get(1).unwrap().err_level(), 2);
    assert_eq!(db.executed_statements().await.len(), 1);
    // persisted before the failing write was attempted
    assert_eq!(store.entry_count().await, 2);
}

#[tokio::test]
async fn unreachable_database_is_reported_before_execute() {
    let db = MockDatabaseBuilder::new()
        .with_table(users())
        .with_connection_failure()
        .build();
    let mut session = executing(&db, |_| {});

    let result = session.run("INSERT INTO users (id) VALUES (1)").await;
    assert!(matches!(
        result,
        Err(SessionError::Catalog(CatalogError::ConnectionError(_)))
    ));
    assert_eq!(session.stage(), Stage::Check);
}
