//! Check-stage behaviour of whole batches

use pretty_assertions::assert_eq;
use sqlaudit_catalog::{CatalogError, MockDatabase, MockDatabaseBuilder};
use sqlaudit_core::{
    AuditConfig, CheckConstraintInfo, ColumnInfo, DiagnosticCode, IndexInfo, Severity, Stage,
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
        .with_check(CheckConstraintInfo::table("chk_age", "(`age` >= 18)", true))
}

fn session_with(db: MockDatabase, configure: impl FnOnce(&mut AuditConfig)) -> Session {
    let mut config = AuditConfig::default();
    config.options.database = Some("test".to_string());
    configure(&mut config);
    Session::new(config, Arc::new(db))
}

fn session() -> Session {
    session_with(MockDatabaseBuilder::new().with_table(users()).build(), |_| {})
}

fn codes(session: &Session, index: usize) -> Vec<DiagnosticCode> {
    session.records().get(index).unwrap().diagnostics.iter().map(|d| d.code).collect()
}

#[tokio::test]
async fn three_statement_batch_is_clean() {
    let db = MockDatabaseBuilder::new().with_database("test").build();
    let mut session = session_with(db, |_| {});

    let records = session
        .audit("DROP TABLE IF EXISTS t1; CREATE TABLE t1(id INT PRIMARY KEY); INSERT INTO t1 VALUES(1);")
        .await
        .unwrap();

    assert_eq!(records.len(), 3);
    for record in records {
        assert_eq!(record.err_level(), 0, "{}: {}", record.sql, record.message());
        assert_eq!(record.stage, Stage::Check);
        assert_eq!(record.stage_status, StageStatus::AuditCompleted);
        assert_eq!(record.rollback_sql, "");
    }
    assert_eq!(records.get(1).unwrap().sequence, 2);
}

#[tokio::test]
async fn later_statements_see_earlier_ddl() {
    let mut session = session();
    let records = session
        .audit(
            "CREATE TABLE t2 (id INT PRIMARY KEY, age INT CHECK (age >= 18));\n\
             ALTER TABLE t2 ADD COLUMN nick VARCHAR(20) AFTER id;",
        )
        .await
        .unwrap();

    assert_eq!(records.max_err_level(), 0);
    assert!(records
        .get(0)
        .unwrap()
        .message()
        .contains("COLUMN `age` CHECK constraint (unnamed)"));

    let t2 = session.cache().get(&TableKey::new("test", "t2")).unwrap();
    assert_eq!(t2.column_names(), vec!["id", "nick", "age"]);
    assert_eq!(t2.checks[0].expression, "`age`>=18");
    assert!(!t2.columns[0].nullable);
}

#[tokio::test]
async fn alter_check_is_written_back_to_the_cache() {
    let mut session = session();
    let records = session
        .audit("ALTER TABLE t_missing ADD COLUMN x INT; ALTER TABLE users ALTER CHECK chk_age NOT ENFORCED")
        .await
        .unwrap();

    assert_eq!(records.get(0).unwrap().err_level(), 2);
    assert_eq!(records.get(1).unwrap().err_level(), 0);

    let cached = session.cache().get(&TableKey::new("test", "users")).unwrap();
    assert_eq!(cached.key().fqn(), "test.users");
    assert!(!cached.checks[0].enforced);
}

#[tokio::test]
async fn failed_alter_leaves_cache_untouched() {
    let mut session = session();
    session
        .audit("ALTER TABLE users ADD COLUMN nick INT, DROP COLUMN nope")
        .await
        .unwrap();

    assert_eq!(codes(&session, 0), vec![DiagnosticCode::ColumnNotFound]);
    let cached = session.cache().get(&TableKey::new("test", "users")).unwrap();
    assert!(cached.find_column("nick").is_none());
}

#[tokio::test]
async fn drop_then_recreate() {
    let mut session = session();
    let records = session
        .audit("DROP TABLE users; INSERT INTO users (id) VALUES (1); CREATE TABLE users (id INT)")
        .await
        .unwrap();

    assert_eq!(records.get(0).unwrap().err_level(), 0);
    assert_eq!(records.get(2).unwrap().err_level(), 0);
    assert_eq!(codes(&session, 1), vec![DiagnosticCode::TableNotFound]);
    assert_eq!(
        session.cache().get(&TableKey::new("test", "users")).unwrap().columns.len(),
        1
    );
}

#[tokio::test]
async fn rename_moves_the_cache_entry() {
    let mut session = session();
    session
        .audit(
            "RENAME TABLE users TO people;\n\
             INSERT INTO people (id, age) VALUES (1, 20);\n\
             INSERT INTO users (id) VALUES (1);",
        )
        .await
        .unwrap();

    let levels: Vec<u8> = session.records().iter().map(|r| r.err_level()).collect();
    assert_eq!(levels, vec![0, 0, 2]);
    assert!(session.cache().is_dropped(&TableKey::new("test", "users")));
}

#[tokio::test]
async fn semantic_errors() {
    let mut session = session();
    session
        .audit(
            "INSERT INTO missing VALUES (1);\n\
             INSERT INTO users (id, nope) VALUES (1, 2);\n\
             CREATE TABLE users (id INT);\n\
             ALTER TABLE users DROP CHECK nope;\n\
             ALTER TABLE users ADD CONSTRAINT chk_age CHECK (age > 0);\n\
             USE nowhere;",
        )
        .await
        .unwrap();

    assert_eq!(codes(&session, 0), vec![DiagnosticCode::TableNotFound]);
    assert_eq!(codes(&session, 1), vec![DiagnosticCode::ColumnNotFound]);
    assert_eq!(codes(&session, 2), vec![DiagnosticCode::TableExists]);
    assert_eq!(codes(&session, 3), vec![DiagnosticCode::CheckNotFound]);
    assert_eq!(codes(&session, 4), vec![DiagnosticCode::CheckExists]);
    assert_eq!(codes(&session, 5), vec![DiagnosticCode::DatabaseNotFound]);
    assert!(session.records().iter().all(|r| r.err_level() == 2));
}

#[tokio::test]
async fn default_database_comes_from_use() {
    let db = MockDatabaseBuilder::new().with_table(users()).build();
    let mut session = session_with(db, |config| config.options.database = None);

    session
        .audit("CREATE TABLE t (id INT); USE test; CREATE TABLE t (id INT)")
        .await
        .unwrap();

    assert_eq!(codes(&session, 0), vec![DiagnosticCode::NoDatabaseSelected]);
    assert_eq!(session.records().get(2).unwrap().err_level(), 0);
    assert_eq!(session.default_schema(), Some("test"));
}

#[tokio::test]
async fn policy_warnings() {
    let db = MockDatabaseBuilder::new().with_table(users()).build();
    let mut session = session_with(db, |config| config.rules.check_primary_key = true);

    session
        .audit(
            "DELETE FROM users; UPDATE users SET age = 1 WHERE id = 2; TRUNCATE TABLE users;\n\
             CREATE TABLE nokey (id INT);\n\
             ALTER TABLE users ADD CONSTRAINT chk_id CHECK (id > 0) NOT ENFORCED;",
        )
        .await
        .unwrap();

    let levels: Vec<u8> = session.records().iter().map(|r| r.err_level()).collect();
    assert_eq!(levels, vec![1, 0, 1, 1, 1]);
    assert_eq!(codes(&session, 0), vec![DiagnosticCode::DmlWithoutWhere]);
    assert_eq!(codes(&session, 2), vec![DiagnosticCode::RollbackUnavailable]);
    assert_eq!(codes(&session, 3), vec![DiagnosticCode::TableWithoutPrimaryKey]);
    assert!(session.records().get(4).unwrap().message().contains("[NOT ENFORCED]"));
}

#[tokio::test]
async fn rules_and_severity_overrides() {
    let db = MockDatabaseBuilder::new().with_table(users()).build();
    let mut session = session_with(db, |config| {
        config.rules.enable_drop_table = false;
        config
            .severity
            .set_override(DiagnosticCode::CheckNotEnforced, Severity::Error);
    });

    session
        .audit("DROP TABLE users; ALTER TABLE users ADD CONSTRAINT c1 CHECK (id > 0) NOT ENFORCED")
        .await
        .unwrap();

    assert_eq!(codes(&session, 0), vec![DiagnosticCode::DropTableForbidden]);
    assert_eq!(session.records().get(1).unwrap().err_level(), 2);
    let cached = session.cache().get(&TableKey::new("test", "users")).unwrap();
    assert_eq!(cached.checks.len(), 1);
}

#[tokio::test]
async fn bad_statement_does_not_hide_the_rest() {
    let mut session = session();
    let records = session
        .audit("INSERT INTO users VALUES (; SELECT * FROM users")
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records.get(0).unwrap().err_level(), 2);
    assert_eq!(records.get(1).unwrap().err_level(), 0);
}

#[tokio::test]
async fn fingerprints_when_enabled() {
    let db = MockDatabaseBuilder::new().with_table(users()).build();
    let mut session = session_with(db, |config| config.options.enable_fingerprint = true);

    let records = session
        .audit("SELECT 1; select   1")
        .await
        .unwrap();
    let first = records.get(0).unwrap().fingerprint.clone().unwrap();
    assert_eq!(first.len(), 64);
    assert_eq!(records.get(1).unwrap().fingerprint.as_deref(), Some(first.as_str()));
}

#[tokio::test]
async fn metadata_failure_stops_the_batch() {
    let db = MockDatabaseBuilder::new()
        .with_table(users())
        .with_error(
            TableKey::new("test", "locked"),
            CatalogError::PermissionDenied("SELECT denied".into()),
        )
        .build();
    let mut session = session_with(db, |_| {});

    let result = session
        .audit("INSERT INTO users (id) VALUES (1); DELETE FROM locked WHERE id = 1; SELECT 1")
        .await;

    assert!(matches!(result, Err(SessionError::Catalog(CatalogError::PermissionDenied(_)))));
    let records = session.records();
    assert_eq!(records.len(), 3);
    assert_eq!(codes(&session, 1), vec![DiagnosticCode::CatalogUnavailable]);
    assert_eq!(records.get(2).unwrap().stage_status, StageStatus::Skipped);
}

#[tokio::test]
async fn generated_check_names_stay_put_after_a_drop() {
    let mut session = session();
    session
        .audit(
            "CREATE TABLE t (a INT CHECK (a > 0), b INT CHECK (b > 0));\n\
             ALTER TABLE t DROP CHECK t_chk_1;\n\
             ALTER TABLE t DROP CHECK t_chk_1;\n\
             ALTER TABLE t DROP CHECK t_chk_2;",
        )
        .await
        .unwrap();

    assert_eq!(session.records().get(1).unwrap().err_level(), 0);
    assert_eq!(codes(&session, 2), vec![DiagnosticCode::CheckNotFound]);
    assert_eq!(session.records().get(3).unwrap().err_level(), 0);
    let t = session.cache().get(&TableKey::new("test", "t")).unwrap();
    assert!(t.checks.is_empty());
}

#[tokio::test]
async fn later_unnamed_check_keeps_counting_up() {
    let mut session = session();
    session
        .audit(
            "CREATE TABLE t (a INT CHECK (a > 0), b INT CHECK (b > 0));\n\
             ALTER TABLE t DROP CHECK t_chk_1;\n\
             ALTER TABLE t ADD COLUMN c INT CHECK (c > 0);\n\
             ALTER TABLE t DROP CHECK t_chk_3;",
        )
        .await
        .unwrap();

    assert_eq!(session.records().max_err_level(), 0);
    let t = session.cache().get(&TableKey::new("test", "t")).unwrap();
    let names: Vec<&str> = t.checks.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["t_chk_2"]);
}

#[tokio::test]
async fn dropping_a_column_read_by_a_table_check() {
    let db = MockDatabaseBuilder::new()
        .with_table(
            TableInfo::new("test", "ranges")
                .with_columns(vec![
                    ColumnInfo::new("lo", "INT"),
                    ColumnInfo::new("hi", "INT"),
                    ColumnInfo::new("step", "INT"),
                ])
                .with_check(CheckConstraintInfo::table("chk_order", "(`lo` <= `hi`)", true))
                .with_check(CheckConstraintInfo::table("chk_step", "(`step` > 0)", true)),
        )
        .build();
    let mut session = session_with(db, |_| {});

    session
        .audit(
            "ALTER TABLE ranges DROP COLUMN lo;\n\
             ALTER TABLE ranges RENAME COLUMN step TO stride;\n\
             ALTER TABLE ranges DROP COLUMN step;\n\
             ALTER TABLE ranges DROP CHECK chk_step;",
        )
        .await
        .unwrap();

    assert_eq!(codes(&session, 0), vec![DiagnosticCode::CheckDependsOnColumn]);
    assert!(session.records().get(0).unwrap().message().contains("chk_order"));
    assert_eq!(codes(&session, 1), vec![DiagnosticCode::CheckDependsOnColumn]);
    assert_eq!(codes(&session, 2), vec![DiagnosticCode::CheckDropped]);
    assert_eq!(codes(&session, 3), vec![DiagnosticCode::CheckNotFound]);

    let ranges = session.cache().get(&TableKey::new("test", "ranges")).unwrap();
    assert_eq!(ranges.column_names(), vec!["lo", "hi"]);
    let names: Vec<&str> = ranges.checks.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["chk_order"]);
}
