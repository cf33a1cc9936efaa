//! Column origins of SELECT results

use pretty_assertions::assert_eq;
use sqlaudit_catalog::MockDatabaseBuilder;
use sqlaudit_core::{AuditConfig, ColumnInfo, IndexInfo, TableInfo};
use sqlaudit_engine::{LookupError, MaskingError, MaskingField, Session};
use std::sync::Arc;

fn table(name: &str, columns: &[&str]) -> TableInfo {
    TableInfo::new("test_inc", name)
        .with_columns(columns.iter().map(|c| ColumnInfo::new(*c, "int")).collect())
        .with_index(IndexInfo::primary(vec!["id".to_string()]))
}

fn session() -> Session {
    let db = MockDatabaseBuilder::new()
        .with_table(table("t1", &["id", "c1"]))
        .with_table(table("t2", &["id", "c1", "c2"]))
        .build();
    let mut config = AuditConfig::default();
    config.options.database = Some("test_inc".to_string());
    Session::new(config, Arc::new(db))
}

fn field(index: usize, name: &str, table: &str, alias: &str) -> MaskingField {
    MaskingField {
        index,
        field: name.to_string(),
        data_type: "int".to_string(),
        table: table.to_string(),
        schema: "test_inc".to_string(),
        alias: alias.to_string(),
    }
}

#[tokio::test]
async fn wildcards_expand_in_from_order() {
    let mut session = session();

    let expected = vec![field(0, "id", "t1", "id"), field(1, "c1", "t1", "c1")];
    assert_eq!(session.masking("select * from t1").await.unwrap(), expected);
    assert_eq!(session.masking("select a.* from t1 a").await.unwrap(), expected);

    assert_eq!(
        session
            .masking("select a1.*, a1.id, a2.* from t1 a1 inner join t2 a2 on a1.id = a2.id")
            .await
            .unwrap(),
        vec![
            field(0, "id", "t1", "id"),
            field(1, "c1", "t1", "c1"),
            field(2, "id", "t1", "id"),
            field(3, "id", "t2", "id"),
            field(4, "c1", "t2", "c1"),
            field(5, "c2", "t2", "c2"),
        ]
    );
}

#[tokio::test]
async fn union_branches_continue_the_index() {
    let mut session = session();
    assert_eq!(
        session
            .masking("select * from t1 union select id, c2 from t2")
            .await
            .unwrap(),
        vec![
            field(0, "id", "t1", "id"),
            field(1, "c1", "t1", "c1"),
            field(2, "id", "t2", "id"),
            field(3, "c2", "t2", "c2"),
        ]
    );
}

#[tokio::test]
async fn expressions_list_every_column_they_read() {
    let mut session = session();

    let fields = session
        .masking("select ifnull(c1, c2) as v from t1 inner join t2 on t1.id = t2.id")
        .await
        .unwrap();
    assert_eq!(fields, vec![field(0, "c1", "t1", "v"), field(0, "c2", "t2", "v")]);

    let fields = session
        .masking(
            "select a.c1_alias, a.c3_alias \
             from (select *, c1 as c1_alias, concat(id, c2) as c3_alias from t2) a",
        )
        .await
        .unwrap();
    assert_eq!(
        fields,
        vec![
            field(0, "c1", "t2", "c1_alias"),
            field(1, "id", "t2", "c3_alias"),
            field(1, "c2", "t2", "c3_alias"),
        ]
    );

    let fields = session.masking("select 1 as one, id from t1").await.unwrap();
    assert_eq!(fields, vec![field(1, "id", "t1", "id")]);
}

#[tokio::test]
async fn earlier_ddl_is_visible() {
    let mut session = session();
    session
        .audit("CREATE TABLE t3 (id INT PRIMARY KEY, secret VARCHAR(20))")
        .await
        .unwrap();

    let fields = session.masking("select secret from t3").await.unwrap();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].table, "t3");
    assert_eq!(fields[0].field, "secret");

    let json = serde_json::to_string(&fields[0]).unwrap();
    assert!(json.contains("\"type\":"));
}

#[tokio::test]
async fn unresolvable_queries() {
    let mut session = session();

    assert!(matches!(
        session.masking("select * from missing").await,
        Err(MaskingError::Lookup(LookupError::NotFound(_)))
    ));
    assert_eq!(
        session.masking("select nope from t1").await,
        Err(MaskingError::UnknownColumn("nope".to_string()))
    );
    assert_eq!(
        session.masking("select x.* from t1").await,
        Err(MaskingError::UnknownTable("x".to_string()))
    );
    assert!(matches!(
        session.masking("insert into t1 values (1, 1)").await,
        Err(MaskingError::Parse(_))
    ));
}
