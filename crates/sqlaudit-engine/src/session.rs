//! Audit session: the two-stage pipeline over one batch
//!
//! The Check stage audits every statement against the schema cache and fills
//! the record set. `run` continues into the Execute stage when the options
//! allow it: the cache is rebuilt from scratch, each statement is audited
//! again, applied to the live database and its rollback captured.

use crate::cache::SchemaCache;
use crate::handlers::Handlers;
use crate::masking::{trace_query, MaskingError, MaskingField};
use crate::scope::StatementScope;
use sqlaudit_catalog::{BackupEntry, BackupStore, CatalogError, DmlCapture, DmlKind, LiveDatabase};
use sqlaudit_core::{
    fingerprint, AuditConfig, BackupTiming, Diagnostic, DiagnosticCode, Record, RecordSet, Stage,
    StageStatus, TableKey,
};
use sqlaudit_sql::{parse_query_shape, AuditStatement, ParsedStatement, SqlParser};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Failures that stop a batch
///
/// Problems with individual statements are diagnostics on their records;
/// these are collaborator failures.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Metadata lookup failed: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Statement {sequence} failed: {source}")]
    Execute { sequence: usize, source: CatalogError },
}

pub struct Session {
    config: AuditConfig,
    db: Arc<dyn LiveDatabase>,
    backup: Option<Arc<dyn BackupStore>>,
    parser: SqlParser,
    cache: SchemaCache,
    default_schema: Option<String>,
    stage: Stage,
    records: RecordSet,
}

impl Session {
    pub fn new(config: AuditConfig, db: Arc<dyn LiveDatabase>) -> Self {
        let default_schema = config.options.database.clone();
        Self {
            config,
            db,
            backup: None,
            parser: SqlParser::new(),
            cache: SchemaCache::new(),
            default_schema,
            stage: Stage::Check,
            records: RecordSet::new(),
        }
    }

    /// Where rollback is persisted during the Execute stage
    pub fn with_backup_store(mut self, store: Arc<dyn BackupStore>) -> Self {
        self.backup = Some(store);
        self
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Records of the most recent stage
    pub fn records(&self) -> &RecordSet {
        &self.records
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn cache(&self) -> &SchemaCache {
        &self.cache
    }

    /// Database unqualified names resolve against
    pub fn default_schema(&self) -> Option<&str> {
        self.default_schema.as_deref()
    }

    /// Check stage only
    pub async fn audit(&mut self, batch: &str) -> Result<&RecordSet, SessionError> {
        self.begin(Stage::Check);
        self.run_stage(batch).await?;
        Ok(&self.records)
    }

    /// Check stage, then Execute when enabled and the audit came back clean
    pub async fn run(&mut self, batch: &str) -> Result<&RecordSet, SessionError> {
        self.audit(batch).await?;

        let options = &self.config.options;
        if !options.execute {
            return Ok(&self.records);
        }
        if self.records.has_errors() {
            info!("Execute stage skipped: the audit reported errors");
            return Ok(&self.records);
        }
        if self.records.has_warnings() && !options.ignore_warnings {
            info!("Execute stage skipped: the audit reported warnings");
            return Ok(&self.records);
        }

        self.db.test_connection().await?;
        self.begin(Stage::Execute);
        self.run_stage(batch).await?;
        Ok(&self.records)
    }

    /// Base-column origin of every column a SELECT returns
    ///
    /// Tables resolve through the session cache, so DDL audited earlier in
    /// this session is visible. Nothing is recorded in the record set.
    pub async fn masking(&mut self, sql: &str) -> Result<Vec<MaskingField>, MaskingError> {
        let shape = parse_query_shape(sql)?;
        for name in shape.tables() {
            let key = name
                .resolve(self.default_schema.as_deref())
                .ok_or(MaskingError::NoDatabaseSelected)?;
            self.cache.lookup(self.db.as_ref(), &key).await?;
        }
        let fields = trace_query(&shape, &self.cache, self.default_schema.as_deref())?;
        debug!("Traced {} masking field(s)", fields.len());
        Ok(fields)
    }

    fn begin(&mut self, stage: Stage) {
        self.stage = stage;
        self.cache.reset();
        self.default_schema = self.config.options.database.clone();
        self.records = RecordSet::new();
    }

    async fn run_stage(&mut self, batch: &str) -> Result<(), SessionError> {
        let statements = match self.parser.parse_batch(batch) {
            Ok(statements) => statements,
            Err(e) => {
                warn!("Batch could not be split: {}", e);
                let mut record = Record::new(1, batch.trim(), self.stage);
                record.push(e.to_diagnostic());
                self.records.push(record);
                return Ok(());
            }
        };
        info!("{:?} stage: {} statement(s) via {}", self.stage, statements.len(), self.db.name());

        let mut pending = statements.into_iter().enumerate();
        while let Some((idx, statement)) = pending.next() {
            if let Err(err) = self.process(idx + 1, statement).await {
                for (rest, skipped) in pending {
                    let mut record = Record::new(rest + 1, skipped.sql, self.stage);
                    record.stage_status = StageStatus::Skipped;
                    self.records.push(record);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    async fn process(&mut self, sequence: usize, parsed: ParsedStatement) -> Result<(), SessionError> {
        let mut scope = StatementScope::new(
            Record::new(sequence, parsed.sql, self.stage),
            self.config.severity.clone(),
        );
        if self.config.options.enable_fingerprint {
            scope.record.fingerprint = Some(fingerprint(&scope.record.sql));
        }

        let statement = match parsed.statement {
            Ok(statement) => statement,
            Err(e) => {
                debug!("Statement {} did not parse: {}", sequence, e);
                scope.record.push(e.to_diagnostic());
                self.records.push(scope.record);
                return Ok(());
            }
        };
        debug!("Auditing statement {} ({})", sequence, statement.kind());

        let mut handlers = Handlers {
            cache: &mut self.cache,
            db: self.db.as_ref(),
            rules: &self.config.rules,
            default_schema: &mut self.default_schema,
        };
        let target = match handlers.dispatch(&statement, &mut scope).await {
            Ok(target) => target,
            Err(source) => {
                warn!("Statement {}: {}", sequence, source);
                scope.error(DiagnosticCode::CatalogUnavailable, source.to_string());
                self.records.push(scope.record);
                return Err(SessionError::Catalog(source));
            }
        };

        let (mut record, mut rollback) = scope.finish();
        if self.stage == Stage::Check {
            record.stage_status = StageStatus::AuditCompleted;
            self.records.push(record);
            return Ok(());
        }
        if record.is_aborted() || matches!(statement, AuditStatement::Query) {
            record.stage_status = StageStatus::Skipped;
            self.records.push(record);
            return Ok(());
        }

        record.rollback_sql = rollback.flush();
        self.execute(record, &statement, target).await
    }

    /// Apply one audited statement and persist its rollback
    async fn execute(
        &mut self,
        mut record: Record,
        statement: &AuditStatement,
        target: Option<TableKey>,
    ) -> Result<(), SessionError> {
        let sequence = record.sequence;
        let store = self.backup.clone().filter(|_| self.config.options.backup);
        let mut backup_failed = false;

        if let (Some(store), Some(table), Some(kind)) = (&store, &target, dml_kind(statement)) {
            let capture = DmlCapture {
                table: table.clone(),
                kind,
                sql: record.sql.clone(),
            };
            match store.capture_rows(&capture).await {
                Ok(rows) if !rows.is_empty() => {
                    if !record.rollback_sql.is_empty() {
                        record.rollback_sql.push('\n');
                    }
                    record.rollback_sql.push_str(&rows.join("\n"));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Statement {}: {}", sequence, e);
                    record.push(Diagnostic::warn(
                        DiagnosticCode::BackupFailed,
                        format!("Backup failed: {}", e),
                    ));
                    backup_failed = true;
                }
            }
        }

        let entry = BackupEntry::new(sequence, target, record.sql.clone(), record.rollback_sql.clone());
        let persist = store.filter(|_| !entry.rollback_sql.is_empty());
        let timing = self.config.options.backup_timing;

        if timing == BackupTiming::Before {
            if let Some(store) = &persist {
                backup_failed |= !persist_entry(store.as_ref(), &entry, &mut record).await;
            }
        }

        match self.db.execute(&record.sql).await {
            Ok(rows) => record.affected_rows = rows,
            Err(source) => {
                warn!("Statement {} failed: {}", sequence, source);
                record.push(Diagnostic::error(
                    DiagnosticCode::ExecuteFailed,
                    source.to_string(),
                ));
                record.stage_status = StageStatus::ExecuteFailed;
                self.records.push(record);
                return Err(SessionError::Execute { sequence, source });
            }
        }

        if timing == BackupTiming::After {
            if let Some(store) = &persist {
                backup_failed |= !persist_entry(store.as_ref(), &entry, &mut record).await;
            }
        }

        record.stage_status = match (&persist, backup_failed) {
            (_, true) => StageStatus::BackupFailed,
            (Some(_), false) => StageStatus::BackupSucceeded,
            (None, false) => StageStatus::ExecuteSucceeded,
        };
        debug!("Statement {} applied, {} row(s)", sequence, record.affected_rows);
        self.records.push(record);
        Ok(())
    }
}

fn dml_kind(statement: &AuditStatement) -> Option<DmlKind> {
    match statement {
        AuditStatement::Insert(_) => Some(DmlKind::Insert),
        AuditStatement::Update(_) => Some(DmlKind::Update),
        AuditStatement::Delete(_) => Some(DmlKind::Delete),
        _ => None,
    }
}

/// Persist, turning a failure into a warning on the record
async fn persist_entry(store: &dyn BackupStore, entry: &BackupEntry, record: &mut Record) -> bool {
    match store.persist(entry).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Statement {}: {} store: {}", entry.sequence, store.name(), e);
            record.push(Diagnostic::warn(
                DiagnosticCode::BackupFailed,
                format!("Backup failed: {}", e),
            ));
            false
        }
    }
}
