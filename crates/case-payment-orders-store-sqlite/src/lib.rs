use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use case_payment_orders_core::{CaseId, CasePaymentOrderId};
use rusqlite::{params, Connection, DatabaseName};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use ulid::Ulid;

mod audit;
mod deletion;
mod records;

pub use deletion::{DeleteRequest, DeletionCoordinator, DeletionSummary};

const LATEST_SCHEMA_VERSION: i64 = 1;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS case_payment_orders (
  id TEXT PRIMARY KEY,
  case_id INTEGER NOT NULL CHECK (case_id BETWEEN 0 AND 9999999999999999),
  order_reference TEXT NOT NULL,
  action TEXT NOT NULL,
  responsible_party TEXT NOT NULL,
  effective_from TEXT NOT NULL,
  created_timestamp TEXT NOT NULL,
  created_by TEXT NOT NULL,
  CONSTRAINT uk_case_payment_orders_case_id_order_reference UNIQUE (case_id, order_reference)
);

CREATE TABLE IF NOT EXISTS case_payment_orders_audit (
  revision_number INTEGER PRIMARY KEY AUTOINCREMENT,
  record_id TEXT NOT NULL,
  change_type TEXT NOT NULL CHECK (change_type IN ('created','modified','deleted')),
  revision_timestamp TEXT NOT NULL,
  case_id INTEGER,
  order_reference TEXT,
  action TEXT,
  responsible_party TEXT,
  effective_from TEXT,
  created_timestamp TEXT,
  created_by TEXT
);

CREATE INDEX IF NOT EXISTS idx_case_payment_orders_case_id ON case_payment_orders(case_id);
CREATE INDEX IF NOT EXISTS idx_case_payment_orders_audit_record_id ON case_payment_orders_audit(record_id);
CREATE INDEX IF NOT EXISTS idx_case_payment_orders_audit_case_id ON case_payment_orders_audit(case_id);
";

const MIGRATIONS: &[(i64, &str)] = &[(1, MIGRATION_001_SQL)];

pub struct SqliteStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrityReport {
    pub quick_check_ok: bool,
    pub quick_check_message: String,
    /// Live orders with no `created` revision in the audit trail.
    pub orders_without_created_revision: Vec<String>,
    /// Audit record ids whose live order no longer exists.
    pub orphaned_revision_record_ids: Vec<String>,
    pub schema_status: SchemaStatus,
}

impl IntegrityReport {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.quick_check_ok
            && self.orders_without_created_revision.is_empty()
            && self.orphaned_revision_record_ids.is_empty()
    }
}

impl SqliteStore {
    /// Open a SQLite-backed order store and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let current_version = current_schema_version(&self.conn)?;
        let pending_versions = MIGRATIONS
            .iter()
            .map(|(version, _)| *version)
            .filter(|version| *version > current_version)
            .collect::<Vec<_>>();

        Ok(SchemaStatus {
            current_version,
            target_version: LATEST_SCHEMA_VERSION,
            pending_versions,
        })
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when migration bootstrapping or any migration step fails.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let current = current_schema_version(&self.conn)?;
        if current > LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {current}; expected at most {LATEST_SCHEMA_VERSION}"
            ));
        }

        for (version, sql) in MIGRATIONS.iter().filter(|(version, _)| *version > current) {
            let tx = self
                .conn
                .transaction()
                .with_context(|| format!("failed to start migration v{version} transaction"))?;
            tx.execute_batch(sql).with_context(|| format!("failed to apply migration v{version}"))?;
            record_schema_version(&tx, *version)?;
            tx.commit().with_context(|| format!("failed to commit migration v{version}"))?;
            tracing::info!(version, "applied schema migration");
        }

        let version = current_schema_version(&self.conn)?;
        if version != LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {version}; expected {LATEST_SCHEMA_VERSION}"
            ));
        }

        Ok(())
    }

    /// Create a `SQLite` backup file of the current main database.
    ///
    /// # Errors
    /// Returns an error when backup directories cannot be created or backup fails.
    pub fn backup_database(&self, out_file: &Path) -> Result<()> {
        if let Some(parent) = out_file.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create parent directory for backup file {}", out_file.display())
            })?;
        }

        self.conn
            .backup(DatabaseName::Main, out_file, None)
            .with_context(|| format!("failed to create sqlite backup at {}", out_file.display()))
    }

    /// Restore this database from a `SQLite` backup file, then migrate to latest.
    ///
    /// # Errors
    /// Returns an error when the backup file is missing, restore fails, or migrations fail.
    pub fn restore_database(&mut self, in_file: &Path) -> Result<()> {
        if !in_file.exists() {
            return Err(anyhow!("backup file does not exist: {}", in_file.display()));
        }

        self.conn
            .restore(DatabaseName::Main, in_file, None::<fn(rusqlite::backup::Progress)>)
            .with_context(|| {
                format!("failed to restore sqlite backup from {}", in_file.display())
            })?;

        self.migrate()
    }

    /// Run quick-check plus live/audit consistency checks.
    ///
    /// # Errors
    /// Returns an error when any check query fails.
    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        let quick_check_message: String = self
            .conn
            .query_row("PRAGMA quick_check", [], |row| row.get::<_, String>(0))
            .context("failed to run PRAGMA quick_check")?;

        let orders_without_created_revision = collect_strings(
            &self.conn,
            "SELECT o.id FROM case_payment_orders o
             WHERE NOT EXISTS (
               SELECT 1 FROM case_payment_orders_audit a
               WHERE a.record_id = o.id AND a.change_type = 'created'
             )
             ORDER BY o.id ASC",
        )
        .context("failed to check orders without a created revision")?;

        let orphaned_revision_record_ids = collect_strings(
            &self.conn,
            "SELECT DISTINCT a.record_id FROM case_payment_orders_audit a
             WHERE NOT EXISTS (SELECT 1 FROM case_payment_orders o WHERE o.id = a.record_id)
             ORDER BY a.record_id ASC",
        )
        .context("failed to check orphaned audit revisions")?;

        let schema_status = self.schema_status()?;
        Ok(IntegrityReport {
            quick_check_ok: quick_check_message == "ok",
            quick_check_message,
            orders_without_created_revision,
            orphaned_revision_record_ids,
            schema_status,
        })
    }
}

fn collect_strings(conn: &Connection, sql: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut values = Vec::new();
    for row in rows {
        values.push(row?);
    }
    Ok(values)
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let version = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get::<_, i64>(0)
        })
        .context("failed to read current schema version")?;
    Ok(version)
}

fn record_schema_version(conn: &Connection, version: i64) -> Result<()> {
    let now = now_rfc3339()?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, now],
    )
    .with_context(|| format!("failed to record migration version {version}"))?;
    Ok(())
}

/// Membership test against a key set bound as one JSON array in `?1`.
///
/// Binding the whole set as a single parameter keeps large key sets clear of
/// SQLite's bound-variable limit.
const IN_KEY_SET: &str = "IN (SELECT value FROM json_each(?1))";

fn key_set<T: Serialize>(keys: &[T]) -> Result<String> {
    serde_json::to_string(keys).context("failed to encode key set")
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn now_rfc3339() -> Result<String> {
    rfc3339(OffsetDateTime::now_utc())
}

fn rfc3339(value: OffsetDateTime) -> Result<String> {
    value
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}

fn parse_rfc3339(value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .with_context(|| format!("invalid RFC3339 timestamp: {value}"))
}

fn parse_order_id(raw: &str) -> Result<CasePaymentOrderId> {
    let parsed = Ulid::from_string(raw).with_context(|| format!("invalid ULID: {raw}"))?;
    Ok(CasePaymentOrderId(parsed))
}

fn case_id_to_sql(case_id: CaseId) -> Result<i64> {
    i64::try_from(case_id.value())
        .with_context(|| format!("case id {case_id} does not fit a sqlite integer"))
}

fn case_id_from_sql(raw: i64) -> Result<CaseId> {
    let value =
        u64::try_from(raw).with_context(|| format!("stored case id is negative: {raw}"))?;
    CaseId::try_from(value).with_context(|| format!("stored case id is invalid: {raw}"))
}
