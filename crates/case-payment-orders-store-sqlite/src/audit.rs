//! Append-only revision trail for `case_payment_orders`.

use anyhow::{anyhow, Context, Result};
use case_payment_orders_core::{
    AuditRevision, CaseId, CasePaymentOrder, CasePaymentOrderId, ChangeType,
};
use rusqlite::{params, Connection};
use time::OffsetDateTime;

use crate::{
    case_id_from_sql, case_id_to_sql, key_set, parse_order_id, parse_rfc3339, rfc3339,
    SqliteStore, IN_KEY_SET,
};

/// Record one revision of `order` inside the caller's transaction.
pub(crate) fn append(
    conn: &Connection,
    change_type: ChangeType,
    order: &CasePaymentOrder,
) -> Result<AuditRevision> {
    let revision_timestamp = OffsetDateTime::now_utc();
    conn.execute(
        "INSERT INTO case_payment_orders_audit(
            record_id, change_type, revision_timestamp, case_id, order_reference,
            action, responsible_party, effective_from, created_timestamp, created_by
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            order.id.to_string(),
            change_type.as_str(),
            rfc3339(revision_timestamp)?,
            case_id_to_sql(order.case_id)?,
            order.order_reference,
            order.action,
            order.responsible_party,
            rfc3339(order.effective_from)?,
            rfc3339(order.created_timestamp)?,
            order.created_by,
        ],
    )
    .with_context(|| format!("failed to append {} revision for {}", change_type.as_str(), order.id))?;

    Ok(AuditRevision {
        revision_number: conn.last_insert_rowid(),
        record_id: order.id,
        change_type,
        revision_timestamp,
        snapshot: Some(order.clone()),
    })
}

impl SqliteStore {
    /// Every revision recorded for `id`, oldest first.
    ///
    /// # Errors
    /// Returns an error when the audit rows cannot be read or decoded.
    pub fn revisions_for(&self, id: CasePaymentOrderId) -> Result<Vec<AuditRevision>> {
        let mut stmt = self.conn.prepare(
            "SELECT revision_number, record_id, change_type, revision_timestamp, case_id,
                    order_reference, action, responsible_party, effective_from,
                    created_timestamp, created_by
             FROM case_payment_orders_audit
             WHERE record_id = ?1
             ORDER BY revision_number ASC",
        )?;
        let rows = stmt.query_map(params![id.to_string()], RevisionRow::read)?;

        let mut revisions = Vec::new();
        for row in rows {
            revisions.push(row?.into_revision()?);
        }
        Ok(revisions)
    }
}

/// Purge all revisions of the given records.
pub(crate) fn delete_by_record_ids(conn: &Connection, ids: &[CasePaymentOrderId]) -> Result<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    conn.execute(
        &format!("DELETE FROM case_payment_orders_audit WHERE record_id {IN_KEY_SET}"),
        params![key_set(ids)?],
    )
    .context("failed to delete audit revisions by record id")
}

/// Purge revisions of records that ever carried one of `case_ids` and are no
/// longer live. History of a live record that moved away from the case id is kept.
pub(crate) fn delete_by_case_ids(conn: &Connection, case_ids: &[CaseId]) -> Result<usize> {
    if case_ids.is_empty() {
        return Ok(0);
    }
    conn.execute(
        &format!(
            "DELETE FROM case_payment_orders_audit
             WHERE record_id IN (
               SELECT DISTINCT record_id FROM case_payment_orders_audit
               WHERE case_id {IN_KEY_SET}
             )
             AND record_id NOT IN (SELECT id FROM case_payment_orders)"
        ),
        params![key_set(case_ids)?],
    )
    .context("failed to delete audit revisions by case id")
}

struct RevisionRow {
    revision_number: i64,
    record_id: String,
    change_type: String,
    revision_timestamp: String,
    case_id: Option<i64>,
    order_reference: Option<String>,
    action: Option<String>,
    responsible_party: Option<String>,
    effective_from: Option<String>,
    created_timestamp: Option<String>,
    created_by: Option<String>,
}

impl RevisionRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            revision_number: row.get(0)?,
            record_id: row.get(1)?,
            change_type: row.get(2)?,
            revision_timestamp: row.get(3)?,
            case_id: row.get(4)?,
            order_reference: row.get(5)?,
            action: row.get(6)?,
            responsible_party: row.get(7)?,
            effective_from: row.get(8)?,
            created_timestamp: row.get(9)?,
            created_by: row.get(10)?,
        })
    }

    fn into_revision(self) -> Result<AuditRevision> {
        let record_id = parse_order_id(&self.record_id)?;
        let change_type = ChangeType::parse(&self.change_type)
            .ok_or_else(|| anyhow!("invalid change_type in audit row: {}", self.change_type))?;

        let snapshot = match (
            self.case_id,
            self.order_reference,
            self.action,
            self.responsible_party,
            self.effective_from,
            self.created_timestamp,
            self.created_by,
        ) {
            (
                Some(case_id),
                Some(order_reference),
                Some(action),
                Some(responsible_party),
                Some(effective_from),
                Some(created_timestamp),
                Some(created_by),
            ) => Some(CasePaymentOrder {
                id: record_id,
                case_id: case_id_from_sql(case_id)?,
                order_reference,
                action,
                responsible_party,
                effective_from: parse_rfc3339(&effective_from)?,
                created_timestamp: parse_rfc3339(&created_timestamp)?,
                created_by,
            }),
            _ => None,
        };

        Ok(AuditRevision {
            revision_number: self.revision_number,
            record_id,
            change_type,
            revision_timestamp: parse_rfc3339(&self.revision_timestamp)?,
            snapshot,
        })
    }
}
