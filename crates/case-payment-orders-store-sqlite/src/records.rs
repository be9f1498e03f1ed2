//! Live `case_payment_orders` table.
//!
//! Every mutation here runs in the caller's transaction together with its
//! audit append, so the two tables move in lockstep.

use anyhow::{anyhow, Context, Result};
use case_payment_orders_core::{
    validate_required, CaseId, CasePaymentOrder, CasePaymentOrderError, CasePaymentOrderFields,
    CasePaymentOrderId, ChangeType, OrderFilter, Page, PageRequest, Referent, ValidationReport,
};
use rusqlite::{params, Connection, OptionalExtension, Params, TransactionBehavior};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::{
    audit, case_id_from_sql, case_id_to_sql, is_unique_violation, key_set, parse_order_id,
    parse_rfc3339, rfc3339, SqliteStore, IN_KEY_SET,
};

const ORDER_COLUMNS: &str = "id, case_id, order_reference, action, responsible_party,
    effective_from, created_timestamp, created_by";

const ORDER_SORT: &str = "ORDER BY case_id ASC, order_reference ASC";

impl SqliteStore {
    /// Persist a new order and its `created` revision in one transaction.
    ///
    /// # Errors
    /// Returns [`CasePaymentOrderError::Validation`] for blank fields or identity,
    /// [`CasePaymentOrderError::Conflict`] when the (case id, order reference) pair
    /// already exists, or a storage error.
    pub fn create_order(
        &mut self,
        fields: &CasePaymentOrderFields,
        created_by: &str,
    ) -> Result<CasePaymentOrder> {
        fields.validate()?;
        if let Some(issue) = validate_required("created_by", created_by) {
            return Err(CasePaymentOrderError::from(ValidationReport::from(issue)).into());
        }

        let order = CasePaymentOrder {
            id: CasePaymentOrderId::new(),
            case_id: fields.case_id,
            order_reference: fields.order_reference.clone(),
            action: fields.action.clone(),
            responsible_party: fields.responsible_party.clone(),
            effective_from: fields.effective_from,
            created_timestamp: OffsetDateTime::now_utc(),
            created_by: created_by.to_string(),
        };

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to start transaction")?;
        insert_order(&tx, &order)?;
        audit::append(&tx, ChangeType::Created, &order)?;
        tx.commit().context("failed to commit create transaction")?;

        info!(id = %order.id, case_id = %order.case_id, "created case payment order");
        Ok(order)
    }

    /// Replace the editable fields of an existing order and append a `modified` revision.
    ///
    /// # Errors
    /// Returns [`CasePaymentOrderError::NotFound`] when `id` does not exist,
    /// [`CasePaymentOrderError::Conflict`] when the new pair collides with another
    /// order, validation errors for blank fields, or a storage error.
    pub fn update_order(
        &mut self,
        id: CasePaymentOrderId,
        fields: &CasePaymentOrderFields,
    ) -> Result<CasePaymentOrder> {
        fields.validate()?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to start transaction")?;
        let Some(mut order) = load_order(&tx, id)? else {
            return Err(CasePaymentOrderError::NotFound {
                referent: Referent::Id,
                detail: id.to_string(),
            }
            .into());
        };

        order.apply(fields.clone());
        let result = tx.execute(
            "UPDATE case_payment_orders
             SET case_id = ?2, order_reference = ?3, action = ?4,
                 responsible_party = ?5, effective_from = ?6
             WHERE id = ?1",
            params![
                order.id.to_string(),
                case_id_to_sql(order.case_id)?,
                order.order_reference,
                order.action,
                order.responsible_party,
                rfc3339(order.effective_from)?,
            ],
        );
        match result {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => return Err(duplicate_pair(&order).into()),
            Err(err) => {
                return Err(anyhow::Error::new(err).context("failed to update case payment order"))
            }
        }

        audit::append(&tx, ChangeType::Modified, &order)?;
        tx.commit().context("failed to commit update transaction")?;

        info!(id = %order.id, case_id = %order.case_id, "updated case payment order");
        Ok(order)
    }

    /// Load one order by surrogate id.
    ///
    /// # Errors
    /// Returns an error when the row cannot be read or decoded.
    pub fn get_order(&self, id: CasePaymentOrderId) -> Result<Option<CasePaymentOrder>> {
        load_order(&self.conn, id)
    }

    /// Page through orders whose surrogate id is in `ids`.
    ///
    /// # Errors
    /// Returns an error when the query fails or a row cannot be decoded.
    pub fn find_by_ids(
        &self,
        ids: &[CasePaymentOrderId],
        page: PageRequest,
    ) -> Result<Page<CasePaymentOrder>> {
        page_where(&self.conn, "id", ids, page)
    }

    /// Page through orders whose case id is in `case_ids`.
    ///
    /// # Errors
    /// Returns an error when the query fails or a row cannot be decoded.
    pub fn find_by_case_ids(
        &self,
        case_ids: &[CaseId],
        page: PageRequest,
    ) -> Result<Page<CasePaymentOrder>> {
        page_where(&self.conn, "case_id", case_ids, page)
    }

    /// Page through orders selected by `filter`, sorted by case id then order reference.
    ///
    /// # Errors
    /// Returns an error when the query fails or a row cannot be decoded.
    pub fn query_orders(
        &self,
        filter: &OrderFilter,
        page: PageRequest,
    ) -> Result<Page<CasePaymentOrder>> {
        match filter {
            OrderFilter::Ids(ids) => self.find_by_ids(ids, page),
            OrderFilter::CaseIds(case_ids) => self.find_by_case_ids(case_ids, page),
        }
    }
}

/// Remove every live order whose id is in `ids`, returning the removed rows.
///
/// Each removed row gets a `deleted` revision in the same transaction. The
/// number of rows returned is the number actually deleted.
pub(crate) fn delete_by_ids(
    conn: &Connection,
    ids: &[CasePaymentOrderId],
) -> Result<Vec<CasePaymentOrder>> {
    delete_where(conn, "id", ids)
}

/// Remove every live order whose case id is in `case_ids`, returning the removed rows.
pub(crate) fn delete_by_case_ids(
    conn: &Connection,
    case_ids: &[CaseId],
) -> Result<Vec<CasePaymentOrder>> {
    delete_where(conn, "case_id", case_ids)
}

fn delete_where<K: Serialize>(
    conn: &Connection,
    column: &str,
    keys: &[K],
) -> Result<Vec<CasePaymentOrder>> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }
    let keys = key_set(keys)?;

    let matched = select_where(
        conn,
        &format!(
            "SELECT {ORDER_COLUMNS} FROM case_payment_orders
             WHERE {column} {IN_KEY_SET} {ORDER_SORT}"
        ),
        params![keys],
    )?;

    for order in &matched {
        audit::append(conn, ChangeType::Deleted, order)?;
    }

    let deleted = conn
        .execute(
            &format!("DELETE FROM case_payment_orders WHERE {column} {IN_KEY_SET}"),
            params![keys],
        )
        .context("failed to delete case payment orders")?;

    if deleted != matched.len() {
        return Err(anyhow!(
            "deleted {deleted} case payment orders but matched {}",
            matched.len()
        ));
    }

    debug!(column, deleted, "deleted case payment order rows");
    Ok(matched)
}

fn insert_order(conn: &Connection, order: &CasePaymentOrder) -> Result<()> {
    let result = conn.execute(
        "INSERT INTO case_payment_orders(
            id, case_id, order_reference, action, responsible_party,
            effective_from, created_timestamp, created_by
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            order.id.to_string(),
            case_id_to_sql(order.case_id)?,
            order.order_reference,
            order.action,
            order.responsible_party,
            rfc3339(order.effective_from)?,
            rfc3339(order.created_timestamp)?,
            order.created_by,
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(err) if is_unique_violation(&err) => Err(duplicate_pair(order).into()),
        Err(err) => Err(anyhow::Error::new(err).context("failed to insert case payment order")),
    }
}

fn load_order(conn: &Connection, id: CasePaymentOrderId) -> Result<Option<CasePaymentOrder>> {
    let mut stmt =
        conn.prepare(&format!("SELECT {ORDER_COLUMNS} FROM case_payment_orders WHERE id = ?1"))?;
    let raw = stmt.query_row(params![id.to_string()], OrderRow::read).optional()?;
    raw.map(OrderRow::into_order).transpose()
}

fn page_where<K: Serialize>(
    conn: &Connection,
    column: &str,
    keys: &[K],
    page: PageRequest,
) -> Result<Page<CasePaymentOrder>> {
    let offset = page.checked_offset()?;
    if keys.is_empty() {
        return Ok(Page::new(Vec::new(), page, 0));
    }
    let keys = key_set(keys)?;

    let total: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM case_payment_orders WHERE {column} {IN_KEY_SET}"),
            params![keys],
            |row| row.get(0),
        )
        .context("failed to count case payment orders")?;

    let content = select_where(
        conn,
        &format!(
            "SELECT {ORDER_COLUMNS} FROM case_payment_orders
             WHERE {column} {IN_KEY_SET} {ORDER_SORT}
             LIMIT ?2 OFFSET ?3"
        ),
        params![keys, i64::from(page.size), offset],
    )?;

    debug!(column, total, returned = content.len(), page = page.page, "paged case payment orders");
    Ok(Page::new(content, page, u64::try_from(total).context("negative row count")?))
}

fn select_where<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<CasePaymentOrder>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, OrderRow::read)?;
    let mut orders = Vec::new();
    for row in rows {
        orders.push(row?.into_order()?);
    }
    Ok(orders)
}

fn duplicate_pair(order: &CasePaymentOrder) -> CasePaymentOrderError {
    CasePaymentOrderError::Conflict(format!(
        "a case payment order already exists for case_id {} and order_reference {}",
        order.case_id, order.order_reference
    ))
}

/// Raw column values, decoded outside the rusqlite row callback.
struct OrderRow {
    id: String,
    case_id: i64,
    order_reference: String,
    action: String,
    responsible_party: String,
    effective_from: String,
    created_timestamp: String,
    created_by: String,
}

impl OrderRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            case_id: row.get(1)?,
            order_reference: row.get(2)?,
            action: row.get(3)?,
            responsible_party: row.get(4)?,
            effective_from: row.get(5)?,
            created_timestamp: row.get(6)?,
            created_by: row.get(7)?,
        })
    }

    fn into_order(self) -> Result<CasePaymentOrder> {
        Ok(CasePaymentOrder {
            id: parse_order_id(&self.id)?,
            case_id: case_id_from_sql(self.case_id)?,
            order_reference: self.order_reference,
            action: self.action,
            responsible_party: self.responsible_party,
            effective_from: parse_rfc3339(&self.effective_from)?,
            created_timestamp: parse_rfc3339(&self.created_timestamp)?,
            created_by: self.created_by,
        })
    }
}
