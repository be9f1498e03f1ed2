use std::collections::BTreeSet;

use anyhow::{Context, Result};
use case_payment_orders_core::{CasePaymentOrderError, OrderFilter, Referent};
use rusqlite::TransactionBehavior;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{audit, records, SqliteStore};

/// Raw delete selector as received from an outer layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteRequest {
    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(default)]
    pub case_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeletionSummary {
    pub referent: Referent,
    pub requested: usize,
    pub records_deleted: usize,
    pub revisions_deleted: usize,
}

/// All-or-nothing removal of live orders and their whole audit history.
pub struct DeletionCoordinator<'a> {
    store: &'a mut SqliteStore,
}

impl<'a> DeletionCoordinator<'a> {
    pub fn new(store: &'a mut SqliteStore) -> Self {
        Self { store }
    }

    /// Resolve and validate `request`, then delete.
    ///
    /// # Errors
    /// Returns [`CasePaymentOrderError::Filter`] unless exactly one list is supplied,
    /// [`CasePaymentOrderError::Validation`] for malformed keys, and
    /// [`CasePaymentOrderError::NotFound`] when any key matches no live order.
    pub fn delete(&mut self, request: &DeleteRequest) -> Result<DeletionSummary> {
        let filter = OrderFilter::resolve(request.ids.as_slice(), request.case_ids.as_slice())?;
        self.delete_filter(&filter)
    }

    /// Delete every live order selected by `filter` together with all its revisions.
    ///
    /// Nothing is removed unless every requested key matches at least one live order.
    /// `filter` must come from [`OrderFilter::resolve`].
    ///
    /// # Errors
    /// Returns [`CasePaymentOrderError::Filter`] for an empty filter,
    /// [`CasePaymentOrderError::NotFound`] listing the unmatched keys, or a
    /// storage error. Either way the transaction is rolled back.
    pub(crate) fn delete_filter(&mut self, filter: &OrderFilter) -> Result<DeletionSummary> {
        if filter.is_empty() {
            return Err(CasePaymentOrderError::Filter(
                "one of ids or case_ids must be supplied".to_string(),
            )
            .into());
        }

        let tx = self
            .store
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to start delete transaction")?;

        let (removed, missing) = match filter {
            OrderFilter::Ids(ids) => {
                let removed = records::delete_by_ids(&tx, ids)?;
                let matched = removed.iter().map(|order| order.id).collect::<BTreeSet<_>>();
                let missing = ids
                    .iter()
                    .filter(|id| !matched.contains(*id))
                    .map(ToString::to_string)
                    .collect::<Vec<_>>();
                (removed, missing)
            }
            OrderFilter::CaseIds(case_ids) => {
                let removed = records::delete_by_case_ids(&tx, case_ids)?;
                let matched = removed.iter().map(|order| order.case_id).collect::<BTreeSet<_>>();
                let missing = case_ids
                    .iter()
                    .filter(|case_id| !matched.contains(*case_id))
                    .map(ToString::to_string)
                    .collect::<Vec<_>>();
                (removed, missing)
            }
        };

        if !missing.is_empty() {
            tx.rollback().context("failed to roll back incomplete delete")?;
            warn!(
                referent = %filter.referent(),
                requested = filter.len(),
                missing = missing.len(),
                "delete rejected; not every key matched a live order"
            );
            return Err(CasePaymentOrderError::NotFound {
                referent: filter.referent(),
                detail: missing.join(", "),
            }
            .into());
        }

        let revisions_deleted = match filter {
            OrderFilter::Ids(ids) => audit::delete_by_record_ids(&tx, ids)?,
            OrderFilter::CaseIds(case_ids) => audit::delete_by_case_ids(&tx, case_ids)?,
        };
        tx.commit().context("failed to commit delete transaction")?;

        let summary = DeletionSummary {
            referent: filter.referent(),
            requested: filter.len(),
            records_deleted: removed.len(),
            revisions_deleted,
        };
        info!(
            referent = %summary.referent,
            records_deleted = summary.records_deleted,
            revisions_deleted = summary.revisions_deleted,
            "deleted case payment orders"
        );
        Ok(summary)
    }
}

impl SqliteStore {
    /// Shorthand for [`DeletionCoordinator::delete`].
    ///
    /// # Errors
    /// See [`DeletionCoordinator::delete`].
    pub fn delete_orders(&mut self, request: &DeleteRequest) -> Result<DeletionSummary> {
        DeletionCoordinator::new(self).delete(request)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use anyhow::anyhow;
    use case_payment_orders_core::{
        CaseId, CasePaymentOrder, CasePaymentOrderFields, CasePaymentOrderId, ChangeType,
        ErrorKind, PageRequest, ValidationIssue,
    };
    use time::macros::datetime;

    use super::*;

    const SHARED_CASE: &str = "6551341964128977";
    const OTHER_CASE: &str = "4444333322221111";

    fn migrated_store() -> Result<SqliteStore> {
        let mut store = SqliteStore::open(Path::new(":memory:"))?;
        store.migrate()?;
        Ok(store)
    }

    fn create(store: &mut SqliteStore, case_id: &str, reference: &str) -> Result<CasePaymentOrder> {
        store.create_order(
            &CasePaymentOrderFields {
                effective_from: datetime!(2026-02-01 12:00 UTC),
                case_id: CaseId::parse(case_id)?,
                action: "Case Creation".to_string(),
                responsible_party: "The Payment Team".to_string(),
                order_reference: reference.to_string(),
            },
            "deleter",
        )
    }

    fn by_ids(ids: &[CasePaymentOrderId]) -> DeleteRequest {
        DeleteRequest { ids: ids.iter().map(ToString::to_string).collect(), case_ids: Vec::new() }
    }

    fn by_case_ids(case_ids: &[&str]) -> DeleteRequest {
        DeleteRequest {
            ids: Vec::new(),
            case_ids: case_ids.iter().map(ToString::to_string).collect(),
        }
    }

    fn core_error(err: &anyhow::Error) -> Option<&CasePaymentOrderError> {
        err.downcast_ref::<CasePaymentOrderError>()
    }

    // Test IDs: TDEL-001
    #[test]
    fn delete_with_one_missing_id_removes_nothing() -> Result<()> {
        let mut store = migrated_store()?;
        let a = create(&mut store, SHARED_CASE, "2021-1")?;
        let b = create(&mut store, OTHER_CASE, "2021-2")?;
        let missing = CasePaymentOrderId::new();

        let Err(err) = store.delete_orders(&by_ids(&[a.id, b.id, missing])) else {
            return Err(anyhow!("incomplete delete succeeded"));
        };
        let Some(CasePaymentOrderError::NotFound { referent, detail }) = core_error(&err) else {
            return Err(anyhow!("expected NotFound, got {err:#}"));
        };
        assert_eq!(*referent, Referent::Id);
        assert_eq!(detail, &missing.to_string());

        for order in [&a, &b] {
            assert_eq!(store.get_order(order.id)?.as_ref(), Some(order));
            let revisions = store.revisions_for(order.id)?;
            assert_eq!(revisions.len(), 1);
            assert_eq!(revisions[0].change_type, ChangeType::Created);
        }
        Ok(())
    }

    // Test IDs: TDEL-002
    #[test]
    fn delete_by_id_purges_every_revision() -> Result<()> {
        let mut store = migrated_store()?;
        let order = create(&mut store, SHARED_CASE, "2021-1")?;
        for action in ["Review", "Approve"] {
            let mut fields = order.fields();
            fields.action = action.to_string();
            store.update_order(order.id, &fields)?;
        }
        assert_eq!(store.revisions_for(order.id)?.len(), 3);

        let summary = store.delete_orders(&by_ids(&[order.id]))?;
        assert_eq!(summary.referent, Referent::Id);
        assert_eq!(summary.records_deleted, 1);
        assert_eq!(summary.revisions_deleted, 4);
        assert!(store.get_order(order.id)?.is_none());
        assert!(store.revisions_for(order.id)?.is_empty());
        assert!(store.integrity_check()?.is_consistent());
        Ok(())
    }

    // Test IDs: TDEL-003
    #[test]
    fn delete_by_shared_case_id_removes_every_matching_record() -> Result<()> {
        let mut store = migrated_store()?;
        let shared = [
            create(&mut store, SHARED_CASE, "2021-1")?,
            create(&mut store, SHARED_CASE, "2021-2")?,
            create(&mut store, SHARED_CASE, "2021-3")?,
        ];
        let survivor = create(&mut store, OTHER_CASE, "2021-1")?;

        let summary = store.delete_orders(&by_case_ids(&[SHARED_CASE, SHARED_CASE]))?;
        assert_eq!(summary.referent, Referent::CaseId);
        assert_eq!(summary.requested, 1);
        assert_eq!(summary.records_deleted, 3);
        assert_eq!(summary.revisions_deleted, 6);

        for order in &shared {
            assert!(store.get_order(order.id)?.is_none());
            assert!(store.revisions_for(order.id)?.is_empty());
        }
        assert_eq!(store.get_order(survivor.id)?, Some(survivor.clone()));
        assert_eq!(store.revisions_for(survivor.id)?.len(), 1);
        Ok(())
    }

    // Test IDs: TDEL-004
    #[test]
    fn delete_by_case_id_with_unmatched_key_rolls_back() -> Result<()> {
        let mut store = migrated_store()?;
        let order = create(&mut store, SHARED_CASE, "2021-1")?;

        let Err(err) = store.delete_orders(&by_case_ids(&[SHARED_CASE, OTHER_CASE])) else {
            return Err(anyhow!("incomplete delete succeeded"));
        };
        let Some(CasePaymentOrderError::NotFound { referent, detail }) = core_error(&err) else {
            return Err(anyhow!("expected NotFound, got {err:#}"));
        };
        assert_eq!(*referent, Referent::CaseId);
        assert_eq!(detail, OTHER_CASE);
        assert!(err.to_string().contains("for Case ID"));

        assert_eq!(store.get_order(order.id)?, Some(order.clone()));
        assert_eq!(store.revisions_for(order.id)?.len(), 1);
        Ok(())
    }

    // Test IDs: TDEL-005
    #[test]
    fn delete_requires_exactly_one_key_list() -> Result<()> {
        let mut store = migrated_store()?;

        for request in [
            DeleteRequest::default(),
            DeleteRequest {
                ids: vec!["not-a-ulid".to_string()],
                case_ids: vec!["12345".to_string()],
            },
        ] {
            let Err(err) = store.delete_orders(&request) else {
                return Err(anyhow!("ambiguous delete succeeded"));
            };
            assert!(matches!(core_error(&err), Some(CasePaymentOrderError::Filter(_))));
        }
        Ok(())
    }

    // Test IDs: TDEL-006
    #[test]
    fn delete_reports_every_malformed_case_id_together() -> Result<()> {
        let mut store = migrated_store()?;
        create(&mut store, SHARED_CASE, "2021-1")?;

        let Err(err) = store.delete_orders(&by_case_ids(&["12345", SHARED_CASE, "6551341964128976"]))
        else {
            return Err(anyhow!("malformed delete succeeded"));
        };
        let Some(CasePaymentOrderError::Validation(report)) = core_error(&err) else {
            return Err(anyhow!("expected validation error, got {err:#}"));
        };
        assert_eq!(report.invalid_values(), vec!["12345", "6551341964128976"]);
        assert!(report
            .issues()
            .iter()
            .any(|issue| matches!(issue, ValidationIssue::CaseIdLength { .. })));

        let page = store.find_by_case_ids(&[CaseId::parse(SHARED_CASE)?], PageRequest::default())?;
        assert_eq!(page.total_elements, 1);
        Ok(())
    }

    // Test IDs: TDEL-007
    #[test]
    fn record_that_moved_off_the_case_id_keeps_its_history() -> Result<()> {
        let mut store = migrated_store()?;
        let stays = create(&mut store, SHARED_CASE, "2021-1")?;
        let moves = create(&mut store, SHARED_CASE, "2021-2")?;

        let mut fields = moves.fields();
        fields.case_id = CaseId::parse(OTHER_CASE)?;
        store.update_order(moves.id, &fields)?;

        let summary = store.delete_orders(&by_case_ids(&[SHARED_CASE]))?;
        assert_eq!(summary.records_deleted, 1);
        assert!(store.revisions_for(stays.id)?.is_empty());
        assert_eq!(store.revisions_for(moves.id)?.len(), 2);

        let report = store.integrity_check()?;
        assert!(report.is_consistent(), "{report:?}");
        Ok(())
    }

    // Test IDs: TDEL-008
    #[test]
    fn deletion_errors_classify_by_kind() -> Result<()> {
        let mut store = migrated_store()?;
        let Err(err) = store.delete_orders(&by_ids(&[CasePaymentOrderId::new()])) else {
            return Err(anyhow!("delete of unknown id succeeded"));
        };
        assert_eq!(core_error(&err).map(CasePaymentOrderError::kind), Some(ErrorKind::NotFound));
        Ok(())
    }

    // Test IDs: TDEL-009
    #[test]
    fn empty_filter_is_rejected_without_touching_the_store() -> Result<()> {
        let mut store = migrated_store()?;
        let order = create(&mut store, SHARED_CASE, "2021-1")?;

        for filter in [OrderFilter::Ids(Vec::new()), OrderFilter::CaseIds(Vec::new())] {
            let Err(err) = DeletionCoordinator::new(&mut store).delete_filter(&filter) else {
                return Err(anyhow!("empty delete succeeded"));
            };
            assert!(matches!(core_error(&err), Some(CasePaymentOrderError::Filter(_))));
        }
        assert_eq!(store.get_order(order.id)?, Some(order));
        Ok(())
    }

    // Test IDs: TDEL-010
    #[test]
    fn delete_with_tens_of_thousands_of_ids_reports_missing_keys() -> Result<()> {
        let mut store = migrated_store()?;
        let live = create(&mut store, SHARED_CASE, "2021-1")?;

        let mut ids = (0..40_000).map(|_| CasePaymentOrderId::new()).collect::<Vec<_>>();
        ids.push(live.id);

        let Err(err) = store.delete_orders(&by_ids(&ids)) else {
            return Err(anyhow!("delete of unknown ids succeeded"));
        };
        assert_eq!(core_error(&err).map(CasePaymentOrderError::kind), Some(ErrorKind::NotFound));
        assert_eq!(store.get_order(live.id)?, Some(live.clone()));
        assert_eq!(store.revisions_for(live.id)?.len(), 1);

        let summary = store.delete_orders(&by_ids(&[live.id]))?;
        assert_eq!(summary.records_deleted, 1);
        Ok(())
    }
}
