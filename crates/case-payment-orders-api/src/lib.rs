use std::path::{Path, PathBuf};

use anyhow::Result;
use case_payment_orders_core::{
    uid, validate_required, AuditRevision, CaseId, CasePaymentOrder, CasePaymentOrderError,
    CasePaymentOrderFields, CasePaymentOrderId, ErrorKind, OrderFilter, Page, PageRequest,
    Referent, ValidationIssue, ValidationReport,
};
use case_payment_orders_store_sqlite::{
    DeleteRequest, DeletionSummary, IntegrityReport, SchemaStatus, SqliteStore,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

pub const API_CONTRACT_VERSION: &str = "api.v1";

/// Source of the identity recorded as `created_by` on new orders.
pub trait IdentityProvider {
    /// # Errors
    /// Returns an error when no identity can be resolved for the current caller.
    fn current_identity(&self) -> Result<String>;
}

/// Identity fixed at construction, for CLI and test callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticIdentity(String);

impl StaticIdentity {
    #[must_use]
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_identity(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrateResult {
    pub dry_run: bool,
    pub current_version: i64,
    pub target_version: i64,
    pub would_apply_versions: Vec<i64>,
    pub after_version: Option<i64>,
    pub up_to_date: Option<bool>,
}

/// Untrusted order fields; every problem is reported in a single validation error.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateCasePaymentOrderRequest {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub effective_from: Option<OffsetDateTime>,
    #[serde(default)]
    pub case_id: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub responsible_party: String,
    #[serde(default)]
    pub order_reference: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateCasePaymentOrderRequest {
    #[serde(default)]
    pub id: String,
    #[serde(flatten)]
    pub order: CreateCasePaymentOrderRequest,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CasePaymentOrderQuery {
    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(default)]
    pub case_ids: Vec<String>,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupResult {
    pub backup_path: String,
    pub schema_version: i64,
}

/// Transport-neutral view of a failed call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub issues: Vec<ValidationIssue>,
}

impl ErrorReport {
    #[must_use]
    pub fn from_error(err: &anyhow::Error) -> Self {
        match domain_error(err) {
            Some(domain) => Self {
                kind: domain.kind(),
                message: domain.to_string(),
                issues: match domain {
                    CasePaymentOrderError::Validation(report) => report.issues().to_vec(),
                    _ => Vec::new(),
                },
            },
            None => Self { kind: ErrorKind::Fatal, message: format!("{err:#}"), issues: Vec::new() },
        }
    }
}

/// Classify any error raised through this API. Anything that is not a domain error is fatal.
#[must_use]
pub fn classify(err: &anyhow::Error) -> ErrorKind {
    domain_error(err).map_or(ErrorKind::Fatal, CasePaymentOrderError::kind)
}

fn domain_error(err: &anyhow::Error) -> Option<&CasePaymentOrderError> {
    err.chain().find_map(|cause| cause.downcast_ref::<CasePaymentOrderError>())
}

#[derive(Debug, Clone)]
pub struct CasePaymentOrdersApi {
    db_path: PathBuf,
}

impl CasePaymentOrdersApi {
    #[must_use]
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn open_store(&self) -> Result<SqliteStore> {
        debug!(db = %self.db_path.display(), "opening case payment order store");
        SqliteStore::open(&self.db_path)
    }

    fn open_migrated_store(&self) -> Result<SqliteStore> {
        let mut store = self.open_store()?;
        store.migrate()?;
        Ok(store)
    }

    /// Inspect schema status without mutating data.
    ///
    /// # Errors
    /// Returns an error when the `SQLite` database cannot be opened or queried.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        let store = self.open_store()?;
        store.schema_status()
    }

    /// Apply pending migrations, or return planned versions for dry-run mode.
    ///
    /// # Errors
    /// Returns an error when migration planning or execution fails.
    pub fn migrate(&self, dry_run: bool) -> Result<MigrateResult> {
        let mut store = self.open_store()?;
        let before = store.schema_status()?;
        if dry_run {
            return Ok(MigrateResult {
                dry_run: true,
                current_version: before.current_version,
                target_version: before.target_version,
                would_apply_versions: before.pending_versions,
                after_version: None,
                up_to_date: None,
            });
        }

        store.migrate()?;
        let after = store.schema_status()?;
        Ok(MigrateResult {
            dry_run: false,
            current_version: before.current_version,
            target_version: before.target_version,
            would_apply_versions: before.pending_versions,
            after_version: Some(after.current_version),
            up_to_date: Some(after.pending_versions.is_empty()),
        })
    }

    /// Validate and persist a new order on behalf of `identity`.
    ///
    /// # Errors
    /// Returns a validation error listing every bad field, a conflict when the
    /// (case id, order reference) pair is taken, or a storage error.
    pub fn create(
        &self,
        request: &CreateCasePaymentOrderRequest,
        identity: &dyn IdentityProvider,
    ) -> Result<CasePaymentOrder> {
        let mut report = ValidationReport::new();
        let fields = collect_fields(request, &mut report)?;
        let (Some(fields), true) = (fields, report.is_empty()) else {
            return Err(CasePaymentOrderError::from(report).into());
        };
        let created_by = identity.current_identity()?;
        let mut store = self.open_migrated_store()?;
        store.create_order(&fields, &created_by)
    }

    /// Replace the editable fields of an existing order.
    ///
    /// # Errors
    /// Returns a validation error listing every bad field including the id, not-found
    /// when the id has no live order, a conflict, or a storage error.
    pub fn update(&self, request: &UpdateCasePaymentOrderRequest) -> Result<CasePaymentOrder> {
        let mut report = ValidationReport::new();
        let id = record_issues(CasePaymentOrderId::parse_field("id", &request.id), &mut report)?;
        let fields = collect_fields(&request.order, &mut report)?;
        let (Some(id), Some(fields), true) = (id, fields, report.is_empty()) else {
            return Err(CasePaymentOrderError::from(report).into());
        };

        let mut store = self.open_migrated_store()?;
        store.update_order(id, &fields)
    }

    /// Load one live order.
    ///
    /// # Errors
    /// Returns a validation error for a malformed id, not-found when absent, or a storage error.
    pub fn get(&self, id: &str) -> Result<CasePaymentOrder> {
        let id = CasePaymentOrderId::parse_field("id", id)?;
        let store = self.open_migrated_store()?;
        store.get_order(id)?.ok_or_else(|| {
            CasePaymentOrderError::NotFound { referent: Referent::Id, detail: id.to_string() }.into()
        })
    }

    /// Page through orders selected by ids or by case ids.
    ///
    /// # Errors
    /// Returns a filter error unless exactly one key list is supplied, a validation
    /// error for malformed keys or pagination, or a storage error.
    pub fn query(&self, query: &CasePaymentOrderQuery) -> Result<Page<CasePaymentOrder>> {
        let filter = OrderFilter::resolve(query.ids.as_slice(), query.case_ids.as_slice())?;
        let page = PageRequest::new(
            query.page.unwrap_or(0),
            query.size.unwrap_or(PageRequest::DEFAULT_SIZE),
        )?;
        let store = self.open_migrated_store()?;
        let result = store.query_orders(&filter, page)?;
        debug!(
            referent = %filter.referent(),
            keys = filter.len(),
            total = result.total_elements,
            "queried case payment orders"
        );
        Ok(result)
    }

    /// Delete orders and their history, all or nothing.
    ///
    /// # Errors
    /// Returns a filter or validation error for a bad request, not-found when any key
    /// matches no live order, or a storage error.
    pub fn delete(&self, request: &DeleteRequest) -> Result<DeletionSummary> {
        let mut store = self.open_migrated_store()?;
        store.delete_orders(request)
    }

    /// Revision history of one order, oldest first.
    ///
    /// # Errors
    /// Returns a validation error for a malformed id, not-found when the id has no
    /// recorded history, or a storage error.
    pub fn history(&self, id: &str) -> Result<Vec<AuditRevision>> {
        let id = CasePaymentOrderId::parse_field("id", id)?;
        let store = self.open_migrated_store()?;
        let revisions = store.revisions_for(id)?;
        if revisions.is_empty() {
            return Err(CasePaymentOrderError::NotFound {
                referent: Referent::Id,
                detail: id.to_string(),
            }
            .into());
        }
        Ok(revisions)
    }

    /// Generate a fresh check-digit-valid case id. Does not touch the database.
    ///
    /// # Errors
    /// Returns a fatal error when the OS random source is unavailable.
    pub fn generate_case_id(&self) -> Result<CaseId> {
        Ok(uid::generate_case_id()?)
    }

    /// Run storage and live/audit consistency checks.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or checked.
    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        let store = self.open_migrated_store()?;
        store.integrity_check()
    }

    /// Write a `SQLite` backup of the database to `out_file`.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or the backup fails.
    pub fn backup(&self, out_file: &Path) -> Result<BackupResult> {
        let store = self.open_migrated_store()?;
        store.backup_database(out_file)?;
        Ok(BackupResult {
            backup_path: out_file.display().to_string(),
            schema_version: store.schema_status()?.current_version,
        })
    }

    /// Replace the database contents with a backup, then migrate.
    ///
    /// # Errors
    /// Returns an error when the backup is missing, restore fails, or migration fails.
    pub fn restore(&self, in_file: &Path) -> Result<SchemaStatus> {
        let mut store = self.open_store()?;
        store.restore_database(in_file)?;
        store.schema_status()
    }
}

/// Move the issues of a failed field parse into `report`.
fn record_issues<T>(
    parsed: Result<T, CasePaymentOrderError>,
    report: &mut ValidationReport,
) -> Result<Option<T>, CasePaymentOrderError> {
    match parsed {
        Ok(value) => Ok(Some(value)),
        Err(CasePaymentOrderError::Validation(issues)) => {
            report.extend(issues.issues().iter().cloned());
            Ok(None)
        }
        Err(other) => Err(other),
    }
}

/// Check every field of `request`, recording each problem in `report`.
///
/// Yields the fields whenever the typed ones parsed; the caller still has to
/// check `report` for blank text fields.
fn collect_fields(
    request: &CreateCasePaymentOrderRequest,
    report: &mut ValidationReport,
) -> Result<Option<CasePaymentOrderFields>, CasePaymentOrderError> {
    if request.effective_from.is_none() {
        report.push(ValidationIssue::Required { field: "effective_from".to_string() });
    }
    let case_id = record_issues(CaseId::parse_field("case_id", &request.case_id), report)?;

    for (field, value) in [
        ("action", &request.action),
        ("responsible_party", &request.responsible_party),
        ("order_reference", &request.order_reference),
    ] {
        report.extend(validate_required(field, value));
    }

    let (Some(effective_from), Some(case_id)) = (request.effective_from, case_id) else {
        return Ok(None);
    };
    Ok(Some(CasePaymentOrderFields {
        effective_from,
        case_id,
        action: request.action.clone(),
        responsible_party: request.responsible_party.clone(),
        order_reference: request.order_reference.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use case_payment_orders_core::{checksum, ChangeType};
    use time::macros::datetime;

    use super::*;

    const CASE_A: &str = "6551341964128977";
    const CASE_B: &str = "4444333322221111";

    fn unique_temp_db_path() -> PathBuf {
        std::env::temp_dir().join(format!("case-payment-orders-api-{}.sqlite3", ulid::Ulid::new()))
    }

    fn cleanup(db_path: &Path) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", db_path.display()));
        }
    }

    fn request(case_id: &str, order_reference: &str) -> CreateCasePaymentOrderRequest {
        CreateCasePaymentOrderRequest {
            effective_from: Some(datetime!(2026-04-01 08:00 UTC)),
            case_id: case_id.to_string(),
            action: "Case Creation".to_string(),
            responsible_party: "The Payment Team".to_string(),
            order_reference: order_reference.to_string(),
        }
    }

    struct NoIdentity;

    impl IdentityProvider for NoIdentity {
        fn current_identity(&self) -> Result<String> {
            Err(anyhow!("no authenticated caller"))
        }
    }

    // Test IDs: TAPI-001
    #[test]
    fn create_query_update_history_and_delete_round_trip() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = CasePaymentOrdersApi::new(db_path.clone());
        let identity = StaticIdentity::new("caseworker-7");

        let created = api.create(&request(CASE_A, "2021-11223344556"), &identity)?;
        assert_eq!(created.created_by, "caseworker-7");
        assert_eq!(api.get(&created.id.to_string())?, created);

        let mut change = request(CASE_A, "2021-11223344556");
        change.action = "Case Reviewed".to_string();
        let updated = api.update(&UpdateCasePaymentOrderRequest {
            id: created.id.to_string(),
            order: change,
        })?;
        assert_eq!(updated.action, "Case Reviewed");

        let page = api.query(&CasePaymentOrderQuery {
            case_ids: vec![CASE_A.to_string()],
            ..CasePaymentOrderQuery::default()
        })?;
        assert_eq!(page.content, vec![updated.clone()]);

        let history = api.history(&created.id.to_string())?;
        let kinds = history.iter().map(|rev| rev.change_type).collect::<Vec<_>>();
        assert_eq!(kinds, vec![ChangeType::Created, ChangeType::Modified]);

        let summary = api.delete(&DeleteRequest {
            ids: vec![created.id.to_string()],
            case_ids: Vec::new(),
        })?;
        assert_eq!(summary.records_deleted, 1);
        assert_eq!(summary.revisions_deleted, 3);

        let Err(err) = api.history(&created.id.to_string()) else {
            return Err(anyhow!("history survived deletion"));
        };
        assert_eq!(classify(&err), ErrorKind::NotFound);
        assert!(api.integrity_check()?.is_consistent());

        cleanup(&db_path);
        Ok(())
    }

    // Test IDs: TAPI-002
    #[test]
    fn create_reports_every_invalid_field_at_once() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = CasePaymentOrdersApi::new(db_path.clone());

        let bad = CreateCasePaymentOrderRequest {
            effective_from: None,
            case_id: "12345".to_string(),
            action: String::new(),
            responsible_party: "The Payment Team".to_string(),
            order_reference: " ".to_string(),
        };
        let Err(err) = api.create(&bad, &StaticIdentity::new("tester")) else {
            return Err(anyhow!("invalid request was accepted"));
        };
        let report = ErrorReport::from_error(&err);
        assert_eq!(report.kind, ErrorKind::Validation);

        let fields = report.issues.iter().map(ValidationIssue::field).collect::<Vec<_>>();
        assert!(fields.contains(&Some("effective_from")));
        assert!(fields.contains(&Some("case_id")));
        assert!(fields.contains(&Some("action")));
        assert!(fields.contains(&Some("order_reference")));
        assert!(report
            .issues
            .iter()
            .any(|issue| matches!(issue, ValidationIssue::CaseIdLength { .. })));

        cleanup(&db_path);
        Ok(())
    }

    // Test IDs: TAPI-003
    #[test]
    fn duplicate_pair_is_a_conflict() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = CasePaymentOrdersApi::new(db_path.clone());
        let identity = StaticIdentity::new("tester");

        api.create(&request(CASE_A, "2021-11223344556"), &identity)?;
        let Err(err) = api.create(&request(CASE_A, "2021-11223344556"), &identity) else {
            return Err(anyhow!("duplicate was accepted"));
        };
        assert_eq!(classify(&err), ErrorKind::Conflict);

        cleanup(&db_path);
        Ok(())
    }

    // Test IDs: TAPI-004
    #[test]
    fn blank_or_failing_identity_blocks_create() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = CasePaymentOrdersApi::new(db_path.clone());

        let Err(err) = api.create(&request(CASE_A, "2021-1"), &StaticIdentity::new("  ")) else {
            return Err(anyhow!("blank identity was accepted"));
        };
        assert_eq!(classify(&err), ErrorKind::Validation);

        let Err(err) = api.create(&request(CASE_A, "2021-1"), &NoIdentity) else {
            return Err(anyhow!("missing identity was accepted"));
        };
        assert_eq!(classify(&err), ErrorKind::Fatal);

        cleanup(&db_path);
        Ok(())
    }

    // Test IDs: TAPI-005
    #[test]
    fn query_enforces_mode_and_pagination() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = CasePaymentOrdersApi::new(db_path.clone());
        let identity = StaticIdentity::new("tester");
        for reference in ["2021-1", "2021-2", "2021-3"] {
            api.create(&request(CASE_B, reference), &identity)?;
        }

        let Err(err) = api.query(&CasePaymentOrderQuery::default()) else {
            return Err(anyhow!("query without keys succeeded"));
        };
        assert_eq!(classify(&err), ErrorKind::Validation);

        let Err(err) = api.query(&CasePaymentOrderQuery {
            case_ids: vec![CASE_B.to_string()],
            size: Some(0),
            ..CasePaymentOrderQuery::default()
        }) else {
            return Err(anyhow!("zero page size accepted"));
        };
        assert_eq!(classify(&err), ErrorKind::Validation);

        let second = api.query(&CasePaymentOrderQuery {
            case_ids: vec![CASE_B.to_string()],
            page: Some(1),
            size: Some(2),
            ..CasePaymentOrderQuery::default()
        })?;
        assert_eq!(second.total_elements, 3);
        assert_eq!(second.total_pages, 2);
        assert_eq!(second.content.len(), 1);
        assert_eq!(second.content[0].order_reference, "2021-3");

        cleanup(&db_path);
        Ok(())
    }

    // Test IDs: TAPI-006
    #[test]
    fn update_and_get_of_unknown_id_are_not_found() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = CasePaymentOrdersApi::new(db_path.clone());
        let unknown = CasePaymentOrderId::new().to_string();

        let Err(err) = api.get(&unknown) else {
            return Err(anyhow!("unknown id was found"));
        };
        assert_eq!(classify(&err), ErrorKind::NotFound);

        let Err(err) = api.update(&UpdateCasePaymentOrderRequest {
            id: unknown,
            order: request(CASE_A, "2021-1"),
        }) else {
            return Err(anyhow!("update of unknown id succeeded"));
        };
        assert_eq!(classify(&err), ErrorKind::NotFound);

        let Err(err) = api.get("definitely-not-a-ulid") else {
            return Err(anyhow!("malformed id was accepted"));
        };
        assert_eq!(classify(&err), ErrorKind::Validation);

        cleanup(&db_path);
        Ok(())
    }

    // Test IDs: TAPI-007
    #[test]
    fn generated_case_ids_verify_and_are_accepted_on_create() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = CasePaymentOrdersApi::new(db_path.clone());

        let case_id = api.generate_case_id()?;
        assert!(checksum::verify(&case_id.to_string()));

        let created =
            api.create(&request(&case_id.to_string(), "2021-1"), &StaticIdentity::new("tester"))?;
        assert_eq!(created.case_id, case_id);

        cleanup(&db_path);
        Ok(())
    }

    // Test IDs: TAPI-008
    #[test]
    fn backup_and_restore_round_trip_orders() -> Result<()> {
        let db_path = unique_temp_db_path();
        let backup_path = unique_temp_db_path();
        let api = CasePaymentOrdersApi::new(db_path.clone());
        let identity = StaticIdentity::new("tester");

        let kept = api.create(&request(CASE_A, "2021-1"), &identity)?;
        let backup = api.backup(&backup_path)?;
        assert_eq!(backup.schema_version, 1);

        api.delete(&DeleteRequest { ids: vec![kept.id.to_string()], case_ids: Vec::new() })?;
        let status = api.restore(&backup_path)?;
        assert!(status.pending_versions.is_empty());
        assert_eq!(api.get(&kept.id.to_string())?, kept);
        assert_eq!(api.history(&kept.id.to_string())?.len(), 1);

        cleanup(&db_path);
        cleanup(&backup_path);
        Ok(())
    }

    // Test IDs: TAPI-009
    #[test]
    fn requests_deserialize_from_wire_json() -> Result<()> {
        let update: UpdateCasePaymentOrderRequest = serde_json::from_str(
            r#"{
                "id": "01K1D3A7E9J5MNNN8F5JVCJY51",
                "effective_from": "2026-04-01T08:00:00Z",
                "case_id": "6551341964128977",
                "action": "Case Creation",
                "responsible_party": "The Payment Team",
                "order_reference": "2021-11223344556"
            }"#,
        )?;
        assert_eq!(update.order, request(CASE_A, "2021-11223344556"));

        let query: CasePaymentOrderQuery = serde_json::from_str(r#"{"case_ids":["x"]}"#)?;
        assert!(query.ids.is_empty());
        assert_eq!(query.page, None);

        let err = ErrorReport::from_error(&anyhow!("disk on fire"));
        assert_eq!(err.kind, ErrorKind::Fatal);
        assert_eq!(serde_json::to_value(&err)?["kind"], "fatal");
        Ok(())
    }

    // Test IDs: TAPI-010
    #[test]
    fn update_reports_malformed_id_together_with_field_issues() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = CasePaymentOrdersApi::new(db_path.clone());

        let mut order = request(CASE_A, "2021-1");
        order.action = " ".to_string();
        let Err(err) =
            api.update(&UpdateCasePaymentOrderRequest { id: "not-a-ulid".to_string(), order })
        else {
            return Err(anyhow!("update with a malformed id was accepted"));
        };
        let report = ErrorReport::from_error(&err);
        assert_eq!(report.kind, ErrorKind::Validation);
        assert!(report
            .issues
            .iter()
            .any(|issue| matches!(issue, ValidationIssue::MalformedId { field, .. } if field == "id")));
        assert!(report
            .issues
            .iter()
            .any(|issue| matches!(issue, ValidationIssue::Required { field } if field == "action")));

        let Err(err) = api.update(&UpdateCasePaymentOrderRequest {
            id: String::new(),
            order: request(CASE_A, "2021-1"),
        }) else {
            return Err(anyhow!("update without an id was accepted"));
        };
        let fields = ErrorReport::from_error(&err)
            .issues
            .iter()
            .filter_map(|issue| issue.field().map(str::to_string))
            .collect::<Vec<_>>();
        assert_eq!(fields, vec!["id".to_string()]);

        cleanup(&db_path);
        Ok(())
    }

    // Test IDs: TAPI-011
    #[test]
    fn query_with_out_of_range_page_is_a_validation_error() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = CasePaymentOrdersApi::new(db_path.clone());

        let Err(err) = api.query(&CasePaymentOrderQuery {
            case_ids: vec![CASE_A.to_string()],
            page: Some(u32::MAX),
            size: Some(u32::MAX),
            ..CasePaymentOrderQuery::default()
        }) else {
            return Err(anyhow!("out-of-range page was accepted"));
        };
        let report = ErrorReport::from_error(&err);
        assert_eq!(report.kind, ErrorKind::Validation);
        assert!(matches!(report.issues.as_slice(), [ValidationIssue::InvalidPagination { .. }]));

        cleanup(&db_path);
        Ok(())
    }

    // Test IDs: TAPI-012
    #[test]
    fn delete_of_many_unknown_ids_is_not_found() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = CasePaymentOrdersApi::new(db_path.clone());
        let kept = api.create(&request(CASE_A, "2021-1"), &StaticIdentity::new("tester"))?;

        let ids = (0..40_000).map(|_| CasePaymentOrderId::new().to_string()).collect();
        let Err(err) = api.delete(&DeleteRequest { ids, case_ids: Vec::new() }) else {
            return Err(anyhow!("delete of unknown ids succeeded"));
        };
        assert_eq!(classify(&err), ErrorKind::NotFound);
        assert_eq!(api.get(&kept.id.to_string())?, kept);

        cleanup(&db_path);
        Ok(())
    }
}
