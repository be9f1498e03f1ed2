use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use ulid::Ulid;

pub mod checksum;
pub mod uid;
mod validation;

pub use validation::{
    validate_case_id, validate_case_ids, validate_required, ValidationIssue, ValidationReport,
    CASE_ID_LENGTH,
};

/// Coarse classification that outer layers map onto transport responses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Fatal,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::Fatal => "fatal",
        }
    }
}

/// Which kind of identifier a lookup or delete was keyed on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Referent {
    Id,
    CaseId,
}

impl Display for Referent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id => f.write_str("id"),
            Self::CaseId => f.write_str("Case ID"),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum CasePaymentOrderError {
    #[error("validation error: {0}")]
    Validation(ValidationReport),
    #[error("filter error: {0}")]
    Filter(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("Case Payment Order does not exist for {referent}: {detail}")]
    NotFound { referent: Referent, detail: String },
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),
}

impl CasePaymentOrderError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::Filter(_) => ErrorKind::Validation,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::ResourceUnavailable(_) => ErrorKind::Fatal,
        }
    }
}

impl From<ValidationReport> for CasePaymentOrderError {
    fn from(report: ValidationReport) -> Self {
        Self::Validation(report)
    }
}

/// Surrogate key assigned by the store when an order is created.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CasePaymentOrderId(pub Ulid);

impl CasePaymentOrderId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Ulid::from_string(value.trim()).ok().map(Self)
    }

    /// Parse `value`, reporting a malformed or blank id under `field`.
    ///
    /// # Errors
    /// Returns [`CasePaymentOrderError::Validation`] when `value` is blank or not a ULID.
    pub fn parse_field(field: &str, value: &str) -> Result<Self, CasePaymentOrderError> {
        if let Some(issue) = validate_required(field, value) {
            return Err(ValidationReport::from(issue).into());
        }
        Self::parse(value).ok_or_else(|| {
            ValidationReport::from(ValidationIssue::MalformedId {
                field: field.to_string(),
                value: value.to_string(),
            })
            .into()
        })
    }
}

impl Default for CasePaymentOrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for CasePaymentOrderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Business key: 16 decimal digits whose last digit is a Luhn check digit.
///
/// Rendered zero-padded to 16 digits; serialized as a JSON number.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(try_from = "u64", into = "u64")]
pub struct CaseId(u64);

impl CaseId {
    /// Parse and validate one case id. Blank input is rejected as required.
    ///
    /// # Errors
    /// Returns [`CasePaymentOrderError::Validation`] with every shape issue found.
    pub fn parse(value: &str) -> Result<Self, CasePaymentOrderError> {
        Self::parse_field("case_id", value)
    }

    /// Parse one case id, reporting issues under `field`.
    ///
    /// # Errors
    /// Returns [`CasePaymentOrderError::Validation`] with every shape issue found.
    pub fn parse_field(field: &str, value: &str) -> Result<Self, CasePaymentOrderError> {
        if let Some(issue) = validate_required(field, value) {
            return Err(ValidationReport::from(issue).into());
        }

        let mut report = ValidationReport::new();
        report.extend(validate_case_id(field, value));
        report.into_result()?;

        value.parse::<u64>().map(Self).map_err(|_| {
            ValidationReport::from(ValidationIssue::CaseIdChecksum {
                field: field.to_string(),
                value: value.to_string(),
            })
            .into()
        })
    }

    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for CaseId {
    type Error = CasePaymentOrderError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::parse(&format!("{value:016}"))
    }
}

impl From<CaseId> for u64 {
    fn from(case_id: CaseId) -> Self {
        case_id.0
    }
}

impl Display for CaseId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016}", self.0)
    }
}

/// Caller-editable fields of an order, shared by create and update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CasePaymentOrderFields {
    #[serde(with = "time::serde::rfc3339")]
    pub effective_from: OffsetDateTime,
    pub case_id: CaseId,
    pub action: String,
    pub responsible_party: String,
    pub order_reference: String,
}

impl CasePaymentOrderFields {
    /// Check the free-text fields that must not be blank.
    ///
    /// # Errors
    /// Returns [`CasePaymentOrderError::Validation`] listing every blank field.
    pub fn validate(&self) -> Result<(), CasePaymentOrderError> {
        let mut report = ValidationReport::new();
        for (field, value) in [
            ("action", &self.action),
            ("responsible_party", &self.responsible_party),
            ("order_reference", &self.order_reference),
        ] {
            report.extend(validate_required(field, value));
        }
        report.into_result()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CasePaymentOrder {
    pub id: CasePaymentOrderId,
    pub case_id: CaseId,
    pub order_reference: String,
    pub action: String,
    pub responsible_party: String,
    #[serde(with = "time::serde::rfc3339")]
    pub effective_from: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_timestamp: OffsetDateTime,
    pub created_by: String,
}

impl CasePaymentOrder {
    #[must_use]
    pub fn fields(&self) -> CasePaymentOrderFields {
        CasePaymentOrderFields {
            effective_from: self.effective_from,
            case_id: self.case_id,
            action: self.action.clone(),
            responsible_party: self.responsible_party.clone(),
            order_reference: self.order_reference.clone(),
        }
    }

    /// Replace the editable fields, keeping identity and creation metadata.
    pub fn apply(&mut self, fields: CasePaymentOrderFields) {
        self.effective_from = fields.effective_from;
        self.case_id = fields.case_id;
        self.action = fields.action;
        self.responsible_party = fields.responsible_party;
        self.order_reference = fields.order_reference;
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
}

impl ChangeType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created" => Some(Self::Created),
            "modified" => Some(Self::Modified),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// One immutable row of an order's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditRevision {
    pub revision_number: i64,
    pub record_id: CasePaymentOrderId,
    pub change_type: ChangeType,
    #[serde(with = "time::serde::rfc3339")]
    pub revision_timestamp: OffsetDateTime,
    pub snapshot: Option<CasePaymentOrder>,
}

/// Selection of orders by exactly one kind of key, deduplicated and sorted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", content = "values", rename_all = "snake_case")]
pub enum OrderFilter {
    Ids(Vec<CasePaymentOrderId>),
    CaseIds(Vec<CaseId>),
}

impl OrderFilter {
    /// Resolve raw id and case id lists into one filter.
    ///
    /// Exactly one of the lists must be non-empty; that check runs before any
    /// value is parsed. Every malformed value is reported in one error.
    ///
    /// # Errors
    /// Returns [`CasePaymentOrderError::Filter`] when both or neither list is supplied,
    /// and [`CasePaymentOrderError::Validation`] when any value is malformed.
    pub fn resolve<S: AsRef<str>>(ids: &[S], case_ids: &[S]) -> Result<Self, CasePaymentOrderError> {
        match (ids.is_empty(), case_ids.is_empty()) {
            (false, false) => Err(CasePaymentOrderError::Filter(
                "ids and case_ids are mutually exclusive; supply only one".to_string(),
            )),
            (true, true) => Err(CasePaymentOrderError::Filter(
                "one of ids or case_ids must be supplied".to_string(),
            )),
            (false, true) => {
                let mut report = ValidationReport::new();
                let mut parsed = BTreeSet::new();
                for value in ids {
                    match CasePaymentOrderId::parse_field("ids", value.as_ref()) {
                        Ok(id) => {
                            parsed.insert(id);
                        }
                        Err(CasePaymentOrderError::Validation(issues)) => {
                            report.extend(issues.issues().iter().cloned());
                        }
                        Err(other) => return Err(other),
                    }
                }
                report.into_result()?;
                Ok(Self::Ids(parsed.into_iter().collect()))
            }
            (true, false) => {
                let mut report = ValidationReport::new();
                let mut parsed = BTreeSet::new();
                for value in case_ids {
                    match CaseId::parse_field("case_ids", value.as_ref()) {
                        Ok(case_id) => {
                            parsed.insert(case_id);
                        }
                        Err(CasePaymentOrderError::Validation(issues)) => {
                            report.extend(issues.issues().iter().cloned());
                        }
                        Err(other) => return Err(other),
                    }
                }
                report.into_result()?;
                Ok(Self::CaseIds(parsed.into_iter().collect()))
            }
        }
    }

    #[must_use]
    pub fn referent(&self) -> Referent {
        match self {
            Self::Ids(_) => Referent::Id,
            Self::CaseIds(_) => Referent::CaseId,
        }
    }

    /// Number of distinct keys requested.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Ids(ids) => ids.len(),
            Self::CaseIds(case_ids) => case_ids.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Zero-based page selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub const DEFAULT_SIZE: u32 = 20;

    /// # Errors
    /// Returns [`CasePaymentOrderError::Validation`] when `size` is zero or the
    /// resulting row offset does not fit a signed 64-bit integer.
    pub fn new(page: u32, size: u32) -> Result<Self, CasePaymentOrderError> {
        if size == 0 {
            return Err(invalid_pagination("page size must be greater than zero"));
        }
        let request = Self { page, size };
        request.checked_offset()?;
        Ok(request)
    }

    #[must_use]
    pub fn offset(self) -> u64 {
        u64::from(self.page) * u64::from(self.size)
    }

    /// Row offset as a SQL integer.
    ///
    /// # Errors
    /// Returns [`CasePaymentOrderError::Validation`] when the offset exceeds `i64::MAX`.
    pub fn checked_offset(self) -> Result<i64, CasePaymentOrderError> {
        i64::try_from(self.offset())
            .map_err(|_| invalid_pagination("page offset exceeds the supported range"))
    }
}

fn invalid_pagination(detail: &str) -> CasePaymentOrderError {
    ValidationReport::from(ValidationIssue::InvalidPagination { detail: detail.to_string() }).into()
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 0, size: Self::DEFAULT_SIZE }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(content: Vec<T>, request: PageRequest, total_elements: u64) -> Self {
        let size = u64::from(request.size.max(1));
        Self {
            content,
            page: request.page,
            size: request.size,
            total_elements,
            total_pages: total_elements.div_ceil(size),
        }
    }
}
