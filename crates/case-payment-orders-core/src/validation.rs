use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::checksum;
use crate::CasePaymentOrderError;

/// Number of characters in a case id, check digit included.
pub const CASE_ID_LENGTH: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
    Required { field: String },
    CaseIdLength { field: String, value: String },
    CaseIdChecksum { field: String, value: String },
    MalformedId { field: String, value: String },
    InvalidPagination { detail: String },
}

impl ValidationIssue {
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Required { field }
            | Self::CaseIdLength { field, .. }
            | Self::CaseIdChecksum { field, .. }
            | Self::MalformedId { field, .. } => Some(field),
            Self::InvalidPagination { .. } => None,
        }
    }

    /// The rejected input, when the issue concerns a concrete value.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::CaseIdLength { value, .. }
            | Self::CaseIdChecksum { value, .. }
            | Self::MalformedId { value, .. } => Some(value),
            Self::Required { .. } | Self::InvalidPagination { .. } => None,
        }
    }
}

impl Display for ValidationIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Required { field } => write!(f, "{field}: value is required"),
            Self::CaseIdLength { field, value } => {
                write!(f, "{field}: Case ID has to be {CASE_ID_LENGTH} digits long ({value})")
            }
            Self::CaseIdChecksum { field, value } => {
                write!(f, "{field}: Case ID has to be a valid {CASE_ID_LENGTH}-digit Luhn number ({value})")
            }
            Self::MalformedId { field, value } => write!(f, "{field}: malformed id ({value})"),
            Self::InvalidPagination { detail } => write!(f, "pagination: {detail}"),
        }
    }
}

/// Every issue found while validating one request, in discovery order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(transparent)]
pub struct ValidationReport {
    issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    pub fn extend(&mut self, issues: impl IntoIterator<Item = ValidationIssue>) {
        self.issues.extend(issues);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    #[must_use]
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    /// Values rejected by this report, without duplicates, in discovery order.
    #[must_use]
    pub fn invalid_values(&self) -> Vec<&str> {
        let mut values: Vec<&str> = Vec::new();
        for value in self.issues.iter().filter_map(ValidationIssue::value) {
            if !values.contains(&value) {
                values.push(value);
            }
        }
        values
    }

    /// Convert into a validation error when at least one issue was recorded.
    ///
    /// # Errors
    /// Returns [`CasePaymentOrderError::Validation`] carrying this report when it is not empty.
    pub fn into_result(self) -> Result<(), CasePaymentOrderError> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(CasePaymentOrderError::Validation(self))
        }
    }
}

impl From<ValidationIssue> for ValidationReport {
    fn from(issue: ValidationIssue) -> Self {
        Self { issues: vec![issue] }
    }
}

impl Display for ValidationReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (index, issue) in self.issues.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

/// Report a [`ValidationIssue::Required`] when `value` is blank.
#[must_use]
pub fn validate_required(field: &str, value: &str) -> Option<ValidationIssue> {
    value.trim().is_empty().then(|| ValidationIssue::Required { field: field.to_string() })
}

/// Judge the shape of one case id.
///
/// Blank input is accepted here; whether the value is required is decided by
/// the caller. Length and checksum are independent checks, so a single value
/// can produce both issues.
#[must_use]
pub fn validate_case_id(field: &str, value: &str) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    if value.trim().is_empty() {
        return issues;
    }

    if value.chars().count() != CASE_ID_LENGTH {
        issues.push(ValidationIssue::CaseIdLength {
            field: field.to_string(),
            value: value.to_string(),
        });
    }

    if !value.chars().all(|c| c.is_ascii_digit()) || !checksum::verify(value) {
        issues.push(ValidationIssue::CaseIdChecksum {
            field: field.to_string(),
            value: value.to_string(),
        });
    }

    issues
}

/// Judge every case id in `values`, reporting all malformed elements at once.
///
/// # Errors
/// Returns [`CasePaymentOrderError::Validation`] listing every invalid element.
pub fn validate_case_ids<S: AsRef<str>>(
    field: &str,
    values: &[S],
) -> Result<(), CasePaymentOrderError> {
    let mut report = ValidationReport::new();
    for value in values {
        report.extend(validate_case_id(field, value.as_ref()));
    }
    report.into_result()
}
