//! Generator for 16-digit, checksum-valid identifiers.
//!
//! Layout: the first 11 digits of the current UNIX time in milliseconds,
//! four random digits, then the Luhn check digit over those 15 digits.

use rand::rngs::OsRng;
use rand::RngCore;
use time::OffsetDateTime;

use crate::checksum::with_check_digit;
use crate::{CaseId, CasePaymentOrderError};

const TIMESTAMP_DIGITS: usize = 11;

// Largest multiple of 10_000 that fits in a u16; samples at or above it are redrawn.
const RANDOM_SAMPLE_LIMIT: u16 = 60_000;

/// Generate a new identifier from the clock and the operating system RNG.
///
/// # Errors
/// Returns [`CasePaymentOrderError::ResourceUnavailable`] when the random source fails.
pub fn generate() -> Result<String, CasePaymentOrderError> {
    generate_with(OffsetDateTime::now_utc(), &mut OsRng)
}

/// Generate an identifier and wrap it as a [`CaseId`], for seeding dummy data.
///
/// # Errors
/// Returns [`CasePaymentOrderError::ResourceUnavailable`] when the random source fails.
pub fn generate_case_id() -> Result<CaseId, CasePaymentOrderError> {
    CaseId::parse(&generate()?)
}

/// Generate an identifier for an explicit instant and random source.
///
/// # Errors
/// Returns [`CasePaymentOrderError::ResourceUnavailable`] when `rng` cannot supply bytes.
pub fn generate_with<R>(now: OffsetDateTime, rng: &mut R) -> Result<String, CasePaymentOrderError>
where
    R: RngCore + ?Sized,
{
    let millis = u128::try_from(now.unix_timestamp_nanos() / 1_000_000).unwrap_or(0);
    let mut body = format!("{millis:0>width$}", width = TIMESTAMP_DIGITS);
    body.truncate(TIMESTAMP_DIGITS);
    body.push_str(&random_digits(rng)?);
    Ok(with_check_digit(&body))
}

fn random_digits<R>(rng: &mut R) -> Result<String, CasePaymentOrderError>
where
    R: RngCore + ?Sized,
{
    loop {
        let mut bytes = [0_u8; 2];
        rng.try_fill_bytes(&mut bytes).map_err(|err| {
            CasePaymentOrderError::ResourceUnavailable(format!("random source unavailable: {err}"))
        })?;
        let sample = u16::from_be_bytes(bytes);
        if sample < RANDOM_SAMPLE_LIMIT {
            return Ok(format!("{:04}", sample % 10_000));
        }
    }
}
