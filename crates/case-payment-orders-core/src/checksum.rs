//! Luhn check-digit arithmetic over decimal strings.
//!
//! Callers are expected to have filtered their input down to ASCII digits.
//! Neither function panics on other characters: a non-digit contributes
//! nothing to the sum, and [`verify`] rejects a non-digit check position.

/// Compute the Luhn check digit for `digits`, the number without its check digit.
///
/// Starting from the rightmost character, every digit at an even position
/// (0, 2, 4, ...) is doubled, with 9 subtracted when the result exceeds 9.
/// The check digit is whatever brings the sum up to the next multiple of ten.
/// An empty body sums to zero and yields a check digit of `0`.
#[must_use]
pub fn compute_check_digit(digits: &str) -> u8 {
    let sum = digits.bytes().rev().enumerate().fold(0_u8, |sum, (position, byte)| {
        let value = match byte {
            b'0'..=b'9' => byte - b'0',
            _ => 0,
        };
        let weighted = if position % 2 == 0 {
            let doubled = value * 2;
            if doubled > 9 {
                doubled - 9
            } else {
                doubled
            }
        } else {
            value
        };
        (sum + weighted) % 10
    });

    (10 - sum) % 10
}

/// Check that the last character of `number` is the Luhn check digit of the rest.
///
/// Returns `false` for empty input or when the trailing character is not a digit.
#[must_use]
pub fn verify(number: &str) -> bool {
    let Some((check_index, check_char)) = number.char_indices().last() else {
        return false;
    };
    let Some(check) = check_char.to_digit(10) else {
        return false;
    };

    u32::from(compute_check_digit(&number[..check_index])) == check
}

/// Append the computed check digit to `body`.
#[must_use]
pub fn with_check_digit(body: &str) -> String {
    let mut number = String::with_capacity(body.len() + 1);
    number.push_str(body);
    number.push(char::from(b'0' + compute_check_digit(body)));
    number
}
