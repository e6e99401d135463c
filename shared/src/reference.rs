//! Order reference sequencing
//!
//! References are free-form strings made of an optional prefix and a
//! numeric suffix ("PO-0007", "AB02", "0001"). The suffix is incremented as a
//! decimal string, so references far beyond the range of a machine integer
//! still sequence correctly.

use std::collections::HashSet;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ReferenceError;

/// Maximum stored length of a reference
pub const MAX_REFERENCE_LENGTH: usize = 64;

/// Upper bound for the integer sort key
pub const REFERENCE_INT_CLIP: i64 = 0x7fff_ffff;

/// Human-readable unique order identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reference(String);

impl Reference {
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Split into `(prefix, numeric suffix)`, using the longest run of
    /// decimal digits at the end of the string
    pub fn split(&self) -> (&str, Option<&str>) {
        let digits = self
            .0
            .bytes()
            .rev()
            .take_while(u8::is_ascii_digit)
            .count();

        if digits == 0 {
            (&self.0, None)
        } else {
            let at = self.0.len() - digits;
            (&self.0[..at], Some(&self.0[at..]))
        }
    }

    pub fn prefix(&self) -> &str {
        self.split().0
    }

    /// Integer value of the numeric suffix, clipped to fit a 32-bit column.
    /// Zero when there is no suffix.
    pub fn reference_int(&self) -> i64 {
        let Some(digits) = self.split().1 else {
            return 0;
        };

        let significant = digits.trim_start_matches('0');
        if significant.len() > 10 {
            return REFERENCE_INT_CLIP;
        }

        significant
            .parse::<i64>()
            .map(|n| n.min(REFERENCE_INT_CLIP))
            .unwrap_or(0)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Reference {
    fn from(value: &str) -> Self {
        Reference::new(value)
    }
}

impl From<String> for Reference {
    fn from(value: String) -> Self {
        Reference::new(value)
    }
}

/// Add one to a string of ASCII digits, keeping at least its width.
///
/// "009" -> "010", "99" -> "100".
fn increment_digits(digits: &str) -> String {
    let mut bytes = digits.as_bytes().to_vec();
    let mut carry = true;

    for b in bytes.iter_mut().rev() {
        if !carry {
            break;
        }
        if *b == b'9' {
            *b = b'0';
        } else {
            *b += 1;
            carry = false;
        }
    }

    if carry {
        bytes.insert(0, b'1');
    }

    // Only ASCII digits were written
    bytes.into_iter().map(char::from).collect()
}

/// Compute the reference that follows `last`.
///
/// Fails with [`ReferenceError::ReferenceExhausted`] when `last` has no
/// numeric suffix; incrementing would return the prefix unchanged.
pub fn next_reference(last: &Reference) -> Result<Reference, ReferenceError> {
    match last.split() {
        (prefix, Some(digits)) => Ok(Reference(format!("{}{}", prefix, increment_digits(digits)))),
        (prefix, None) => Err(ReferenceError::ReferenceExhausted(prefix.to_string())),
    }
}

/// Find the next reference after `last` that `is_taken` reports as unused.
///
/// Every candidate is remembered; if a candidate repeats, the loop stops and
/// returns it even though it is known to be taken.
pub fn next_available_reference<F>(last: &Reference, mut is_taken: F) -> Result<Reference, ReferenceError>
where
    F: FnMut(&Reference) -> bool,
{
    let mut attempts: HashSet<Reference> = HashSet::new();
    attempts.insert(last.clone());

    let mut reference = last.clone();

    loop {
        reference = next_reference(&reference)?;

        if attempts.contains(&reference) {
            return Ok(reference);
        }

        if is_taken(&reference) {
            attempts.insert(reference.clone());
        } else {
            return Ok(reference);
        }
    }
}

/// First reference of an empty namespace, e.g. ("SO", 4) -> "SO0001"
pub fn first_reference(prefix: &str, digits: usize) -> Reference {
    Reference(format!("{}{:0width$}", prefix, 1, width = digits.max(1)))
}

/// Validate a user-supplied reference, optionally against a regex pattern
pub fn validate_reference(value: &str, pattern: Option<&str>) -> Result<Reference, ReferenceError> {
    let reference = Reference::new(value);

    if reference.as_str().is_empty() {
        return Err(ReferenceError::Empty);
    }

    if reference.as_str().chars().count() > MAX_REFERENCE_LENGTH {
        return Err(ReferenceError::TooLong {
            value: reference.into_inner(),
            max: MAX_REFERENCE_LENGTH,
        });
    }

    if let Some(pattern) = pattern.filter(|p| !p.is_empty()) {
        let regex = Regex::new(pattern).map_err(|e| ReferenceError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        if !regex.is_match(reference.as_str()) {
            return Err(ReferenceError::PatternMismatch {
                value: reference.into_inner(),
                pattern: pattern.to_string(),
            });
        }
    }

    Ok(reference)
}
