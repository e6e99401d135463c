//! Serial number specification parsing
//!
//! A specification such as `"1,3,5-8,~,100+10"` is expanded into an ordered,
//! duplicate-free list of serial tokens whose length must equal the expected
//! quantity.
//!
//! Accepted forms, separated by commas and/or whitespace:
//! - a single token (`12`, `SN-A`)
//! - an inclusive numeric range (`10-20`)
//! - `~`, replaced by the next available serial number
//! - `<start>+`, enough consecutive numbers from `<start>` to reach the quantity
//! - `<start>+<n>`, consecutive numbers from `<start>` through `<start> + <n>`

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{SerialError, SerialErrors};
use crate::models::Serial;

fn separators() -> &'static Regex {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    SEPARATORS.get_or_init(|| Regex::new(r"[\s,]+").expect("separator pattern is valid"))
}

/// Collects serials in discovery order, recording duplicates as errors
#[derive(Default)]
struct Accumulator {
    serials: Vec<Serial>,
    seen: HashSet<Serial>,
    errors: Vec<SerialError>,
    /// Run values never materialized because the list was already too long
    skipped: u128,
}

impl Accumulator {
    fn add(&mut self, serial: Serial) {
        if self.seen.contains(&serial) {
            self.errors.push(SerialError::DuplicateSerial(serial));
        } else {
            self.seen.insert(serial.clone());
            self.serials.push(serial);
        }
    }

    fn add_token(&mut self, token: &str) {
        self.add(Serial::parse(token));
    }

    fn len(&self) -> usize {
        self.serials.len()
    }

    /// Serials found so far, counting skipped run values
    fn found(&self) -> u128 {
        self.serials.len() as u128 + self.skipped
    }
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Add `count` consecutive numbers from `start` through the accumulator.
///
/// Values stop being materialized once the list holds more than `expected`
/// serials; the rest only count towards the quantity mismatch.
fn add_bounded_run(acc: &mut Accumulator, group: &str, start: u64, count: u64, expected: usize) {
    if count == 0 {
        return;
    }

    if start.checked_add(count - 1).is_none() {
        acc.errors
            .push(SerialError::InvalidGroupSequence(group.to_string()));
        return;
    }

    let mut offset = 0;
    while offset < count && acc.len() <= expected {
        acc.add(Serial::Number(start + offset));
        offset += 1;
    }
    acc.skipped += u128::from(count - offset);
}

fn resolve_range(acc: &mut Accumulator, group: &str, expected: usize) {
    let items: Vec<&str> = group.split('-').collect();

    if items.len() != 2 || !items.iter().all(|i| is_numeric(i)) {
        // Not a simple a-b range, so the group is a literal serial
        acc.add_token(group);
        return;
    }

    let (Ok(a), Ok(b)) = (items[0].parse::<u64>(), items[1].parse::<u64>()) else {
        acc.errors.push(SerialError::InvalidGroup(group.to_string()));
        return;
    };

    if a >= b {
        acc.errors
            .push(SerialError::InvalidGroupRange(group.to_string()));
        return;
    }

    let Some(count) = (b - a).checked_add(1) else {
        acc.errors.push(SerialError::InvalidGroup(group.to_string()));
        return;
    };

    add_bounded_run(acc, group, a, count, expected);
}

fn resolve_sequence(acc: &mut Accumulator, group: &str, expected: usize) {
    let items: Vec<&str> = group.split('+').collect();

    if items.len() != 2 {
        acc.errors
            .push(SerialError::InvalidGroupSequence(group.to_string()));
        return;
    }

    let start = match items[0].parse::<u64>() {
        Ok(n) if is_numeric(items[0]) => n,
        _ => {
            acc.errors
                .push(SerialError::InvalidGroupSequence(group.to_string()));
            return;
        }
    };

    let count = if items[1].is_empty() {
        // start+ : fill whatever is still missing
        expected.saturating_sub(acc.len()) as u64
    } else {
        // start+n : n + 1 values, start through start + n inclusive
        match items[1].parse::<u64>() {
            Ok(n) if is_numeric(items[1]) => n.saturating_add(1),
            _ => {
                acc.errors
                    .push(SerialError::InvalidGroupSequence(group.to_string()));
                return;
            }
        }
    };

    add_bounded_run(acc, group, start, count, expected);
}

/// Resolve a serial number specification into exactly `expected_quantity`
/// distinct serials.
///
/// Each `~` is replaced with `next_available`, which increments after every
/// substitution. All group-level problems are reported together.
pub fn resolve(spec: &str, expected_quantity: usize, next_available: u64) -> Result<Vec<Serial>, SerialErrors> {
    let mut spec = spec.trim().to_string();

    if spec.is_empty() {
        return Err(SerialError::EmptySpec.into());
    }

    if expected_quantity == 0 {
        return Err(SerialError::InvalidQuantity(expected_quantity).into());
    }

    let mut next = next_available;
    while let Some(pos) = spec.find('~') {
        spec.replace_range(pos..pos + 1, &next.to_string());
        next = next.saturating_add(1);
    }

    let groups: Vec<&str> = separators().split(&spec).collect();
    let mut acc = Accumulator::default();

    if groups.len() == expected_quantity {
        // The caller supplied one token per item; take them literally
        for group in &groups {
            if group.is_empty() {
                acc.errors.push(SerialError::InvalidGroup(group.to_string()));
            } else {
                acc.add_token(group);
            }
        }

        if !acc.errors.is_empty() {
            return Err(SerialErrors(acc.errors));
        }

        return Ok(acc.serials);
    }

    for group in groups {
        let group = group.trim();

        if group.contains('-') {
            resolve_range(&mut acc, group, expected_quantity);
        } else if group.contains('+') {
            resolve_sequence(&mut acc, group, expected_quantity);
        } else if !group.is_empty() {
            acc.add_token(group);
        } else {
            acc.errors.push(SerialError::InvalidGroup(group.to_string()));
        }
    }

    if !acc.errors.is_empty() {
        return Err(SerialErrors(acc.errors));
    }

    if acc.serials.is_empty() {
        return Err(SerialError::NoSerialNumbers.into());
    }

    if acc.found() != expected_quantity as u128 {
        return Err(SerialError::QuantityMismatch {
            found: usize::try_from(acc.found()).unwrap_or(usize::MAX),
            expected: expected_quantity,
        }
        .into());
    }

    Ok(acc.serials)
}

/// The "latest" serial: the highest one when every serial is numeric,
/// otherwise the most recently added one
pub fn latest_serial(existing: &[Serial]) -> Option<Serial> {
    if existing.iter().all(|s| s.as_number().is_some()) {
        existing.iter().max().cloned()
    } else {
        existing.last().cloned()
    }
}

/// Next serial number to offer for `~`; 1 when no numeric history exists
pub fn next_serial_number(existing: &[Serial]) -> u64 {
    latest_serial(existing)
        .and_then(|s| s.as_number())
        .map(|n| n.saturating_add(1))
        .unwrap_or(1)
}

/// Candidates that already exist
pub fn find_conflicts(candidates: &[Serial], existing: &[Serial]) -> Vec<Serial> {
    let existing: HashSet<&Serial> = existing.iter().collect();
    candidates
        .iter()
        .filter(|c| existing.contains(c))
        .cloned()
        .collect()
}

/// Placeholder text describing the next available serials for a quantity.
///
/// Numeric histories produce a spec that [`resolve`] accepts ("11-14").
pub fn serial_hint(existing: &[Serial], quantity: usize) -> String {
    match latest_serial(existing) {
        None | Some(Serial::Number(_)) => {
            let first = next_serial_number(existing);
            if quantity >= 2 {
                format!("{}-{}", first, first + quantity as u64 - 1)
            } else {
                first.to_string()
            }
        }
        Some(Serial::Text(latest)) => latest,
    }
}
