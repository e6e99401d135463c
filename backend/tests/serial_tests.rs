//! Serial number tests
//!
//! Tests for serial specification resolution including:
//! - Literal token lists
//! - Range and sequence expansion
//! - Duplicate and quantity mismatch reporting

use proptest::prelude::*;
use shared::error::SerialError;
use shared::models::Serial;
use shared::serial::{find_conflicts, next_serial_number, resolve, serial_hint};

fn nums(values: &[u64]) -> Vec<Serial> {
    values.iter().map(|n| Serial::Number(*n)).collect()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_literal_tokens_fast_path() {
        assert_eq!(resolve("10,20,30", 3, 1).unwrap(), nums(&[10, 20, 30]));
    }

    #[test]
    fn test_range_expansion() {
        assert_eq!(resolve("1-5", 5, 1).unwrap(), nums(&[1, 2, 3, 4, 5]));
    }

    #[test]
    fn test_duplicates_are_rejected() {
        let errors = resolve("1,1,2", 3, 1).unwrap_err();
        assert!(errors.contains(|e| matches!(e, SerialError::DuplicateSerial(Serial::Number(1)))));
    }

    #[test]
    fn test_quantity_mismatch() {
        let errors = resolve("1,2", 3, 1).unwrap_err();
        assert_eq!(
            errors.errors(),
            &[SerialError::QuantityMismatch { found: 2, expected: 3 }]
        );
    }

    #[test]
    fn test_plus_sequence_includes_end() {
        // start+n yields n + 1 serials
        assert_eq!(resolve("5+2", 3, 1).unwrap(), nums(&[5, 6, 7]));
        assert!(resolve("5+2", 2, 1).is_err());
    }

    #[test]
    fn test_open_sequence_fills_quantity() {
        assert_eq!(resolve("1, 10+", 4, 1).unwrap(), nums(&[1, 10, 11, 12]));
    }

    #[test]
    fn test_tilde_uses_next_available() {
        assert_eq!(resolve("~", 1, 11).unwrap(), nums(&[11]));
        assert_eq!(resolve("~,~", 2, 11).unwrap(), nums(&[11, 12]));
    }

    #[test]
    fn test_mixed_groups_and_text() {
        let serials = resolve("A-1 3-4 SN9", 4, 1).unwrap();
        assert_eq!(
            serials,
            vec![
                Serial::Text("A-1".to_string()),
                Serial::Number(3),
                Serial::Number(4),
                Serial::Text("SN9".to_string()),
            ]
        );
    }

    #[test]
    fn test_leading_zeros_are_the_same_serial() {
        let errors = resolve("007,7", 2, 1).unwrap_err();
        assert!(errors.contains(|e| matches!(e, SerialError::DuplicateSerial(_))));
    }

    #[test]
    fn test_empty_and_zero_quantity() {
        assert_eq!(resolve("  ", 1, 1).unwrap_err().errors(), &[SerialError::EmptySpec]);
        assert_eq!(
            resolve("1", 0, 1).unwrap_err().errors(),
            &[SerialError::InvalidQuantity(0)]
        );
    }

    #[test]
    fn test_reversed_range_is_invalid() {
        let errors = resolve("9-3, 1", 3, 1).unwrap_err();
        assert!(errors.contains(|e| matches!(e, SerialError::InvalidGroupRange(_))));
    }

    #[test]
    fn test_next_serial_and_hint() {
        let existing = nums(&[3, 10, 7]);
        assert_eq!(next_serial_number(&existing), 11);
        assert_eq!(serial_hint(&existing, 4), "11-14");
        assert_eq!(resolve(&serial_hint(&existing, 4), 4, 11).unwrap(), nums(&[11, 12, 13, 14]));
    }

    #[test]
    fn test_conflicts_with_existing() {
        let existing = nums(&[1, 2, 3]);
        let candidates = resolve("2-5", 4, 1).unwrap();
        assert_eq!(find_conflicts(&candidates, &existing), nums(&[2, 3]));
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// An a-b range yields exactly b - a + 1 consecutive serials
        #[test]
        fn prop_range_expansion(start in 0u64..100_000, len in 2u64..200) {
            let end = start + len - 1;
            let serials = resolve(&format!("{}-{}", start, end), len as usize, 1).unwrap();

            prop_assert_eq!(serials.len() as u64, len);
            prop_assert_eq!(serials.first(), Some(&Serial::Number(start)));
            prop_assert_eq!(serials.last(), Some(&Serial::Number(end)));
        }

        /// A list of distinct numbers resolves to itself, in order
        #[test]
        fn prop_literal_list(values in prop::collection::hash_set(0u64..1_000_000, 1..30)) {
            let values: Vec<u64> = values.into_iter().collect();
            let spec = values.iter().map(u64::to_string).collect::<Vec<_>>().join(",");

            prop_assert_eq!(resolve(&spec, values.len(), 1).unwrap(), nums(&values));
        }

        /// Resolved serials are always unique and match the quantity
        #[test]
        fn prop_resolved_serials_are_unique(start in 1u64..1000, extra in 0u64..50) {
            let quantity = (extra + 2) as usize;
            let serials = resolve(&format!("{}+", start), quantity, 1).unwrap();

            let unique: std::collections::HashSet<&Serial> = serials.iter().collect();
            prop_assert_eq!(unique.len(), quantity);
            prop_assert_eq!(serials.len(), quantity);
        }

        /// A wrong quantity is reported, never silently padded or trimmed
        #[test]
        fn prop_quantity_mismatch(count in 2usize..20, delta in 1usize..5) {
            let spec = (1..=count).map(|n| n.to_string()).collect::<Vec<_>>().join(",");
            let result = resolve(&spec, count + delta, 1);

            prop_assert!(result.is_err());
        }
    }
}
