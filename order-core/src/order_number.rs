use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{OrderError, OrderResult};

/// Width of a composite lab order identifier.
pub const IDENTIFIER_WIDTH: usize = 10;

const SEQUENCE_MODULUS: u64 = 1_000_000;

/// Facility tag followed by the zero padded order sequence, e.g. `CBNH000045`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabOrderIdentifier(String);

impl LabOrderIdentifier {
    /// Wrap a value read back from the observation store, verbatim.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Four uppercase letters then six digits.
    pub fn is_well_formed(&self) -> bool {
        let bytes = self.0.as_bytes();
        bytes.len() == IDENTIFIER_WIDTH
            && bytes[..4].iter().all(u8::is_ascii_uppercase)
            && bytes[4..].iter().all(u8::is_ascii_digit)
    }
}

impl fmt::Display for LabOrderIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compose the identifier from a facility tag and a raw order number.
///
/// Non-digits are stripped and the number wraps modulo one million, so
/// `ORD-1000046` and `ORD-46` compose to the same identifier. When tag and
/// digits together exceed [`IDENTIFIER_WIDTH`] no padding is added and the
/// result is longer than usual.
pub fn compose(tag: &str, raw_order_number: &str) -> OrderResult<LabOrderIdentifier> {
    let sequence = reduce_digits(raw_order_number, SEQUENCE_MODULUS)
        .ok_or_else(|| OrderError::InvalidOrderNumber(raw_order_number.to_string()))?;
    let digits = sequence.to_string();
    let used = tag.chars().count() + digits.len();

    let padding = match IDENTIFIER_WIDTH.checked_sub(used) {
        Some(padding) => padding,
        None => {
            warn!(
                tag,
                order_number = raw_order_number,
                width = used,
                "lab order identifier exceeds fixed width, padding skipped"
            );
            0
        }
    };

    Ok(LabOrderIdentifier(format!(
        "{tag}{}{digits}",
        "0".repeat(padding)
    )))
}

/// Value of the decimal digits in `text`, reduced modulo `modulus`.
///
/// Works digit by digit so arbitrarily long runs never overflow. `None` when
/// `text` has no ASCII digit.
pub(crate) fn reduce_digits(text: &str, modulus: u64) -> Option<u64> {
    text.chars()
        .filter_map(|c| c.to_digit(10))
        .fold(None, |acc, digit| {
            Some((acc.unwrap_or(0) * 10 + u64::from(digit)) % modulus)
        })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use proptest::prelude::*;
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    use super::*;

    #[derive(Clone, Default)]
    struct WarningCount(Arc<AtomicUsize>);

    impl WarningCount {
        fn get(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl<S: Subscriber> Layer<S> for WarningCount {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn warnings_during(f: impl FnOnce()) -> usize {
        let count = WarningCount::default();
        let subscriber = tracing_subscriber::registry().with(count.clone());
        tracing::subscriber::with_default(subscriber, f);
        count.get()
    }

    #[test]
    fn composes_tag_and_padded_sequence() {
        let id = compose("CBNH", "ORD-000045").unwrap();
        assert_eq!(id.as_str(), "CBNH000045");
        assert!(id.is_well_formed());
    }

    #[test]
    fn sequence_wraps_at_one_million() {
        assert_eq!(
            compose("CBNH", "1000046").unwrap(),
            compose("CBNH", "46").unwrap()
        );
        assert_eq!(compose("CBNH", "ORD-999999").unwrap().as_str(), "CBNH999999");
        assert_eq!(compose("CBNH", "ORD-1000000").unwrap().as_str(), "CBNH000000");
    }

    #[test]
    fn oversized_tag_gets_no_padding() {
        assert_eq!(compose("LONGTAG", "ORD-123456").unwrap().as_str(), "LONGTAG123456");
        assert_eq!(compose("LONGTAG", "ORD-12").unwrap().as_str(), "LONGTAG012");
    }

    #[test]
    fn padding_overflow_logs_a_warning() {
        let overflowing = warnings_during(|| {
            compose("LONGTAG", "ORD-123456").unwrap();
        });
        assert_eq!(overflowing, 1);

        let fitting = warnings_during(|| {
            compose("LONGTAG", "ORD-12").unwrap();
            compose("CBNH", "ORD-000045").unwrap();
        });
        assert_eq!(fitting, 0);
    }

    #[test]
    fn rejects_order_number_without_digits() {
        assert_eq!(
            compose("CBNH", "ORD-"),
            Err(OrderError::InvalidOrderNumber("ORD-".to_string()))
        );
    }

    #[test]
    fn well_formed_check() {
        assert!(LabOrderIdentifier::from_stored("YPDE000001").is_well_formed());
        assert!(!LabOrderIdentifier::from_stored("CBNH00045").is_well_formed());
        assert!(!LabOrderIdentifier::from_stored("cbnh000045").is_well_formed());
    }

    #[test]
    fn reduce_digits_ignores_non_digits() {
        assert_eq!(reduce_digits("a1b2c3", 1_000), Some(123));
        assert_eq!(reduce_digits("99999999999999999999999", 1_000_000), Some(999_999));
        assert_eq!(reduce_digits("abc", 10), None);
    }

    proptest! {
        #[test]
        fn identifier_is_always_ten_characters(tag in "[A-Z]{4}", number in "[A-Z-]{0,4}[0-9]{1,6}") {
            let id = compose(&tag, &number).unwrap();
            prop_assert_eq!(id.as_str().len(), IDENTIFIER_WIDTH);
            prop_assert!(id.is_well_formed());
        }

        #[test]
        fn composing_is_deterministic(number in "[0-9]{1,20}") {
            prop_assert_eq!(compose("ZAAJ", &number).unwrap(), compose("ZAAJ", &number).unwrap());
        }
    }
}
