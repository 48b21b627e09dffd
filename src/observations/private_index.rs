//! Maps (event vector, value) pairs onto the discretized domain used by
//! shuffled differential privacy.
//!
//! The domain has `num_event_vectors * num_index_points` points. A pair maps
//! to `value_index * num_event_vectors + event_vector_index`.

use super::random::RandomSource;
use crate::{
    data::types::EventVector,
    registry::{types::MetricDimension, validator::num_event_vectors},
};

/// Position of `event_vector` in the metric's event vector space, as a mixed
/// radix number whose first dimension is the least significant digit.
///
/// A dimension with a `max_event_code` uses the code itself as its digit;
/// otherwise the digit is the code's rank among the declared codes.
pub fn event_vector_index(
    event_vector: &EventVector,
    dimensions: &[MetricDimension],
) -> Result<u64, String> {
    let codes = event_vector.codes();
    if codes.len() != dimensions.len() {
        return Err(format!(
            "event vector {codes:?} has {} codes but the metric has {} dimensions",
            codes.len(),
            dimensions.len()
        ));
    }

    let mut index = 0u64;
    let mut multiplier = 1u64;
    for (code, dimension) in codes.iter().zip(dimensions) {
        let (digit, size) = if dimension.max_event_code != 0 {
            if *code > dimension.max_event_code {
                return Err(format!(
                    "event code {code} exceeds max_event_code {}",
                    dimension.max_event_code
                ));
            }
            (u64::from(*code), u64::from(dimension.max_event_code) + 1)
        } else {
            let rank = dimension
                .event_codes
                .keys()
                .position(|known| known == code)
                .ok_or_else(|| format!("unknown event code {code}"))?;
            (rank as u64, dimension.event_codes.len() as u64)
        };
        index += digit * multiplier;
        multiplier *= size;
    }
    Ok(index)
}

/// Discretizes `value` onto `num_index_points` evenly spaced points over
/// `[min_value, max_value]`. Values outside the range are clamped; values
/// between two points round up with probability equal to their distance
/// from the lower point.
pub fn value_index<R: RandomSource + ?Sized>(
    value: i64,
    min_value: i64,
    max_value: i64,
    num_index_points: u32,
    source: &mut R,
) -> u64 {
    if num_index_points <= 1 || max_value <= min_value {
        return 0;
    }
    let clamped = value.clamp(min_value, max_value);
    let interval =
        (max_value - min_value) as f64 / f64::from(num_index_points - 1);
    let approximate = (clamped - min_value) as f64 / interval;
    let lower = approximate.floor();
    let index = if source.next_f64() < approximate - lower {
        lower + 1.0
    } else {
        lower
    };
    (index as u64).min(u64::from(num_index_points - 1))
}

/// Size of the private index domain for a metric and report.
pub fn num_private_indices(
    dimensions: &[MetricDimension],
    num_index_points: u32,
) -> Option<u64> {
    num_event_vectors(dimensions)?.checked_mul(u64::from(num_index_points))
}

pub fn private_index(
    value_index: u64,
    event_vector_index: u64,
    num_event_vectors: u64,
) -> u64 {
    value_index * num_event_vectors + event_vector_index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ConstantRandomSource;

    fn dimensions() -> Vec<MetricDimension> {
        vec![
            MetricDimension::with_codes([(1, "a"), (5, "b"), (9, "c")]),
            MetricDimension::with_max_event_code(3),
        ]
    }

    #[test]
    fn test_event_vector_index_mixed_radix() -> Result<(), String> {
        let dims = dimensions();
        assert_eq!(event_vector_index(&[1, 0].into(), &dims)?, 0);
        assert_eq!(event_vector_index(&[5, 0].into(), &dims)?, 1);
        assert_eq!(event_vector_index(&[9, 0].into(), &dims)?, 2);
        assert_eq!(event_vector_index(&[1, 1].into(), &dims)?, 3);
        assert_eq!(event_vector_index(&[9, 3].into(), &dims)?, 11);
        assert_eq!(event_vector_index(&EventVector::default(), &[])?, 0);
        Ok(())
    }

    #[test]
    fn test_event_vector_index_rejects_bad_vectors() {
        let dims = dimensions();
        assert!(event_vector_index(&[2, 0].into(), &dims).is_err());
        assert!(event_vector_index(&[1, 4].into(), &dims).is_err());
        assert!(event_vector_index(&[1].into(), &dims).is_err());
    }

    #[test]
    fn test_value_index_clamps_and_rounds() {
        let mut round_down = ConstantRandomSource::new(0.99);
        let mut round_up = ConstantRandomSource::new(0.0);

        // Points at 0, 5, 10.
        assert_eq!(value_index(-3, 0, 10, 3, &mut round_up), 0);
        assert_eq!(value_index(25, 0, 10, 3, &mut round_up), 2);
        assert_eq!(value_index(5, 0, 10, 3, &mut round_up), 1);
        assert_eq!(value_index(7, 0, 10, 3, &mut round_down), 1);
        assert_eq!(value_index(7, 0, 10, 3, &mut round_up), 2);
        assert_eq!(value_index(10, 0, 10, 3, &mut round_up), 2);
    }

    #[test]
    fn test_value_index_single_point() {
        let mut source = ConstantRandomSource::new(0.0);
        assert_eq!(value_index(100, 0, 0, 1, &mut source), 0);
        assert_eq!(value_index(100, 0, 50, 1, &mut source), 0);
    }

    #[test]
    fn test_private_index_layout() {
        assert_eq!(num_private_indices(&dimensions(), 3), Some(36));
        assert_eq!(private_index(2, 11, 12), 35);
        assert_eq!(private_index(0, 0, 12), 0);
    }
}
