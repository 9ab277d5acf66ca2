use crate::errors::ConformalError;
use std::str::FromStr;

/// Create a string of all available items.
pub fn items_to_strings(items: Vec<&str>) -> String {
    let mut s = String::new();
    for i in items {
        s.push_str(i);
        s.push_str(&String::from(", "));
    }
    s
}

// Validation
pub fn validate_float_parameter(value: f64, min: f64, max: f64, parameter: &str) -> Result<(), ConformalError> {
    let mut msg = String::new();
    if value.is_nan() || value < min || max < value {
        msg.push_str(&format!("real value within range {} and {}", min, max));
    }
    if !msg.is_empty() {
        Err(ConformalError::InvalidParameter(
            parameter.to_string(),
            msg,
            value.to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Confidence levels must lie in [0, 1].
pub fn validate_confidence(confidence: f64) -> Result<(), ConformalError> {
    validate_float_parameter(confidence, 0.0, 1.0, "confidence")
}

/// Parse a string parameter value, reporting the expected type on failure.
pub fn parse_param<T: FromStr>(name: &str, value: &str, expected: &str) -> Result<T, ConformalError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConformalError::InvalidParameter(name.to_string(), expected.to_string(), value.to_string()))
}

/// Median of a set of values; the mean of the two middle values for even counts.
///
/// Infinite values are ordered normally, NaN values must be filtered by the caller.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut v = values.to_vec();
    v.sort_unstable_by(|a, b| a.total_cmp(b));
    let mid = v.len() / 2;
    if v.len() % 2 == 1 {
        v[mid]
    } else {
        let (a, b) = (v[mid - 1], v[mid]);
        if a == b {
            // Keeps (-inf, -inf) and (inf, inf) from turning into NaN.
            a
        } else {
            (a + b) / 2.0
        }
    }
}

/// Geometric mean, zero when any value is zero.
pub fn geometric_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    if values.iter().any(|v| *v <= 0.0) {
        return 0.0;
    }
    (values.iter().map(|v| v.ln()).sum::<f64>() / values.len() as f64).exp()
}

/// Derive an independent seed for stream `index` from a base seed (splitmix64 finalizer).
pub fn mix_seed(seed: u64, index: u64) -> u64 {
    let mut z = seed.wrapping_add(index.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
