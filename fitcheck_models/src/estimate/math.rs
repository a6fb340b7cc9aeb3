//! Byte arithmetic shared by the calculators and families.
//!
//! Products of exact integer quantities (element counts × dtype width) use
//! checked `u64` math. Anything fractional (sub-byte quantization, interval
//! factors) is done in `f64` and rounded **up**, so an estimate never
//! under-reports a requirement because of truncation.

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MathProblem {
    #[error("memory estimate overflow: {0}")]
    MemoryEstimateOverflow(f64),
}

/// `ceil(value)` as bytes, failing when the value does not fit in `u64`.
pub fn ceil_bytes(value: f64) -> Result<u64, MathProblem> {
    if !value.is_finite() || value > u64::MAX as f64 {
        return Err(MathProblem::MemoryEstimateOverflow(value));
    }
    Ok(value.max(0.0).ceil() as u64)
}

/// Product of every factor.
pub fn product(factors: &[u64]) -> Result<u64, MathProblem> {
    factors.iter().try_fold(1u64, |acc, &f| {
        acc.checked_mul(f)
            .ok_or(MathProblem::MemoryEstimateOverflow(acc as f64 * f as f64))
    })
}

pub fn sum<I: IntoIterator<Item = u64>>(values: I) -> Result<u64, MathProblem> {
    values.into_iter().try_fold(0u64, |acc, v| {
        acc.checked_add(v)
            .ok_or(MathProblem::MemoryEstimateOverflow(acc as f64 + v as f64))
    })
}

/// `ceil(bytes · factor)`.
pub fn scale(bytes: u64, factor: f64) -> Result<u64, MathProblem> {
    ceil_bytes(bytes as f64 * factor)
}

/// `ceil(numerator / denominator)`. A zero denominator yields zero.
pub fn div_ceil(numerator: u64, denominator: u64) -> u64 {
    if denominator == 0 {
        return 0;
    }
    numerator.div_ceil(denominator)
}
