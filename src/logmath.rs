//! Log-domain arithmetic for acoustic scores.
//!
//! Mixture weights, transition probabilities, and Gaussian densities are all
//! kept in the log domain. `LogMath` is an explicit context value threaded
//! through the loader and the adaptation pipeline rather than a process-wide
//! singleton, so two models with different conventions can coexist.

/// The smallest representable log value; `log(0)` maps here.
pub const LOG_ZERO: f32 = -f32::MAX;

/// Natural-log arithmetic context.
///
/// Zero-sized today; it exists as the seam through which all log-domain
/// conversions flow.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMath;

impl LogMath {
    /// Create a new log math context.
    pub fn new() -> Self {
        Self
    }

    /// Convert a linear value to the log domain. Non-positive values map
    /// to [`LOG_ZERO`].
    pub fn linear_to_log(&self, value: f32) -> f32 {
        if value <= 0.0 {
            LOG_ZERO
        } else {
            value.ln()
        }
    }

    /// Convert a log-domain value back to linear. [`LOG_ZERO`] maps to zero.
    pub fn log_to_linear(&self, value: f32) -> f32 {
        if value <= LOG_ZERO {
            0.0
        } else {
            value.exp()
        }
    }

    /// Convert a slice of linear values to the log domain in place.
    pub fn linear_to_log_slice(&self, values: &mut [f32]) {
        for value in values.iter_mut() {
            *value = self.linear_to_log(*value);
        }
    }

    /// Add two log-domain values as if they were linear:
    /// `log(exp(a) + exp(b))`, computed without leaving the log domain.
    pub fn add_as_linear(&self, a: f32, b: f32) -> f32 {
        let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
        if lo <= LOG_ZERO {
            return hi;
        }
        let diff = lo - hi;
        // exp underflows well before f32::MIN_EXP decades; skip the work
        if diff < -80.0 {
            hi
        } else {
            hi + diff.exp().ln_1p()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_log_round_trip() {
        let lm = LogMath::new();
        for &x in &[1e-7f32, 0.25, 1.0, 3.5, 1000.0] {
            let log = lm.linear_to_log(x);
            assert!((lm.log_to_linear(log) - x).abs() < x * 1e-5);
        }
    }

    #[test]
    fn test_zero_maps_to_log_zero() {
        let lm = LogMath::new();
        assert_eq!(lm.linear_to_log(0.0), LOG_ZERO);
        assert_eq!(lm.linear_to_log(-1.0), LOG_ZERO);
        assert_eq!(lm.log_to_linear(LOG_ZERO), 0.0);
    }

    #[test]
    fn test_add_as_linear() {
        let lm = LogMath::new();
        let sum = lm.add_as_linear(lm.linear_to_log(0.25), lm.linear_to_log(0.75));
        assert!((lm.log_to_linear(sum) - 1.0).abs() < 1e-6);

        // adding log-zero is the identity
        let a = lm.linear_to_log(0.5);
        assert_eq!(lm.add_as_linear(a, LOG_ZERO), a);
        assert_eq!(lm.add_as_linear(LOG_ZERO, a), a);
    }
}
