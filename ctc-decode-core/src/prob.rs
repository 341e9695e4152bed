//! Log-domain probability arithmetic for beam entries.
//!
//! Every hypothesis tracks two log-probabilities per timestep: the mass of
//! alignment paths ending in blank and the mass ending in its own label.
//! Their log-sum is cached in `total` so the beam can be ordered without
//! recomputing it.

/// Log-domain zero. A probability pair whose `total` equals this value is
/// not part of the beam.
pub const LOG_ZERO: f32 = f32::NEG_INFINITY;

/// Numerically stable `log(exp(a) + exp(b))`.
///
/// Combining with [`LOG_ZERO`] leaves the other operand unchanged, which is
/// how impossible paths propagate through the recurrence without turning
/// everything into NaN.
pub fn log_sum_exp(a: f32, b: f32) -> f32 {
    if a == LOG_ZERO {
        b
    } else if b == LOG_ZERO {
        a
    } else {
        let max = a.max(b);
        max + ((a - max).exp() + (b - max).exp()).ln()
    }
}

/// Blank/label/total log-probabilities of one hypothesis at one timestep.
///
/// Invariant after [`combine`](Self::combine): `total = logsumexp(blank, label)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamProbability {
    /// Log-probability over all alignment paths reaching this hypothesis.
    pub total: f32,
    /// Log-probability of the paths ending in blank.
    pub blank: f32,
    /// Log-probability of the paths ending in this hypothesis' label.
    pub label: f32,
}

impl Default for BeamProbability {
    fn default() -> Self {
        Self {
            total: LOG_ZERO,
            blank: LOG_ZERO,
            label: LOG_ZERO,
        }
    }
}

impl BeamProbability {
    /// Recompute `total` from the blank and label components.
    pub fn combine(&mut self) {
        self.total = log_sum_exp(self.blank, self.label);
    }

    /// Deactivate: set all three components back to [`LOG_ZERO`].
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_sum_exp_matches_direct_sum() {
        let a = 0.3f32.ln();
        let b = 0.7f32.ln();
        assert!((log_sum_exp(a, b) - 1.0f32.ln()).abs() < 1e-6);

        let a = 0.4f32.ln();
        let b = 0.18f32.ln();
        assert!((log_sum_exp(a, b) - 0.58f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn log_sum_exp_log_zero_is_identity() {
        assert_eq!(log_sum_exp(LOG_ZERO, -1.5), -1.5);
        assert_eq!(log_sum_exp(-1.5, LOG_ZERO), -1.5);
        assert_eq!(log_sum_exp(LOG_ZERO, LOG_ZERO), LOG_ZERO);
    }

    #[test]
    fn log_sum_exp_extreme_magnitudes() {
        // The small operand underflows but must not produce NaN.
        let out = log_sum_exp(0.0, -1e4);
        assert!(out.is_finite());
        assert!((out - 0.0).abs() < 1e-6);
    }

    #[test]
    fn combine_and_reset() {
        let mut p = BeamProbability::default();
        assert_eq!(p.total, LOG_ZERO);

        p.blank = 0.7f32.ln();
        p.label = 0.3f32.ln();
        p.combine();
        assert!((p.total - 1.0f32.ln()).abs() < 1e-6);

        p.reset();
        assert_eq!(p.blank, LOG_ZERO);
        assert_eq!(p.label, LOG_ZERO);
        assert_eq!(p.total, LOG_ZERO);
    }
}
