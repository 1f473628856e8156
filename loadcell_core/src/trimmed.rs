//! One-shot spike-resistant read: collect a batch, sort, drop `k` from each end and
//! average what is left.

use std::time::Duration;

use loadcell_traits::SampleSource;
use tracing::debug;

use crate::batch::read_one;
use crate::error::Result;

/// Batch size used when the caller passes 0.
pub const DEFAULT_TRIMMED_SAMPLES: usize = 15;
/// Smallest batch that still has a middle after trimming one per side.
pub const MIN_TRIMMED_SAMPLES: usize = 3;

/// Clamp `(n, k)` to a usable batch: `n = 0` selects the default, `n < 3` is raised to
/// 3 and `k` is reduced until at least one sample survives.
pub fn normalize(n: usize, k: usize) -> (usize, usize) {
    let n = match n {
        0 => DEFAULT_TRIMMED_SAMPLES,
        n if n < MIN_TRIMMED_SAMPLES => MIN_TRIMMED_SAMPLES,
        n => n,
    };
    let k = if k >= n.div_ceil(2) { (n - 1) / 2 } else { k };
    (n, k)
}

/// Integer mean of `samples[k..len-k]` after sorting in place. Truncates toward zero.
pub fn trimmed_mean(samples: &mut [i32], k: usize) -> i32 {
    if samples.is_empty() {
        return 0;
    }
    samples.sort_unstable();
    let k = k.min((samples.len() - 1) / 2);
    let kept = &samples[k..samples.len() - k];
    let sum: i64 = kept.iter().copied().map(i64::from).sum();
    // the mean of i32 values always fits in i32
    (sum / kept.len() as i64) as i32
}

pub fn read_trimmed<S: SampleSource + ?Sized>(source: &mut S, n: usize, k: usize) -> Result<i32> {
    collect(source, n, k, None)
}

/// As [`read_trimmed`] with each sample read bounded by `timeout`.
pub fn read_trimmed_within<S: SampleSource + ?Sized>(
    source: &mut S,
    n: usize,
    k: usize,
    timeout: Duration,
) -> Result<i32> {
    collect(source, n, k, Some(timeout))
}

fn collect<S: SampleSource + ?Sized>(
    source: &mut S,
    n: usize,
    k: usize,
    timeout: Option<Duration>,
) -> Result<i32> {
    let (n, k) = normalize(n, k);
    let mut buf = Vec::with_capacity(n);
    for _ in 0..n {
        buf.push(read_one(source, timeout)?);
    }
    let mean = trimmed_mean(&mut buf, k);
    debug!(n, k, mean, "trimmed batch");
    Ok(mean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadcell_hardware::SimulatedSource;
    use rstest::rstest;

    #[rstest]
    #[case((0, 3), (15, 3))]
    #[case((1, 0), (3, 0))]
    #[case((2, 5), (3, 1))]
    #[case((10, 5), (10, 4))]
    #[case((10, 4), (10, 4))]
    #[case((4, 2), (4, 1))]
    #[case((7, usize::MAX), (7, 3))]
    #[case((usize::MAX, usize::MAX / 2 + 1), (usize::MAX, usize::MAX / 2))]
    fn normalizes_batch(#[case] input: (usize, usize), #[case] expected: (usize, usize)) {
        assert_eq!(normalize(input.0, input.1), expected);
    }

    #[test]
    fn spike_is_trimmed() {
        let mut src = SimulatedSource::scripted(vec![10, 10, 10, 10, 10_000, 10, 10]);
        assert_eq!(read_trimmed(&mut src, 7, 1).unwrap(), 10);
    }

    #[test]
    fn mean_truncates_toward_zero() {
        assert_eq!(trimmed_mean(&mut [1, 2], 0), 1);
        assert_eq!(trimmed_mean(&mut [-1, -2], 0), -1);
    }

    #[test]
    fn reads_exactly_n_without_discard() {
        let mut src = SimulatedSource::constant(4);
        read_trimmed(&mut src, 0, 3).unwrap();
        assert_eq!(src.reads(), DEFAULT_TRIMMED_SAMPLES);
    }

    #[test]
    fn timeout_propagates() {
        let mut src = SimulatedSource::unresponsive();
        assert!(read_trimmed_within(&mut src, 5, 1, Duration::from_millis(1)).is_err());
    }
}
