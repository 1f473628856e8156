//! Rolling trimmed moving average.
//!
//! A ring of the last `W` samples plus a sorted copy of the same multiset. Each push
//! evicts the oldest sample from both (binary search + shift) and inserts the new one,
//! so the trimmed mean is available without re-sorting. Storage is fixed at `N`
//! elements; nothing allocates.

use heapless::{Deque, Vec};
use tracing::warn;

/// Compile-time capacity used when none is given.
pub const DEFAULT_CAPACITY: usize = 32;
pub const DEFAULT_WINDOW: usize = 15;
pub const DEFAULT_TRIM: usize = 3;

#[derive(Debug, Clone)]
pub struct RollingTrimmedFilter<const N: usize = DEFAULT_CAPACITY> {
    ring: Deque<i32, N>,
    sorted: Vec<i32, N>,
    window: usize,
    trim: usize,
    sum: i64,
}

impl<const N: usize> Default for RollingTrimmedFilter<N> {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_TRIM)
    }
}

impl<const N: usize> RollingTrimmedFilter<N> {
    const NONZERO_CAPACITY: () = assert!(N > 0, "filter capacity must be at least 1");

    /// `window` is clamped to `1..=N`; `trim` is reduced to `(window - 1) / 2` when
    /// `2 * trim >= window` (checked without overflow).
    pub fn new(window: usize, trim: usize) -> Self {
        let () = Self::NONZERO_CAPACITY;
        let (window, trim) = Self::sizing(window, trim);
        Self {
            ring: Deque::new(),
            sorted: Vec::new(),
            window,
            trim,
            sum: 0,
        }
    }

    fn sizing(window: usize, trim: usize) -> (usize, usize) {
        let w = window.clamp(1, N);
        if w != window {
            warn!(requested = window, used = w, capacity = N, "filter window clamped");
        }
        let k = if trim >= w.div_ceil(2) { (w - 1) / 2 } else { trim };
        if k != trim {
            warn!(requested = trim, used = k, window = w, "filter trim reduced");
        }
        (w, k)
    }

    /// Apply new sizing. Clears the window.
    pub fn reconfigure(&mut self, window: usize, trim: usize) {
        let (w, k) = Self::sizing(window, trim);
        self.window = w;
        self.trim = k;
        self.reset();
    }

    pub fn reset(&mut self) {
        self.ring.clear();
        self.sorted.clear();
        self.sum = 0;
    }

    /// Incorporate `sample` and return the filtered value.
    ///
    /// Until the window fills this is the plain mean of everything seen; afterwards it
    /// is the mean of the sorted window with `trim` values dropped from each end.
    pub fn push(&mut self, sample: i32) -> f64 {
        if self.ring.len() >= self.window
            && let Some(old) = self.ring.pop_front()
        {
            if let Ok(i) = self.sorted.binary_search(&old) {
                self.sorted.remove(i);
            }
            self.sum -= i64::from(old);
        }

        let ring_ok = self.ring.push_back(sample).is_ok();
        let pos = self.sorted.binary_search(&sample).unwrap_or_else(|i| i);
        let sorted_ok = self.sorted.insert(pos, sample).is_ok();
        debug_assert!(ring_ok && sorted_ok, "window never exceeds capacity");
        self.sum += i64::from(sample);

        self.mean()
    }

    fn mean(&self) -> f64 {
        let len = self.ring.len();
        if len < self.window {
            return self.sum as f64 / len as f64;
        }
        let kept = &self.sorted[self.trim..len - self.trim];
        let s: i64 = kept.iter().copied().map(i64::from).sum();
        s as f64 / kept.len() as f64
    }

    /// Filtered value without pushing; `None` while empty.
    pub fn current(&self) -> Option<f64> {
        (!self.ring.is_empty()).then(|| self.mean())
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.ring.len() == self.window
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn trim(&self) -> usize {
        self.trim
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn sorted(&self) -> &[i32] {
        &self.sorted
    }

    /// Live samples, oldest first.
    pub fn ring(&self) -> impl Iterator<Item = i32> + '_ {
        self.ring.iter().copied()
    }
}
