//! Batch averaging: drop the samples already in flight, then average a fixed batch.
//!
//! Used for tare and calibration where a single stable number is wanted and a
//! little latency is fine.

use std::time::Duration;

use loadcell_traits::SampleSource;
use tracing::{debug, trace};

use crate::error::{Result, ScaleError};
use crate::hw_error::map_hw_error;

/// Samples thrown away before a batch; a FIFO-fed source holds this many stale
/// conversions plus a little margin.
pub const DEFAULT_DISCARD: u32 = 6;

/// Read one sample, bounded by `timeout` when given.
pub(crate) fn read_one<S: SampleSource + ?Sized>(
    source: &mut S,
    timeout: Option<Duration>,
) -> Result<i32> {
    let res = match timeout {
        Some(t) => source.read_with_timeout(t),
        None => source.read_blocking(),
    };
    let v = res.map_err(|e| map_hw_error(e.as_ref()))?;
    trace!(raw = v, "sample");
    Ok(v)
}

/// Blocking batch average with `discard_count` leading samples dropped.
pub fn read_average<S: SampleSource + ?Sized>(
    source: &mut S,
    batch_size: u32,
    discard_count: u32,
) -> Result<f64> {
    BatchAverager::new(discard_count).read_average(source, batch_size)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchAverager {
    discard: u32,
}

impl Default for BatchAverager {
    fn default() -> Self {
        Self::new(DEFAULT_DISCARD)
    }
}

impl BatchAverager {
    pub const fn new(discard: u32) -> Self {
        Self { discard }
    }

    pub fn discard(&self) -> u32 {
        self.discard
    }

    pub fn read_average<S: SampleSource + ?Sized>(
        &self,
        source: &mut S,
        batch_size: u32,
    ) -> Result<f64> {
        self.read(source, batch_size, None)
    }

    /// Like [`read_average`](Self::read_average) but every sample read is bounded by
    /// `timeout`; an expired read aborts the batch with `ScaleError::Timeout`.
    pub fn read_average_within<S: SampleSource + ?Sized>(
        &self,
        source: &mut S,
        batch_size: u32,
        timeout: Duration,
    ) -> Result<f64> {
        self.read(source, batch_size, Some(timeout))
    }

    /// Bounded when `timeout` is `Some`, blocking otherwise.
    pub fn read<S: SampleSource + ?Sized>(
        &self,
        source: &mut S,
        batch_size: u32,
        timeout: Option<Duration>,
    ) -> Result<f64> {
        if batch_size == 0 {
            return Err(ScaleError::InvalidInput("batch size must be at least 1"));
        }
        for _ in 0..self.discard {
            read_one(source, timeout)?;
        }
        let mut acc: i64 = 0;
        for _ in 0..batch_size {
            acc += i64::from(read_one(source, timeout)?);
        }
        let avg = acc as f64 / f64::from(batch_size);
        debug!(batch_size, discard = self.discard, avg, "batch average");
        Ok(avg)
    }
}
