//! Per-channel tare offset and scale.
//!
//! Scale is stored as raw counts per gram, so `grams = (counts - offset) / scale`.

use std::time::Duration;

use loadcell_traits::SampleSource;
use tracing::{info, warn};

use crate::batch::BatchAverager;
use crate::error::{Result, ScaleError};

/// Batch size substituted when a caller asks for zero or fewer samples.
pub const MIN_SAMPLES: u32 = 7;

/// Persisted form of one channel's calibration. A `counts_per_gram` of 0.0 means no
/// measured scale (tared only, or never calibrated).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScaleEntry {
    pub offset_counts: i32,
    pub counts_per_gram: f32,
}

impl ScaleEntry {
    pub const fn new(offset_counts: i32, counts_per_gram: f32) -> Self {
        Self {
            offset_counts,
            counts_per_gram,
        }
    }

    /// A scale that can be divided by.
    pub fn has_valid_scale(&self) -> bool {
        self.counts_per_gram.is_finite() && self.counts_per_gram > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Uninitialized,
    Tared,
    Calibrated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationState {
    offset_counts: i32,
    scale: f32,
    phase: Phase,
}

impl Default for CalibrationState {
    fn default() -> Self {
        Self::new()
    }
}

/// `samples <= 0` selects [`MIN_SAMPLES`].
pub fn effective_samples(samples: i32) -> u32 {
    u32::try_from(samples)
        .ok()
        .filter(|&n| n > 0)
        .unwrap_or(MIN_SAMPLES)
}

impl CalibrationState {
    pub const fn new() -> Self {
        Self {
            offset_counts: 0,
            scale: 1.0,
            phase: Phase::Uninitialized,
        }
    }

    pub fn from_entry(entry: &ScaleEntry) -> Self {
        let mut s = Self::new();
        s.apply_entry(entry);
        s
    }

    pub fn offset(&self) -> i32 {
        self.offset_counts
    }

    /// Counts per gram.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// True once a non-zero offset has been set.
    pub fn is_tared(&self) -> bool {
        self.offset_counts != 0
    }

    pub fn set_offset(&mut self, offset_counts: i32) {
        self.offset_counts = offset_counts;
        if self.phase == Phase::Uninitialized {
            self.phase = Phase::Tared;
        }
    }

    pub fn set_scale(&mut self, counts_per_gram: f32) -> Result<()> {
        if !(counts_per_gram.is_finite() && counts_per_gram > 0.0) {
            warn!(counts_per_gram, "rejected scale");
            return Err(ScaleError::InvalidInput("scale must be a positive number"));
        }
        self.scale = counts_per_gram;
        self.phase = Phase::Calibrated;
        Ok(())
    }

    /// Store `avg` as the zero point. Truncates toward zero and saturates at the i32
    /// range.
    pub fn tare_from_average(&mut self, avg: f64) -> i32 {
        // `as` on f64 -> i32 truncates and saturates; NaN becomes 0
        let offset = avg as i32;
        self.offset_counts = offset;
        if self.phase != Phase::Calibrated {
            self.phase = Phase::Tared;
        }
        info!(offset, "tare set");
        offset
    }

    /// Derive the scale from an averaged reading taken with `known_grams` on the cell.
    /// On error nothing changes.
    pub fn calibrate_from_average(&mut self, avg: f64, known_grams: f32) -> Result<f32> {
        if !(known_grams.is_finite() && known_grams > 0.0) {
            warn!(known_grams, "calibration weight must be positive");
            return Err(ScaleError::InvalidInput("known weight must be positive"));
        }
        let net = avg - f64::from(self.offset_counts);
        if net == 0.0 {
            warn!(avg, offset = self.offset_counts, "no net signal for calibration");
            return Err(ScaleError::InvalidInput("reading equals tare offset"));
        }
        if net < 0.0 {
            warn!(net, "net reading below tare; check wiring or re-tare");
            return Err(ScaleError::InvalidInput("net reading is negative"));
        }
        let scale = (net / f64::from(known_grams)) as f32;
        if !(scale.is_finite() && scale > 0.0) {
            return Err(ScaleError::InvalidInput("derived scale out of range"));
        }
        self.scale = scale;
        self.phase = Phase::Calibrated;
        info!(scale, known_grams, net, "calibrated");
        Ok(scale)
    }

    /// Average `samples` readings (`<= 0` selects 7) and make that the zero point.
    pub fn tare<S: SampleSource + ?Sized>(&mut self, source: &mut S, samples: i32) -> Result<i32> {
        self.tare_with(source, samples, &BatchAverager::default(), None)
    }

    pub fn tare_with<S: SampleSource + ?Sized>(
        &mut self,
        source: &mut S,
        samples: i32,
        averager: &BatchAverager,
        timeout: Option<Duration>,
    ) -> Result<i32> {
        let avg = averager.read(source, effective_samples(samples), timeout)?;
        Ok(self.tare_from_average(avg))
    }

    pub fn calibrate<S: SampleSource + ?Sized>(
        &mut self,
        source: &mut S,
        known_grams: f32,
        samples: i32,
    ) -> Result<f32> {
        self.calibrate_with(source, known_grams, samples, &BatchAverager::default(), None)
    }

    pub fn calibrate_with<S: SampleSource + ?Sized>(
        &mut self,
        source: &mut S,
        known_grams: f32,
        samples: i32,
        averager: &BatchAverager,
        timeout: Option<Duration>,
    ) -> Result<f32> {
        // fail before touching the source
        if !(known_grams.is_finite() && known_grams > 0.0) {
            warn!(known_grams, "calibration weight must be positive");
            return Err(ScaleError::InvalidInput("known weight must be positive"));
        }
        let avg = averager.read(source, effective_samples(samples), timeout)?;
        self.calibrate_from_average(avg, known_grams)
    }

    pub fn weight_grams(&self, filtered_counts: f64) -> f64 {
        (filtered_counts - f64::from(self.offset_counts)) / f64::from(self.scale)
    }

    /// Weight represented by the tare offset itself.
    pub fn tare_grams(&self) -> f64 {
        -f64::from(self.offset_counts) / f64::from(self.scale)
    }

    /// Scale is written as 0.0 until calibrated, so a tare-only record does not
    /// restore the unit default as if it were measured.
    pub fn to_entry(&self) -> ScaleEntry {
        let scale = if self.phase == Phase::Calibrated {
            self.scale
        } else {
            0.0
        };
        ScaleEntry::new(self.offset_counts, scale)
    }

    /// Offset is always taken; scale only when it is a usable positive number, so a
    /// blank entry keeps the current scale.
    pub fn apply_entry(&mut self, entry: &ScaleEntry) {
        self.offset_counts = entry.offset_counts;
        if entry.has_valid_scale() {
            self.scale = entry.counts_per_gram;
            self.phase = Phase::Calibrated;
        } else if entry.offset_counts != 0 {
            self.phase = Phase::Tared;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadcell_hardware::SimulatedSource;
    use rstest::rstest;

    #[test]
    fn starts_uninitialized_with_unit_scale() {
        let s = CalibrationState::new();
        assert_eq!(s.phase(), Phase::Uninitialized);
        assert_eq!(s.scale(), 1.0);
        assert!(!s.is_tared());
    }

    #[test]
    fn tare_then_calibrate_scenario() {
        let mut s = CalibrationState::new();
        let averager = BatchAverager::new(0);
        let mut src = SimulatedSource::constant(100);
        assert_eq!(s.tare_with(&mut src, 7, &averager, None).unwrap(), 100);
        assert_eq!(s.phase(), Phase::Tared);

        src.set_script(vec![150]);
        let scale = s.calibrate_with(&mut src, 50.0, 7, &averager, None).unwrap();
        assert_eq!(scale, 1.0);
        assert_eq!(s.phase(), Phase::Calibrated);
        assert_eq!(s.weight_grams(200.0), 100.0);
    }

    #[rstest]
    #[case(0.0)]
    #[case(-10.0)]
    #[case(f32::NAN)]
    #[case(f32::INFINITY)]
    fn non_positive_weight_is_a_no_op(#[case] known: f32) {
        let mut s = CalibrationState::new();
        s.set_scale(2.5).unwrap();
        let mut src = SimulatedSource::constant(500);
        let err = s.calibrate(&mut src, known, 10).unwrap_err();
        assert!(matches!(err, ScaleError::InvalidInput(_)));
        assert_eq!(s.scale(), 2.5);
        assert_eq!(src.reads(), 0);
    }

    #[test]
    fn zero_net_keeps_scale() {
        let mut s = CalibrationState::new();
        s.tare_from_average(300.0);
        assert!(s.calibrate_from_average(300.0, 10.0).is_err());
        assert_eq!(s.scale(), 1.0);
        assert_eq!(s.phase(), Phase::Tared);
    }

    #[test]
    fn negative_net_is_rejected() {
        let mut s = CalibrationState::new();
        s.tare_from_average(300.0);
        assert!(s.calibrate_from_average(100.0, 10.0).is_err());
        assert_eq!(s.scale(), 1.0);
    }

    #[rstest]
    #[case(99.9, 99)]
    #[case(-99.9, -99)]
    #[case(1e12, i32::MAX)]
    #[case(-1e12, i32::MIN)]
    fn tare_truncates_and_saturates(#[case] avg: f64, #[case] offset: i32) {
        let mut s = CalibrationState::new();
        assert_eq!(s.tare_from_average(avg), offset);
    }

    #[rstest]
    #[case(0, 7)]
    #[case(-3, 7)]
    #[case(1, 1)]
    #[case(25, 25)]
    fn sample_count_defaults(#[case] asked: i32, #[case] used: u32) {
        assert_eq!(effective_samples(asked), used);
    }

    #[test]
    fn tare_uses_minimum_batch_when_asked_for_none() {
        let mut s = CalibrationState::new();
        let mut src = SimulatedSource::constant(10);
        s.tare_with(&mut src, 0, &BatchAverager::new(0), None).unwrap();
        assert_eq!(src.reads(), MIN_SAMPLES as usize);
    }

    #[rstest]
    #[case(0.0)]
    #[case(-1.0)]
    #[case(f32::NAN)]
    fn set_scale_rejects_invalid(#[case] v: f32) {
        let mut s = CalibrationState::new();
        assert!(s.set_scale(v).is_err());
        assert_eq!(s.scale(), 1.0);
    }

    #[test]
    fn tare_grams_is_negative_offset_over_scale() {
        let mut s = CalibrationState::new();
        s.set_offset(200);
        s.set_scale(4.0).unwrap();
        assert_eq!(s.tare_grams(), -50.0);
        assert_eq!(s.weight_grams(200.0), 0.0);
    }

    #[test]
    fn blank_entry_keeps_default_scale() {
        let s = CalibrationState::from_entry(&ScaleEntry::default());
        assert_eq!(s.scale(), 1.0);
        assert_eq!(s.offset(), 0);
        assert_eq!(s.phase(), Phase::Uninitialized);

        let s = CalibrationState::from_entry(&ScaleEntry::new(100, 0.0));
        assert_eq!((s.offset(), s.scale(), s.phase()), (100, 1.0, Phase::Tared));
    }

    #[test]
    fn retare_keeps_calibration() {
        let mut s = CalibrationState::from_entry(&ScaleEntry::new(10, 4.0));
        s.tare_from_average(50.0);
        assert_eq!(s.phase(), Phase::Calibrated);
        assert_eq!(s.to_entry(), ScaleEntry::new(50, 4.0));
    }

    #[test]
    fn tare_only_entry_has_no_scale() {
        let mut s = CalibrationState::new();
        s.tare_from_average(321.0);
        assert_eq!(s.to_entry(), ScaleEntry::new(321, 0.0));
        let back = CalibrationState::from_entry(&s.to_entry());
        assert_eq!(back.phase(), Phase::Tared);
    }

    #[test]
    fn entry_round_trip() {
        let e = ScaleEntry::new(-4242, 812.5);
        let s = CalibrationState::from_entry(&e);
        assert_eq!(s.to_entry(), e);
        assert_eq!(s.phase(), Phase::Calibrated);
    }
}
