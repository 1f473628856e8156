//! One physical load cell: a sample source, its calibration and a rolling filter.

use std::marker::PhantomData;
use std::time::Duration;

use eyre::WrapErr;
use loadcell_traits::SampleSource;
use tracing::{debug, info};

use crate::batch::{BatchAverager, DEFAULT_DISCARD, read_one};
use crate::calibration::{CalibrationState, ScaleEntry};
use crate::error::{BuildError, Result};
use crate::hw_error::map_hw_error;
use crate::rolling::{DEFAULT_CAPACITY, DEFAULT_TRIM, DEFAULT_WINDOW, RollingTrimmedFilter};
use crate::trimmed::{DEFAULT_TRIMMED_SAMPLES, read_trimmed, read_trimmed_within};

/// Per-channel tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSettings {
    pub window: usize,
    pub trim: usize,
    pub discard: u32,
    pub tare_samples: i32,
    pub calibrate_samples: i32,
    pub trimmed_samples: usize,
    pub trimmed_trim: usize,
    /// `None` reads block until the source delivers.
    pub read_timeout: Option<Duration>,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            trim: DEFAULT_TRIM,
            discard: DEFAULT_DISCARD,
            tare_samples: 15,
            calibrate_samples: 15,
            trimmed_samples: DEFAULT_TRIMMED_SAMPLES,
            trimmed_trim: 3,
            read_timeout: Some(Duration::from_millis(500)),
        }
    }
}

pub struct Channel<S, const N: usize = DEFAULT_CAPACITY> {
    name: String,
    source: S,
    calibration: CalibrationState,
    filter: RollingTrimmedFilter<N>,
    averager: BatchAverager,
    settings: ChannelSettings,
}

impl<S, const N: usize> core::fmt::Debug for Channel<S, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("calibration", &self.calibration)
            .field("filled", &self.filter.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Channel<(), DEFAULT_CAPACITY> {
    /// Start building a channel.
    pub fn builder() -> ChannelBuilder<Missing> {
        ChannelBuilder::default()
    }
}

impl<S: SampleSource, const N: usize> Channel<S, N> {
    /// Build directly. Out-of-range window/trim are clamped rather than rejected; use
    /// the builder for strict validation.
    pub fn new(name: impl Into<String>, source: S, settings: ChannelSettings) -> Self {
        Self {
            name: name.into(),
            source,
            calibration: CalibrationState::new(),
            filter: RollingTrimmedFilter::new(settings.window, settings.trim),
            averager: BatchAverager::new(settings.discard),
            settings,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &ChannelSettings {
        &self.settings
    }

    pub fn calibration(&self) -> &CalibrationState {
        &self.calibration
    }

    pub fn calibration_mut(&mut self) -> &mut CalibrationState {
        &mut self.calibration
    }

    pub fn filter(&self) -> &RollingTrimmedFilter<N> {
        &self.filter
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Zero the channel from a batch average (`samples <= 0` selects 7).
    pub fn tare(&mut self, samples: i32) -> Result<i32> {
        let offset = self.calibration.tare_with(
            &mut self.source,
            samples,
            &self.averager,
            self.settings.read_timeout,
        )?;
        info!(channel = %self.name, offset, "channel tared");
        Ok(offset)
    }

    /// Derive counts-per-gram with `known_grams` on the cell.
    pub fn calibrate(&mut self, known_grams: f32, samples: i32) -> Result<f32> {
        let scale = self.calibration.calibrate_with(
            &mut self.source,
            known_grams,
            samples,
            &self.averager,
            self.settings.read_timeout,
        )?;
        info!(channel = %self.name, scale, "channel calibrated");
        Ok(scale)
    }

    pub fn read_raw(&mut self) -> Result<i32> {
        read_one(&mut self.source, self.settings.read_timeout)
    }

    /// Plain average of `samples` reads (at least 1, no discard), truncated to whole
    /// counts, in grams.
    pub fn read_weight(&mut self, samples: i32) -> Result<f64> {
        let n = samples.max(1);
        let mut acc: i64 = 0;
        for _ in 0..n {
            acc += i64::from(self.read_raw()?);
        }
        let mean = acc / i64::from(n);
        let grams = self.calibration.weight_grams(mean as f64);
        debug!(channel = %self.name, n, mean, grams, "light average");
        Ok(grams)
    }

    /// Push one sample through the rolling trimmed filter and convert.
    pub fn read_weight_trimmed_mavg(&mut self) -> Result<f64> {
        let raw = self.read_raw()?;
        let filtered = self.filter.push(raw);
        Ok(self.calibration.weight_grams(filtered))
    }

    /// One-shot trimmed batch read, in grams.
    pub fn read_weight_filtered(&mut self) -> Result<f64> {
        let counts = match self.settings.read_timeout {
            Some(t) => read_trimmed_within(
                &mut self.source,
                self.settings.trimmed_samples,
                self.settings.trimmed_trim,
                t,
            )?,
            None => read_trimmed(
                &mut self.source,
                self.settings.trimmed_samples,
                self.settings.trimmed_trim,
            )?,
        };
        Ok(self.calibration.weight_grams(f64::from(counts)))
    }

    pub fn apply_entry(&mut self, entry: &ScaleEntry) {
        self.calibration.apply_entry(entry);
        debug!(channel = %self.name, ?entry, "calibration applied");
    }

    pub fn to_entry(&self) -> ScaleEntry {
        self.calibration.to_entry()
    }

    pub fn reset_filter(&mut self) {
        self.filter.reset();
    }

    pub fn power_down(&mut self) -> Result<()> {
        self.source
            .power_down()
            .map_err(|e| map_hw_error(e.as_ref()))
    }

    /// Power back up; the rolling window is cleared since its samples are stale.
    pub fn power_up(&mut self) -> Result<()> {
        self.source.power_up().map_err(|e| map_hw_error(e.as_ref()))?;
        self.filter.reset();
        Ok(())
    }
}

#[cfg(feature = "hardware-errors")]
impl<const N: usize> Channel<loadcell_hardware::FifoSource, N> {
    /// Attach a FIFO-fed channel, installing the shared reader program on first use and
    /// claiming a state machine. Fails with `NoFreeStateMachine` once all are taken.
    pub fn from_fifo(
        name: impl Into<String>,
        rx: loadcell_hardware::FifoReceiver,
        settings: ChannelSettings,
    ) -> Result<Self> {
        let source = loadcell_hardware::FifoSource::new(rx).map_err(|e| map_hw_error(&e))?;
        Ok(Self::new(name, source, settings))
    }
}

// ── Builder ──────────────────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `Channel`; `build()` is only available once a source is set.
pub struct ChannelBuilder<State, S = ()> {
    name: String,
    source: Option<S>,
    settings: ChannelSettings,
    entry: Option<ScaleEntry>,
    _state: PhantomData<State>,
}

impl Default for ChannelBuilder<Missing> {
    fn default() -> Self {
        Self {
            name: "ch0".into(),
            source: None,
            settings: ChannelSettings::default(),
            entry: None,
            _state: PhantomData,
        }
    }
}

impl<State, S> ChannelBuilder<State, S> {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn settings(mut self, settings: ChannelSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Initial calibration, e.g. loaded from the store.
    pub fn calibration(mut self, entry: ScaleEntry) -> Self {
        self.entry = Some(entry);
        self
    }

    pub fn source<T: SampleSource>(self, source: T) -> ChannelBuilder<Set, T> {
        ChannelBuilder {
            name: self.name,
            source: Some(source),
            settings: self.settings,
            entry: self.entry,
            _state: PhantomData,
        }
    }
}

impl<S: SampleSource> ChannelBuilder<Set, S> {
    pub fn build<const N: usize>(self) -> eyre::Result<Channel<S, N>> {
        let name = self.name.clone();
        self.try_build()
            .wrap_err_with(|| format!("build channel '{name}'"))
    }

    fn try_build<const N: usize>(self) -> eyre::Result<Channel<S, N>> {
        let s = &self.settings;
        if s.window == 0 || s.window > N {
            return Err(BuildError::InvalidConfig("window must be in 1..=capacity").into());
        }
        if s.trim >= s.window.div_ceil(2) {
            return Err(BuildError::InvalidConfig("2*trim must be less than window").into());
        }
        if s.trimmed_samples != 0 && s.trimmed_trim >= s.trimmed_samples.div_ceil(2) {
            return Err(BuildError::InvalidConfig(
                "2*trimmed_trim must be less than trimmed_samples",
            )
            .into());
        }
        if s.read_timeout.is_some_and(|t| t.is_zero()) {
            return Err(BuildError::InvalidConfig("read timeout must be positive").into());
        }
        let Some(source) = self.source else {
            return Err(BuildError::MissingSource.into());
        };
        let mut ch = Channel::new(self.name, source, self.settings);
        if let Some(entry) = self.entry {
            ch.apply_entry(&entry);
        }
        Ok(ch)
    }
}
