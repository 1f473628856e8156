use std::time::Duration;

use loadcell_traits::{BoxError, SampleSource};
use tracing::trace;

use crate::error::HwError;

/// Simulated load cell.
///
/// Plays back a script of raw counts (cycling when it runs out), optionally with
/// deterministic noise and periodic spikes layered on top. A simulator that never
/// converts reports timeouts on bounded reads and a disconnect on blocking reads,
/// since it cannot block forever.
#[derive(Debug, Clone)]
pub struct SimulatedSource {
    script: Vec<i32>,
    idx: usize,
    noise_amp: i32,
    rng_state: u32,
    spike_every: usize,
    spike_counts: i32,
    reads: usize,
    pending_timeouts: usize,
    unresponsive: bool,
    powered: bool,
}

impl SimulatedSource {
    pub fn constant(counts: i32) -> Self {
        Self::scripted(vec![counts])
    }

    pub fn scripted(script: Vec<i32>) -> Self {
        Self {
            script,
            idx: 0,
            noise_amp: 0,
            rng_state: 0xC0FF_EE01,
            spike_every: 0,
            spike_counts: 0,
            reads: 0,
            pending_timeouts: 0,
            unresponsive: false,
            powered: true,
        }
    }

    /// A device that never signals data-ready.
    pub fn unresponsive() -> Self {
        Self {
            unresponsive: true,
            ..Self::scripted(Vec::new())
        }
    }

    /// Add uniform noise in `[-amp, +amp]` counts.
    pub fn with_noise(mut self, amp: i32, seed: u32) -> Self {
        self.noise_amp = amp.max(0);
        self.rng_state = seed.max(1);
        self
    }

    /// Add `counts` to every `every`-th sample (1-based).
    pub fn with_spikes(mut self, every: usize, counts: i32) -> Self {
        self.spike_every = every;
        self.spike_counts = counts;
        self
    }

    /// The next `n` bounded reads time out before the script resumes.
    pub fn with_timeouts(mut self, n: usize) -> Self {
        self.pending_timeouts = n;
        self
    }

    /// Replace the script, e.g. when a weight is placed between tare and calibrate.
    pub fn set_script(&mut self, script: Vec<i32>) {
        self.script = script;
        self.idx = 0;
    }

    /// Total successful reads so far.
    pub fn reads(&self) -> usize {
        self.reads
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    fn next_noise(&mut self) -> i32 {
        if self.noise_amp == 0 {
            return 0;
        }
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rng_state = x;
        let span = (self.noise_amp as u32) * 2 + 1;
        (x % span) as i32 - self.noise_amp
    }

    fn next_sample(&mut self) -> Result<i32, HwError> {
        if !self.powered {
            return Err(HwError::Gpio("simulated hx711 is powered down".into()));
        }
        let Some(&base) = self.script.get(self.idx) else {
            return Err(HwError::Disconnected);
        };
        self.idx = (self.idx + 1) % self.script.len();
        self.reads += 1;
        let mut v = base.saturating_add(self.next_noise());
        if self.spike_every > 0 && self.reads % self.spike_every == 0 {
            v = v.saturating_add(self.spike_counts);
        }
        trace!(raw = v, "simulated sample");
        Ok(v)
    }
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::constant(0)
    }
}

impl SampleSource for SimulatedSource {
    fn read_blocking(&mut self) -> Result<i32, BoxError> {
        if self.unresponsive {
            return Err(HwError::Disconnected.into());
        }
        Ok(self.next_sample()?)
    }

    fn read_with_timeout(&mut self, _timeout: Duration) -> Result<i32, BoxError> {
        if self.unresponsive {
            return Err(HwError::Timeout.into());
        }
        if self.pending_timeouts > 0 {
            self.pending_timeouts -= 1;
            return Err(HwError::Timeout.into());
        }
        Ok(self.next_sample()?)
    }

    fn read_nonblocking(&mut self) -> Result<Option<i32>, BoxError> {
        if self.unresponsive || self.pending_timeouts > 0 {
            return Ok(None);
        }
        Ok(Some(self.next_sample()?))
    }

    fn power_down(&mut self) -> Result<(), BoxError> {
        self.powered = false;
        Ok(())
    }

    fn power_up(&mut self) -> Result<(), BoxError> {
        self.powered = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_cycles() {
        let mut s = SimulatedSource::scripted(vec![1, 2, 3]);
        let got: Vec<i32> = (0..5).map(|_| s.read_blocking().unwrap()).collect();
        assert_eq!(got, vec![1, 2, 3, 1, 2]);
        assert_eq!(s.reads(), 5);
    }

    #[test]
    fn noise_stays_within_amplitude() {
        let mut s = SimulatedSource::constant(1000).with_noise(5, 42);
        for _ in 0..200 {
            let v = s.read_blocking().unwrap();
            assert!((995..=1005).contains(&v), "{v}");
        }
    }

    #[test]
    fn spikes_land_on_schedule() {
        let mut s = SimulatedSource::constant(10).with_spikes(3, 1000);
        let got: Vec<i32> = (0..6).map(|_| s.read_blocking().unwrap()).collect();
        assert_eq!(got, vec![10, 10, 1010, 10, 10, 1010]);
    }

    #[test]
    fn injected_timeouts_then_data() {
        let mut s = SimulatedSource::constant(7).with_timeouts(1);
        let err = s.read_with_timeout(Duration::from_millis(1)).unwrap_err();
        assert!(err.downcast_ref::<HwError>().is_some());
        assert_eq!(s.read_with_timeout(Duration::from_millis(1)).unwrap(), 7);
    }

    #[test]
    fn unresponsive_never_yields_zero() {
        let mut s = SimulatedSource::unresponsive();
        assert!(s.read_with_timeout(Duration::from_millis(1)).is_err());
        assert!(s.read_blocking().is_err());
        assert_eq!(s.read_nonblocking().unwrap(), None);
    }

    #[test]
    fn power_cycle() {
        let mut s = SimulatedSource::constant(1);
        s.power_down().unwrap();
        assert!(s.read_blocking().is_err());
        s.power_up().unwrap();
        assert_eq!(s.read_blocking().unwrap(), 1);
    }
}
