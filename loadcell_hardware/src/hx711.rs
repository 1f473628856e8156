//! Bit-banged HX711 reader.
//!
//! One conversion is shifted out MSB first on 24 rising SCK edges; 1..=3 extra pulses
//! select channel and gain for the *next* conversion. Holding SCK high for more than
//! 60 µs powers the chip down.

use std::time::Duration;

use loadcell_traits::sample::SAMPLE_BITS;
use loadcell_traits::{BoxError, Clock, MonotonicClock, SampleSource, sign_extend_24};
use tracing::trace;

use crate::error::{HwError, Result};
use crate::util::wait_until_low_with_timeout;

const POWER_DOWN_HOLD: Duration = Duration::from_micros(64);
const POWER_UP_SETTLE: Duration = Duration::from_micros(1);
const DEFAULT_POLL: Duration = Duration::from_micros(200);

/// Input channel and gain applied to the conversion after the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gain {
    /// Channel A, gain 128.
    #[default]
    Gain128,
    /// Channel A, gain 64.
    Gain64,
    /// Channel B, gain 32.
    Gain32,
}

impl Gain {
    /// Total SCK pulses per read, data bits included.
    pub fn clock_pulses(self) -> u8 {
        match self {
            Gain::Gain128 => 25,
            Gain::Gain32 => 26,
            Gain::Gain64 => 27,
        }
    }
}

/// Output data rate, selected by the RATE pin on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rate {
    #[default]
    Sps10,
    Sps80,
}

impl Rate {
    pub fn samples_per_second(self) -> u8 {
        match self {
            Rate::Sps10 => 10,
            Rate::Sps80 => 80,
        }
    }

    /// Time from power-up or channel change until output is valid.
    pub fn settling_time(self) -> Duration {
        match self {
            Rate::Sps10 => Duration::from_millis(400),
            Rate::Sps80 => Duration::from_millis(50),
        }
    }
}

/// The two wires of the HX711 interface.
pub trait Hx711Lines {
    fn dout_is_high(&mut self) -> Result<bool>;
    fn set_sck(&mut self, high: bool) -> Result<()>;
}

pub struct Hx711<L, C = MonotonicClock> {
    lines: L,
    clock: C,
    gain: Gain,
    poll_interval: Duration,
    powered: bool,
}

impl<L: Hx711Lines> Hx711<L, MonotonicClock> {
    pub fn new(lines: L, gain: Gain) -> Result<Self> {
        Self::with_clock(lines, gain, MonotonicClock::new())
    }
}

impl<L: Hx711Lines, C: Clock> Hx711<L, C> {
    pub fn with_clock(mut lines: L, gain: Gain, clock: C) -> Result<Self> {
        lines.set_sck(false)?; // clock idle low
        Ok(Self {
            lines,
            clock,
            gain,
            poll_interval: DEFAULT_POLL,
            powered: true,
        })
    }

    /// Takes effect from the conversion after the next read.
    pub fn set_gain(&mut self, gain: Gain) {
        self.gain = gain;
    }

    pub fn gain(&self) -> Gain {
        self.gain
    }

    pub fn set_poll_interval(&mut self, interval: Duration) {
        self.poll_interval = interval;
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    /// Block for the settling time of `rate`.
    pub fn wait_settle(&self, rate: Rate) {
        self.clock.sleep(rate.settling_time());
    }

    pub fn read_with_timeout(&mut self, timeout: Duration) -> Result<i32> {
        let poll = self.poll_interval;
        let lines = &mut self.lines;
        wait_until_low_with_timeout(|| lines.dout_is_high(), timeout, poll, &self.clock)
            .map_err(|e| match e {
                HwError::DataReadyTimeout => HwError::Timeout,
                other => other,
            })?;
        self.shift_in()
    }

    pub fn read_blocking(&mut self) -> Result<i32> {
        while self.lines.dout_is_high()? {
            self.clock.sleep(self.poll_interval);
        }
        self.shift_in()
    }

    pub fn read_nonblocking(&mut self) -> Result<Option<i32>> {
        if self.lines.dout_is_high()? {
            return Ok(None);
        }
        self.shift_in().map(Some)
    }

    pub fn power_down(&mut self) -> Result<()> {
        self.lines.set_sck(true)?;
        self.clock.sleep(POWER_DOWN_HOLD);
        self.powered = false;
        Ok(())
    }

    pub fn power_up(&mut self) -> Result<()> {
        self.lines.set_sck(false)?;
        self.clock.sleep(POWER_UP_SETTLE);
        self.powered = true;
        Ok(())
    }

    fn shift_in(&mut self) -> Result<i32> {
        let mut word: u32 = 0;
        for _ in 0..SAMPLE_BITS {
            self.lines.set_sck(true)?;
            spin_delay_100ns();
            word = (word << 1) | u32::from(self.lines.dout_is_high()?);
            self.lines.set_sck(false)?;
            spin_delay_100ns();
        }

        // Remaining pulses select gain for the next conversion
        let extra = u32::from(self.gain.clock_pulses()) - SAMPLE_BITS;
        for _ in 0..extra {
            self.lines.set_sck(true)?;
            spin_delay_100ns();
            self.lines.set_sck(false)?;
            spin_delay_100ns();
        }

        let value = sign_extend_24(word);
        trace!(raw = value, "hx711 raw read");
        Ok(value)
    }
}

impl<L: Hx711Lines, C: Clock> SampleSource for Hx711<L, C> {
    fn read_blocking(&mut self) -> std::result::Result<i32, BoxError> {
        Ok(Hx711::read_blocking(self)?)
    }

    fn read_with_timeout(&mut self, timeout: Duration) -> std::result::Result<i32, BoxError> {
        Ok(Hx711::read_with_timeout(self, timeout)?)
    }

    fn read_nonblocking(&mut self) -> std::result::Result<Option<i32>, BoxError> {
        Ok(Hx711::read_nonblocking(self)?)
    }

    fn power_down(&mut self) -> std::result::Result<(), BoxError> {
        Ok(Hx711::power_down(self)?)
    }

    fn power_up(&mut self) -> std::result::Result<(), BoxError> {
        Ok(Hx711::power_up(self)?)
    }
}

#[inline(always)]
fn spin_delay_100ns() {
    std::hint::spin_loop();
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio {
    use rppal::gpio::{Gpio, InputPin, OutputPin};

    use super::Hx711Lines;
    use crate::error::{HwError, Result};

    /// Raspberry Pi GPIO lines.
    pub struct RppalLines {
        dout: InputPin,
        sck: OutputPin,
    }

    impl RppalLines {
        pub fn open(dout_pin: u8, sck_pin: u8) -> Result<Self> {
            let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
            let dout = gpio
                .get(dout_pin)
                .map_err(|e| HwError::Gpio(format!("open hx711 dout {dout_pin}: {e}")))?
                .into_input();
            let sck = gpio
                .get(sck_pin)
                .map_err(|e| HwError::Gpio(format!("open hx711 sck {sck_pin}: {e}")))?
                .into_output_low();
            Ok(Self { dout, sck })
        }
    }

    impl Hx711Lines for RppalLines {
        fn dout_is_high(&mut self) -> Result<bool> {
            Ok(self.dout.is_high())
        }

        fn set_sck(&mut self, high: bool) -> Result<()> {
            if high {
                self.sck.set_high();
            } else {
                self.sck.set_low();
            }
            Ok(())
        }
    }
}
