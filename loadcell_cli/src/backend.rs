//! Sample-source selection: simulator by default, HX711 on GPIO with `hardware`.
//!
//! The simulator is driven by environment variables so end-to-end tests can script it:
//! - `LOADCELL_SIM_COUNTS`: comma-separated counts, cycled (default `0`)
//! - `LOADCELL_SIM_LOADED_COUNTS`: counts played once the calibration weight is placed
//! - `LOADCELL_SIM_TIMEOUT=1`: a device that never becomes ready

use std::time::Duration;

use eyre::WrapErr;
use loadcell_config::ChannelCfg;
use loadcell_hardware::SimulatedSource;
use loadcell_traits::{BoxError, SampleSource};

pub const ENV_SIM_COUNTS: &str = "LOADCELL_SIM_COUNTS";
pub const ENV_SIM_LOADED: &str = "LOADCELL_SIM_LOADED_COUNTS";
pub const ENV_SIM_TIMEOUT: &str = "LOADCELL_SIM_TIMEOUT";

pub enum Rig {
    Sim {
        source: SimulatedSource,
        loaded: Option<Vec<i32>>,
    },
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    Hx711(loadcell_hardware::Hx711<loadcell_hardware::RppalLines>),
}

pub fn parse_counts(s: &str) -> eyre::Result<Vec<i32>> {
    let v = s
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| {
            t.parse::<i32>()
                .map_err(|e| eyre::eyre!("invalid count '{t}': {e}"))
        })
        .collect::<eyre::Result<Vec<_>>>()?;
    if v.is_empty() {
        eyre::bail!("count list is empty");
    }
    Ok(v)
}

impl Rig {
    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    pub fn open(ch: &ChannelCfg) -> eyre::Result<Self> {
        tracing::debug!(channel = %ch.name, "using simulated load cell");
        Self::simulated()
    }

    #[cfg(all(feature = "hardware", target_os = "linux"))]
    pub fn open(ch: &ChannelCfg) -> eyre::Result<Self> {
        if std::env::var_os(ENV_SIM_COUNTS).is_some() || std::env::var_os(ENV_SIM_TIMEOUT).is_some() {
            return Self::simulated();
        }
        let (gain, rate) = hx711_params(ch);
        let lines = loadcell_hardware::RppalLines::open(ch.dout, ch.sck)
            .wrap_err_with(|| format!("open hx711 for channel '{}'", ch.name))?;
        let hx = loadcell_hardware::Hx711::new(lines, gain)?;
        tracing::info!(channel = %ch.name, dout = ch.dout, sck = ch.sck, ?gain, ?rate, "hx711 ready");
        hx.wait_settle(rate);
        Ok(Self::Hx711(hx))
    }

    fn simulated() -> eyre::Result<Self> {
        if std::env::var(ENV_SIM_TIMEOUT).is_ok_and(|v| v == "1") {
            return Ok(Self::Sim {
                source: SimulatedSource::unresponsive(),
                loaded: None,
            });
        }
        let counts = match std::env::var(ENV_SIM_COUNTS) {
            Ok(s) => parse_counts(&s).wrap_err_with(|| format!("parse {ENV_SIM_COUNTS}"))?,
            Err(_) => vec![0],
        };
        let loaded = match std::env::var(ENV_SIM_LOADED) {
            Ok(s) => Some(parse_counts(&s).wrap_err_with(|| format!("parse {ENV_SIM_LOADED}"))?),
            Err(_) => None,
        };
        Ok(Self::Sim {
            source: SimulatedSource::scripted(counts),
            loaded,
        })
    }

    /// The operator has put the calibration weight on the cell.
    pub fn weight_placed(&mut self) {
        match self {
            Self::Sim { source, loaded } => {
                if let Some(script) = loaded.take() {
                    source.set_script(script);
                }
            }
            #[cfg(all(feature = "hardware", target_os = "linux"))]
            Self::Hx711(_) => {}
        }
    }

    fn inner(&mut self) -> &mut dyn SampleSource {
        match self {
            Self::Sim { source, .. } => source,
            #[cfg(all(feature = "hardware", target_os = "linux"))]
            Self::Hx711(hx) => hx,
        }
    }
}

impl SampleSource for Rig {
    fn read_blocking(&mut self) -> Result<i32, BoxError> {
        self.inner().read_blocking()
    }

    fn read_with_timeout(&mut self, timeout: Duration) -> Result<i32, BoxError> {
        self.inner().read_with_timeout(timeout)
    }

    fn read_nonblocking(&mut self) -> Result<Option<i32>, BoxError> {
        self.inner().read_nonblocking()
    }

    fn power_down(&mut self) -> Result<(), BoxError> {
        self.inner().power_down()
    }

    fn power_up(&mut self) -> Result<(), BoxError> {
        self.inner().power_up()
    }
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn hx711_params(ch: &ChannelCfg) -> (loadcell_hardware::Gain, loadcell_hardware::Rate) {
    use loadcell_hardware::{Gain, Rate};
    let gain = match ch.gain {
        64 => Gain::Gain64,
        32 => Gain::Gain32,
        _ => Gain::Gain128,
    };
    let rate = if ch.rate == 80 { Rate::Sps80 } else { Rate::Sps10 };
    (gain, rate)
}
