#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the load-cell workspace.
//!
//! - `Config` and its sections are deserialized from TOML and validated with `validate()`.
//! - Every section except `[[channel]]` is optional; a file with no channels gets one
//!   default channel.
use serde::Deserialize;

/// Compile-time capacity of the rolling window in the core filter.
pub const MAX_WINDOW: usize = 32;

/// Number of entries in the persisted calibration record.
pub const MAX_CHANNELS: usize = 3;

/// Size of the persisted record; a sector must hold at least this much.
pub const RECORD_LEN: u32 = 32;

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ChannelCfg {
    pub name: String,
    /// BCM pin for HX711 DOUT
    pub dout: u8,
    /// BCM pin for HX711 PD_SCK
    pub sck: u8,
    /// 128 or 64 (channel A) or 32 (channel B)
    pub gain: u8,
    /// Output data rate in samples per second: 10 or 80
    pub rate: u8,
    /// Rolling trimmed filter window (1..=32)
    pub window: usize,
    /// Samples dropped from each end of the sorted window
    pub trim: usize,
    /// Stale samples dropped before a batch average
    pub discard: u32,
    pub tare_samples: i32,
    pub calibrate_samples: i32,
    /// Batch size of the trimmed one-shot read (0 selects 15)
    pub trimmed_samples: usize,
    pub trimmed_trim: usize,
    /// Bound on a single sample read; 0 waits forever
    pub read_timeout_ms: u64,
    /// Calibration used when no valid record is found in storage.
    pub calibration: Option<PersistedCalibration>,
}

impl Default for ChannelCfg {
    fn default() -> Self {
        Self {
            name: "ch0".into(),
            dout: 5,
            sck: 6,
            gain: 128,
            rate: 10,
            window: 15,
            trim: 3,
            discard: 6,
            tare_samples: 15,
            calibrate_samples: 15,
            trimmed_samples: 15,
            trimmed_trim: 3,
            read_timeout_ms: 500,
            calibration: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct PersistedCalibration {
    /// zero-load reading in raw counts
    pub offset_counts: i32,
    /// raw counts per gram
    pub counts_per_gram: f32,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StorageCfg {
    /// Flash image file; the record lives in its top sector.
    pub path: String,
    pub sector_size: u32,
    pub capacity: u32,
}

impl Default for StorageCfg {
    fn default() -> Self {
        Self {
            path: "loadcell-flash.bin".into(),
            sector_size: 4096,
            capacity: 64 * 1024,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "channel")]
    pub channels: Vec<ChannelCfg>,
    pub storage: StorageCfg,
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channels: vec![ChannelCfg::default()],
            storage: StorageCfg::default(),
            logging: Logging::default(),
        }
    }
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    let mut cfg = toml::from_str::<Config>(s)?;
    if cfg.channels.is_empty() {
        cfg.channels.push(ChannelCfg::default());
    }
    Ok(cfg)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &std::path::Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {}: {}", path.display(), e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {}: {}", path.display(), e))?;
    cfg.validate()
        .map_err(|e| eyre::eyre!("invalid config {}: {}", path.display(), e))?;
    Ok(cfg)
}

impl Config {
    /// Look a channel up by name or by index ("0", "1", ...).
    pub fn channel(&self, key: &str) -> Option<(usize, &ChannelCfg)> {
        if let Some(found) = self.channels.iter().enumerate().find(|(_, c)| c.name == key) {
            return Some(found);
        }
        key.parse::<usize>()
            .ok()
            .and_then(|i| self.channels.get(i).map(|c| (i, c)))
    }

    pub fn validate(&self) -> eyre::Result<()> {
        if self.channels.is_empty() {
            eyre::bail!("at least one [[channel]] is required");
        }
        if self.channels.len() > MAX_CHANNELS {
            eyre::bail!(
                "at most {} channels are supported, got {}",
                MAX_CHANNELS,
                self.channels.len()
            );
        }

        for (i, ch) in self.channels.iter().enumerate() {
            let at = format!("channel[{i}]");
            if ch.name.trim().is_empty() {
                eyre::bail!("{at}.name must not be empty");
            }
            if self.channels[..i].iter().any(|c| c.name == ch.name) {
                eyre::bail!("{at}.name '{}' is used twice", ch.name);
            }
            if ch.dout == ch.sck {
                eyre::bail!("{at}.dout and {at}.sck must be different pins");
            }
            if !matches!(ch.gain, 128 | 64 | 32) {
                eyre::bail!("{at}.gain must be one of 128, 64, 32");
            }
            if !matches!(ch.rate, 10 | 80) {
                eyre::bail!("{at}.rate must be 10 or 80");
            }
            if ch.window == 0 || ch.window > MAX_WINDOW {
                eyre::bail!("{at}.window must be in 1..={MAX_WINDOW}");
            }
            if ch.trim >= ch.window.div_ceil(2) {
                eyre::bail!("{at}.trim must satisfy 2*trim < window");
            }
            if ch.discard > 64 {
                eyre::bail!("{at}.discard is unreasonably large (>64)");
            }
            if ch.tare_samples <= 0 {
                eyre::bail!("{at}.tare_samples must be >= 1");
            }
            if ch.calibrate_samples <= 0 {
                eyre::bail!("{at}.calibrate_samples must be >= 1");
            }
            if ch.trimmed_samples != 0 && ch.trimmed_trim >= ch.trimmed_samples.div_ceil(2) {
                eyre::bail!("{at}.trimmed_trim must satisfy 2*trimmed_trim < trimmed_samples");
            }
            if ch.read_timeout_ms > 60_000 {
                eyre::bail!("{at}.read_timeout_ms is unreasonably large (>60s)");
            }
            if let Some(cal) = ch.calibration
                && !(cal.counts_per_gram.is_finite() && cal.counts_per_gram > 0.0)
            {
                eyre::bail!("{at}.calibration.counts_per_gram must be a positive number");
            }
        }

        // Storage
        if self.storage.path.trim().is_empty() {
            eyre::bail!("storage.path must not be empty");
        }
        if self.storage.sector_size < RECORD_LEN {
            eyre::bail!("storage.sector_size must be >= {RECORD_LEN}");
        }
        if self.storage.capacity < self.storage.sector_size {
            eyre::bail!("storage.capacity must hold at least one sector");
        }
        if self.storage.capacity % self.storage.sector_size != 0 {
            eyre::bail!("storage.capacity must be a multiple of storage.sector_size");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never, daily, hourly");
        }

        Ok(())
    }
}
