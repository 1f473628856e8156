//! `From` implementations bridging `loadcell_config` types to `loadcell_core` types.

use std::time::Duration;

use crate::calibration::ScaleEntry;
use crate::channel::ChannelSettings;

impl From<&loadcell_config::ChannelCfg> for ChannelSettings {
    fn from(c: &loadcell_config::ChannelCfg) -> Self {
        Self {
            window: c.window,
            trim: c.trim,
            discard: c.discard,
            tare_samples: c.tare_samples,
            calibrate_samples: c.calibrate_samples,
            trimmed_samples: c.trimmed_samples,
            trimmed_trim: c.trimmed_trim,
            // 0 means wait forever
            read_timeout: (c.read_timeout_ms > 0).then(|| Duration::from_millis(c.read_timeout_ms)),
        }
    }
}

impl From<&loadcell_config::PersistedCalibration> for ScaleEntry {
    fn from(c: &loadcell_config::PersistedCalibration) -> Self {
        ScaleEntry::new(c.offset_counts, c.counts_per_gram)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_cfg_maps_to_settings() {
        let cfg = loadcell_config::ChannelCfg {
            window: 9,
            trim: 2,
            read_timeout_ms: 0,
            ..Default::default()
        };
        let s = ChannelSettings::from(&cfg);
        assert_eq!((s.window, s.trim), (9, 2));
        assert_eq!(s.read_timeout, None);
        assert_eq!(s.discard, 6);

        let cfg = loadcell_config::ChannelCfg {
            read_timeout_ms: 250,
            ..Default::default()
        };
        assert_eq!(
            ChannelSettings::from(&cfg).read_timeout,
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn persisted_calibration_maps_to_entry() {
        let p = loadcell_config::PersistedCalibration {
            offset_counts: -12,
            counts_per_gram: 420.0,
        };
        assert_eq!(ScaleEntry::from(&p), ScaleEntry::new(-12, 420.0));
    }
}
