#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Load-cell signal conditioning, calibration and persistence (hardware-agnostic).
//!
//! All sampling goes through `loadcell_traits::SampleSource` and all persistence
//! through `loadcell_traits::BlockStorage`.
//!
//! ## Architecture
//!
//! - **Batch average** (`batch`): drop in-flight samples, average a batch; for tare/calibrate
//! - **Trimmed batch** (`trimmed`): sort a batch, drop `k` per side; spike-resistant one-shot
//! - **Rolling filter** (`rolling`): sliding window with an incrementally sorted copy
//! - **Calibration** (`calibration`): offset and counts-per-gram, `Uninitialized → Tared → Calibrated`
//! - **Store** (`store`): 32-byte CRC-checked record for three channels in the top flash sector
//! - **Channel** (`channel`): one sensor tying source, calibration and filter together
//!
//! Weight is `(counts - offset) / counts_per_gram`; a timeout from the source is always
//! an error, never a zero reading.

pub mod batch;
pub mod calibration;
pub mod channel;
pub mod conversions;
pub mod error;
pub mod hw_error;
pub mod rolling;
pub mod store;
pub mod trimmed;

pub use batch::{BatchAverager, DEFAULT_DISCARD, read_average};
pub use calibration::{CalibrationState, MIN_SAMPLES, Phase, ScaleEntry};
pub use channel::{Channel, ChannelBuilder, ChannelSettings};
pub use error::{BuildError, Result, ScaleError, StoreError};
pub use hw_error::map_hw_error;
pub use rolling::RollingTrimmedFilter;
pub use store::{ConfigRecord, ConfigStore, MAGIC, RECORD_LEN, crc32};
pub use trimmed::{read_trimmed, read_trimmed_within};
