//! Sample sources and block storage for HX711 load cells.
//!
//! - [`hx711::Hx711`]: bit-banged reader over any [`hx711::Hx711Lines`] (rppal lines behind `hardware`)
//! - [`fifo::FifoSource`]: reader fed by a state machine through a small RX FIFO
//! - [`sim::SimulatedSource`]: scripted counts for tests and `--sim` runs
//! - [`flash::MemFlash`] / [`flash::FileFlash`]: NOR-flash style storage for the config record

pub mod error;
pub mod fifo;
pub mod flash;
pub mod hx711;
pub mod registry;
pub mod sim;
pub mod util;

pub use error::HwError;
pub use fifo::{FIFO_DEPTH, FifoReceiver, FifoSource, FifoWriter, fifo};
pub use flash::{DEFAULT_SECTOR_SIZE, FileFlash, MemFlash};
pub use hx711::{Gain, Hx711, Hx711Lines, Rate};
pub use registry::{ChannelRegistry, ProgramHandle, STATE_MACHINES, StateMachineSlot};
pub use sim::SimulatedSource;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use hx711::gpio::RppalLines;
