//! FIFO-fed reader.
//!
//! A state machine running the shared reader program pushes one raw 24-bit word per
//! conversion into a small RX FIFO; this side pops and sign-extends. The FIFO holds
//! words that were converted before the caller asked, which is why batch reads
//! discard a few samples first.

use std::time::Duration;

use crossbeam_channel as xch;
use loadcell_traits::{BoxError, SampleSource, sign_extend_24};
use tracing::trace;

use crate::error::{HwError, Result};
use crate::registry::{ChannelRegistry, ProgramHandle, StateMachineSlot};

/// Depth of the RX FIFO when the two halves are joined.
pub const FIFO_DEPTH: usize = 8;

/// Offset the reader program lands at when installed.
const READER_PROGRAM_OFFSET: u8 = 0;

/// Consumer half as handed to [`FifoSource`].
pub type FifoReceiver = xch::Receiver<u32>;

/// Producer half; stands in for the state machine's push side.
#[derive(Debug, Clone)]
pub struct FifoWriter {
    tx: xch::Sender<u32>,
}

impl FifoWriter {
    /// Push one raw word. Returns `false` when the FIFO is full and the word was dropped,
    /// which is what the hardware does when nobody drains it.
    pub fn push(&self, raw: u32) -> bool {
        self.tx.try_send(raw).is_ok()
    }
}

pub fn fifo(depth: usize) -> (FifoWriter, FifoReceiver) {
    let (tx, rx) = xch::bounded(depth.max(1));
    (FifoWriter { tx }, rx)
}

pub struct FifoSource {
    rx: FifoReceiver,
    program: ProgramHandle,
    slot: StateMachineSlot<'static>,
    enabled: bool,
}

impl FifoSource {
    /// Attach to `rx` using the process-wide registry.
    pub fn new(rx: FifoReceiver) -> Result<Self> {
        Self::with_registry(rx, ChannelRegistry::global())
    }

    pub fn with_registry(
        rx: FifoReceiver,
        registry: &'static ChannelRegistry,
    ) -> Result<Self> {
        let program = registry.acquire_program_slot(|| READER_PROGRAM_OFFSET);
        let slot = registry.claim_state_machine()?;
        trace!(
            sm = slot.index(),
            offset = program.offset(),
            "fifo reader attached"
        );
        Ok(Self {
            rx,
            program,
            slot,
            enabled: true,
        })
    }

    pub fn program(&self) -> ProgramHandle {
        self.program
    }

    pub fn state_machine(&self) -> u8 {
        self.slot.index()
    }

    /// Words currently waiting in the FIFO.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.enabled {
            Ok(())
        } else {
            Err(HwError::Gpio("state machine disabled (powered down)".into()))
        }
    }

    pub fn read_blocking(&mut self) -> Result<i32> {
        self.ensure_enabled()?;
        let raw = self.rx.recv().map_err(|_| HwError::Disconnected)?;
        Ok(sign_extend_24(raw))
    }

    pub fn read_with_timeout(&mut self, timeout: Duration) -> Result<i32> {
        self.ensure_enabled()?;
        match self.rx.recv_timeout(timeout) {
            Ok(raw) => Ok(sign_extend_24(raw)),
            Err(xch::RecvTimeoutError::Timeout) => Err(HwError::Timeout),
            Err(xch::RecvTimeoutError::Disconnected) => Err(HwError::Disconnected),
        }
    }

    pub fn read_nonblocking(&mut self) -> Result<Option<i32>> {
        self.ensure_enabled()?;
        match self.rx.try_recv() {
            Ok(raw) => Ok(Some(sign_extend_24(raw))),
            Err(xch::TryRecvError::Empty) => Ok(None),
            Err(xch::TryRecvError::Disconnected) => Err(HwError::Disconnected),
        }
    }
}

impl SampleSource for FifoSource {
    fn read_blocking(&mut self) -> std::result::Result<i32, BoxError> {
        Ok(FifoSource::read_blocking(self)?)
    }

    fn read_with_timeout(&mut self, timeout: Duration) -> std::result::Result<i32, BoxError> {
        Ok(FifoSource::read_with_timeout(self, timeout)?)
    }

    fn read_nonblocking(&mut self) -> std::result::Result<Option<i32>, BoxError> {
        Ok(FifoSource::read_nonblocking(self)?)
    }

    fn power_down(&mut self) -> std::result::Result<(), BoxError> {
        // only gates reads; the chip's own PD_SCK power-down is not driven from here
        self.enabled = false;
        Ok(())
    }

    fn power_up(&mut self) -> std::result::Result<(), BoxError> {
        self.enabled = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> &'static ChannelRegistry {
        Box::leak(Box::new(ChannelRegistry::new()))
    }

    #[test]
    fn reads_sign_extended_words_in_order() {
        let (w, rx) = fifo(FIFO_DEPTH);
        let mut src = FifoSource::with_registry(rx, registry()).unwrap();
        assert!(w.push(0x00_0010));
        assert!(w.push(0xFF_FFF0));
        assert_eq!(src.read_blocking().unwrap(), 16);
        assert_eq!(src.read_with_timeout(Duration::from_millis(1)).unwrap(), -16);
    }

    #[test]
    fn timeout_and_empty_are_distinct_from_zero() {
        let (_w, rx) = fifo(FIFO_DEPTH);
        let mut src = FifoSource::with_registry(rx, registry()).unwrap();
        assert_eq!(src.read_nonblocking().unwrap(), None);
        let err = src.read_with_timeout(Duration::from_millis(2)).unwrap_err();
        assert!(matches!(err, HwError::Timeout));
    }

    #[test]
    fn dropped_writer_disconnects() {
        let (w, rx) = fifo(FIFO_DEPTH);
        let mut src = FifoSource::with_registry(rx, registry()).unwrap();
        drop(w);
        assert!(matches!(
            src.read_blocking().unwrap_err(),
            HwError::Disconnected
        ));
    }

    #[test]
    fn full_fifo_drops_new_words() {
        let (w, rx) = fifo(2);
        let src = FifoSource::with_registry(rx, registry()).unwrap();
        assert!(w.push(1));
        assert!(w.push(2));
        assert!(!w.push(3));
        assert_eq!(src.pending(), 2);
    }

    #[test]
    fn channels_share_one_program_install() {
        let reg = registry();
        let (_w1, rx1) = fifo(FIFO_DEPTH);
        let (_w2, rx2) = fifo(FIFO_DEPTH);
        let a = FifoSource::with_registry(rx1, reg).unwrap();
        let b = FifoSource::with_registry(rx2, reg).unwrap();
        assert_eq!(a.program(), b.program());
        assert_ne!(a.state_machine(), b.state_machine());
        assert_eq!(reg.install_count(), 1);
    }

    #[test]
    fn powered_down_source_refuses_reads() {
        let (w, rx) = fifo(FIFO_DEPTH);
        let mut src = FifoSource::with_registry(rx, registry()).unwrap();
        w.push(5);
        SampleSource::power_down(&mut src).unwrap();
        assert!(FifoSource::read_nonblocking(&mut src).is_err());
        SampleSource::power_up(&mut src).unwrap();
        assert_eq!(FifoSource::read_nonblocking(&mut src).unwrap(), Some(5));
    }
}
