//! Process-wide bookkeeping for the shared reader program.
//!
//! Every FIFO-fed channel runs the same wire program on one of a small number of
//! state machines. The program must be installed exactly once per process no matter
//! how many channels are built (possibly from several threads); state machines are
//! claimed per channel and released on drop.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use tracing::{debug, info};

use crate::error::{HwError, Result};

/// Number of state machines available to readers.
pub const STATE_MACHINES: u8 = 4;

static GLOBAL: OnceLock<ChannelRegistry> = OnceLock::new();

/// Proof that the reader program is installed; carries its load offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramHandle {
    offset: u8,
}

impl ProgramHandle {
    pub fn offset(&self) -> u8 {
        self.offset
    }
}

#[derive(Debug, Default)]
pub struct ChannelRegistry {
    program: OnceLock<ProgramHandle>,
    installs: AtomicUsize,
    claimed: AtomicU8,
}

impl ChannelRegistry {
    pub const fn new() -> Self {
        Self {
            program: OnceLock::new(),
            installs: AtomicUsize::new(0),
            claimed: AtomicU8::new(0),
        }
    }

    /// The registry shared by every channel in the process.
    pub fn global() -> &'static ChannelRegistry {
        GLOBAL.get_or_init(ChannelRegistry::new)
    }

    /// Install the reader program on first call; later calls return the same handle
    /// without running `install`. Concurrent first callers block until the winner
    /// finishes, so `install` runs at most once.
    pub fn acquire_program_slot(&self, install: impl FnOnce() -> u8) -> ProgramHandle {
        *self.program.get_or_init(|| {
            let offset = install();
            self.installs.fetch_add(1, Ordering::Relaxed);
            info!(offset, "reader program installed");
            ProgramHandle { offset }
        })
    }

    pub fn program(&self) -> Option<ProgramHandle> {
        self.program.get().copied()
    }

    /// How many times an installer actually ran (0 or 1).
    pub fn install_count(&self) -> usize {
        self.installs.load(Ordering::Relaxed)
    }

    pub fn claim_state_machine(&self) -> Result<StateMachineSlot<'_>> {
        let mut current = self.claimed.load(Ordering::Acquire);
        loop {
            let Some(index) = (0..STATE_MACHINES).find(|i| current & (1 << i) == 0) else {
                return Err(HwError::NoFreeStateMachine(STATE_MACHINES));
            };
            let next = current | (1 << index);
            match self.claimed.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    debug!(index, "state machine claimed");
                    return Ok(StateMachineSlot {
                        registry: self,
                        index,
                    });
                }
                Err(actual) => current = actual,
            }
        }
    }

    pub fn claimed_count(&self) -> u32 {
        self.claimed.load(Ordering::Acquire).count_ones()
    }

    fn release(&self, index: u8) {
        self.claimed.fetch_and(!(1 << index), Ordering::AcqRel);
        debug!(index, "state machine released");
    }
}

/// A claimed state machine; released when dropped.
#[derive(Debug)]
pub struct StateMachineSlot<'a> {
    registry: &'a ChannelRegistry,
    index: u8,
}

impl StateMachineSlot<'_> {
    pub fn index(&self) -> u8 {
        self.index
    }
}

impl Drop for StateMachineSlot<'_> {
    fn drop(&mut self) {
        self.registry.release(self.index);
    }
}
